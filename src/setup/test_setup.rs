use std::fs;
use std::io::Write;

use super::setup::open_log_file;
use super::*;

#[cfg(test)]
use pretty_assertions::assert_eq;

#[test]
fn test_open_log_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("a/b/caesar.log");

    {
        let mut f = open_log_file(&path).unwrap();
        f.write_all(b"foo\n").unwrap();
    }

    // appended, not truncated
    {
        let mut f = open_log_file(&path).unwrap();
        f.write_all(b"bar\n").unwrap();
    }

    assert_eq!("foo\nbar\n", fs::read_to_string(&path).unwrap());
}

#[test]
fn test_init_logger() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("logs/caesar.log");

    init_logger(&path).unwrap();
    assert!(path.is_file());

    // a directory is not a log file
    assert!(init_logger(dir.path()).is_err());
}
