use std::cell::RefCell;
use std::io::{self, Write};
use std::str::from_utf8;
use std::thread;

use chrono::DateTime;
use slog::{slog_crit, slog_debug, slog_info, slog_warn, Drain};

use super::log_format::CaesarFormat;
use super::log_format::TIMESTAMP_FORMAT;

#[cfg(test)]
use pretty_assertions::assert_eq;

thread_local! {
    static BUFFER: RefCell<Vec<u8>> = RefCell::new(Vec::new());
}

struct TestWriter;

impl Write for TestWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        BUFFER.with(|buffer| buffer.borrow_mut().write(buf))
    }
    fn flush(&mut self) -> io::Result<()> {
        BUFFER.with(|buffer| buffer.borrow_mut().flush())
    }
}

fn log_some() {
    let decorator = slog_term::PlainSyncDecorator::new(TestWriter);
    let drain = CaesarFormat::new(decorator).fuse();
    let logger = slog::Logger::root(drain, slog::o!("replica" => 2));

    slog_info!(logger, "started with {} delivery threads", 4);
    slog_debug!(logger, "deliver"; "client" => 1, "position" => 7);
    slog_warn!(logger, "drop undecodable message"; "from" => 1);
    slog_crit!(logger, "halt"; "fatal" => true);
}

#[test]
fn test_caesar_format() {
    let output = thread::Builder::new()
        .name("delivery-2-0".to_string())
        .spawn(|| {
            log_some();
            BUFFER.with(|buffer| from_utf8(&*buffer.borrow()).unwrap().to_string())
        })
        .unwrap()
        .join()
        .unwrap();

    let expect = r#"[2020/05/03 10:13:55.035 +08:00] [INFO] [delivery-2-0] [src/setup/test_format.rs:35] started with 4 delivery threads, replica: 2
[2020/05/03 10:13:55.038 +08:00] [DEBG] [delivery-2-0] [src/setup/test_format.rs:36] deliver, client: 1, position: 7, replica: 2
[2020/05/03 10:13:55.038 +08:00] [WARN] [delivery-2-0] [src/setup/test_format.rs:37] drop undecodable message, from: 1, replica: 2
[2020/05/03 10:13:55.038 +08:00] [CRIT] [delivery-2-0] [src/setup/test_format.rs:38] halt, fatal: true, replica: 2
"#;

    assert_eq!(expect.lines().count(), output.lines().count());

    for (output_line, expect_line) in output.lines().zip(expect.lines()) {
        let date_time = &output_line[1..31];
        assert!(valid_date_time(date_time), "{}", date_time);

        assert_eq!(&expect_line[32..], &output_line[32..]);
    }
}

#[test]
fn test_caesar_format_unnamed_thread() {
    let output = thread::Builder::new()
        .spawn(|| {
            log_some();
            BUFFER.with(|buffer| from_utf8(&*buffer.borrow()).unwrap().to_string())
        })
        .unwrap()
        .join()
        .unwrap();

    let first = output.lines().next().unwrap();
    assert!(first[32..].starts_with("[INFO] [-] [src/setup/test_format.rs:35]"));
}

fn valid_date_time(dt: &str) -> bool {
    DateTime::parse_from_str(dt, TIMESTAMP_FORMAT).is_ok()
}
