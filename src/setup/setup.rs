use std::fs::{self, File, OpenOptions};
use std::io::{self, Error, ErrorKind};
use std::path::Path;

use slog::Drain;

use super::log_format::CaesarFormat;

/// init_logger installs the global logger. Records are appended to the file at `path`.
pub fn init_logger<P: AsRef<Path>>(path: P) -> io::Result<()> {
    let file = open_log_file(path.as_ref())?;

    let decorator = slog_term::PlainDecorator::new(file);
    let drain = CaesarFormat::new(decorator).fuse();
    let drain = slog_async::Async::new(drain).build().fuse();

    let logger = slog::Logger::root(drain, slog::o!());

    slog_global::set_global(logger);

    info!("logger ready: {}", path.as_ref().display());
    Ok(())
}

/// Opens log file with append mode. Creates a new log file and its parent directories if they
/// do not exist.
pub(crate) fn open_log_file(path: &Path) -> io::Result<File> {
    let parent = path.parent().ok_or_else(|| {
        Error::new(
            ErrorKind::Other,
            format!("no parent directory of log file: {}", path.display()),
        )
    })?;
    if !parent.as_os_str().is_empty() && !parent.is_dir() {
        fs::create_dir_all(parent)?
    }
    OpenOptions::new().append(true).create(true).open(path)
}
