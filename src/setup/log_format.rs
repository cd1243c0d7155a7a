use std::{io, result, thread};

use slog::{Drain, OwnedKVList, Record, KV};
use slog_term::{Decorator, RecordDecorator, Serializer};

pub const TIMESTAMP_FORMAT: &str = "%Y/%m/%d %H:%M:%S%.3f %:z";

/// CaesarFormat writes one line per record:
///
/// ```text
/// [2020/05/03 10:13:55.035 +08:00] [INFO] [delivery-0-1] [src/kv/kv.rs:80] msg, k: v, ...
/// ```
///
/// The thread name tells the replica actor apart from the delivery threads. An unnamed thread
/// is written as `-`.
pub struct CaesarFormat<D>
where
    D: Decorator,
{
    decorator: D,
}

impl<D> Drain for CaesarFormat<D>
where
    D: Decorator,
{
    type Ok = ();
    type Err = io::Error;

    fn log(&self, record: &Record, values: &OwnedKVList) -> result::Result<Self::Ok, Self::Err> {
        self.decorator.with_record(record, values, |rd| {
            write_prefix(rd, record)?;

            rd.start_whitespace()?;
            write!(rd, " ")?;
            rd.start_msg()?;
            write!(rd, "{}", record.msg())?;

            // record kvs first, then the logger's own kvs, each after a comma
            let mut serializer = Serializer::new(&mut *rd, true, true);
            record.kv().serialize(record, &mut serializer)?;
            values.serialize(record, &mut serializer)?;
            serializer.finish()?;

            rd.start_whitespace()?;
            writeln!(rd)?;
            rd.flush()
        })
    }
}

impl<D> CaesarFormat<D>
where
    D: Decorator,
{
    pub fn new(d: D) -> CaesarFormat<D> {
        CaesarFormat { decorator: d }
    }
}

fn write_prefix(rd: &mut dyn RecordDecorator, record: &Record) -> io::Result<()> {
    rd.start_timestamp()?;
    write!(rd, "[{}]", chrono::Local::now().format(TIMESTAMP_FORMAT))?;

    rd.start_whitespace()?;
    write!(rd, " ")?;
    rd.start_level()?;
    write!(rd, "[{}]", record.level().as_short_str())?;

    rd.start_whitespace()?;
    write!(rd, " ")?;
    rd.start_msg()?;
    write!(rd, "[{}]", thread::current().name().unwrap_or("-"))?;

    // there is no `start_line()` or `start_file()`
    rd.start_whitespace()?;
    write!(rd, " ")?;
    rd.start_msg()?;
    write!(rd, "[{}:{}]", record.file(), record.line())
}
