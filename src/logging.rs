//! Logger setup for the binary

use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::Path;

use log::warn;

use crate::config::LoggingConfig;

/// Install the global logger.
///
/// The level comes from configuration and `RUST_LOG` overrides it. When a log
/// file is configured, records go to stderr and are appended to the file;
/// a relative file name resolves against `server_dir`.
pub fn init(config: &LoggingConfig, server_dir: &Path) {
    let mut builder = env_logger::Builder::new();
    builder
        .format(|buf, record| {
            writeln!(
                buf,
                "[{} {} {}:{}] {}",
                buf.timestamp_millis(),
                record.level(),
                record.file().unwrap_or("unknown"),
                record.line().unwrap_or(0),
                record.args()
            )
        })
        .filter_level(config.level_filter())
        .parse_default_env();

    let mut open_error = None;
    if let Some(file) = &config.file {
        let path = if file.is_absolute() {
            file.clone()
        } else {
            server_dir.join(file)
        };
        match OpenOptions::new().create(true).append(true).open(&path) {
            Ok(file) => {
                builder.target(env_logger::Target::Pipe(Box::new(Tee::new(file))));
            }
            Err(e) => open_error = Some((path, e)),
        }
    }

    builder.init();

    if let Some((path, e)) = open_error {
        warn!("Cannot open log file {}: {e}, logging to stderr only", path.display());
    }
}

/// Writes every record to stderr and a second sink.
struct Tee<W> {
    sink: W,
}

impl<W: Write> Tee<W> {
    fn new(sink: W) -> Self {
        Self { sink }
    }
}

impl<W: Write> Write for Tee<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        // stderr is best-effort; the file is the durable copy
        let _ = io::stderr().write_all(buf);
        self.sink.write_all(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        let _ = io::stderr().flush();
        self.sink.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tee_copies_into_sink() {
        let mut tee = Tee::new(Vec::new());
        tee.write_all(b"[0 INFO x.rs:1] hello\n").expect("write");
        tee.flush().expect("flush");
        assert_eq!(tee.sink, b"[0 INFO x.rs:1] hello\n");
    }
}
