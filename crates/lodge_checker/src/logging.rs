use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;

use anyhow::Context;
use env_logger::{Builder, Env, Target, WriteStyle};
use log::LevelFilter;

/// Crates whose debug output `--debug` turns on.
const OWN_CRATES: [&str; 4] = [
    "lodge_checker",
    "lodge_scan",
    "reservation_site",
    "notification_services",
];

/// Writes every log line to stdout and to the log file.
struct Tee {
    file: File,
}

impl Write for Tee {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        io::stdout().write_all(buf)?;
        self.file.write_all(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        io::stdout().flush()?;
        self.file.flush()
    }
}

/// Initializes console + file logging.
///
/// Lines look like `2025-04-01 09:30:00,123 [INFO] message`. `RUST_LOG`
/// still applies when `debug` is off.
pub fn init(debug: bool, log_file: &Path) -> anyhow::Result<()> {
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_file)
        .with_context(|| format!("could not open log file {}", log_file.display()))?;

    let mut builder = Builder::from_env(Env::new().default_filter_or("info"));
    if debug {
        builder.filter_level(LevelFilter::Info);
        for krate in OWN_CRATES {
            builder.filter_module(krate, LevelFilter::Debug);
        }
    }

    builder
        .format(|buf, record| {
            writeln!(
                buf,
                "{} [{}] {}",
                chrono::Local::now().format("%Y-%m-%d %H:%M:%S,%3f"),
                record.level(),
                record.args()
            )
        })
        .write_style(WriteStyle::Never)
        .target(Target::Pipe(Box::new(Tee { file })))
        .try_init()
        .context("logger already initialized")?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_tee_appends_to_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("checker.log");
        fs::write(&path, "earlier line\n").unwrap();

        let file = OpenOptions::new().append(true).open(&path).unwrap();
        let mut tee = Tee { file };
        tee.write_all(b"2025-04-01 09:30:00,123 [INFO] hello\n").unwrap();
        tee.flush().unwrap();

        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "earlier line\n2025-04-01 09:30:00,123 [INFO] hello\n"
        );
    }

    #[test]
    fn test_init_fails_for_unwritable_path() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("missing").join("checker.log");
        assert!(init(false, &missing).is_err());
    }
}
