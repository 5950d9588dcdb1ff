//! Logging to the console and to a per-block log file at once.
//!
//! `env_logger` does the filtering and formatting; its output goes through
//! a [`LogTee`] that writes every line to the file and, unless muted, to
//! stderr. The logger is installed before the block's file name is known,
//! so setup errors still reach the console; the file is attached with
//! [`LogHandle::log_to_file`] once it is. The task display mutes the
//! console while it owns the terminal.

use env_logger::{Builder, Env, Target, WriteStyle};
use log::SetLoggerError;
use std::{
    fmt,
    fs::{File, OpenOptions},
    io::{self, Write},
    path::Path,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex, PoisonError,
    },
};

/// Switches console output of the log on and off.
#[derive(Debug, Clone)]
pub struct ConsoleSwitch {
    enabled: Arc<AtomicBool>,
}

impl ConsoleSwitch {
    fn new() -> Self {
        Self {
            enabled: Arc::new(AtomicBool::new(true)),
        }
    }

    pub fn mute(&self) {
        self.enabled.store(false, Ordering::SeqCst);
    }

    pub fn unmute(&self) {
        self.enabled.store(true, Ordering::SeqCst);
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }
}

/// Writes to a file and, while its [`ConsoleSwitch`] is on, a console.
pub struct LogTee<F: Write, C: Write> {
    file: F,
    console: C,
    switch: ConsoleSwitch,
}

impl<F: Write, C: Write> Write for LogTee<F, C> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.file.write_all(buf)?;
        if self.switch.is_enabled() {
            // Console failures are ignored
            let _ = self.console.write_all(buf);
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        let _ = self.console.flush();
        self.file.flush()
    }
}

/// Returned when logging can't be set up.
#[derive(Debug)]
pub enum LoggingError {
    IoError(io::Error),
    AlreadyInitialized(SetLoggerError),
}

impl fmt::Display for LoggingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::IoError(e) => write!(f, "could not open log file: {}", e),
            Self::AlreadyInitialized(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for LoggingError {}

/// The block's log file, once one is attached. Until then lines only go to
/// the console.
#[derive(Debug, Clone, Default)]
pub struct LogFile {
    file: Arc<Mutex<Option<File>>>,
}

impl LogFile {
    /// Append every later line to `path`.
    pub fn attach(&self, path: impl AsRef<Path>) -> Result<(), LoggingError> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(LoggingError::IoError)?;
        *self.file.lock().unwrap_or_else(PoisonError::into_inner) = Some(file);
        Ok(())
    }
}

impl Write for LogFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self.file.lock().unwrap_or_else(PoisonError::into_inner).as_mut() {
            Some(file) => file.write_all(buf).map(|_| buf.len()),
            None => Ok(buf.len()),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self.file.lock().unwrap_or_else(PoisonError::into_inner).as_mut() {
            Some(file) => file.flush(),
            None => Ok(()),
        }
    }
}

/// What [`init`] hands back to steer the installed logger.
#[derive(Debug, Clone)]
pub struct LogHandle {
    console: ConsoleSwitch,
    file: LogFile,
}

impl LogHandle {
    pub fn console(&self) -> &ConsoleSwitch {
        &self.console
    }

    /// Start appending to `path` as well as the console.
    pub fn log_to_file(&self, path: impl AsRef<Path>) -> Result<(), LoggingError> {
        self.file.attach(path)
    }
}

/// Install the global logger, writing to stderr until a file is attached.
/// The level defaults to `info` and can be changed with `RUST_LOG`.
pub fn init() -> Result<LogHandle, LoggingError> {
    let switch = ConsoleSwitch::new();
    let file = LogFile::default();
    let tee = LogTee {
        file: file.clone(),
        console: io::stderr(),
        switch: switch.clone(),
    };

    Builder::from_env(Env::default().default_filter_or("info"))
        .format(|buf, record| {
            writeln!(
                buf,
                "{} {:<5} {}",
                buf.timestamp_millis(),
                record.level(),
                record.args()
            )
        })
        .write_style(WriteStyle::Never)
        .target(Target::Pipe(Box::new(tee)))
        .try_init()
        .map_err(LoggingError::AlreadyInitialized)?;

    Ok(LogHandle {
        console: switch,
        file,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn tee_writes_both() {
        let switch = ConsoleSwitch::new();
        let mut tee = LogTee {
            file: Vec::new(),
            console: Vec::new(),
            switch: switch.clone(),
        };

        writeln!(tee, "session opened").unwrap();
        switch.mute();
        writeln!(tee, "target 3 hit").unwrap();
        switch.unmute();
        writeln!(tee, "saved").unwrap();

        assert_eq!(
            String::from_utf8(tee.file).unwrap(),
            "session opened\ntarget 3 hit\nsaved\n"
        );
        assert_eq!(
            String::from_utf8(tee.console).unwrap(),
            "session opened\nsaved\n"
        );
    }

    #[test]
    fn file_error_propagates() {
        struct Broken;
        impl Write for Broken {
            fn write(&mut self, _: &[u8]) -> io::Result<usize> {
                Err(io::Error::new(io::ErrorKind::Other, "disk full"))
            }
            fn flush(&mut self) -> io::Result<()> {
                Ok(())
            }
        }

        let mut tee = LogTee {
            file: Broken,
            console: Vec::new(),
            switch: ConsoleSwitch::new(),
        };
        assert!(tee.write(b"x\n").is_err());
    }

    #[test]
    fn file_attached_later() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("P01_block1.log");
        let file = LogFile::default();
        let mut tee = LogTee {
            file: file.clone(),
            console: Vec::new(),
            switch: ConsoleSwitch::new(),
        };

        writeln!(tee, "invalid trial count").unwrap();
        assert!(!path.exists());

        file.attach(&path).unwrap();
        writeln!(tee, "block 1 started").unwrap();
        tee.flush().unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "block 1 started\n");
        assert_eq!(
            String::from_utf8(tee.console).unwrap(),
            "invalid trial count\nblock 1 started\n"
        );
    }

    #[test]
    fn attach_reports_open_failure() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("no_such_dir").join("x.log");
        assert!(matches!(
            LogFile::default().attach(missing),
            Err(LoggingError::IoError(_))
        ));
    }
}
