//! Everything that has to go right before the first trial: picking a port,
//! working out the block number and where its files go. Failures here are
//! fatal; the task exits with code 1 without starting a session.

use crate::config::ConfigError;
use crate::gui::RadialGuiError;
use crate::logging::LoggingError;
use crate::session_file::SESSION_EXTENSION;
use crate::sample_source::SourceError;

use std::{
    fmt, fs, io,
    path::{Path, PathBuf},
};

/// A problem that stops the task from starting.
#[derive(Debug)]
pub enum SetupError {
    /// There are no serial ports on this machine.
    NoSerialPorts,
    /// The requested port is not one of the available ones.
    PortNotFound(PathBuf),
    /// The operator quit the device selector.
    SelectorCancelled,
    /// The amplifier could not be opened or started.
    DeviceInit(SourceError),
    /// The trial count was not a positive whole number.
    InvalidTrialCount(String),
    Config(ConfigError),
    Logging(LoggingError),
    IOError(io::Error),
    Gui(RadialGuiError),
}

impl fmt::Display for SetupError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoSerialPorts => write!(f, "no serial ports found"),
            Self::PortNotFound(port) => write!(f, "serial port {} not found", port.display()),
            Self::SelectorCancelled => write!(f, "no device selected"),
            Self::DeviceInit(e) => write!(f, "could not start the amplifier: {}", e),
            Self::InvalidTrialCount(input) => {
                write!(f, "trial count must be a positive integer, got {:?}", input)
            }
            Self::Config(e) => write!(f, "bad config: {}", e),
            Self::Logging(e) => write!(f, "{}", e),
            Self::IOError(e) => write!(f, "io error: {}", e),
            Self::Gui(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for SetupError {}

impl From<io::Error> for SetupError {
    fn from(value: io::Error) -> Self {
        Self::IOError(value)
    }
}

impl From<ConfigError> for SetupError {
    fn from(value: ConfigError) -> Self {
        Self::Config(value)
    }
}

impl From<LoggingError> for SetupError {
    fn from(value: LoggingError) -> Self {
        Self::Logging(value)
    }
}

impl From<SourceError> for SetupError {
    fn from(value: SourceError) -> Self {
        Self::DeviceInit(value)
    }
}

impl From<RadialGuiError> for SetupError {
    fn from(value: RadialGuiError) -> Self {
        Self::Gui(value)
    }
}

/// How the port gets chosen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PortChoice {
    /// Use this port without asking.
    Use(PathBuf),
    /// More than one port and nothing requested; ask the operator.
    Ask(Vec<PathBuf>),
}

/// Decide on a port given what is plugged in and what was asked for.
pub fn choose_port(
    mut available: Vec<PathBuf>,
    requested: Option<&Path>,
) -> Result<PortChoice, SetupError> {
    if available.is_empty() {
        return Err(SetupError::NoSerialPorts);
    }

    if let Some(requested) = requested {
        return available
            .into_iter()
            .find(|p| p == requested)
            .map(PortChoice::Use)
            .ok_or_else(|| SetupError::PortNotFound(requested.to_path_buf()));
    }

    if available.len() == 1 {
        return Ok(PortChoice::Use(available.swap_remove(0)));
    }
    Ok(PortChoice::Ask(available))
}

/// Turn free text into something safe to put in a file name.
pub fn file_safe(id: &str) -> String {
    id.chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// The first block number with no session file, backup, or log for this
/// participant in `data_dir`. Blocks count from 1.
pub fn next_block_id(data_dir: impl AsRef<Path>, participant_id: &str) -> io::Result<u32> {
    let prefix = format!("{}_block", file_safe(participant_id));
    let entries = match fs::read_dir(data_dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(1),
        Err(e) => return Err(e),
    };

    let mut highest = 0;
    for entry in entries {
        let name = entry?.file_name();
        let name = name.to_string_lossy();
        let Some(rest) = name.strip_prefix(&prefix) else {
            continue;
        };
        let digits: String = rest.chars().take_while(char::is_ascii_digit).collect();
        if let Ok(n) = digits.parse::<u32>() {
            highest = highest.max(n);
        }
    }
    Ok(highest + 1)
}

/// Where one block's files go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockPaths {
    pub session: PathBuf,
    pub log: PathBuf,
}

impl BlockPaths {
    pub fn new(data_dir: impl AsRef<Path>, participant_id: &str, block_id: u32) -> Self {
        let stem = format!("{}_block{}", file_safe(participant_id), block_id);
        let data_dir = data_dir.as_ref();
        Self {
            session: data_dir.join(format!("{}.{}", stem, SESSION_EXTENSION)),
            log: data_dir.join(format!("{}.log", stem)),
        }
    }
}
