use std::{error::Error, fmt::Display};

#[derive(Debug)]
pub enum RadialGuiError {
    IOError(std::io::Error),
    /// The terminal is narrower or shorter than a usable task display.
    TooSmall { width: u16, height: u16 },
}

impl Display for RadialGuiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::IOError(e) => write!(f, "terminal error: {}", e),
            Self::TooSmall { width, height } => {
                write!(f, "terminal too small for the task ({}x{} cells)", width, height)
            }
        }
    }
}

impl Error for RadialGuiError {}

impl From<std::io::Error> for RadialGuiError {
    fn from(value: std::io::Error) -> Self {
        Self::IOError(value)
    }
}
