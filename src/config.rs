//! Task settings. Every field has a default, so a config file only needs
//! to name what it changes:
//!
//! ```text
//! (sample_rate: 500.0, port: Some("/dev/ttyUSB0"), capture_radius: 40.0)
//! ```

use crate::layout::TargetLayout;
use crate::sample_source::SerialSettings;

use serde::{Deserialize, Serialize};
use std::{borrow::Cow, fmt, fs, io, path::Path, path::PathBuf};

/// Settings for one run of the task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskConfig {
    /// Nominal amplifier sample rate, in Hz.
    pub sample_rate: f64,
    pub channel_count: usize,
    pub baud_rate: u32,
    /// Written to the amplifier to start streaming.
    pub start_command: String,
    /// Written to the amplifier to stop streaming.
    pub stop_command: String,
    /// Serial port to use without asking.
    pub port: Option<PathBuf>,
    /// Cap on samples waiting to be drained; unbounded when `None`.
    pub queue_capacity: Option<usize>,
    /// Frames per second of the task display.
    pub frame_rate: f64,
    pub width: f64,
    pub height: f64,
    pub ring_radius: f64,
    pub target_radius: f64,
    /// How close to the center a click must be to start a trial.
    pub center_radius: f64,
    /// How close to the cued target a click must be to count as a hit.
    pub capture_radius: f64,
    pub min_delay_ms: f64,
    pub max_delay_ms: f64,
    /// Where session files and logs go when the prompt is left blank.
    pub data_dir: PathBuf,
    /// Where the backup file goes if the session file can't be written.
    pub backup_dir: PathBuf,
    pub task_name: String,
}

impl Default for TaskConfig {
    fn default() -> Self {
        Self {
            sample_rate: 250.0,
            channel_count: 8,
            baud_rate: 115200,
            start_command: "b".to_owned(),
            stop_command: "s".to_owned(),
            port: None,
            queue_capacity: None,
            frame_rate: 60.0,
            width: 900.0,
            height: 700.0,
            ring_radius: 250.0,
            target_radius: 10.0,
            center_radius: 30.0,
            capture_radius: 30.0,
            min_delay_ms: 500.0,
            max_delay_ms: 3000.0,
            data_dir: PathBuf::from("data"),
            backup_dir: std::env::temp_dir(),
            task_name: "radial8".to_owned(),
        }
    }
}

/// Returned when a config file can't be read or understood.
#[derive(Debug)]
pub enum ConfigError {
    IoError(io::Error),
    RonSpannedError(ron::de::SpannedError),
    Invalid(&'static str),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let msg = match self {
            Self::IoError(error) => Cow::from(format!("io error: {}", error)),
            Self::RonSpannedError(error) => Cow::from(format!("ron error: {}", error)),
            Self::Invalid(why) => Cow::from(*why),
        };
        write!(f, "{}", msg)
    }
}

impl std::error::Error for ConfigError {}

impl TaskConfig {
    /// Read a config from a RON file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(ConfigError::IoError)?;
        Self::from_ron(&text)
    }

    /// Parse a config from RON text and check it makes sense.
    pub fn from_ron(text: &str) -> Result<Self, ConfigError> {
        let config: Self = ron::de::from_str(text).map_err(ConfigError::RonSpannedError)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if !(self.sample_rate > 0.0) {
            return Err(ConfigError::Invalid("sample_rate must be positive"));
        }
        if self.channel_count == 0 {
            return Err(ConfigError::Invalid("channel_count must be positive"));
        }
        if !(self.frame_rate > 0.0) {
            return Err(ConfigError::Invalid("frame_rate must be positive"));
        }
        if self.min_delay_ms < 0.0 || self.max_delay_ms < self.min_delay_ms {
            return Err(ConfigError::Invalid(
                "delays must satisfy 0 <= min_delay_ms <= max_delay_ms",
            ));
        }
        Ok(())
    }

    /// The target geometry these settings describe.
    pub fn layout(&self) -> TargetLayout {
        TargetLayout::new(
            self.width,
            self.height,
            self.ring_radius,
            self.target_radius,
            self.center_radius,
            self.capture_radius,
        )
    }

    /// The serial settings these settings describe.
    pub fn serial_settings(&self) -> SerialSettings {
        SerialSettings {
            baud_rate: self.baud_rate,
            channel_count: self.channel_count,
            start_command: self.start_command.clone(),
            stop_command: self.stop_command.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn partial_file_keeps_defaults() {
        let config =
            TaskConfig::from_ron("(sample_rate: 500.0, port: Some(\"/dev/ttyUSB0\"))").unwrap();
        assert_eq!(config.sample_rate, 500.0);
        assert_eq!(config.port, Some(PathBuf::from("/dev/ttyUSB0")));
        assert_eq!(config.channel_count, 8);
        assert_eq!(config.capture_radius, 30.0);
    }

    #[test]
    fn empty_file_is_default() {
        assert_eq!(TaskConfig::from_ron("()").unwrap(), TaskConfig::default());
    }

    #[test]
    fn rejects_nonsense() {
        assert!(matches!(
            TaskConfig::from_ron("(sample_rate: 0.0)"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            TaskConfig::from_ron("(min_delay_ms: 10.0, max_delay_ms: 5.0)"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            TaskConfig::from_ron("(sample_rate: \"fast\")"),
            Err(ConfigError::RonSpannedError(_))
        ));
    }

    #[test]
    fn from_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "(channel_count: 4, task_name: \"radial8-practice\")").unwrap();
        let config = TaskConfig::from_path(file.path()).unwrap();
        assert_eq!(config.channel_count, 4);
        assert_eq!(config.task_name, "radial8-practice");

        assert!(matches!(
            TaskConfig::from_path("/definitely/not/here.ron"),
            Err(ConfigError::IoError(_))
        ));
    }

    #[test]
    fn layout_uses_config() {
        let config = TaskConfig {
            capture_radius: 12.0,
            ..TaskConfig::default()
        };
        let layout = config.layout();
        assert_eq!(layout.capture_radius(), 12.0);
        assert_eq!(layout.target(0).unwrap().x, 700.0);
    }
}
