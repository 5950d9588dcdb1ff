//! This module provides an API to read and write session files, the format
//! a block of radial8 trials is saved in. The files have the following
//! structure:
//!
//! - First there is a header holding everything but the neural data:
//!   - `metadata`: sample rate, channel count, participant, block, task
//!     name, requested and completed trial counts, and where the file was
//!     meant to be saved
//!   - `cue`: the target index of each trial
//!   - `go_cue_times`, `trial_start_times`, `trial_end_times`,
//!     `trial_durations`: per trial clock readings, in ms
//!   - `neural_lengths`: how many samples each trial really has
//!   - `padded_length`: the length every trial is padded to
//!   - `cursor_trajectories`: the cursor positions of each trial
//! - Then there is a separator, which is a byte of all 1s; `0xFF`.
//! - Finally `neural_data`: big-endian `f32`s, trial by trial, each trial
//!   zero-padded to `padded_length` samples of `channel_count` channels.
//!
//! The header is encoded using [serde] and [ron]. Because it is UTF-8 it
//! can never contain the separator byte. Padding is undone on read using
//! `neural_lengths`, so a padded zero is never mistaken for a reading.
//!
//! If the session file can't be written, [persist_with_fallback] writes a
//! backup instead: a single RON document with the same field names, where
//! `neural_data` is a list of per-trial sample lists with no padding.
//! [read_session] reads either kind.

use crate::layout::Point;
use crate::recording::TrialRecord;
use crate::sample::Sample;
use crate::session::{SessionMetadata, SessionRecord};

use log::{error, info};
use serde::{Deserialize, Serialize};
use std::{
    borrow::Cow,
    fmt,
    fs::{self, File},
    io::{BufWriter, Read, Write},
    path::{Path, PathBuf},
};

/// Extension of session files.
pub const SESSION_EXTENSION: &str = "r8s";

/// Extension of backup files.
pub const BACKUP_EXTENSION: &str = "backup.ron";

const DELIMITER: u8 = 0xFF;

/// A session, laid out the way it is stored on disk.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionFile {
    header: SessionFileHeader,
    neural_data: Vec<f32>,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
struct SessionFileHeader {
    metadata: SessionMetadata,
    cue: Vec<u8>,
    go_cue_times: Vec<f64>,
    trial_start_times: Vec<f64>,
    trial_end_times: Vec<f64>,
    trial_durations: Vec<f64>,
    neural_lengths: Vec<u64>,
    padded_length: u64,
    cursor_trajectories: Vec<Vec<Point>>,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
struct BackupFile {
    metadata: SessionMetadata,
    cue: Vec<u8>,
    go_cue_times: Vec<f64>,
    trial_start_times: Vec<f64>,
    trial_end_times: Vec<f64>,
    trial_durations: Vec<f64>,
    neural_lengths: Vec<u64>,
    cursor_trajectories: Vec<Vec<Point>>,
    neural_data: Vec<Vec<Sample>>,
}

/// Things that go wrong while reading, building, or writing session files.
#[derive(Debug)]
pub enum SessionFileError {
    /// A sample did not have `channel_count` channels.
    ChannelCount {
        trial: usize,
        expected: usize,
        found: usize,
    },

    /// The per-trial fields of a file disagree on the number of trials, or
    /// the data is shorter than the header says.
    Inconsistent(&'static str),

    /// Returned when reading a session file that has no delimiter between
    /// the header and the data.
    NoDelimiter,

    /// Returned when io fails when reading or writing files.
    IoError(std::io::Error),

    /// Returned when serialization of the header fails.
    RonError(ron::Error),

    /// Returned when deserialization of the header fails.
    RonSpannedError(ron::de::SpannedError),
}

impl fmt::Display for SessionFileError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        use SessionFileError as SFE;
        let msg = match self {
            SFE::ChannelCount {
                trial,
                expected,
                found,
            } => Cow::from(format!(
                "trial {} has a sample with {} channels, expected {}",
                trial, found, expected
            )),
            SFE::Inconsistent(what) => Cow::from(format!("inconsistent session file: {}", what)),
            SFE::NoDelimiter => Cow::from("no delimiter in session file"),
            SFE::IoError(error) => Cow::from(format!("io error: {}", error)),
            SFE::RonError(error) => Cow::from(format!("ron error: {}", error)),
            SFE::RonSpannedError(error) => Cow::from(format!("ron spanning error: {}", error)),
        };

        write!(f, "{}", msg)
    }
}

impl std::error::Error for SessionFileError {}

/// Per-trial columns shared by both file kinds.
struct Columns {
    cue: Vec<u8>,
    go_cue_times: Vec<f64>,
    trial_start_times: Vec<f64>,
    trial_end_times: Vec<f64>,
    trial_durations: Vec<f64>,
    neural_lengths: Vec<u64>,
    cursor_trajectories: Vec<Vec<Point>>,
}

impl Columns {
    fn from_trials(trials: &[TrialRecord]) -> Self {
        Self {
            cue: trials.iter().map(|t| t.cue).collect(),
            go_cue_times: trials.iter().map(|t| t.go_time).collect(),
            trial_start_times: trials.iter().map(|t| t.start_time).collect(),
            trial_end_times: trials.iter().map(|t| t.end_time).collect(),
            trial_durations: trials.iter().map(TrialRecord::duration).collect(),
            neural_lengths: trials
                .iter()
                .map(|t| t.neural_samples.len() as u64)
                .collect(),
            cursor_trajectories: trials.iter().map(|t| t.cursor_trajectory.clone()).collect(),
        }
    }

    /// Zip the columns back into trials, taking each trial's samples from
    /// `samples`.
    fn into_trials(
        self,
        samples: impl IntoIterator<Item = Vec<Sample>>,
    ) -> Result<Vec<TrialRecord>, SessionFileError> {
        let n = self.cue.len();
        let lens = [
            self.go_cue_times.len(),
            self.trial_start_times.len(),
            self.trial_end_times.len(),
            self.trial_durations.len(),
            self.neural_lengths.len(),
            self.cursor_trajectories.len(),
        ];
        if lens.iter().any(|&len| len != n) {
            return Err(SessionFileError::Inconsistent("per-trial field lengths differ"));
        }

        let mut samples = samples.into_iter();
        let mut trials = Vec::with_capacity(n);
        for (i, cursor_trajectory) in self.cursor_trajectories.into_iter().enumerate() {
            let neural_samples = samples
                .next()
                .ok_or(SessionFileError::Inconsistent("fewer sample blocks than trials"))?;
            if neural_samples.len() as u64 != self.neural_lengths[i] {
                return Err(SessionFileError::Inconsistent(
                    "neural_lengths does not match the data",
                ));
            }
            trials.push(TrialRecord {
                cue: self.cue[i],
                neural_samples,
                cursor_trajectory,
                go_time: self.go_cue_times[i],
                start_time: self.trial_start_times[i],
                end_time: self.trial_end_times[i],
            });
        }
        Ok(trials)
    }
}

fn check_channels(record: &SessionRecord) -> Result<(), SessionFileError> {
    let expected = record.metadata.channel_count;
    for (trial, t) in record.trials.iter().enumerate() {
        if let Some(bad) = t.neural_samples.iter().find(|s| s.len() != expected) {
            return Err(SessionFileError::ChannelCount {
                trial,
                expected,
                found: bad.len(),
            });
        }
    }
    Ok(())
}

impl SessionFile {
    /// Lay a [SessionRecord] out for writing, padding every trial to the
    /// longest one.
    pub fn from_record(record: &SessionRecord) -> Result<Self, SessionFileError> {
        check_channels(record)?;

        let channel_count = record.metadata.channel_count;
        let padded_length = record
            .trials
            .iter()
            .map(|t| t.neural_samples.len())
            .max()
            .unwrap_or(0);

        let mut neural_data = Vec::with_capacity(record.trials.len() * padded_length * channel_count);
        for trial in &record.trials {
            for sample in &trial.neural_samples {
                neural_data.extend_from_slice(sample);
            }
            let padding = (padded_length - trial.neural_samples.len()) * channel_count;
            neural_data.extend(std::iter::repeat(0.0).take(padding));
        }

        let columns = Columns::from_trials(&record.trials);
        Ok(SessionFile {
            header: SessionFileHeader {
                metadata: record.metadata.clone(),
                cue: columns.cue,
                go_cue_times: columns.go_cue_times,
                trial_start_times: columns.trial_start_times,
                trial_end_times: columns.trial_end_times,
                trial_durations: columns.trial_durations,
                neural_lengths: columns.neural_lengths,
                padded_length: padded_length as u64,
                cursor_trajectories: columns.cursor_trajectories,
            },
            neural_data,
        })
    }

    /// Rebuild the [SessionRecord], dropping the padding.
    pub fn to_record(&self) -> Result<SessionRecord, SessionFileError> {
        let (n_trials, padded_length, channel_count) = self.dims();
        if self.neural_data.len() != n_trials * padded_length * channel_count {
            return Err(SessionFileError::Inconsistent(
                "neural_data is not trials x padded_length x channels",
            ));
        }
        if self
            .header
            .neural_lengths
            .iter()
            .any(|&len| len as usize > padded_length)
        {
            return Err(SessionFileError::Inconsistent(
                "a trial is longer than padded_length",
            ));
        }

        let trial_stride = padded_length * channel_count;
        let samples = self
            .header
            .neural_lengths
            .iter()
            .enumerate()
            .map(|(i, &len)| {
                let start = i * trial_stride;
                let end = start + len as usize * channel_count;
                self.neural_data[start..end]
                    .chunks(channel_count.max(1))
                    .map(<[f32]>::to_vec)
                    .collect()
            })
            .collect::<Vec<Vec<Sample>>>();

        let header = self.header.clone();
        let columns = Columns {
            cue: header.cue,
            go_cue_times: header.go_cue_times,
            trial_start_times: header.trial_start_times,
            trial_end_times: header.trial_end_times,
            trial_durations: header.trial_durations,
            neural_lengths: header.neural_lengths,
            cursor_trajectories: header.cursor_trajectories,
        };

        Ok(SessionRecord {
            trials: columns.into_trials(samples)?,
            metadata: header.metadata,
        })
    }

    /// `(trials, padded_length, channels)` of [SessionFile::padded_neural_data].
    pub fn dims(&self) -> (usize, usize, usize) {
        (
            self.header.cue.len(),
            self.header.padded_length as usize,
            self.header.metadata.channel_count,
        )
    }

    /// The zero-padded neural data, trial by trial, sample by sample,
    /// channel by channel.
    pub fn padded_neural_data(&self) -> &[f32] {
        &self.neural_data
    }

    /// How many samples each trial really has.
    pub fn neural_lengths(&self) -> &[u64] {
        &self.header.neural_lengths
    }

    pub fn metadata(&self) -> &SessionMetadata {
        &self.header.metadata
    }

    /// Write out a [SessionFile] to the path provided. The path holds either
    /// the whole file or nothing; a failed write leaves no partial file.
    pub fn to_path(&self, path: impl AsRef<Path>) -> Result<(), SessionFileError> {
        write_atomically(path.as_ref(), |writer| self.to_file(writer))
    }

    /// Write out a [SessionFile] to the [Write]able object provided.
    pub fn to_file(&self, file: &mut impl Write) -> Result<(), SessionFileError> {
        let h_str = ron::ser::to_string(&self.header).map_err(SessionFileError::RonError)?;

        file.write_all(h_str.as_bytes())
            .map_err(SessionFileError::IoError)?;

        file.write_all(&[DELIMITER])
            .map_err(SessionFileError::IoError)?;

        let s_buf: Vec<u8> = self
            .neural_data
            .iter()
            .flat_map(|f| f.to_be_bytes())
            .collect();

        file.write_all(&s_buf).map_err(SessionFileError::IoError)
    }

    /// Read a [SessionFile] from the path provided.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, SessionFileError> {
        let mut handle = File::open(path).map_err(SessionFileError::IoError)?;
        Self::from_file(&mut handle)
    }

    /// Read a [SessionFile] from the [Read]able object provided.
    pub fn from_file(file: &mut impl Read) -> Result<Self, SessionFileError> {
        let mut raw = Vec::new();
        file.read_to_end(&mut raw)
            .map_err(SessionFileError::IoError)?;
        Self::from_bytes(&raw)
    }

    fn from_bytes(raw: &[u8]) -> Result<Self, SessionFileError> {
        let delim_idx = raw
            .iter()
            .position(|e| *e == DELIMITER)
            .ok_or(SessionFileError::NoDelimiter)?;

        let (header_buf, data_buf) = raw.split_at(delim_idx);
        let data_buf = &data_buf[1..];

        let header = ron::de::from_bytes::<SessionFileHeader>(header_buf)
            .map_err(SessionFileError::RonSpannedError)?;

        if data_buf.len() % 4 != 0 {
            return Err(SessionFileError::Inconsistent("truncated neural_data"));
        }
        let neural_data = data_buf
            .chunks_exact(4)
            .map(|bs| f32::from_be_bytes([bs[0], bs[1], bs[2], bs[3]]))
            .collect();

        Ok(SessionFile {
            header,
            neural_data,
        })
    }
}

/// Write `record` as a backup RON file, with ragged neural data.
pub fn write_backup(record: &SessionRecord, path: impl AsRef<Path>) -> Result<(), SessionFileError> {
    let columns = Columns::from_trials(&record.trials);
    let backup = BackupFile {
        metadata: record.metadata.clone(),
        cue: columns.cue,
        go_cue_times: columns.go_cue_times,
        trial_start_times: columns.trial_start_times,
        trial_end_times: columns.trial_end_times,
        trial_durations: columns.trial_durations,
        neural_lengths: columns.neural_lengths,
        cursor_trajectories: columns.cursor_trajectories,
        neural_data: record
            .trials
            .iter()
            .map(|t| t.neural_samples.clone())
            .collect(),
    };

    let text = ron::ser::to_string_pretty(&backup, ron::ser::PrettyConfig::default())
        .map_err(SessionFileError::RonError)?;
    write_atomically(path.as_ref(), |writer| {
        writer
            .write_all(text.as_bytes())
            .map_err(SessionFileError::IoError)
    })
}

/// Write into a temporary file beside `path`, then rename it over `path`.
/// The temporary file is removed if anything fails.
fn write_atomically<F>(path: &Path, write: F) -> Result<(), SessionFileError>
where
    F: FnOnce(&mut BufWriter<&mut File>) -> Result<(), SessionFileError>,
{
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    let mut partial = tempfile::Builder::new()
        .prefix(".radial8-")
        .suffix(".partial")
        .tempfile_in(dir)
        .map_err(SessionFileError::IoError)?;

    {
        let mut writer = BufWriter::new(partial.as_file_mut());
        write(&mut writer)?;
        writer.flush().map_err(SessionFileError::IoError)?;
    }
    partial
        .as_file()
        .sync_all()
        .map_err(SessionFileError::IoError)?;
    partial
        .persist(path)
        .map_err(|e| SessionFileError::IoError(e.error))?;
    Ok(())
}

fn backup_from_bytes(raw: &[u8]) -> Result<SessionRecord, SessionFileError> {
    let backup = ron::de::from_bytes::<BackupFile>(raw).map_err(SessionFileError::RonSpannedError)?;
    let columns = Columns {
        cue: backup.cue,
        go_cue_times: backup.go_cue_times,
        trial_start_times: backup.trial_start_times,
        trial_end_times: backup.trial_end_times,
        trial_durations: backup.trial_durations,
        neural_lengths: backup.neural_lengths,
        cursor_trajectories: backup.cursor_trajectories,
    };
    Ok(SessionRecord {
        trials: columns.into_trials(backup.neural_data)?,
        metadata: backup.metadata,
    })
}

/// Read a session file or a backup file back into a [SessionRecord].
pub fn read_session(path: impl AsRef<Path>) -> Result<SessionRecord, SessionFileError> {
    let raw = fs::read(path).map_err(SessionFileError::IoError)?;
    // Backups are plain UTF-8, so only a session file has the delimiter
    if raw.contains(&DELIMITER) {
        SessionFile::from_bytes(&raw)?.to_record()
    } else {
        backup_from_bytes(&raw)
    }
}

/// Where the backup for a session file at `primary` goes.
pub fn backup_path_for(primary: impl AsRef<Path>, backup_dir: impl AsRef<Path>) -> PathBuf {
    let stem = primary
        .as_ref()
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "session".to_owned());
    backup_dir
        .as_ref()
        .join(format!("{}.{}", stem, BACKUP_EXTENSION))
}

/// Where a session ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveOutcome {
    Primary(PathBuf),
    Backup(PathBuf),
}

/// Both the session file and its backup failed to write.
#[derive(Debug)]
pub struct PersistenceError {
    pub primary: SessionFileError,
    pub backup: SessionFileError,
}

impl fmt::Display for PersistenceError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "session could not be saved ({}), nor its backup ({})",
            self.primary, self.backup
        )
    }
}

impl std::error::Error for PersistenceError {}

/// Save `record` to `primary`, or to `backup` if that fails.
pub fn persist_with_fallback(
    record: &SessionRecord,
    primary: impl AsRef<Path>,
    backup: impl AsRef<Path>,
) -> Result<SaveOutcome, PersistenceError> {
    let primary = primary.as_ref();
    let backup = backup.as_ref();

    let primary_err = match SessionFile::from_record(record).and_then(|f| f.to_path(primary)) {
        Ok(()) => {
            info!(
                "Saved {} trials to {}",
                record.trials.len(),
                primary.display()
            );
            return Ok(SaveOutcome::Primary(primary.to_path_buf()));
        }
        Err(e) => e,
    };

    error!(
        "Could not save session to {}: {}; writing backup to {}",
        primary.display(),
        primary_err,
        backup.display()
    );

    match write_backup(record, backup) {
        Ok(()) => {
            info!(
                "Saved {} trials to backup {}",
                record.trials.len(),
                backup.display()
            );
            Ok(SaveOutcome::Backup(backup.to_path_buf()))
        }
        Err(backup_err) => {
            error!("Backup {} failed too: {}", backup.display(), backup_err);
            Err(PersistenceError {
                primary: primary_err,
                backup: backup_err,
            })
        }
    }
}

/// Persist a finished session to the path in its metadata, falling back to
/// a backup in `backup_dir`.
pub fn finalize(
    record: &SessionRecord,
    backup_dir: impl AsRef<Path>,
) -> Result<SaveOutcome, PersistenceError> {
    let primary = &record.metadata.save_path;
    persist_with_fallback(record, primary, backup_path_for(primary, backup_dir))
}
