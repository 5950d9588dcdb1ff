//! The questions asked at the console before a block starts.

use crate::setup::SetupError;

use std::{
    io::{self, BufRead, Write},
    path::{Path, PathBuf},
};

/// Used when the participant prompt is left blank.
pub const ANONYMOUS: &str = "anonymous";

/// What the operator told us about this block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Answers {
    pub trial_count: usize,
    pub participant_id: String,
    pub data_dir: PathBuf,
}

/// Parse a trial count, which must be a whole number greater than zero.
pub fn parse_trial_count(input: &str) -> Result<usize, SetupError> {
    match input.trim().parse::<usize>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(SetupError::InvalidTrialCount(input.trim().to_owned())),
    }
}

/// Print `question`, then read one line. End of input reads as blank.
pub fn ask<R: BufRead, W: Write>(input: &mut R, output: &mut W, question: &str) -> io::Result<String> {
    write!(output, "{}", question)?;
    output.flush()?;

    let mut line = String::new();
    input.read_line(&mut line)?;
    Ok(line.trim().to_owned())
}

/// Ask for the trial count, participant and data directory, in that order.
/// The trial count is checked before anything else is asked.
pub fn ask_all<R: BufRead, W: Write>(
    input: &mut R,
    output: &mut W,
    default_data_dir: &Path,
) -> Result<Answers, SetupError> {
    let trial_count = parse_trial_count(&ask(input, output, "Number of trials: ")?)?;

    let participant_id = ask(input, output, "Participant ID: ")?;
    let participant_id = if participant_id.is_empty() {
        ANONYMOUS.to_owned()
    } else {
        participant_id
    };

    let question = format!("Data directory [{}]: ", default_data_dir.display());
    let data_dir = ask(input, output, &question)?;
    let data_dir = if data_dir.is_empty() {
        default_data_dir.to_path_buf()
    } else {
        PathBuf::from(data_dir)
    };

    Ok(Answers {
        trial_count,
        participant_id,
        data_dir,
    })
}
