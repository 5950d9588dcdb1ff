//! Samples as they come off the amplifier, and the parser for the text lines
//! the board firmware writes to the serial port.
//!
//! Each line holds one reading per channel, separated by commas:
//!
//! ```text
//! -12.25,3.5,0.0,1e-3,7,8.125,-0.5,2
//! ```
//!
//! Whitespace around the values and a trailing `\r\n` are tolerated.

use nom::{
    character::complete::{char, line_ending, space0},
    combinator::{eof, opt},
    multi::separated_list1,
    number::complete::float,
    sequence::{delimited, terminated},
    Finish, IResult,
};

use std::fmt;

/// One multi-channel reading. The position of a sample in the queue is the
/// only time information it carries.
pub type Sample = Vec<f32>;

/// Returned when a serial line can not be turned into a [`Sample`].
#[derive(Debug, Clone, PartialEq)]
pub enum SampleParseError {
    /// The line was not a comma separated list of numbers.
    Malformed(String),
    /// The line parsed, but held the wrong number of channels.
    ChannelCount {
        /// How many channels the session expects.
        expected: usize,
        /// How many values the line contained.
        found: usize,
    },
}

impl fmt::Display for SampleParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Malformed(line) => write!(f, "malformed sample line {:?}", line),
            Self::ChannelCount { expected, found } => {
                write!(f, "expected {} channels, found {}", expected, found)
            }
        }
    }
}

impl std::error::Error for SampleParseError {}

fn parse_value(s: &str) -> IResult<&str, f32> {
    delimited(space0, float, space0)(s)
}

fn parse_line(s: &str) -> IResult<&str, Sample> {
    terminated(
        separated_list1(char(','), parse_value),
        terminated(opt(line_ending), eof),
    )(s)
}

/// Parses one line of amplifier output, checking it carries exactly
/// `channel_count` readings.
pub fn parse_sample(line: &str, channel_count: usize) -> Result<Sample, SampleParseError> {
    let (_rest, sample) = parse_line(line)
        .finish()
        .map_err(|_| SampleParseError::Malformed(line.trim_end().to_owned()))?;

    if sample.len() != channel_count {
        return Err(SampleParseError::ChannelCount {
            expected: channel_count,
            found: sample.len(),
        });
    }

    Ok(sample)
}
