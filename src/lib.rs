//! radial8 runs a center-out reaching task while recording a biosignal
//! amplifier. A participant clicks a center target, waits for one of eight
//! targets on a ring around it to be cued, and reaches for it. Samples
//! streamed from the amplifier while a target is cued are kept with that
//! trial, alongside the cue, the pointer trajectory and the trial's
//! timing, and the whole block is written to one session file for offline
//! analysis.
//!
//! The task runs in a terminal. Amplifier samples arrive on a background
//! thread and are handed to the display loop through a [`SampleQueue`];
//! a shared recording gate decides which of them belong to a trial.
//!
//! The `radial8` binary runs a block, `inspect` reads a saved one back.

pub mod args;
pub mod config;
pub mod dummy_source;
pub mod gui;
pub mod layout;
pub mod logging;
pub mod prompt;
pub mod recording;
pub mod sample;
pub mod sample_queue;
pub mod sample_source;
pub mod scheduler;
pub mod session;
pub mod session_file;
pub mod setup;
pub mod shutdown;

pub use layout::Point;
pub use sample::Sample;
pub use sample_queue::SampleQueue;
