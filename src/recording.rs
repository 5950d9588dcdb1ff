//! The recording gate and the accumulator that turns gated samples into a
//! [`TrialRecord`].

use crate::layout::Point;
use crate::sample::Sample;

use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

/// Whether samples coming off the queue belong to a trial.
///
/// Clones share the same flag, so the acquisition side can read what the
/// main loop sets.
#[derive(Debug, Clone, Default)]
pub struct RecordingGate {
    active: Arc<AtomicBool>,
}

impl RecordingGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    fn set(&self, active: bool) {
        self.active.store(active, Ordering::Release);
    }
}

/// Everything recorded between target onset and target acquisition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialRecord {
    /// Index of the cued target, in `0..8`.
    pub cue: u8,
    pub neural_samples: Vec<Sample>,
    pub cursor_trajectory: Vec<Point>,
    /// Session clock reading when the cue appeared, in ms.
    pub go_time: f64,
    /// Session clock reading of the first sample, in ms.
    pub start_time: f64,
    /// Session clock reading when the target was acquired, in ms.
    pub end_time: f64,
}

impl TrialRecord {
    pub fn duration(&self) -> f64 {
        self.end_time - self.start_time
    }
}

/// Collects the samples and cursor positions of the trial in progress.
#[derive(Debug)]
pub struct TrialAccumulator {
    gate: RecordingGate,
    sample_rate: f64,
    channel_count: usize,
    current_samples: Vec<Sample>,
    current_trajectory: Vec<Point>,
    go_time: f64,
    rejected: u64,
}

impl TrialAccumulator {
    /// Instantiate an idle accumulator for samples of `channel_count`
    /// channels arriving at `sample_rate` Hz.
    pub fn new(sample_rate: f64, channel_count: usize) -> Self {
        Self {
            gate: RecordingGate::new(),
            sample_rate,
            channel_count,
            current_samples: Vec::new(),
            current_trajectory: Vec::new(),
            go_time: 0.0,
            rejected: 0,
        }
    }

    /// A handle to the gate this accumulator opens and closes.
    pub fn gate(&self) -> RecordingGate {
        self.gate.clone()
    }

    pub fn is_active(&self) -> bool {
        self.gate.is_active()
    }

    /// Open the gate and forget whatever the last trial left behind.
    pub fn start_trial(&mut self, go_time: f64) {
        self.current_samples.clear();
        self.current_trajectory.clear();
        self.go_time = go_time;
        self.gate.set(true);
    }

    /// Keep `sample` if a trial is being recorded. Returns whether it was
    /// kept. Samples with the wrong number of channels are never kept.
    pub fn append_if_active(&mut self, sample: Sample) -> bool {
        if !self.gate.is_active() {
            return false;
        }
        if sample.len() != self.channel_count {
            self.rejected += 1;
            warn!(
                "Rejected a sample with {} channels, expected {}",
                sample.len(),
                self.channel_count
            );
            return false;
        }
        self.current_samples.push(sample);
        true
    }

    /// Record where the cursor is, if a trial is being recorded.
    pub fn push_cursor(&mut self, point: Point) {
        if self.gate.is_active() {
            self.current_trajectory.push(point);
        }
    }

    /// Samples kept so far in the current trial.
    pub fn current_len(&self) -> usize {
        self.current_samples.len()
    }

    /// Samples thrown away for having the wrong shape.
    pub fn rejected_count(&self) -> u64 {
        self.rejected
    }

    /// Close the gate and hand back the finished trial.
    ///
    /// The first sample is dated by counting back one sample period per
    /// sample from `now`. A trial with no samples still produces a record,
    /// starting at its go time, so trials stay index aligned.
    pub fn stop_trial(&mut self, cue: u8, now: f64) -> TrialRecord {
        self.gate.set(false);

        let neural_samples = std::mem::take(&mut self.current_samples);
        let cursor_trajectory = std::mem::take(&mut self.current_trajectory);

        let start_time = if neural_samples.is_empty() {
            warn!("No data collected for trial with cue {}", cue);
            self.go_time
        } else {
            now - neural_samples.len() as f64 * (1000.0 / self.sample_rate)
        };

        debug!(
            "Trial with cue {} closed: {} samples, {} cursor points",
            cue,
            neural_samples.len(),
            cursor_trajectory.len()
        );

        TrialRecord {
            cue,
            neural_samples,
            cursor_trajectory,
            go_time: self.go_time,
            start_time,
            end_time: now,
        }
    }

    /// Close the gate and throw the current trial away. Returns how many
    /// samples were lost.
    pub fn abandon_trial(&mut self) -> usize {
        self.gate.set(false);
        let lost = self.current_samples.len();
        self.current_samples.clear();
        self.current_trajectory.clear();
        lost
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gate_closed_by_default() {
        let mut acc = TrialAccumulator::new(250.0, 2);
        assert!(!acc.is_active());
        assert!(!acc.append_if_active(vec![1.0, 2.0]));
        acc.push_cursor(Point::new(1.0, 1.0));
        assert_eq!(acc.current_len(), 0);
    }

    #[test]
    fn gate_handles_share_state() {
        let mut acc = TrialAccumulator::new(250.0, 2);
        let gate = acc.gate();
        acc.start_trial(0.0);
        assert!(gate.is_active());
        acc.stop_trial(0, 10.0);
        assert!(!gate.is_active());
    }

    #[test]
    fn start_time_counts_back_from_now() {
        let mut acc = TrialAccumulator::new(250.0, 2);
        acc.start_trial(1000.0);
        for _ in 0..10 {
            assert!(acc.append_if_active(vec![0.5, -0.5]));
        }
        acc.push_cursor(Point::new(450.0, 350.0));
        acc.push_cursor(Point::new(500.0, 350.0));

        let record = acc.stop_trial(3, 2000.0);
        assert_eq!(record.cue, 3);
        assert_eq!(record.neural_samples.len(), 10);
        assert_eq!(record.cursor_trajectory.len(), 2);
        assert_eq!(record.go_time, 1000.0);
        // 10 samples at 250 Hz are 40 ms
        assert_eq!(record.start_time, 1960.0);
        assert_eq!(record.end_time, 2000.0);
        assert_eq!(record.duration(), 40.0);
        assert!(!acc.is_active());
    }

    #[test]
    fn empty_trial_still_recorded() {
        let mut acc = TrialAccumulator::new(250.0, 2);
        acc.start_trial(500.0);
        let record = acc.stop_trial(7, 900.0);
        assert!(record.neural_samples.is_empty());
        assert_eq!(record.start_time, 500.0);
        assert_eq!(record.duration(), 400.0);
    }

    #[test]
    fn start_clears_previous_trial() {
        let mut acc = TrialAccumulator::new(250.0, 1);
        acc.start_trial(0.0);
        acc.append_if_active(vec![1.0]);
        assert_eq!(acc.abandon_trial(), 1);

        acc.start_trial(10.0);
        acc.append_if_active(vec![2.0]);
        let record = acc.stop_trial(0, 20.0);
        assert_eq!(record.neural_samples, vec![vec![2.0]]);
    }

    #[test]
    fn wrong_shape_rejected() {
        let mut acc = TrialAccumulator::new(250.0, 8);
        acc.start_trial(0.0);
        assert!(!acc.append_if_active(vec![1.0; 3]));
        assert!(acc.append_if_active(vec![1.0; 8]));
        assert_eq!(acc.rejected_count(), 1);
        assert_eq!(acc.current_len(), 1);
    }
}
