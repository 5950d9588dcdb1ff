//! A session owns everything that lives for one block of trials: the
//! sample queue, the recording gate and accumulator, the scheduler, and the
//! trials recorded so far.
//!
//! The main loop calls [`Session::on_frame`] once per frame and forwards
//! pointer events; [`Session::close`] hands back the [`SessionRecord`] to
//! persist.

use crate::layout::{Point, TargetLayout};
use crate::recording::{RecordingGate, TrialAccumulator, TrialRecord};
use crate::sample_queue::SampleQueue;
use crate::scheduler::{CuePicker, SchedulerEvent, TrialScheduler, TrialState};

use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::{fmt, path::PathBuf, time::Instant};

/// Facts about a session that go into the file next to the data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionMetadata {
    pub sample_rate: f64,
    pub channel_count: usize,
    pub participant_id: String,
    pub block_id: u32,
    pub task_name: String,
    pub requested_trial_count: usize,
    pub completed_trial_count: usize,
    pub save_path: PathBuf,
}

/// Every trial of a session, in the order they were run.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionRecord {
    pub trials: Vec<TrialRecord>,
    pub metadata: SessionMetadata,
}

/// Milliseconds since the session opened, on a monotonic clock.
#[derive(Debug, Clone, Copy)]
pub struct SessionClock {
    start: Instant,
}

impl SessionClock {
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn now_ms(&self) -> f64 {
        self.start.elapsed().as_secs_f64() * 1000.0
    }
}

/// Counts for the end-of-session log line.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSummary {
    pub completed: usize,
    pub requested: usize,
    pub misses: usize,
    pub cancelled: bool,
    pub recorded_samples: usize,
    pub discarded_samples: u64,
    pub rejected_samples: u64,
    pub mean_duration_ms: Option<f64>,
}

impl fmt::Display for SessionSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{} trials{}, {} misses, {} samples recorded, {} discarded, {} rejected",
            self.completed,
            self.requested,
            if self.cancelled { " (cancelled)" } else { "" },
            self.misses,
            self.recorded_samples,
            self.discarded_samples,
            self.rejected_samples,
        )?;
        if let Some(mean) = self.mean_duration_ms {
            write!(f, ", mean trial {:.0} ms", mean)?;
        }
        Ok(())
    }
}

/// The state of one running block.
pub struct Session<P: CuePicker> {
    metadata: SessionMetadata,
    queue: SampleQueue,
    accumulator: TrialAccumulator,
    scheduler: TrialScheduler<P>,
    trials: Vec<TrialRecord>,
    cursor: Option<Point>,
    discarded: u64,
    closed: bool,
}

impl<P: CuePicker> Session<P> {
    /// Start a session that pulls samples from `queue`.
    pub fn open(
        metadata: SessionMetadata,
        layout: TargetLayout,
        picker: P,
        queue: SampleQueue,
    ) -> Self {
        info!(
            "Session opened: task {}, participant {:?}, block {}, {} trials, {} channels at {} Hz",
            metadata.task_name,
            metadata.participant_id,
            metadata.block_id,
            metadata.requested_trial_count,
            metadata.channel_count,
            metadata.sample_rate
        );

        let accumulator = TrialAccumulator::new(metadata.sample_rate, metadata.channel_count);
        let scheduler = TrialScheduler::new(layout, picker, metadata.requested_trial_count);

        Self {
            metadata,
            queue,
            accumulator,
            scheduler,
            trials: Vec::new(),
            cursor: None,
            discarded: 0,
            closed: false,
        }
    }

    pub fn metadata(&self) -> &SessionMetadata {
        &self.metadata
    }

    /// Another handle to the queue this session drains.
    pub fn queue(&self) -> SampleQueue {
        self.queue.clone()
    }

    pub fn gate(&self) -> RecordingGate {
        self.accumulator.gate()
    }

    pub fn scheduler(&self) -> &TrialScheduler<P> {
        &self.scheduler
    }

    pub fn trials(&self) -> &[TrialRecord] {
        &self.trials
    }

    /// Where the pointer was last seen.
    pub fn cursor(&self) -> Option<Point> {
        self.cursor
    }

    /// Samples currently held for the trial in progress.
    pub fn current_trial_len(&self) -> usize {
        self.accumulator.current_len()
    }

    /// Whether the main loop should stop.
    pub fn is_finished(&self) -> bool {
        self.closed || self.scheduler.is_terminal()
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Move everything waiting in the queue through the gate.
    fn drain(&mut self) {
        for sample in self.queue.drain_available() {
            if !self.accumulator.is_active() {
                self.discarded += 1;
                continue;
            }
            // Rejected samples are counted by the accumulator
            self.accumulator.append_if_active(sample);
        }
    }

    /// Once per frame: drain the queue, let the scheduler see the time, and
    /// log where the cursor is if a trial is running.
    pub fn on_frame(&mut self, now: f64) -> SchedulerEvent {
        if self.closed {
            return SchedulerEvent::Ignored;
        }
        self.drain();

        let event = self.scheduler.tick(now);
        if let SchedulerEvent::TargetOnset { target, onset } = event {
            self.accumulator.start_trial(onset);
            info!(
                "Trial {} started: target {} at {:.1} ms",
                self.trials.len() + 1,
                target,
                onset
            );
        }

        if let Some(p) = self.cursor {
            self.accumulator.push_cursor(p);
        }

        event
    }

    pub fn pointer_moved(&mut self, p: Point) {
        self.cursor = Some(p);
    }

    /// Forward a pointer press to the scheduler and record the trial if it
    /// was a hit.
    pub fn pointer_down(&mut self, p: Point, now: f64) -> SchedulerEvent {
        if self.closed {
            return SchedulerEvent::Ignored;
        }
        self.cursor = Some(p);

        let event = self.scheduler.pointer_down(p, now);
        match event {
            SchedulerEvent::TargetHit { target, at } => {
                // Whatever arrived up to the click belongs to this trial
                self.drain();
                self.accumulator.push_cursor(p);
                let record = self.accumulator.stop_trial(target, at);
                info!(
                    "Target {} hit at {:.1} ms, trial {} stopped with {} samples over {:.0} ms",
                    target,
                    at,
                    self.trials.len() + 1,
                    record.neural_samples.len(),
                    record.duration()
                );
                self.trials.push(record);
            }
            SchedulerEvent::TargetMiss { target, distance } => {
                info!("Missed target {} by {:.0}px at {}", target, distance, p);
            }
            SchedulerEvent::DelayStarted { until } => {
                info!("Center clicked, cue due at {:.1} ms", until);
            }
            SchedulerEvent::TargetOnset { .. } | SchedulerEvent::Ignored => {}
        }
        event
    }

    /// Stop running trials, as on window close or escape.
    pub fn cancel(&mut self) {
        if let TrialState::Active { target, .. } = self.scheduler.cancel() {
            let lost = self.accumulator.abandon_trial();
            warn!(
                "Session cancelled during trial with target {}, {} samples discarded",
                target, lost
            );
        }
    }

    pub fn summary(&self) -> SessionSummary {
        let durations: Vec<f64> = self.trials.iter().map(TrialRecord::duration).collect();
        SessionSummary {
            completed: self.trials.len(),
            requested: self.metadata.requested_trial_count,
            misses: self.scheduler.miss_count(),
            cancelled: self.scheduler.was_cancelled(),
            recorded_samples: self.trials.iter().map(|t| t.neural_samples.len()).sum(),
            discarded_samples: self.discarded,
            rejected_samples: self.accumulator.rejected_count(),
            mean_duration_ms: (!durations.is_empty())
                .then(|| durations.iter().sum::<f64>() / durations.len() as f64),
        }
    }

    /// End the session and take its record. Only the first call returns
    /// anything; later calls return `None` and change nothing.
    pub fn close(&mut self) -> Option<SessionRecord> {
        if self.closed {
            return None;
        }
        self.cancel();
        self.drain();
        self.closed = true;

        let mut metadata = self.metadata.clone();
        metadata.completed_trial_count = self.trials.len();
        info!("Session closed: {}", self.summary());

        Some(SessionRecord {
            trials: std::mem::take(&mut self.trials),
            metadata,
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::scheduler::tests::{test_layout, ScriptedPicker};

    pub(crate) fn test_metadata(trials: usize) -> SessionMetadata {
        SessionMetadata {
            sample_rate: 250.0,
            channel_count: 2,
            participant_id: "P01".to_owned(),
            block_id: 1,
            task_name: "radial8".to_owned(),
            requested_trial_count: trials,
            completed_trial_count: 0,
            save_path: PathBuf::from("data/P01_block1.r8s"),
        }
    }

    fn session(targets: &[usize], trials: usize, capture: f64) -> Session<ScriptedPicker> {
        Session::open(
            test_metadata(trials),
            test_layout(capture),
            ScriptedPicker::new(targets),
            SampleQueue::new(),
        )
    }

    /// Click the center, let the cue appear, feed `n` samples, click the
    /// target.
    fn run_trial(session: &mut Session<ScriptedPicker>, now: &mut f64, n: usize) {
        let center = session.scheduler().layout().center();
        session.pointer_down(center, *now);
        *now += 16.0;
        let SchedulerEvent::TargetOnset { target, .. } = session.on_frame(*now) else {
            panic!("the cue should appear with no delay");
        };
        let queue = session.queue();
        for i in 0..n {
            queue.enqueue(vec![i as f32, -(i as f32)]);
        }
        *now += 16.0;
        session.pointer_moved(Point::new(500.0, 400.0));
        session.on_frame(*now);
        *now += 300.0;
        let t = session.scheduler().layout().target(target as usize).unwrap();
        session.pointer_down(t, *now);
    }

    #[test]
    fn three_trial_scenario() {
        let mut session = session(&[2, 5, 0], 3, 10.0);
        let mut now = 0.0;
        for n in [10, 20, 5] {
            run_trial(&mut session, &mut now, n);
        }
        assert!(session.is_finished());

        let record = session.close().unwrap();
        let cues: Vec<u8> = record.trials.iter().map(|t| t.cue).collect();
        assert_eq!(cues, vec![2, 5, 0]);
        assert_eq!(record.trials.len(), 3);
        assert_eq!(record.metadata.completed_trial_count, 3);

        let lens: Vec<usize> = record.trials.iter().map(|t| t.neural_samples.len()).collect();
        assert_eq!(lens, vec![10, 20, 5]);
        // Cursor seen on the onset frame, the next frame, and the click
        assert!(record.trials.iter().all(|t| t.cursor_trajectory.len() == 3));
        assert!(record
            .trials
            .iter()
            .all(|t| t.start_time <= t.end_time && t.go_time <= t.end_time));
    }

    #[test]
    fn miss_scenario() {
        let mut session = session(&[6], 2, 10.0);
        let center = session.scheduler().layout().center();
        session.pointer_down(center, 0.0);
        session.on_frame(16.0);

        let t = session.scheduler().layout().target(6).unwrap();
        let event = session.pointer_down(Point::new(t.x, t.y + 50.0), 100.0);
        assert!(matches!(event, SchedulerEvent::TargetMiss { target: 6, .. }));
        assert_eq!(session.scheduler().active_target(), Some(6));
        assert_eq!(session.scheduler().trial_count(), 0);
        assert!(session.trials().is_empty());
        assert!(session.gate().is_active());
    }

    #[test]
    fn samples_outside_trials_are_discarded() {
        let mut session = session(&[1, 3], 2, 10.0);
        let queue = session.queue();

        // Before any trial
        for _ in 0..7 {
            queue.enqueue(vec![0.0, 0.0]);
        }
        session.on_frame(0.0);
        assert_eq!(session.summary().discarded_samples, 7);

        let mut now = 10.0;
        run_trial(&mut session, &mut now, 12);

        // Between trials, plus one sample of the wrong shape during a trial
        queue.enqueue(vec![0.0, 0.0]);
        session.on_frame(now + 1.0);
        let center = session.scheduler().layout().center();
        session.pointer_down(center, now + 2.0);
        session.on_frame(now + 3.0);
        queue.enqueue(vec![0.0; 3]);
        run_remaining(&mut session, now + 4.0, 3);

        let summary = session.summary();
        let record = session.close().unwrap();
        let recorded: u64 = record
            .trials
            .iter()
            .map(|t| t.neural_samples.len() as u64)
            .sum();
        assert_eq!(recorded, 15);
        assert_eq!(summary.discarded_samples, 8);
        assert_eq!(summary.rejected_samples, 1);
        assert_eq!(
            recorded + summary.discarded_samples + summary.rejected_samples,
            queue.enqueued_count()
        );
    }

    /// Feed `n` samples into the active trial and hit its target.
    fn run_remaining(session: &mut Session<ScriptedPicker>, now: f64, n: usize) {
        let queue = session.queue();
        for _ in 0..n {
            queue.enqueue(vec![1.0, 1.0]);
        }
        let target = session.scheduler().active_target().unwrap();
        let t = session.scheduler().layout().target(target as usize).unwrap();
        session.pointer_down(t, now);
    }

    #[test]
    fn cancel_drops_unfinished_trial() {
        let mut session = session(&[0, 1, 2], 3, 10.0);
        let mut now = 0.0;
        run_trial(&mut session, &mut now, 4);
        run_trial(&mut session, &mut now, 4);

        let center = session.scheduler().layout().center();
        session.pointer_down(center, now);
        session.on_frame(now + 16.0);
        session.queue().enqueue(vec![1.0, 1.0]);
        session.on_frame(now + 32.0);
        assert_eq!(session.current_trial_len(), 1);

        session.cancel();
        assert!(session.is_finished());
        let record = session.close().unwrap();
        assert_eq!(record.trials.len(), 2);
        assert!(record.trials.len() < record.metadata.requested_trial_count);
        assert!(!session.gate().is_active());
    }

    #[test]
    fn close_is_idempotent() {
        let mut session = session(&[4], 1, 10.0);
        let mut now = 0.0;
        run_trial(&mut session, &mut now, 3);

        let first = session.close().unwrap();
        assert_eq!(first.trials.len(), 1);
        assert!(session.close().is_none());
        assert!(session.close().is_none());

        // A closed session ignores input
        let t = session.scheduler().layout().target(4).unwrap();
        assert_eq!(session.pointer_down(t, now + 1.0), SchedulerEvent::Ignored);
        assert!(session.trials().is_empty());
    }

    #[test]
    fn empty_trial_kept() {
        let mut session = session(&[3], 1, 10.0);
        let mut now = 0.0;
        run_trial(&mut session, &mut now, 0);
        let record = session.close().unwrap();
        assert_eq!(record.trials.len(), 1);
        assert!(record.trials[0].neural_samples.is_empty());
        assert_eq!(record.trials[0].cue, 3);
    }
}
