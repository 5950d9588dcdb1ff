//! The trial state machine: when the next cue appears, which target it is,
//! and when the trial is over.
//!
//! ```text
//!            click center       delay elapsed            click on target
//!   Idle ─────────────────> Waiting ─────────> Active ─────────────────> Idle
//!    │                                            │ click elsewhere: miss
//!    └──── trial_count == requested, or cancel ───┴──────────────> Terminal
//! ```

use crate::layout::{Point, TargetLayout, N_TARGETS};

use rand::Rng;
use std::fmt;

/// Where the randomness of the task comes from.
pub trait CuePicker {
    /// How long to wait, in ms, between leaving the center and the cue.
    fn delay_ms(&mut self) -> f64;

    /// Which target to cue, in `0..N_TARGETS`.
    fn target(&mut self) -> usize;
}

/// A [`CuePicker`] drawing delays uniformly from `[min_delay_ms,
/// max_delay_ms)` and targets uniformly from the eight.
#[derive(Debug, Clone)]
pub struct RandomPicker<R: Rng> {
    rng: R,
    min_delay_ms: f64,
    max_delay_ms: f64,
}

impl<R: Rng> RandomPicker<R> {
    pub fn new(rng: R, min_delay_ms: f64, max_delay_ms: f64) -> Self {
        Self {
            rng,
            min_delay_ms,
            max_delay_ms,
        }
    }
}

impl<R: Rng> CuePicker for RandomPicker<R> {
    fn delay_ms(&mut self) -> f64 {
        if self.max_delay_ms <= self.min_delay_ms {
            return self.min_delay_ms;
        }
        self.rng.gen_range(self.min_delay_ms..self.max_delay_ms)
    }

    fn target(&mut self) -> usize {
        self.rng.gen_range(0..N_TARGETS)
    }
}

/// The states of a [`TrialScheduler`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TrialState {
    /// Center target showing, waiting for the participant to click it.
    Idle,
    /// Nothing cued yet; the cue appears at `until`.
    Waiting { until: f64 },
    /// `target` has been cued since `onset` and recording is on.
    Active { target: u8, onset: f64 },
    /// No more trials will run.
    Terminal,
}

/// What a tick or a click did to the scheduler.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SchedulerEvent {
    /// Nothing changed.
    Ignored,
    /// The center was clicked; the cue appears at `until`.
    DelayStarted { until: f64 },
    /// `target` was cued. Recording should start.
    TargetOnset { target: u8, onset: f64 },
    /// The cued target was clicked. Recording should stop.
    TargetHit { target: u8, at: f64 },
    /// A click during a trial that was not on the cued target.
    TargetMiss { target: u8, distance: f64 },
}

impl fmt::Display for TrialState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Waiting { .. } => write!(f, "waiting"),
            Self::Active { target, .. } => write!(f, "target {}", target),
            Self::Terminal => write!(f, "done"),
        }
    }
}

/// Drives the trials of one session.
pub struct TrialScheduler<P: CuePicker> {
    layout: TargetLayout,
    picker: P,
    state: TrialState,
    trial_count: usize,
    requested_trial_count: usize,
    cancelled: bool,
    misses: usize,
}

impl<P: CuePicker> TrialScheduler<P> {
    /// Instantiate a scheduler that will run `requested_trial_count` trials.
    pub fn new(layout: TargetLayout, picker: P, requested_trial_count: usize) -> Self {
        let state = if requested_trial_count == 0 {
            TrialState::Terminal
        } else {
            TrialState::Idle
        };
        Self {
            layout,
            picker,
            state,
            trial_count: 0,
            requested_trial_count,
            cancelled: false,
            misses: 0,
        }
    }

    pub fn layout(&self) -> &TargetLayout {
        &self.layout
    }

    pub fn state(&self) -> TrialState {
        self.state
    }

    /// Trials completed so far.
    pub fn trial_count(&self) -> usize {
        self.trial_count
    }

    pub fn requested_trial_count(&self) -> usize {
        self.requested_trial_count
    }

    /// Clicks that missed the cued target.
    pub fn miss_count(&self) -> usize {
        self.misses
    }

    pub fn is_terminal(&self) -> bool {
        self.state == TrialState::Terminal
    }

    /// Whether the session ended through [`TrialScheduler::cancel`] rather
    /// than by running every trial.
    pub fn was_cancelled(&self) -> bool {
        self.cancelled
    }

    /// The target on screen, if any.
    pub fn active_target(&self) -> Option<u8> {
        match self.state {
            TrialState::Active { target, .. } => Some(target),
            _ => None,
        }
    }

    /// Advance the clock to `now`. Fires the cue once the delay is over.
    pub fn tick(&mut self, now: f64) -> SchedulerEvent {
        match self.state {
            TrialState::Waiting { until } if now >= until => {
                // Pickers that hand out bad indices get folded onto the ring
                let target = (self.picker.target() % N_TARGETS) as u8;
                self.state = TrialState::Active { target, onset: now };
                SchedulerEvent::TargetOnset { target, onset: now }
            }
            _ => SchedulerEvent::Ignored,
        }
    }

    /// Handle a pointer press at `p`.
    pub fn pointer_down(&mut self, p: Point, now: f64) -> SchedulerEvent {
        match self.state {
            TrialState::Idle if self.layout.hits_center(p) => {
                let until = now + self.picker.delay_ms().max(0.0);
                self.state = TrialState::Waiting { until };
                SchedulerEvent::DelayStarted { until }
            }
            TrialState::Active { target, .. } => {
                if self.layout.hits_target(target as usize, p) {
                    self.trial_count += 1;
                    self.state = if self.trial_count >= self.requested_trial_count {
                        TrialState::Terminal
                    } else {
                        TrialState::Idle
                    };
                    SchedulerEvent::TargetHit { target, at: now }
                } else {
                    self.misses += 1;
                    let distance = self
                        .layout
                        .target(target as usize)
                        .map_or(f64::INFINITY, |t| t.abs_dist(&p));
                    SchedulerEvent::TargetMiss { target, distance }
                }
            }
            _ => SchedulerEvent::Ignored,
        }
    }

    /// Stop running trials. Returns the state the scheduler was in.
    pub fn cancel(&mut self) -> TrialState {
        let previous = self.state;
        if previous != TrialState::Terminal {
            self.cancelled = true;
            self.state = TrialState::Terminal;
        }
        previous
    }
}
