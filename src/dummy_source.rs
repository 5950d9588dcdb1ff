use crate::sample::Sample;
use crate::sample_source::{SampleCallback, SampleSource, SourceError};

use log::{debug, info};
use rand::prelude::*;
use std::f32::consts::PI;
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

/// A [`SampleSource`] that makes up samples at a fixed rate, so the task
/// can be run and tested without an amplifier plugged in.
///
/// Each channel is a sine at its own frequency plus uniform noise.
pub struct DummySource {
    sample_rate: f64,
    channel_count: usize,
    amplitude: f32,
    noise: f32,
    tx: Option<mpsc::Sender<Signal>>,
    handle: Option<thread::JoinHandle<()>>,
}

enum Signal {
    Stop,
}

/// Builder for a [`DummySource`].
#[derive(Debug, Clone)]
pub struct DummySourceBuilder {
    sample_rate: f64,
    channel_count: usize,
    amplitude: f32,
    noise: f32,
}

impl Default for DummySourceBuilder {
    fn default() -> Self {
        Self {
            sample_rate: 250.0,
            channel_count: 8,
            amplitude: 50.0,
            noise: 5.0,
        }
    }
}

impl DummySourceBuilder {
    pub fn sample_rate(self, sample_rate: f64) -> Self {
        Self {
            sample_rate,
            ..self
        }
    }
    pub fn channel_count(self, channel_count: usize) -> Self {
        Self {
            channel_count,
            ..self
        }
    }
    pub fn amplitude(self, amplitude: f32) -> Self {
        Self { amplitude, ..self }
    }
    pub fn noise(self, noise: f32) -> Self {
        Self { noise, ..self }
    }
    pub fn build(self) -> DummySource {
        DummySource {
            sample_rate: self.sample_rate.max(1.0),
            channel_count: self.channel_count,
            amplitude: self.amplitude,
            noise: self.noise,
            tx: None,
            handle: None,
        }
    }
}

impl DummySource {
    /// Get a builder with 8 channels at 250 Hz.
    pub fn builder() -> DummySourceBuilder {
        DummySourceBuilder::default()
    }
}

impl SampleSource for DummySource {
    fn start_stream(&mut self, mut on_sample: SampleCallback) -> Result<(), SourceError> {
        if self.handle.is_some() {
            return Err(SourceError::AlreadyStreaming);
        }

        let (tx, rx) = mpsc::channel::<Signal>();
        let sample_rate = self.sample_rate;
        let channel_count = self.channel_count;
        let amplitude = self.amplitude;
        let noise = self.noise;

        let handle = thread::spawn(move || {
            let mut rng = thread_rng();
            let period = Duration::from_secs_f64(1.0 / sample_rate);
            let mut deadline = Instant::now();
            let mut n: u64 = 0;

            loop {
                match rx.try_recv() {
                    Ok(Signal::Stop) | Err(mpsc::TryRecvError::Disconnected) => break,
                    Err(mpsc::TryRecvError::Empty) => {}
                }

                let t = n as f32 / sample_rate as f32;
                on_sample(synthetic_sample(t, channel_count, amplitude, noise, &mut rng));
                n += 1;

                // Absolute deadlines, an overshoot is made up on the next sample
                deadline += period;
                if let Some(remaining) = deadline.checked_duration_since(Instant::now()) {
                    spin_sleep::sleep(remaining);
                }
            }
            debug!("Dummy source produced {} samples", n);
        });

        self.tx = Some(tx);
        self.handle = Some(handle);
        info!(
            "Streaming synthetic data, {} channels at {} Hz",
            self.channel_count, self.sample_rate
        );
        Ok(())
    }

    fn stop(&mut self) -> Result<(), SourceError> {
        // The thread may have exited already
        if let Some(tx) = self.tx.take() {
            let _ = tx.send(Signal::Stop);
        }
        if let Some(thread) = self.handle.take() {
            thread.join().map_err(|_| SourceError::JoinError)?;
            info!("Stopped synthetic stream");
        }
        Ok(())
    }

    fn is_streaming(&self) -> bool {
        self.handle.is_some()
    }
}

impl Drop for DummySource {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}

/// Channel `c` is a sine at `(c + 1) * 2` Hz.
fn synthetic_sample(
    t: f32,
    channel_count: usize,
    amplitude: f32,
    noise: f32,
    rng: &mut impl Rng,
) -> Sample {
    (0..channel_count)
        .map(|c| {
            let freq = (c + 1) as f32 * 2.0;
            let jitter = if noise > 0.0 {
                rng.gen_range(-noise..noise)
            } else {
                0.0
            };
            amplitude * (2.0 * PI * freq * t).sin() + jitter
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sample_queue::SampleQueue;

    #[test]
    fn synthetic_shape() {
        let mut rng = StdRng::seed_from_u64(7);
        let sample = synthetic_sample(0.0, 8, 50.0, 0.0, &mut rng);
        assert_eq!(sample.len(), 8);
        assert!(sample.iter().all(|v| v.abs() < 1e-6));
    }

    #[test]
    fn streams_into_queue() {
        let queue = SampleQueue::new();
        let producer = queue.clone();
        let mut source = DummySource::builder()
            .sample_rate(1000.0)
            .channel_count(4)
            .build();

        source
            .start_stream(Box::new(move |s| producer.enqueue(s)))
            .unwrap();
        assert!(source.is_streaming());
        assert!(matches!(
            source.start_stream(Box::new(|_| {})),
            Err(SourceError::AlreadyStreaming)
        ));

        thread::sleep(Duration::from_millis(100));
        source.stop().unwrap();
        let count = queue.enqueued_count();
        assert!(count > 0);
        assert!(queue.drain_available().iter().all(|s| s.len() == 4));

        // Nothing more arrives after stop
        thread::sleep(Duration::from_millis(20));
        assert_eq!(queue.enqueued_count(), count);
    }

    #[test]
    fn stop_is_idempotent() {
        let mut source = DummySource::builder().build();
        source.stop().unwrap();
        source.start_stream(Box::new(|_| {})).unwrap();
        source.stop().unwrap();
        source.stop().unwrap();
        assert!(!source.is_streaming());
    }
}
