//! `SampleSource`
//!
//! Anything that streams [`Sample`]s from a background thread into a
//! callback. The amplifier on a serial port is the real thing; see
//! [`crate::dummy_source::DummySource`] for a synthetic stand-in.

use crate::sample::{parse_sample, Sample};

use log::{debug, info, warn};
use serial2::SerialPort;
use std::{
    fmt, io,
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread::{self, JoinHandle},
    time::Duration,
};

/// The function a source calls once per sample, on its own thread.
pub type SampleCallback = Box<dyn FnMut(Sample) + Send + 'static>;

/// How long a read may block before the reader thread checks whether it
/// has been asked to stop.
const READ_TIMEOUT: Duration = Duration::from_millis(100);

/// Longest line the reader will hold waiting for its `\n`. A few hundred
/// channels of text fit comfortably.
pub const MAX_LINE_LEN: usize = 4096;

/// Errors raised while bringing a source up or down.
#[derive(Debug)]
pub enum SourceError {
    /// The serial port could not be opened or configured.
    Open(PathBuf, io::Error),
    /// Writing a command to the device failed.
    Write(io::Error),
    /// `start_stream` was called on a source that is already streaming.
    AlreadyStreaming,
    /// The acquisition thread panicked.
    JoinError,
}

impl fmt::Display for SourceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Open(path, e) => write!(f, "could not open {}: {}", path.display(), e),
            Self::Write(e) => write!(f, "could not write to device: {}", e),
            Self::AlreadyStreaming => write!(f, "source is already streaming"),
            Self::JoinError => write!(f, "acquisition thread panicked"),
        }
    }
}

impl std::error::Error for SourceError {}

/// A device that delivers one [`Sample`] per callback invocation from a
/// thread it owns.
pub trait SampleSource {
    /// Start the acquisition thread. Every sample the device produces is
    /// handed to `on_sample`.
    fn start_stream(&mut self, on_sample: SampleCallback) -> Result<(), SourceError>;

    /// Stop the acquisition thread and tell the device to stop streaming.
    /// Calling this twice, or before [`SampleSource::start_stream`], is fine.
    fn stop(&mut self) -> Result<(), SourceError>;

    /// Whether the acquisition thread is running.
    fn is_streaming(&self) -> bool;
}

/// Lists the serial ports on this machine.
pub fn available_ports() -> io::Result<Vec<PathBuf>> {
    SerialPort::available_ports()
}

/// Serial parameters and the commands that switch the board's stream on
/// and off.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerialSettings {
    /// Baud rate of the port.
    pub baud_rate: u32,
    /// Readings per line the board sends.
    pub channel_count: usize,
    /// Written to the board when streaming starts.
    pub start_command: String,
    /// Written to the board when streaming stops.
    pub stop_command: String,
}

/// Cuts a byte stream into lines. A line ends at `\n`; a `\r` before it
/// is dropped, as are empty lines. A line that grows past `max_len` bytes
/// is thrown away up to its `\n`, so a device stuck in a binary mode can't
/// make the buffer grow without bound.
#[derive(Debug)]
pub struct LineFramer {
    buf: Vec<u8>,
    max_len: usize,
    skipping: bool,
    dropped: u64,
}

impl LineFramer {
    pub fn new(max_len: usize) -> Self {
        Self {
            buf: Vec::new(),
            max_len,
            skipping: false,
            dropped: 0,
        }
    }

    /// Feed one chunk as it came off the wire and take the lines it
    /// completed. Bytes after the last `\n` are kept for the next chunk.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Vec<u8>> {
        let mut lines = Vec::new();
        for &c in chunk {
            if c == b'\n' {
                if self.skipping {
                    self.skipping = false;
                    continue;
                }
                let mut line = std::mem::take(&mut self.buf);
                if line.last() == Some(&b'\r') {
                    line.pop();
                }
                if !line.is_empty() {
                    lines.push(line);
                }
                continue;
            }
            if self.skipping {
                continue;
            }
            if self.buf.len() == self.max_len {
                warn!(
                    "Dropping serial line longer than {} bytes, is the device sending binary?",
                    self.max_len
                );
                self.buf.clear();
                self.skipping = true;
                self.dropped += 1;
                continue;
            }
            self.buf.push(c);
        }
        lines
    }

    /// Bytes held for the line still in progress.
    pub fn pending_len(&self) -> usize {
        self.buf.len()
    }

    /// Lines thrown away for being too long.
    pub fn dropped_count(&self) -> u64 {
        self.dropped
    }
}

/// An amplifier on a serial port that writes one line of comma separated
/// readings per sample.
pub struct SerialSource {
    path: PathBuf,
    port: Arc<SerialPort>,
    settings: SerialSettings,
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl SerialSource {
    /// Open the port at `path`. Nothing is streamed until
    /// [`SampleSource::start_stream`].
    pub fn open(path: impl AsRef<Path>, settings: SerialSettings) -> Result<Self, SourceError> {
        let path = path.as_ref().to_path_buf();
        let mut port = SerialPort::open(&path, settings.baud_rate)
            .map_err(|e| SourceError::Open(path.clone(), e))?;
        port.set_read_timeout(READ_TIMEOUT)
            .map_err(|e| SourceError::Open(path.clone(), e))?;

        info!("Opened {} at {} baud", path.display(), settings.baud_rate);

        Ok(Self {
            path,
            port: Arc::new(port),
            settings,
            running: Arc::new(AtomicBool::new(false)),
            handle: None,
        })
    }

    /// The path this source was opened with.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn send_command(&self, command: &str) -> Result<(), SourceError> {
        if command.is_empty() {
            return Ok(());
        }
        self.port
            .write_all(command.as_bytes())
            .map_err(SourceError::Write)
    }
}

impl SampleSource for SerialSource {
    fn start_stream(&mut self, mut on_sample: SampleCallback) -> Result<(), SourceError> {
        if self.handle.is_some() {
            return Err(SourceError::AlreadyStreaming);
        }

        // Whatever is sitting in the OS buffer predates this session
        if let Err(e) = self.port.discard_input_buffer() {
            warn!("Could not flush stale input on {}: {}", self.path.display(), e);
        }
        self.send_command(&self.settings.start_command)?;

        self.running.store(true, Ordering::SeqCst);
        let running = Arc::clone(&self.running);
        let port = Arc::clone(&self.port);
        let channel_count = self.settings.channel_count;

        self.handle = Some(thread::spawn(move || {
            let mut buffer = [0; 256];
            let mut framer = LineFramer::new(MAX_LINE_LEN);

            while running.load(Ordering::SeqCst) {
                let read_len = match port.read(&mut buffer) {
                    Ok(n) => n,
                    Err(e) if e.kind() == io::ErrorKind::TimedOut => continue,
                    Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                    Err(e) => {
                        warn!("Device read failed, stopping acquisition: {}", e);
                        break;
                    }
                };

                for line in framer.push(&buffer[..read_len]) {
                    match std::str::from_utf8(&line) {
                        Ok(line) => match parse_sample(line, channel_count) {
                            Ok(sample) => on_sample(sample),
                            Err(e) => warn!("Was unable to parse sample: {}", e),
                        },
                        // Often happens at the beginning of transmission when
                        // there is still garbage in the hardware buffer
                        Err(e) => warn!("Failed to decode utf-8: {:?}", e),
                    }
                }
            }

            if framer.dropped_count() > 0 {
                warn!("{} overlong serial lines were dropped", framer.dropped_count());
            }
            running.store(false, Ordering::SeqCst);
            debug!("Serial reader thread exiting");
        }));

        info!("Streaming from {}", self.path.display());
        Ok(())
    }

    fn stop(&mut self) -> Result<(), SourceError> {
        let Some(handle) = self.handle.take() else {
            return Ok(());
        };

        self.running.store(false, Ordering::SeqCst);
        let joined = handle.join().map_err(|_| SourceError::JoinError);
        let stopped = self.send_command(&self.settings.stop_command);
        info!("Stopped streaming from {}", self.path.display());

        joined.and(stopped)
    }

    fn is_streaming(&self) -> bool {
        self.handle.is_some() && self.running.load(Ordering::SeqCst)
    }
}

impl Drop for SerialSource {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            warn!("Error stopping {} on drop: {}", self.path.display(), e);
        }
    }
}
