//! Turning SIGINT, SIGTERM and SIGHUP into an orderly stop.
//!
//! Closing the terminal window sends SIGHUP. Left alone it would end the
//! process before the block is saved, so the handler only raises a
//! [`StopFlag`] and the task loop winds the session down itself.

use log::info;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

/// Set once a stop has been asked for. Clones share the same flag.
#[derive(Debug, Clone, Default)]
pub struct StopFlag {
    requested: Arc<AtomicBool>,
}

impl StopFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request(&self) {
        self.requested.store(true, Ordering::SeqCst);
    }

    pub fn is_requested(&self) -> bool {
        self.requested.load(Ordering::SeqCst)
    }
}

/// Install the process-wide handler for SIGINT, SIGTERM and SIGHUP. It can
/// only be installed once per process.
pub fn on_termination() -> Result<StopFlag, ctrlc::Error> {
    let flag = StopFlag::new();
    let raised = flag.clone();
    ctrlc::set_handler(move || raised.request())?;
    info!("Termination handler installed");
    Ok(flag)
}
