//! Cooperative stop requests shared between the tick loop and its owner.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::warn;

/// A cloneable boolean stop request.
///
/// The control loop only reads it between ticks, so a tick that is already
/// running always completes.
#[derive(Debug, Clone, Default)]
pub struct StopHandle {
    flag: Arc<AtomicBool>,
}

impl StopHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request_stop(&self) {
        self.flag.store(true, Ordering::Release);
    }

    pub fn is_stop_requested(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }
}

/// Route SIGINT / Ctrl-C to the given stop handle.
pub fn install_interrupt_handler(handle: &StopHandle) -> Result<(), ctrlc::Error> {
    let handle = handle.clone();
    ctrlc::set_handler(move || {
        warn!("SIGINT received, shutting down cleanly");
        handle.request_stop();
    })
}
