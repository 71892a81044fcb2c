//! Speech capture adapter.
//! The engine streams `{ text, is_final }` fragments into the orchestrator
//! handle; the orchestrator only starts, stops and queries it.

use std::sync::atomic::{AtomicBool, Ordering};

use tracing::debug;

use crate::error::CaptureError;

pub trait SpeechCapture: Send + Sync {
    fn start(&self) -> Result<(), CaptureError>;
    fn stop(&self);
    fn is_capturing(&self) -> bool;
}

/// Capture adapter for hosts that push fragments themselves (typed input,
/// tests). Tracks the capturing flag only.
#[derive(Default)]
pub struct NullCapture {
    capturing: AtomicBool,
}

impl NullCapture {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SpeechCapture for NullCapture {
    fn start(&self) -> Result<(), CaptureError> {
        self.capturing.store(true, Ordering::SeqCst);
        debug!("capture_started");
        Ok(())
    }

    fn stop(&self) {
        if self.capturing.swap(false, Ordering::SeqCst) {
            debug!("capture_stopped");
        }
    }

    fn is_capturing(&self) -> bool {
        self.capturing.load(Ordering::SeqCst)
    }
}
