//! Cross-task run control

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Cloneable handle for requesting stop or pause of a running loop.
///
/// Requests are polled at cycle boundaries only.
#[derive(Clone, Debug, Default)]
pub struct RunControl {
    stop: Arc<AtomicBool>,
    pause: Arc<AtomicBool>,
}

impl RunControl {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request_stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
    }

    pub fn request_pause(&self) {
        self.pause.store(true, Ordering::SeqCst);
    }

    pub fn clear_pause(&self) {
        self.pause.store(false, Ordering::SeqCst);
    }

    pub fn is_stop_requested(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }

    pub fn is_pause_requested(&self) -> bool {
        self.pause.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_shared_between_clones() {
        let control = RunControl::new();
        let remote = control.clone();
        remote.request_pause();
        assert!(control.is_pause_requested());
        control.clear_pause();
        assert!(!remote.is_pause_requested());
        remote.request_stop();
        assert!(control.is_stop_requested());
    }
}
