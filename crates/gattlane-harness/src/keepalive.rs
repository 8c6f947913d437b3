//! Keepalive that counts the lane's start and stop signals

use std::sync::atomic::{AtomicUsize, Ordering};

use gattlane_core::Keepalive;

#[derive(Debug, Default)]
pub struct CountingKeepalive {
    starts: AtomicUsize,
    stops: AtomicUsize,
}

impl CountingKeepalive {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn starts(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }

    pub fn stops(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }

    /// Whether the keepalive should currently be running
    pub fn is_running(&self) -> bool {
        self.starts() > self.stops()
    }
}

impl Keepalive for CountingKeepalive {
    fn start_background_keepalive(&self) {
        self.starts.fetch_add(1, Ordering::SeqCst);
    }

    fn stop_background_keepalive(&self) {
        self.stops.fetch_add(1, Ordering::SeqCst);
    }
}
