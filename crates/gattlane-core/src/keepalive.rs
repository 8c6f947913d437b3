//! Background keepalive hook
//!
//! The host keeps the process alive while local services are being
//! advertised. The lane only signals the transitions.

use tracing::debug;

/// External collaborator told when the registry gains its first service and
/// when it loses its last one
pub trait Keepalive: Send + Sync {
    fn start_background_keepalive(&self);

    fn stop_background_keepalive(&self);
}

/// Keepalive for hosts without a background service
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopKeepalive;

impl Keepalive for NoopKeepalive {
    fn start_background_keepalive(&self) {
        debug!("keepalive start requested");
    }

    fn stop_background_keepalive(&self) {
        debug!("keepalive stop requested");
    }
}
