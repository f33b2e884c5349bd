//! Coordinator and pocket session state
//!
//! The coordinator gets the full status push and may issue commands; the
//! pocket console is a read-only subscriber of the same frames. Keep-alive
//! round trips are tracked for the diagnostics page.

use fission_comlink::mgmt::MgmtEndpoint;

/// Session-local state for a coordinator or pocket link.
#[derive(Debug, Clone)]
pub struct CoordSessionState {
    pub endpoint: MgmtEndpoint,
    /// Most recent keep-alive round trip, milliseconds
    pub last_rtt_ms: Option<u64>,
    /// Static build info has been pushed since link-up
    pub builds_sent: bool,
}

impl CoordSessionState {
    pub fn new(endpoint: MgmtEndpoint) -> Self {
        Self {
            endpoint,
            last_rtt_ms: None,
            builds_sent: false,
        }
    }

    /// Commands are only accepted from the full coordinator.
    pub fn can_command(&self) -> bool {
        matches!(self.endpoint, MgmtEndpoint::Coordinator)
    }

    pub fn record_keepalive(&mut self, sent_ms: u64, now_ms: u64) {
        self.last_rtt_ms = Some(now_ms.saturating_sub(sent_ms));
    }
}
