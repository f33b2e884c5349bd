//! Frame authentication
//!
//! Optional shared-key authentication for every frame on the wire. The MAC
//! is HMAC-SHA256 over `(seq || protocol || payload || timestamp)` truncated
//! to [`MAC_LEN`] bytes.

use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::frame::ProtocolId;

type HmacSha256 = Hmac<Sha256>;

/// Truncated MAC length carried on the wire
pub const MAC_LEN: usize = 16;

/// Computes and verifies truncated frame MACs for one shared key.
#[derive(Clone)]
pub struct FrameAuthenticator {
    key: Vec<u8>,
}

impl FrameAuthenticator {
    pub fn new(key: &[u8]) -> Self {
        Self { key: key.to_vec() }
    }

    /// MAC over the authenticated frame fields.
    pub fn compute(
        &self,
        seq: u32,
        protocol: ProtocolId,
        timestamp_ms: u64,
        payload: &[u8],
    ) -> [u8; MAC_LEN] {
        // HMAC-SHA256 accepts keys of any length
        let mut mac = HmacSha256::new_from_slice(&self.key).expect("HMAC accepts any key length");
        mac.update(&seq.to_be_bytes());
        mac.update(&[protocol as u8]);
        mac.update(payload);
        mac.update(&timestamp_ms.to_be_bytes());

        let full = mac.finalize().into_bytes();
        let mut out = [0u8; MAC_LEN];
        out.copy_from_slice(&full[..MAC_LEN]);
        out
    }

    /// Constant-time comparison against a received MAC.
    pub fn verify(
        &self,
        seq: u32,
        protocol: ProtocolId,
        timestamp_ms: u64,
        payload: &[u8],
        received: &[u8],
    ) -> bool {
        if received.len() != MAC_LEN {
            return false;
        }
        let expected = self.compute(seq, protocol, timestamp_ms, payload);
        let mut diff = 0u8;
        for (a, b) in expected.iter().zip(received.iter()) {
            diff |= a ^ b;
        }
        diff == 0
    }
}

impl std::fmt::Debug for FrameAuthenticator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never print key material
        f.debug_struct("FrameAuthenticator").finish_non_exhaustive()
    }
}
