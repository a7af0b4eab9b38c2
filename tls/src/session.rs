//! Per-connection session state surviving the handshake.

use bitflags::bitflags;

use crate::MASTER_LEN;

bitflags! {
    /// Certificate verification outcome flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct VerifyFlags: u32 {
        /// Verification was configured off and skipped.
        const SKIP_VERIFY = 1 << 0;
        /// The peer certificate failed verification.
        const BADCERT = 1 << 1;
    }
}

/// Negotiated session: identifier, suite, master secret and verification
/// outcome. Restored wholesale on ticket resumption.
#[derive(Debug, Clone)]
pub struct Session {
    pub id: [u8; 32],
    pub id_len: usize,
    pub ciphersuite: u16,
    pub verify_result: VerifyFlags,
    /// Session start, seconds since the epoch.
    pub start: u32,
    pub master: [u8; MASTER_LEN],
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    pub fn new() -> Self {
        Session {
            id: [0; 32],
            id_len: 0,
            ciphersuite: 0,
            verify_result: VerifyFlags::empty(),
            start: 0,
            master: [0; MASTER_LEN],
        }
    }

    /// The client-visible session id.
    pub fn id(&self) -> &[u8] {
        &self.id[..self.id_len]
    }
}
