//! Cipher suites, signature/hash algorithm encodings and SCSVs.

/// Signaling value: client fell back from a higher version on its own.
pub const FALLBACK_SCSV: u16 = 0x5600;

/// Signaling value standing in for an empty renegotiation_info extension.
pub const EMPTY_RENEGOTIATION_INFO_SCSV: u16 = 0x00ff;

/// Key exchange families supported on the server side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyExchangeType {
    EcdheEcdsa,
    EcdheRsa,
    DheRsa,
    Rsa,
}

impl KeyExchangeType {
    /// The exchange needs a negotiated elliptic curve.
    pub fn uses_ec(self) -> bool {
        matches!(self, KeyExchangeType::EcdheEcdsa | KeyExchangeType::EcdheRsa)
    }

    /// Ephemeral ECDH exchange.
    pub fn uses_ecdhe(self) -> bool {
        self.uses_ec()
    }

    /// Ephemeral finite-field DH exchange.
    pub fn uses_dhe(self) -> bool {
        matches!(self, KeyExchangeType::DheRsa)
    }

    /// No ephemeral keys: ServerKeyExchange is not sent.
    pub fn no_pfs(self) -> bool {
        matches!(self, KeyExchangeType::Rsa)
    }

    /// The server signs the exchanged parameters.
    pub fn with_server_signature(self) -> bool {
        !self.no_pfs()
    }
}

/// Signature kinds from the signature_algorithms registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SigAlg {
    Rsa,
    Ecdsa,
}

impl SigAlg {
    pub fn from_wire(b: u8) -> Option<Self> {
        match b {
            1 => Some(SigAlg::Rsa),
            3 => Some(SigAlg::Ecdsa),
            _ => None,
        }
    }

    pub fn wire(self) -> u8 {
        match self {
            SigAlg::Rsa => 1,
            SigAlg::Ecdsa => 3,
        }
    }
}

/// Hash kinds from the signature_algorithms registry. SHA-1 and weaker
/// are not negotiable here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashAlg {
    Sha256,
    Sha384,
    Sha512,
}

impl HashAlg {
    pub fn from_wire(b: u8) -> Option<Self> {
        match b {
            4 => Some(HashAlg::Sha256),
            5 => Some(HashAlg::Sha384),
            6 => Some(HashAlg::Sha512),
            _ => None,
        }
    }

    pub fn wire(self) -> u8 {
        match self {
            HashAlg::Sha256 => 4,
            HashAlg::Sha384 => 5,
            HashAlg::Sha512 => 6,
        }
    }

    /// Digest size in bytes.
    pub fn size(self) -> usize {
        match self {
            HashAlg::Sha256 => 32,
            HashAlg::Sha384 => 48,
            HashAlg::Sha512 => 64,
        }
    }
}

/// Key types a certificate key can be asked to act as.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PkAlg {
    Rsa,
    Ecdsa,
    EcKey,
}

/// One negotiable cipher suite.
#[derive(Debug, Clone, Copy)]
pub struct CipherSuite {
    pub id: u16,
    pub name: &'static str,
    pub kx: KeyExchangeType,
    /// PRF and transcript hash of the suite.
    pub mac: HashAlg,
    pub min_minor: u8,
    pub max_minor: u8,
}

impl CipherSuite {
    /// Signature kind used for ServerKeyExchange, when the suite signs.
    pub fn sig_alg(&self) -> Option<SigAlg> {
        match self.kx {
            KeyExchangeType::EcdheEcdsa => Some(SigAlg::Ecdsa),
            KeyExchangeType::EcdheRsa | KeyExchangeType::DheRsa => Some(SigAlg::Rsa),
            KeyExchangeType::Rsa => None,
        }
    }

    /// Certificate key type this suite requires.
    pub fn cert_pk_alg(&self) -> PkAlg {
        match self.kx {
            KeyExchangeType::EcdheEcdsa => PkAlg::Ecdsa,
            _ => PkAlg::Rsa,
        }
    }

    /// Find a suite by wire identifier.
    pub fn from_id(id: u16) -> Option<&'static CipherSuite> {
        SUITES.iter().find(|s| s.id == id)
    }
}

/// Suites the server can terminate, AEAD-only.
pub const SUITES: [CipherSuite; 8] = [
    CipherSuite {
        id: 0xc02b,
        name: "TLS-ECDHE-ECDSA-WITH-AES-128-GCM-SHA256",
        kx: KeyExchangeType::EcdheEcdsa,
        mac: HashAlg::Sha256,
        min_minor: 3,
        max_minor: 3,
    },
    CipherSuite {
        id: 0xc02c,
        name: "TLS-ECDHE-ECDSA-WITH-AES-256-GCM-SHA384",
        kx: KeyExchangeType::EcdheEcdsa,
        mac: HashAlg::Sha384,
        min_minor: 3,
        max_minor: 3,
    },
    CipherSuite {
        id: 0xc02f,
        name: "TLS-ECDHE-RSA-WITH-AES-128-GCM-SHA256",
        kx: KeyExchangeType::EcdheRsa,
        mac: HashAlg::Sha256,
        min_minor: 3,
        max_minor: 3,
    },
    CipherSuite {
        id: 0xc030,
        name: "TLS-ECDHE-RSA-WITH-AES-256-GCM-SHA384",
        kx: KeyExchangeType::EcdheRsa,
        mac: HashAlg::Sha384,
        min_minor: 3,
        max_minor: 3,
    },
    CipherSuite {
        id: 0x009e,
        name: "TLS-DHE-RSA-WITH-AES-128-GCM-SHA256",
        kx: KeyExchangeType::DheRsa,
        mac: HashAlg::Sha256,
        min_minor: 3,
        max_minor: 3,
    },
    CipherSuite {
        id: 0x009f,
        name: "TLS-DHE-RSA-WITH-AES-256-GCM-SHA384",
        kx: KeyExchangeType::DheRsa,
        mac: HashAlg::Sha384,
        min_minor: 3,
        max_minor: 3,
    },
    CipherSuite {
        id: 0x009c,
        name: "TLS-RSA-WITH-AES-128-GCM-SHA256",
        kx: KeyExchangeType::Rsa,
        mac: HashAlg::Sha256,
        min_minor: 3,
        max_minor: 3,
    },
    CipherSuite {
        id: 0x009d,
        name: "TLS-RSA-WITH-AES-256-GCM-SHA384",
        kx: KeyExchangeType::Rsa,
        mac: HashAlg::Sha384,
        min_minor: 3,
        max_minor: 3,
    },
];

/// Per-signature-kind acceptable hash, first offered match wins. Only the
/// ServerKeyExchange signature is constrained by this set; certificate
/// chain signatures are checked elsewhere.
#[derive(Debug, Clone, Copy, Default)]
pub struct SigHashSet {
    rsa: Option<HashAlg>,
    ecdsa: Option<HashAlg>,
}

impl SigHashSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remember the first acceptable hash for a signature kind.
    pub fn add(&mut self, sig: SigAlg, hash: HashAlg) {
        let slot = match sig {
            SigAlg::Rsa => &mut self.rsa,
            SigAlg::Ecdsa => &mut self.ecdsa,
        };
        if slot.is_none() {
            *slot = Some(hash);
        }
    }

    /// Hash selected for a signature kind, if any.
    pub fn find(&self, sig: SigAlg) -> Option<HashAlg> {
        match sig {
            SigAlg::Rsa => self.rsa,
            SigAlg::Ecdsa => self.ecdsa,
        }
    }

    /// Assign a fallback hash to kinds the peer never constrained.
    pub fn fill_defaults(&mut self, hash: HashAlg) {
        if self.rsa.is_none() {
            self.rsa = Some(hash);
        }
        if self.ecdsa.is_none() {
            self.ecdsa = Some(hash);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_by_id() {
        let s = CipherSuite::from_id(0xc02b).unwrap();
        assert_eq!(s.kx, KeyExchangeType::EcdheEcdsa);
        assert_eq!(s.sig_alg(), Some(SigAlg::Ecdsa));
        assert_eq!(s.mac, HashAlg::Sha256);
        assert!(s.kx.uses_ec());
        assert!(!s.kx.no_pfs());

        assert!(CipherSuite::from_id(0x1301).is_none()); // TLS 1.3 suite
    }

    #[test]
    fn rsa_suite_has_no_skx() {
        let s = CipherSuite::from_id(0x009c).unwrap();
        assert!(s.kx.no_pfs());
        assert_eq!(s.sig_alg(), None);
        assert_eq!(s.cert_pk_alg(), PkAlg::Rsa);
    }

    #[test]
    fn sig_hash_set_keeps_first() {
        let mut set = SigHashSet::new();
        set.add(SigAlg::Ecdsa, HashAlg::Sha384);
        set.add(SigAlg::Ecdsa, HashAlg::Sha256);
        assert_eq!(set.find(SigAlg::Ecdsa), Some(HashAlg::Sha384));
        assert_eq!(set.find(SigAlg::Rsa), None);

        set.fill_defaults(HashAlg::Sha256);
        assert_eq!(set.find(SigAlg::Rsa), Some(HashAlg::Sha256));
        assert_eq!(set.find(SigAlg::Ecdsa), Some(HashAlg::Sha384));
    }

    #[test]
    fn wire_encodings_roundtrip() {
        for h in [HashAlg::Sha256, HashAlg::Sha384, HashAlg::Sha512] {
            assert_eq!(HashAlg::from_wire(h.wire()), Some(h));
        }
        for s in [SigAlg::Rsa, SigAlg::Ecdsa] {
            assert_eq!(SigAlg::from_wire(s.wire()), Some(s));
        }
        assert!(HashAlg::from_wire(2).is_none()); // sha1
    }
}
