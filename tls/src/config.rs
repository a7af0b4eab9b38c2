//! Server configuration: tunables, virtual hosts and key material.
//!
//! The configuration is an immutable arena that outlives every
//! connection; handshakes borrow into it by index and never mutate it.
//! Rotation happens by swapping whole configurations at a higher layer.

use bitflags::bitflags;
use hashbrown::HashMap;

use edgetls_bignum::GroupId;

use crate::ciphersuite::{CipherSuite, HashAlg};
use crate::crypto::{PrivateKey, Rng, SniResolver, TicketCodec, TlsCrypto};
use crate::{Result, TlsError, ALPN_PROTOS};

/// Client authentication policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMode {
    /// Never request a client certificate.
    None,
    /// Request one, tolerate its absence.
    Optional,
    /// Request one and fail without it.
    Required,
}

bitflags! {
    /// Key-usage bits a certificate grants its key.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct KeyUsage: u8 {
        const DIGITAL_SIGNATURE = 1 << 0;
        const KEY_ENCIPHERMENT = 1 << 1;
        const KEY_AGREEMENT = 1 << 2;
    }
}

impl KeyUsage {
    /// Usage a suite demands from the certificate key.
    pub fn required_for(suite: &CipherSuite) -> KeyUsage {
        if suite.kx.no_pfs() {
            KeyUsage::KEY_ENCIPHERMENT
        } else {
            KeyUsage::DIGITAL_SIGNATURE
        }
    }
}

/// One configured key with its certificate chain (leaf first, DER).
pub struct KeyCert<'a> {
    pub key: &'a dyn PrivateKey,
    pub chain: &'a [&'a [u8]],
    pub usage: KeyUsage,
}

/// One virtual host: a name and its key/cert list.
pub struct Vhost<'a> {
    pub name: &'a [u8],
    pub key_certs: &'a [KeyCert<'a>],
}

/// Name index over a vhost arena; doubles as the default SNI resolver
/// (index 0 is the default host).
pub struct VhostIndex<'a> {
    by_name: HashMap<&'a [u8], usize>,
    len: usize,
}

impl<'a> VhostIndex<'a> {
    pub fn build(vhosts: &'a [Vhost<'a>]) -> Self {
        let mut by_name = HashMap::with_capacity(vhosts.len());
        for (i, v) in vhosts.iter().enumerate() {
            by_name.insert(v.name, i);
        }
        VhostIndex {
            by_name,
            len: vhosts.len(),
        }
    }

    pub fn lookup(&self, name: &[u8]) -> Option<usize> {
        self.by_name.get(name).copied()
    }
}

impl<'a> SniResolver for VhostIndex<'a> {
    fn resolve(&self, name: Option<&[u8]>) -> Option<usize> {
        match name {
            Some(n) => self.lookup(n),
            None if self.len > 0 => Some(0),
            None => None,
        }
    }
}

/// Immutable per-listener configuration consumed by every handshake.
pub struct TlsConfig<'a> {
    pub authmode: AuthMode,
    /// Highest minor version the server would negotiate; a FALLBACK_SCSV
    /// below this is a downgrade attack.
    pub max_minor_ver: u8,
    /// Emit the acceptable-CA list in CertificateRequest. Not supported;
    /// enabling it fails the handshake at the CertificateRequest writer.
    pub cert_req_ca_list: bool,
    /// Local cipher-suite preference order (wire ids).
    pub suites: &'a [u16],
    /// Local curve preference order.
    pub curve_prefs: &'a [GroupId],
    /// Local hash preference order for signatures.
    pub hash_prefs: &'a [HashAlg],
    /// Configured DHM group (P, G), big-endian.
    pub dhm: Option<(&'a [u8], &'a [u8])>,
    /// ALPN protocols in local preference order, at most `ALPN_PROTOS`.
    pub alpn: &'a [&'a [u8]],
    /// Virtual-host arena; handshakes borrow entries by index.
    pub vhosts: &'a [Vhost<'a>],
    pub sni: Option<&'a dyn SniResolver>,
    pub ticket: Option<&'a dyn TicketCodec>,
    pub crypto: &'a dyn TlsCrypto,
    pub rng: &'a dyn Rng,
    /// Wall-clock seconds, for ServerHello gmt_unix_time and ticket
    /// lifetimes.
    pub now: fn() -> u32,
}

impl<'a> TlsConfig<'a> {
    /// Reject configurations the handshake cannot serve.
    pub fn validate(&self) -> Result<()> {
        if self.alpn.len() > ALPN_PROTOS {
            return Err(TlsError::Config);
        }
        if self.suites.is_empty() || self.vhosts.is_empty() {
            return Err(TlsError::Config);
        }
        for &id in self.suites {
            if CipherSuite::from_id(id).is_none() {
                return Err(TlsError::Config);
            }
        }
        Ok(())
    }

    pub(crate) fn vhost(&self, idx: usize) -> Option<&Vhost<'a>> {
        self.vhosts.get(idx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn index_resolves_names_and_default() {
        let vhosts: &[Vhost<'_>] = &[
            Vhost {
                name: b"example.com",
                key_certs: &[],
            },
            Vhost {
                name: b"other.net",
                key_certs: &[],
            },
        ];
        let idx = VhostIndex::build(vhosts);
        assert_eq!(idx.resolve(Some(b"other.net")), Some(1));
        assert_eq!(idx.resolve(Some(b"missing.org")), None);
        assert_eq!(idx.resolve(None), Some(0));
    }

    #[test]
    fn key_usage_per_suite() {
        let ecdhe = CipherSuite::from_id(0xc02f).unwrap();
        assert_eq!(
            KeyUsage::required_for(ecdhe),
            KeyUsage::DIGITAL_SIGNATURE
        );
        let rsa = CipherSuite::from_id(0x009c).unwrap();
        assert_eq!(KeyUsage::required_for(rsa), KeyUsage::KEY_ENCIPHERMENT);
    }
}
