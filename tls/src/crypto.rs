//! External cryptographic capabilities consumed by the handshake.
//!
//! The handshake core never implements hashes, AEAD, certificate parsing
//! or point multiplication itself; it reaches them through the seams
//! below. Implementations live in the surrounding data plane (or in test
//! harnesses).

use alloc::boxed::Box;

use edgetls_bignum::GroupId;

use crate::ciphersuite::{HashAlg, PkAlg};
use crate::session::Session;
use crate::{Result, FINISHED_LEN, MASTER_LEN};

pub use edgetls_bignum::Rng;

/// Private key bound to a configured certificate.
pub trait PrivateKey {
    /// Whether the key can act as the given kind.
    fn can_do(&self, alg: PkAlg) -> bool;

    /// Key length in bytes (for RSA, the modulus size).
    fn len(&self) -> usize;

    /// Sign `hash` (already digested with `md`); returns the signature
    /// size written into `sig`.
    fn sign(&self, md: HashAlg, hash: &[u8], sig: &mut [u8]) -> Result<usize>;

    /// PKCS#1 v1.5 decryption of `input`; returns the plaintext size.
    /// Only meaningful for RSA keys.
    fn decrypt(&self, input: &[u8], out: &mut [u8]) -> Result<usize>;

    /// Curve of an EC key, if this is one.
    fn ec_group(&self) -> Option<GroupId> {
        None
    }
}

/// Peer certificate as produced by the external X.509 parser: just enough
/// surface to check CertificateVerify.
pub trait PeerCert {
    fn can_do(&self, alg: PkAlg) -> bool;
    fn verify(&self, md: HashAlg, hash: &[u8], sig: &[u8]) -> Result<()>;
}

/// Running handshake transcript plus the PRF outputs derived from it.
pub trait Transcript {
    /// Feed handshake bytes, in wire order.
    fn update_checksum(&mut self, data: &[u8]);

    /// Whether the implementation maintains this hash over the transcript.
    fn supports(&self, hash: HashAlg) -> bool;

    /// Transcript hash for CertificateVerify; returns the digest size.
    fn calc_verify(&self, hash: HashAlg, out: &mut [u8]) -> usize;

    /// Master secret from the premaster and both randoms; the extended
    /// variant binds the transcript hash instead of the randoms.
    fn derive_master(
        &self,
        premaster: &[u8],
        randbytes: &[u8; 64],
        extended: bool,
    ) -> [u8; MASTER_LEN];

    /// 12-byte Finished verify data for the given label.
    fn finished_tag(
        &self,
        master: &[u8; MASTER_LEN],
        label: &'static [u8],
        out: &mut [u8; FINISHED_LEN],
    );
}

/// Ephemeral ECDH exchange over one named group.
pub trait Ecdh {
    /// Generate an ephemeral key and write `ServerECDHParams`
    /// (curve_params + public point) into `out`; returns the size.
    fn make_params(
        &mut self,
        grp: GroupId,
        point_format: u8,
        rng: &dyn Rng,
        out: &mut [u8],
    ) -> Result<usize>;

    /// Read the peer's ephemeral public point (TLS ECPoint body).
    fn read_public(&mut self, buf: &[u8]) -> Result<()>;

    /// Derive the shared secret into `out`; returns the size.
    fn calc_secret(&mut self, rng: &dyn Rng, out: &mut [u8]) -> Result<usize>;
}

/// Factory for the per-connection crypto objects plus one-shot digests.
pub trait TlsCrypto {
    /// Fresh transcript for one handshake.
    fn new_transcript(&self) -> Box<dyn Transcript>;

    /// Fresh ECDH context.
    fn new_ecdh(&self) -> Box<dyn Ecdh>;

    /// One-shot digest over the concatenation of `parts`; returns the
    /// digest size written into `out`.
    fn hash(&self, alg: HashAlg, parts: &[&[u8]], out: &mut [u8]) -> usize;

    /// Parse one DER certificate from the peer's chain.
    fn parse_certificate(&self, der: &[u8]) -> Result<Box<dyn PeerCert>>;
}

/// Session-ticket codec (RFC 5077). Key management and the opaque format
/// belong to the implementation.
pub trait TicketCodec {
    /// Decrypt and validate a ticket, restoring the session it carries.
    fn parse(&self, buf: &[u8]) -> Result<Session>;

    /// Write a ticket for `sess` into `out`; returns the opaque body size
    /// and the lifetime hint in seconds.
    fn write(&self, sess: &Session, out: &mut [u8]) -> Result<(usize, u32)>;
}

/// SNI host lookup: binds a virtual host (by arena index) to the
/// connection. `None` requests the default host.
pub trait SniResolver {
    fn resolve(&self, name: Option<&[u8]>) -> Option<usize>;
}
