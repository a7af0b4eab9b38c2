//! Server-side TLS 1.2 handshake core.
//!
//! This crate implements the handshake state machine of a TLS terminating
//! data plane: an incremental ClientHello parser that consumes wire bytes
//! chunk-at-a-time, cipher-suite negotiation against the local key/cert
//! material, the batched ServerHello..ServerHelloDone record train, the
//! three ClientKeyExchange families, CertificateVerify, and both Finished
//! directions (with NewSessionTicket issuing and ticket resumption).
//!
//! The record layer, certificate parsing, hashes and AEAD are external
//! collaborators reached through the narrow seams in [`crypto`] and
//! [`io`]. Asymmetric arithmetic comes from `edgetls-bignum`.

#![no_std]

extern crate alloc;

pub mod alert;
pub mod ciphersuite;
pub mod config;
pub mod crypto;
pub mod dhm;
pub mod handshake;
pub mod io;
pub mod session;

use core::fmt;

use edgetls_bignum::ecp::EcpError;
use edgetls_bignum::MpiError;

/// TLS major version byte (SSL 3 lineage).
pub const MAJOR_VERSION_3: u8 = 3;

/// Minor version byte of TLS 1.2.
pub const MINOR_VERSION_3: u8 = 3;

/// Record header size on the wire.
pub const TLS_HEADER_SIZE: usize = 5;

/// Handshake message header size: type plus 24-bit length.
pub const HS_HDR_LEN: usize = 4;

/// Record content types.
pub const MSG_CHANGE_CIPHER_SPEC: u8 = 20;
pub const MSG_ALERT: u8 = 21;
pub const MSG_HANDSHAKE: u8 = 22;

/// Handshake message types.
pub const HS_CLIENT_HELLO: u8 = 1;
pub const HS_SERVER_HELLO: u8 = 2;
pub const HS_NEW_SESSION_TICKET: u8 = 4;
pub const HS_CERTIFICATE: u8 = 11;
pub const HS_SERVER_KEY_EXCHANGE: u8 = 12;
pub const HS_CERTIFICATE_REQUEST: u8 = 13;
pub const HS_SERVER_HELLO_DONE: u8 = 14;
pub const HS_CERTIFICATE_VERIFY: u8 = 15;
pub const HS_CLIENT_KEY_EXCHANGE: u8 = 16;
pub const HS_FINISHED: u8 = 20;

/// Scratch buffer bound for a single extension body; doubles as the
/// chunked ClientKeyExchange fallback buffer.
pub const HS_RBUF_SZ: usize = 1024;

/// Stored peer cipher-suite entries; the declared list may be longer, the
/// excess is consumed and dropped (lowest priority last).
pub const CSS_MAX: usize = 50;

/// Negotiated curve list bound.
pub const MAX_CURVES: usize = 8;

/// Configured ALPN protocol bound.
pub const ALPN_PROTOS: usize = 8;

/// Scatter-gather entries per batched send.
pub const MAX_FRAGS: usize = 8;

/// NewSessionTicket opaque body bound.
pub const MAX_TICKET_LEN: usize = 502;

/// Signature size bound in ServerKeyExchange.
pub const MAX_SIG_LEN: usize = 512;

/// ServerKeyExchange payload bound.
pub const MAX_SKX_LEN: usize = 1015;

/// Master secret size.
pub const MASTER_LEN: usize = 48;

/// Finished verify-data size.
pub const FINISHED_LEN: usize = 12;

/// Premaster scratch bound (largest DHM modulus supported).
pub const PREMASTER_SIZE: usize = 516;

/// Handshake error taxonomy. Every kind maps to at most one fatal alert;
/// engine-internal failures collapse to generic alerts and are never
/// surfaced to the peer verbatim.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TlsError {
    /// A bounded buffer or MPI limb budget was exhausted.
    Capacity,
    /// Invalid input to an internal routine.
    BadInput,
    /// Malformed handshake byte layout or inconsistent length fields.
    Decode,
    /// Well-formed but semantically invalid parameter.
    IllegalParameter,
    /// Unsupported protocol version.
    ProtocolVersion,
    /// FALLBACK_SCSV received from a downgraded client.
    InappropriateFallback,
    /// No usable cipher suite.
    HandshakeFailure,
    /// No common ALPN protocol.
    NoApplicationProtocol,
    /// SNI lookup yielded no virtual host.
    UnrecognizedName,
    /// Signature or Finished MAC verification failed.
    AuthFailed,
    /// Missing key material or rejected configuration.
    Config,
    /// Feature outside the supported surface.
    UnsupportedFeature,
    /// Internal invariant violation.
    Internal,
}

impl fmt::Display for TlsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TlsError::Capacity => "capacity exhausted",
            TlsError::BadInput => "invalid input",
            TlsError::Decode => "malformed handshake message",
            TlsError::IllegalParameter => "illegal parameter",
            TlsError::ProtocolVersion => "unsupported protocol version",
            TlsError::InappropriateFallback => "inappropriate fallback",
            TlsError::HandshakeFailure => "no usable cipher suite",
            TlsError::NoApplicationProtocol => "no common application protocol",
            TlsError::UnrecognizedName => "unknown server name",
            TlsError::AuthFailed => "authentication failure",
            TlsError::Config => "configuration error",
            TlsError::UnsupportedFeature => "unsupported feature",
            TlsError::Internal => "internal error",
        };
        write!(f, "{}", s)
    }
}

impl From<MpiError> for TlsError {
    fn from(e: MpiError) -> Self {
        match e {
            MpiError::Capacity => TlsError::Capacity,
            MpiError::BadInput => TlsError::BadInput,
            MpiError::BufferTooSmall => TlsError::Capacity,
        }
    }
}

impl From<EcpError> for TlsError {
    fn from(e: EcpError) -> Self {
        match e {
            EcpError::Capacity => TlsError::Capacity,
            EcpError::BufferTooSmall => TlsError::Capacity,
            EcpError::BadInput => TlsError::BadInput,
            EcpError::FeatureUnavailable => TlsError::UnsupportedFeature,
        }
    }
}

/// Result alias used across the crate.
pub type Result<T> = core::result::Result<T, TlsError>;

/// Per-call progress of the handshake driver. `Postpone` is not an error:
/// the current wire field ended mid-chunk and the driver wants more bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HsStep {
    /// The current message or flight completed.
    Done,
    /// More bytes are needed to make progress.
    Postpone,
}

pub use handshake::{HandshakeState, TlsContext};
