//! TLS 1.2 server-side handshake state machine (RFC 5246 chapter 7).
//!
//! The driver is cooperative: each invocation consumes one contiguous
//! byte slice from the record layer and reports `Done`, `Postpone` (more
//! bytes needed) or a fatal error. Message order is strict; any violation
//! tears the connection down after at most one staged alert.

pub mod client_hello;
pub mod client_read;
pub mod extensions;
pub mod finish_write;
pub mod server_write;

use alloc::boxed::Box;
use alloc::vec::Vec;

use bitflags::bitflags;

use edgetls_bignum::GroupId;

use crate::alert::{send_alert, AlertDescription, AlertLevel};
use crate::ciphersuite::{CipherSuite, PkAlg, SigHashSet};
use crate::config::{KeyUsage, TlsConfig};
use crate::crypto::{Ecdh, PeerCert, PrivateKey, Transcript};
use crate::dhm::DhmContext;
use crate::io::{IoIn, RecordSink};
use crate::session::Session;
use crate::{
    HsStep, Result, TlsError, CSS_MAX, MSG_CHANGE_CIPHER_SPEC, PREMASTER_SIZE,
};

/// Top-level handshake states, in wire order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeState {
    ClientHello,
    ServerHello,
    ServerCertificate,
    ServerKeyExchange,
    CertificateRequest,
    ServerHelloDone,
    ClientCertificate,
    ClientKeyExchange,
    CertificateVerify,
    ClientChangeCipherSpec,
    ClientFinished,
    ServerChangeCipherSpec,
    ServerFinished,
    HandshakeWrapup,
    HandshakeOver,
    /// Irreversible error sink; all handshake resources are released.
    Failed,
}

/// Sub-states of the incremental ClientHello parser. Every multi-byte
/// field can be interrupted after any byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ClientHelloState {
    Version,
    Random,
    SessLen,
    Sess,
    CsLen,
    Cs,
    CsSkip,
    ComprLen,
    Compr,
    ExtLen,
    ExtType,
    ExtSize,
    ExtBody,
}

bitflags! {
    /// Handshake context flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct HsFlags: u8 {
        const RESUME = 1 << 0;
        const NEW_SESSION_TICKET = 1 << 1;
        const SECURE_RENEGOTIATION = 1 << 2;
        const EXTENDED_MS = 1 << 3;
        const CLI_EXTS = 1 << 4;
        const CURVES_EXT = 1 << 5;
    }
}

/// Key-exchange scratch, selected once the suite is known.
pub(crate) enum KxContext {
    None,
    Ecdh(Box<dyn Ecdh>),
    Dhm(DhmContext),
    Rsa,
}

/// Transient handshake context, alive from the first ClientHello byte to
/// the completion of both Finished messages.
pub(crate) struct Handshake {
    /// Client random (32 B) followed by server random (32 B).
    pub randbytes: [u8; 64],
    /// Stored peer suites; the tail past `CSS_MAX` entries is dropped.
    pub css: [u16; CSS_MAX],
    pub cs_total_len: usize,
    pub cs_cur_len: usize,
    pub compr_n: u8,
    pub compr_has_null: bool,
    pub ext_rem_sz: usize,
    pub ext_type: u16,
    pub ext_sz: usize,
    /// Scratch for one extension body, and the chunked key-exchange
    /// fallback buffer.
    pub rbuf: Vec<u8>,
    pub curves: Vec<GroupId>,
    pub point_format: u8,
    pub hash_algs: SigHashSet,
    /// The peer sent a signature_algorithms extension.
    pub sig_algs_seen: bool,
    pub flags: HsFlags,
    /// Selected key/cert entry within the bound vhost.
    pub key_cert: Option<usize>,
    pub kx: KxContext,
    pub premaster: Vec<u8>,
    pub pmslen: usize,
    pub transcript: Box<dyn Transcript>,
    pub ch_state: ClientHelloState,
}

impl Handshake {
    fn new(conf: &TlsConfig<'_>) -> Self {
        Handshake {
            randbytes: [0; 64],
            css: [0; CSS_MAX],
            cs_total_len: 0,
            cs_cur_len: 0,
            compr_n: 0,
            compr_has_null: false,
            ext_rem_sz: 0,
            ext_type: 0,
            ext_sz: 0,
            rbuf: Vec::new(),
            curves: Vec::new(),
            point_format: edgetls_bignum::ecp::PF_UNCOMPRESSED,
            hash_algs: SigHashSet::new(),
            sig_algs_seen: false,
            flags: HsFlags::empty(),
            key_cert: None,
            kx: KxContext::None,
            premaster: alloc::vec![0u8; PREMASTER_SIZE],
            pmslen: 0,
            transcript: conf.crypto.new_transcript(),
            ch_state: ClientHelloState::Version,
        }
    }
}

/// Per-connection handshake driver.
pub struct TlsContext<'a> {
    pub(crate) conf: &'a TlsConfig<'a>,
    /// Incoming-message bookkeeping, shared with the record layer.
    pub io_in: IoIn,
    pub(crate) state: HandshakeState,
    pub(crate) major: u8,
    pub(crate) minor: u8,
    pub(crate) sess: Session,
    /// Bound virtual host (arena index), set by SNI or the default
    /// lookup.
    pub(crate) peer_conf: Option<usize>,
    pub(crate) alpn_chosen: Option<usize>,
    pub(crate) peer_cert: Option<Box<dyn PeerCert>>,
    pub(crate) suite: Option<&'static CipherSuite>,
    pub(crate) hs: Option<Box<Handshake>>,
    pub(crate) worker: usize,
}

impl<'a> TlsContext<'a> {
    /// New server-side connection bound to `worker`'s MPI pool.
    pub fn new(conf: &'a TlsConfig<'a>, worker: usize) -> Self {
        TlsContext {
            conf,
            io_in: IoIn::new(),
            state: HandshakeState::ClientHello,
            major: 0,
            minor: 0,
            sess: Session::new(),
            peer_conf: None,
            alpn_chosen: None,
            peer_cert: None,
            suite: None,
            hs: None,
            worker,
        }
    }

    pub fn state(&self) -> HandshakeState {
        self.state
    }

    pub fn session(&self) -> &Session {
        &self.sess
    }

    /// Negotiated ALPN protocol, if any.
    pub fn alpn_chosen(&self) -> Option<&'a [u8]> {
        self.alpn_chosen.map(|i| self.conf.alpn[i])
    }

    /// Negotiated cipher suite, once selection ran.
    pub fn ciphersuite(&self) -> Option<&'static CipherSuite> {
        self.suite
    }

    /// Drive the handshake with one chunk of the current message.
    ///
    /// `hdr` carries the handshake-header bytes of the message on the
    /// chunk where they arrived (empty otherwise); `buf` is the body
    /// chunk. On a fatal error the context transitions to the error sink
    /// and only tear-down remains.
    pub fn server_step(
        &mut self,
        hdr: &[u8],
        buf: &[u8],
        sink: &mut dyn RecordSink,
    ) -> Result<HsStep> {
        match self.step_inner(hdr, buf, sink) {
            Ok(s) => Ok(s),
            Err(e) => {
                log::debug!("handshake failed in state {:?}: {}", self.state, e);
                self.hs = None;
                self.state = HandshakeState::Failed;
                Err(e)
            }
        }
    }

    fn step_inner(
        &mut self,
        hdr: &[u8],
        buf: &[u8],
        sink: &mut dyn RecordSink,
    ) -> Result<HsStep> {
        if matches!(
            self.state,
            HandshakeState::HandshakeOver | HandshakeState::Failed
        ) {
            return Err(TlsError::BadInput);
        }
        if self.hs.is_none() {
            self.hs = Some(Box::new(Handshake::new(self.conf)));
        }

        loop {
            match self.state {
                HandshakeState::ClientHello => {
                    if self.parse_client_hello(hdr, buf, sink)? == HsStep::Postpone {
                        return Ok(HsStep::Postpone);
                    }
                    self.state = HandshakeState::ServerHello;
                }

                HandshakeState::ServerHello
                | HandshakeState::ServerCertificate
                | HandshakeState::ServerKeyExchange
                | HandshakeState::CertificateRequest
                | HandshakeState::ServerHelloDone => {
                    self.write_server_hello_flight(sink)?;
                    if self.state == HandshakeState::ServerChangeCipherSpec {
                        // Resumption: the finish block follows immediately.
                        continue;
                    }
                    return Ok(HsStep::Done);
                }

                HandshakeState::ClientCertificate => {
                    if self.parse_certificate(hdr, buf, sink)? == HsStep::Postpone {
                        return Ok(HsStep::Postpone);
                    }
                    self.state = HandshakeState::ClientKeyExchange;
                    return Ok(HsStep::Done);
                }

                HandshakeState::ClientKeyExchange => {
                    if self.parse_client_key_exchange(hdr, buf, sink)? == HsStep::Postpone {
                        return Ok(HsStep::Postpone);
                    }
                    self.state = if self.peer_cert.is_some() {
                        HandshakeState::CertificateVerify
                    } else {
                        HandshakeState::ClientChangeCipherSpec
                    };
                    return Ok(HsStep::Done);
                }

                HandshakeState::CertificateVerify => {
                    // Not part of the checksum fed to its own signature.
                    if self.parse_certificate_verify(hdr, buf, sink)? == HsStep::Postpone {
                        return Ok(HsStep::Postpone);
                    }
                    self.state = HandshakeState::ClientChangeCipherSpec;
                    return Ok(HsStep::Done);
                }

                HandshakeState::ClientChangeCipherSpec => {
                    self.parse_change_cipher_spec(buf, sink)?;
                    self.state = HandshakeState::ClientFinished;
                    return Ok(HsStep::Done);
                }

                HandshakeState::ClientFinished => {
                    if self.parse_finished(hdr, buf, sink)? == HsStep::Postpone {
                        return Ok(HsStep::Postpone);
                    }
                    let resumed = self.hs_flags().contains(HsFlags::RESUME);
                    self.state = if resumed {
                        HandshakeState::HandshakeWrapup
                    } else {
                        HandshakeState::ServerChangeCipherSpec
                    };
                }

                HandshakeState::ServerChangeCipherSpec | HandshakeState::ServerFinished => {
                    self.write_finished_flight(sink)?;
                    if self.state == HandshakeState::HandshakeWrapup {
                        continue;
                    }
                    return Ok(HsStep::Done);
                }

                HandshakeState::HandshakeWrapup => {
                    self.handshake_wrapup();
                    self.state = HandshakeState::HandshakeOver;
                    return Ok(HsStep::Done);
                }

                HandshakeState::HandshakeOver | HandshakeState::Failed => {
                    return Err(TlsError::BadInput);
                }
            }
        }
    }

    pub(crate) fn hs_flags(&self) -> HsFlags {
        self.hs.as_ref().map(|h| h.flags).unwrap_or_default()
    }

    pub(crate) fn hs_mut(&mut self) -> Result<&mut Handshake> {
        self.hs.as_deref_mut().ok_or(TlsError::Internal)
    }

    pub(crate) fn hs_ref(&self) -> Result<&Handshake> {
        self.hs.as_deref().ok_or(TlsError::Internal)
    }

    /// Feed handshake bytes to the transcript (everything except
    /// ChangeCipherSpec).
    pub(crate) fn update_checksum(&mut self, data: &[u8]) {
        if let Some(hs) = self.hs.as_deref_mut() {
            hs.transcript.update_checksum(data);
        }
    }

    /// Key derivation; a no-op on resumption where the master secret was
    /// restored from the ticket.
    pub(crate) fn derive_keys(&mut self) -> Result<()> {
        let hs = self.hs.as_deref_mut().ok_or(TlsError::Internal)?;
        if hs.flags.contains(HsFlags::RESUME) {
            return Ok(());
        }
        let master = hs.transcript.derive_master(
            &hs.premaster[..hs.pmslen],
            &hs.randbytes,
            hs.flags.contains(HsFlags::EXTENDED_MS),
        );
        self.sess.master = master;
        for b in hs.premaster.iter_mut() {
            *b = 0;
        }
        hs.pmslen = 0;
        Ok(())
    }

    fn parse_change_cipher_spec(&mut self, buf: &[u8], sink: &mut dyn RecordSink) -> Result<()> {
        if self.io_in.msgtype != MSG_CHANGE_CIPHER_SPEC || buf.len() != 1 || buf[0] != 1 {
            log::debug!("bad ChangeCipherSpec message");
            send_alert(sink, AlertLevel::Fatal, AlertDescription::DecodeError);
            return Err(TlsError::Decode);
        }
        Ok(())
    }

    fn handshake_wrapup(&mut self) {
        log::debug!("handshake complete, suite {:#06x}", self.sess.ciphersuite);
        self.hs = None;
    }

    /// Server-preference suite selection over the stored peer list.
    pub(crate) fn choose_ciphersuite(&mut self, sink: &mut dyn RecordSink) -> Result<()> {
        let (css, stored) = {
            let hs = self.hs_ref()?;
            (hs.css, (hs.cs_total_len / 2).min(CSS_MAX))
        };

        let mut got_common = false;
        for &pref in self.conf.suites {
            for &cs in css[..stored].iter() {
                if cs != pref {
                    continue;
                }
                got_common = true;
                if let Some((info, kc)) = self.ciphersuite_match(pref)? {
                    log::debug!("selected ciphersuite {}", info.name);
                    self.sess.ciphersuite = pref;
                    self.suite = Some(info);
                    self.hs_mut()?.key_cert = Some(kc);
                    return Ok(());
                }
            }
        }

        if got_common {
            log::warn!("none of the common ciphersuites is usable");
        } else {
            log::warn!("no ciphersuites in common");
        }
        send_alert(sink, AlertLevel::Fatal, AlertDescription::HandshakeFailure);
        Err(TlsError::HandshakeFailure)
    }

    /// Whether one suite is usable with the negotiated state and our
    /// key material; returns the matching key/cert index on success.
    fn ciphersuite_match(
        &self,
        suite_id: u16,
    ) -> Result<Option<(&'static CipherSuite, usize)>> {
        let info = CipherSuite::from_id(suite_id).ok_or(TlsError::Internal)?;
        let hs = self.hs_ref()?;
        log::debug!("trying ciphersuite {}", info.name);

        if info.min_minor > self.minor || info.max_minor < self.minor {
            log::debug!("ciphersuite mismatch: version");
            return Ok(None);
        }
        if info.kx.uses_ec() && hs.curves.is_empty() {
            log::debug!("ciphersuite mismatch: no common elliptic curve");
            return Ok(None);
        }
        if let Some(sig) = info.sig_alg() {
            if hs.hash_algs.find(sig).is_none() {
                log::debug!("ciphersuite mismatch: no suitable signature hash");
                return Ok(None);
            }
        }
        let vhost_idx = self.peer_conf.ok_or(TlsError::Internal)?;
        match self.pick_cert(vhost_idx, info, &hs.curves) {
            Some(kc) => Ok(Some((info, kc))),
            None => {
                log::debug!("ciphersuite mismatch: no suitable certificate");
                Ok(None)
            }
        }
    }

    /// Pick a certificate whose key matches the suite: key type, key
    /// usage, and (for ECDSA) a curve in the negotiated set.
    fn pick_cert(
        &self,
        vhost_idx: usize,
        suite: &CipherSuite,
        curves: &[GroupId],
    ) -> Option<usize> {
        let vhost = self.conf.vhost(vhost_idx)?;
        if vhost.key_certs.is_empty() {
            log::debug!("server has no certificate");
            return None;
        }
        let pk_alg = suite.cert_pk_alg();
        let need = KeyUsage::required_for(suite);
        for (i, kc) in vhost.key_certs.iter().enumerate() {
            if !kc.key.can_do(pk_alg) {
                continue;
            }
            // Skip certs the client would reject on keyUsage.
            if !kc.usage.contains(need) {
                continue;
            }
            if pk_alg == PkAlg::Ecdsa && !key_curve_acceptable(kc.key, curves) {
                continue;
            }
            return Some(i);
        }
        None
    }

    /// Private key of the selected key/cert entry.
    pub(crate) fn own_key(&self) -> Result<&'a dyn PrivateKey> {
        let vhost_idx = self.peer_conf.ok_or(TlsError::Config)?;
        let kc_idx = self.hs_ref()?.key_cert.ok_or(TlsError::Config)?;
        let vhost = self.conf.vhost(vhost_idx).ok_or(TlsError::Internal)?;
        Ok(vhost.key_certs.get(kc_idx).ok_or(TlsError::Internal)?.key)
    }

    /// Certificate chain of the selected key/cert entry.
    pub(crate) fn own_chain(&self) -> Result<&'a [&'a [u8]]> {
        let vhost_idx = self.peer_conf.ok_or(TlsError::Config)?;
        let kc_idx = self.hs_ref()?.key_cert.ok_or(TlsError::Config)?;
        let vhost = self.conf.vhost(vhost_idx).ok_or(TlsError::Internal)?;
        Ok(vhost.key_certs.get(kc_idx).ok_or(TlsError::Internal)?.chain)
    }
}

fn key_curve_acceptable(key: &dyn PrivateKey, curves: &[GroupId]) -> bool {
    match key.ec_group() {
        Some(g) => curves.contains(&g),
        None => false,
    }
}
