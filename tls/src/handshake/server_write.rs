//! Batched write of the ServerHello..ServerHelloDone record train.
//!
//! All messages of the flight are appended to one output page, each
//! referenced by one scatter-gather entry, and flushed to the record
//! layer as a single send.

use alloc::vec::Vec;

use edgetls_bignum::{ecp, pool, GroupId};

use crate::alert::{send_alert, AlertDescription, AlertLevel};
use crate::ciphersuite::{HashAlg, SigAlg};
use crate::config::AuthMode;
use crate::handshake::{HandshakeState, HsFlags, KxContext, TlsContext};
use crate::io::{RecordSink, SgTable};
use crate::session::VerifyFlags;
use crate::{
    Result, TlsError, HS_CERTIFICATE, HS_CERTIFICATE_REQUEST, HS_HDR_LEN, HS_SERVER_HELLO,
    HS_SERVER_HELLO_DONE, HS_SERVER_KEY_EXCHANGE, MAJOR_VERSION_3, MAX_SIG_LEN, MAX_SKX_LEN,
    MINOR_VERSION_3, MSG_HANDSHAKE,
};

const CERT_TYPE_RSA_SIGN: u8 = 1;
const CERT_TYPE_ECDSA_SIGN: u8 = 64;

impl<'a> TlsContext<'a> {
    /// Emit the ServerHello train. On resumption only ServerHello goes
    /// out and the state jumps straight to the server finish block.
    pub(crate) fn write_server_hello_flight(&mut self, sink: &mut dyn RecordSink) -> Result<()> {
        match self.server_hello_flight(sink) {
            Ok(()) => Ok(()),
            Err(e) => {
                let desc = match e {
                    TlsError::HandshakeFailure => AlertDescription::HandshakeFailure,
                    _ => AlertDescription::InternalError,
                };
                send_alert(sink, AlertLevel::Fatal, desc);
                Err(e)
            }
        }
    }

    fn server_hello_flight(&mut self, sink: &mut dyn RecordSink) -> Result<()> {
        let mut sgt = SgTable::with_capacity(2048);
        self.write_server_hello(&mut sgt)?;

        if self.hs_flags().contains(HsFlags::RESUME) {
            self.checksum_handshake_frags(&sgt);
            sink.append_record(&sgt, false)?;
            self.derive_keys()?;
            self.state = HandshakeState::ServerChangeCipherSpec;
            return Ok(());
        }

        self.write_certificate(&mut sgt)?;
        self.write_server_key_exchange(&mut sgt)?;
        let client_auth = self.conf.authmode != AuthMode::None;
        if client_auth {
            self.write_certificate_request(&mut sgt)?;
        }
        self.write_server_hello_done(&mut sgt)?;

        self.checksum_handshake_frags(&sgt);
        sink.append_record(&sgt, false)?;

        if client_auth {
            self.state = HandshakeState::ClientCertificate;
        } else {
            self.sess.verify_result |= VerifyFlags::SKIP_VERIFY;
            self.state = HandshakeState::ClientKeyExchange;
        }
        Ok(())
    }

    /// Feed the flight's handshake fragments to the transcript;
    /// ChangeCipherSpec fragments stay out by content type.
    pub(crate) fn checksum_handshake_frags(&mut self, sgt: &SgTable) {
        let mut fed: Vec<u8> = Vec::new();
        for ent in sgt.entries() {
            if ent.ctype == MSG_HANDSHAKE {
                fed.extend_from_slice(sgt.frag_bytes(ent));
            }
        }
        self.update_checksum(&fed);
    }

    fn write_server_hello(&mut self, sgt: &mut SgTable) -> Result<()> {
        let start = sgt.begin();
        let hdr = sgt.reserve(HS_HDR_LEN);

        sgt.put_u8(MAJOR_VERSION_3);
        sgt.put_u8(MINOR_VERSION_3);

        let now = (self.conf.now)();
        sgt.put_u32(now);
        let mut rnd = [0u8; 28];
        self.conf.rng.fill(&mut rnd);
        sgt.put_slice(&rnd);

        {
            let hs = self.hs.as_deref_mut().ok_or(TlsError::Internal)?;
            hs.randbytes[32..36].copy_from_slice(&now.to_be_bytes());
            hs.randbytes[36..64].copy_from_slice(&rnd);
        }

        let flags = self.hs_flags();
        if !flags.contains(HsFlags::RESUME) {
            self.sess.start = now;
            if flags.contains(HsFlags::NEW_SESSION_TICKET) {
                // The ticket replaces the id as the resumption handle.
                self.sess.id_len = 0;
                self.sess.id = [0; 32];
            } else {
                self.sess.id_len = 32;
                self.conf.rng.fill(&mut self.sess.id);
            }
        }
        log::debug!(
            "ServerHello: {} session, id len {}, suite {:#06x}",
            if flags.contains(HsFlags::RESUME) {
                "resumed"
            } else {
                "new"
            },
            self.sess.id_len,
            self.sess.ciphersuite
        );

        sgt.put_u8(self.sess.id_len as u8);
        sgt.put_slice(&self.sess.id[..self.sess.id_len]);
        sgt.put_u16(self.sess.ciphersuite);
        sgt.put_u8(0); // null compression

        let mut ext: Vec<u8> = Vec::new();
        if flags.contains(HsFlags::SECURE_RENEGOTIATION) {
            // Empty renegotiation_info echo.
            ext.extend_from_slice(&[0xff, 0x01, 0x00, 0x01, 0x00]);
        }
        if flags.contains(HsFlags::EXTENDED_MS) {
            ext.extend_from_slice(&[0x00, 0x17, 0x00, 0x00]);
        }
        if flags.contains(HsFlags::NEW_SESSION_TICKET) {
            // Empty: announces a NewSessionTicket message.
            ext.extend_from_slice(&[0x00, 0x23, 0x00, 0x00]);
        }
        if flags.contains(HsFlags::CLI_EXTS) {
            // ec_point_formats, uncompressed only.
            ext.extend_from_slice(&[0x00, 0x0b, 0x00, 0x02, 0x01, 0x00]);
        }
        if let Some(i) = self.alpn_chosen {
            let name = self.conf.alpn[i];
            ext.extend_from_slice(&[0x00, 0x10]);
            ext.extend_from_slice(&((name.len() + 3) as u16).to_be_bytes());
            ext.extend_from_slice(&((name.len() + 1) as u16).to_be_bytes());
            ext.push(name.len() as u8);
            ext.extend_from_slice(name);
        }
        if !ext.is_empty() {
            sgt.put_u16(ext.len() as u16);
            sgt.put_slice(&ext);
        }

        let body = sgt.begin() - start - HS_HDR_LEN;
        sgt.patch_hshdr(hdr, HS_SERVER_HELLO, body);
        sgt.push_frag(start, MSG_HANDSHAKE)
    }

    fn write_certificate(&mut self, sgt: &mut SgTable) -> Result<()> {
        let chain = self.own_chain()?;
        let start = sgt.begin();
        let hdr = sgt.reserve(HS_HDR_LEN);

        let total: usize = chain.iter().map(|c| 3 + c.len()).sum();
        sgt.put_u24(total);
        for cert in chain {
            sgt.put_u24(cert.len());
            sgt.put_slice(cert);
        }

        sgt.patch_hshdr(hdr, HS_CERTIFICATE, 3 + total);
        sgt.push_frag(start, MSG_HANDSHAKE)
    }

    /// ServerKeyExchange: ephemeral parameters plus the server signature
    /// over `client_random || server_random || params`.
    fn write_server_key_exchange(&mut self, sgt: &mut SgTable) -> Result<()> {
        let suite = self.suite.ok_or(TlsError::Internal)?;
        if suite.kx.no_pfs() {
            log::debug!("key exchange without ephemeral keys, no ServerKeyExchange");
            return Ok(());
        }

        let start = sgt.begin();
        let hdr = sgt.reserve(HS_HDR_LEN);

        // Match the local curve preference list against the peer's offer.
        let curve = {
            let hs = self.hs_ref()?;
            let prefs: &[GroupId] = if self.conf.curve_prefs.is_empty() {
                ecp::grp_id_list()
            } else {
                self.conf.curve_prefs
            };
            prefs.iter().copied().find(|g| hs.curves.contains(g))
        };

        let params: Vec<u8> = {
            let worker = self.worker;
            let conf = self.conf;
            let hs = self.hs.as_deref_mut().ok_or(TlsError::Internal)?;
            match hs.kx {
                KxContext::Ecdh(ref mut ecdh) => {
                    let grp = match curve {
                        Some(g) => g,
                        None => {
                            log::warn!("no matching curve for ECDHE key exchange");
                            return Err(TlsError::HandshakeFailure);
                        }
                    };
                    let mut out = [0u8; 512];
                    let n = ecdh.make_params(grp, hs.point_format, conf.rng, &mut out)?;
                    out[..n].to_vec()
                }
                KxContext::Dhm(ref mut dhm) => {
                    let (p, g) = match conf.dhm {
                        Some(pg) => pg,
                        None => {
                            log::debug!("no DH parameters configured");
                            return Err(TlsError::Config);
                        }
                    };
                    dhm.set_group(p, g)?;
                    let mut out = alloc::vec![0u8; MAX_SKX_LEN];
                    let n = pool::with(worker, |pl| dhm.make_params(conf.rng, &mut out, pl))
                        .ok_or(TlsError::Internal)??;
                    out.truncate(n);
                    out
                }
                _ => return Err(TlsError::Internal),
            }
        };
        sgt.put_slice(&params);

        let sig_alg = suite.sig_alg().ok_or(TlsError::Internal)?;
        let (md, randbytes) = {
            let hs = self.hs_ref()?;
            let md = hs.hash_algs.find(sig_alg).ok_or(TlsError::Internal)?;
            (md, hs.randbytes)
        };
        log::debug!("signing key exchange parameters with hash {:?}", md);

        let mut hash = [0u8; 64];
        let hlen = self
            .conf
            .crypto
            .hash(md, &[&randbytes[..], &params[..]], &mut hash);

        sgt.put_u8(md.wire());
        sgt.put_u8(sig_alg.wire());

        let key = self.own_key()?;
        let mut sig = [0u8; MAX_SIG_LEN];
        let siglen = key.sign(md, &hash[..hlen], &mut sig)?;
        sgt.put_u16(siglen as u16);
        sgt.put_slice(&sig[..siglen]);

        let body = sgt.begin() - start - HS_HDR_LEN;
        if body > MAX_SKX_LEN {
            return Err(TlsError::Capacity);
        }
        sgt.patch_hshdr(hdr, HS_SERVER_KEY_EXCHANGE, body);
        sgt.push_frag(start, MSG_HANDSHAKE)
    }

    /// CertificateRequest: certificate types plus the SignatureAndHash
    /// list. The acceptable-CA list is refused at the interface, so the
    /// DN block is always empty.
    fn write_certificate_request(&mut self, sgt: &mut SgTable) -> Result<()> {
        if self.conf.cert_req_ca_list {
            log::warn!("the acceptable-CA list in CertificateRequest is not supported");
            return Err(TlsError::UnsupportedFeature);
        }

        let start = sgt.begin();
        let hdr = sgt.reserve(HS_HDR_LEN);

        sgt.put_u8(2);
        sgt.put_u8(CERT_TYPE_RSA_SIGN);
        sgt.put_u8(CERT_TYPE_ECDSA_SIGN);

        let sa_off = sgt.reserve(2);
        let mut sa_len = 0u16;
        {
            let default = [HashAlg::Sha256];
            let prefs = if self.conf.hash_prefs.is_empty() {
                &default[..]
            } else {
                self.conf.hash_prefs
            };
            let hs = self.hs_ref()?;
            for &h in prefs {
                if !hs.transcript.supports(h) {
                    continue;
                }
                sgt.put_u8(h.wire());
                sgt.put_u8(SigAlg::Rsa.wire());
                sgt.put_u8(h.wire());
                sgt.put_u8(SigAlg::Ecdsa.wire());
                sa_len += 4;
            }
        }
        sgt.patch_u16(sa_off, sa_len);

        // Empty DistinguishedName list.
        sgt.put_u16(0);

        let body = sgt.begin() - start - HS_HDR_LEN;
        sgt.patch_hshdr(hdr, HS_CERTIFICATE_REQUEST, body);
        sgt.push_frag(start, MSG_HANDSHAKE)
    }

    fn write_server_hello_done(&mut self, sgt: &mut SgTable) -> Result<()> {
        log::debug!("sending ServerHelloDone");
        let start = sgt.begin();
        let hdr = sgt.reserve(HS_HDR_LEN);
        sgt.patch_hshdr(hdr, HS_SERVER_HELLO_DONE, 0);
        sgt.push_frag(start, MSG_HANDSHAKE)
    }
}
