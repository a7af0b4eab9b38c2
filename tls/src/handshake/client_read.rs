//! Client-to-server message parsing after ServerHelloDone: Certificate,
//! ClientKeyExchange, CertificateVerify and Finished.

use alloc::vec::Vec;

use edgetls_bignum::pool;

use crate::alert::{send_alert, AlertDescription, AlertLevel};
use crate::ciphersuite::{HashAlg, PkAlg, SigAlg};
use crate::config::AuthMode;
use crate::handshake::{KxContext, TlsContext};
use crate::io::RecordSink;
use crate::session::VerifyFlags;
use crate::{
    HsStep, Result, TlsError, FINISHED_LEN, HS_CERTIFICATE, HS_CERTIFICATE_VERIFY,
    HS_CLIENT_KEY_EXCHANGE, HS_FINISHED, HS_RBUF_SZ, MAJOR_VERSION_3, MSG_HANDSHAKE,
};

/// Upper bound for a reassembled client Certificate message.
const MAX_CERT_MSG: usize = 16 * 1024;

fn be16(b: &[u8]) -> usize {
    ((b[0] as usize) << 8) | b[1] as usize
}

fn be24(b: &[u8]) -> usize {
    ((b[0] as usize) << 16) | ((b[1] as usize) << 8) | b[2] as usize
}

enum KxFamily {
    Ecdh,
    Dhm,
    Rsa,
}

impl<'a> TlsContext<'a> {
    /// Collect the body of the current message across chunks. The single
    /// slice case avoids the scratch buffer; chunked messages are bounded
    /// by `cap`.
    fn collect_message(&mut self, buf: &[u8], cap: usize) -> Result<Option<Vec<u8>>> {
        let hslen = self.io_in.hslen;
        if self.io_in.rlen == 0 && buf.len() >= hslen {
            return Ok(Some(buf[..hslen].to_vec()));
        }

        if hslen > cap {
            log::warn!(
                "chunked message of {} bytes exceeds the {} byte fallback buffer",
                hslen,
                cap
            );
            return Err(TlsError::Decode);
        }

        let hs = self.hs.as_deref_mut().ok_or(TlsError::Internal)?;
        if self.io_in.rlen == 0 {
            log::warn!("chunked handshake message, falling back to copy");
            hs.rbuf.clear();
        }
        hs.rbuf.extend_from_slice(buf);
        self.io_in.rlen += buf.len();
        if self.io_in.rlen < hslen {
            return Ok(None);
        }
        if self.io_in.rlen > hslen {
            return Err(TlsError::Decode);
        }
        Ok(Some(core::mem::take(&mut hs.rbuf)))
    }

    /// Client Certificate message; reached only under client-auth
    /// configurations.
    pub(crate) fn parse_certificate(
        &mut self,
        hdr: &[u8],
        buf: &[u8],
        sink: &mut dyn RecordSink,
    ) -> Result<HsStep> {
        if self.io_in.msgtype != MSG_HANDSHAKE || self.io_in.hstype != HS_CERTIFICATE {
            log::debug!("bad client certificate message type");
            send_alert(sink, AlertLevel::Fatal, AlertDescription::DecodeError);
            return Err(TlsError::Decode);
        }

        self.update_checksum(hdr);
        self.update_checksum(buf);

        let body = match self.collect_message(buf, MAX_CERT_MSG)? {
            Some(b) => b,
            None => return Ok(HsStep::Postpone),
        };

        if body.len() < 3 {
            send_alert(sink, AlertLevel::Fatal, AlertDescription::DecodeError);
            return Err(TlsError::Decode);
        }
        let total = be24(&body);
        if total + 3 != body.len() {
            send_alert(sink, AlertLevel::Fatal, AlertDescription::DecodeError);
            return Err(TlsError::Decode);
        }

        if total == 0 {
            // The client declined to present a certificate.
            if self.conf.authmode == AuthMode::Required {
                log::warn!("client certificate required but none presented");
                send_alert(sink, AlertLevel::Fatal, AlertDescription::HandshakeFailure);
                return Err(TlsError::AuthFailed);
            }
            self.sess.verify_result |= VerifyFlags::SKIP_VERIFY;
            return Ok(HsStep::Done);
        }

        if body.len() < 6 {
            send_alert(sink, AlertLevel::Fatal, AlertDescription::DecodeError);
            return Err(TlsError::Decode);
        }
        let clen = be24(&body[3..]);
        if 6 + clen > body.len() {
            send_alert(sink, AlertLevel::Fatal, AlertDescription::DecodeError);
            return Err(TlsError::Decode);
        }

        let cert = match self.conf.crypto.parse_certificate(&body[6..6 + clen]) {
            Ok(c) => c,
            Err(e) => {
                log::debug!("cannot parse the client certificate: {}", e);
                send_alert(sink, AlertLevel::Fatal, AlertDescription::BadCertificate);
                return Err(e);
            }
        };
        self.peer_cert = Some(cert);

        Ok(HsStep::Done)
    }

    /// ClientKeyExchange: three families. The checksum is fed before key
    /// derivation because the extended master secret binds the transcript
    /// including this message.
    pub(crate) fn parse_client_key_exchange(
        &mut self,
        hdr: &[u8],
        buf: &[u8],
        sink: &mut dyn RecordSink,
    ) -> Result<HsStep> {
        if self.io_in.msgtype != MSG_HANDSHAKE || self.io_in.hstype != HS_CLIENT_KEY_EXCHANGE {
            log::debug!("bad ClientKeyExchange message type");
            send_alert(sink, AlertLevel::Fatal, AlertDescription::DecodeError);
            return Err(TlsError::Decode);
        }

        self.update_checksum(hdr);
        self.update_checksum(buf);

        let body = match self.collect_message(buf, HS_RBUF_SZ) {
            Ok(Some(b)) => b,
            Ok(None) => return Ok(HsStep::Postpone),
            Err(e) => {
                send_alert(sink, AlertLevel::Fatal, AlertDescription::DecodeError);
                return Err(e);
            }
        };

        let family = match self.hs_ref()?.kx {
            KxContext::Ecdh(_) => KxFamily::Ecdh,
            KxContext::Dhm(_) => KxFamily::Dhm,
            KxContext::Rsa => KxFamily::Rsa,
            KxContext::None => return Err(TlsError::Internal),
        };

        match family {
            KxFamily::Ecdh => {
                let rng = self.conf.rng;
                let hs = self.hs.as_deref_mut().ok_or(TlsError::Internal)?;
                let ecdh = match hs.kx {
                    KxContext::Ecdh(ref mut e) => e,
                    _ => return Err(TlsError::Internal),
                };
                if ecdh.read_public(&body).is_err() {
                    log::debug!("cannot read the peer ECDH public point");
                    send_alert(sink, AlertLevel::Fatal, AlertDescription::DecodeError);
                    return Err(TlsError::Decode);
                }
                match ecdh.calc_secret(rng, &mut hs.premaster) {
                    Ok(n) => hs.pmslen = n,
                    Err(e) => {
                        log::debug!("cannot compute the ECDH secret: {}", e);
                        send_alert(sink, AlertLevel::Fatal, AlertDescription::IllegalParameter);
                        return Err(e);
                    }
                }
            }

            KxFamily::Dhm => {
                // opaque dh_Yc<1..2^16-1>
                if body.len() < 2 || 2 + be16(&body) != body.len() {
                    log::debug!("bad client DH public layout");
                    send_alert(sink, AlertLevel::Fatal, AlertDescription::DecodeError);
                    return Err(TlsError::Decode);
                }
                let worker = self.worker;
                let hs = self.hs.as_deref_mut().ok_or(TlsError::Internal)?;
                let dhm = match hs.kx {
                    KxContext::Dhm(ref mut d) => d,
                    _ => return Err(TlsError::Internal),
                };
                if let Err(e) = dhm.read_public(&body[2..]) {
                    log::debug!("cannot read the client DH public value: {}", e);
                    send_alert(sink, AlertLevel::Fatal, AlertDescription::IllegalParameter);
                    return Err(e);
                }
                let premaster = &mut hs.premaster;
                match pool::with(worker, |pl| dhm.calc_secret(premaster, pl)) {
                    Some(Ok(n)) => hs.pmslen = n,
                    Some(Err(e)) => {
                        log::debug!("cannot compute the DH secret: {}", e);
                        send_alert(sink, AlertLevel::Fatal, AlertDescription::IllegalParameter);
                        return Err(e);
                    }
                    None => return Err(TlsError::Internal),
                }
            }

            KxFamily::Rsa => self.parse_encrypted_pms(&body, sink)?,
        }

        self.derive_keys()?;
        Ok(HsStep::Done)
    }

    /// RSA-encrypted premaster. Invalid PKCS#1 padding must not end the
    /// connection here: a fresh random premaster is substituted with a
    /// constant-time masked copy and the failure surfaces only as a bad
    /// MAC on Finished.
    fn parse_encrypted_pms(&mut self, body: &[u8], sink: &mut dyn RecordSink) -> Result<()> {
        let key = self.own_key()?;
        if !key.can_do(PkAlg::Rsa) {
            log::debug!("no RSA private key for the negotiated suite");
            return Err(TlsError::Config);
        }

        let klen = key.len();
        if body.len() != 2 + klen || be16(body) != klen {
            log::debug!("bad encrypted premaster layout");
            send_alert(sink, AlertLevel::Fatal, AlertDescription::DecodeError);
            return Err(TlsError::Decode);
        }

        let ver = [MAJOR_VERSION_3, self.conf.max_minor_ver];

        let mut fake = [0u8; 48];
        self.conf.rng.fill(&mut fake);

        let mut peer = [0u8; 48];
        let (rfail, plen) = match key.decrypt(&body[2..], &mut peer) {
            Ok(n) => (0u32, n),
            Err(_) => (1u32, 0),
        };

        let mut diff = rfail;
        diff |= (plen ^ 48) as u32;
        diff |= (peer[0] ^ ver[0]) as u32;
        diff |= (peer[1] ^ ver[1]) as u32;

        // mask = 0xff when anything differed, without branching on it.
        let mask = (((diff | diff.wrapping_neg()) >> 31) as u8).wrapping_neg();

        let hs = self.hs.as_deref_mut().ok_or(TlsError::Internal)?;
        hs.pmslen = 48;
        for i in 0..48 {
            hs.premaster[i] = (mask & fake[i]) | (!mask & peer[i]);
        }

        Ok(())
    }

    /// CertificateVerify: check the SigAndHash pair against the
    /// maintained transcript hashes and the peer key, then verify the
    /// signature over the transcript hash.
    pub(crate) fn parse_certificate_verify(
        &mut self,
        hdr: &[u8],
        buf: &[u8],
        sink: &mut dyn RecordSink,
    ) -> Result<HsStep> {
        if self.io_in.msgtype != MSG_HANDSHAKE || self.io_in.hstype != HS_CERTIFICATE_VERIFY {
            log::debug!("bad CertificateVerify message type");
            send_alert(sink, AlertLevel::Fatal, AlertDescription::DecodeError);
            return Err(TlsError::Decode);
        }
        if self.io_in.hslen > buf.len() {
            log::warn!("CertificateVerify with chunked data is not supported");
            send_alert(sink, AlertLevel::Fatal, AlertDescription::DecodeError);
            return Err(TlsError::Decode);
        }
        let body = &buf[..self.io_in.hslen];

        if body.len() < 4 {
            send_alert(sink, AlertLevel::Fatal, AlertDescription::DecodeError);
            return Err(TlsError::Decode);
        }

        let md = match HashAlg::from_wire(body[0]) {
            Some(m) => m,
            None => {
                log::debug!("peer not adhering to the requested verify hash");
                send_alert(sink, AlertLevel::Fatal, AlertDescription::IllegalParameter);
                return Err(TlsError::AuthFailed);
            }
        };
        if !self.hs_ref()?.transcript.supports(md) {
            log::debug!("verify hash not maintained over the transcript");
            send_alert(sink, AlertLevel::Fatal, AlertDescription::IllegalParameter);
            return Err(TlsError::AuthFailed);
        }

        let sig_alg = match SigAlg::from_wire(body[1]) {
            Some(s) => s,
            None => {
                log::debug!("peer not adhering to the requested verify signature");
                send_alert(sink, AlertLevel::Fatal, AlertDescription::IllegalParameter);
                return Err(TlsError::AuthFailed);
            }
        };
        let pk_alg = match sig_alg {
            SigAlg::Rsa => PkAlg::Rsa,
            SigAlg::Ecdsa => PkAlg::Ecdsa,
        };

        let sig_len = be16(&body[2..4]);
        if 4 + sig_len != body.len() {
            send_alert(sink, AlertLevel::Fatal, AlertDescription::DecodeError);
            return Err(TlsError::Decode);
        }

        let mut hash = [0u8; 64];
        let hlen = self.hs_ref()?.transcript.calc_verify(md, &mut hash);

        {
            let cert = self.peer_cert.as_deref().ok_or(TlsError::Internal)?;
            if !cert.can_do(pk_alg) {
                log::debug!("verify signature does not match the certificate key");
                send_alert(sink, AlertLevel::Fatal, AlertDescription::IllegalParameter);
                return Err(TlsError::AuthFailed);
            }
            if cert.verify(md, &hash[..hlen], &body[4..]).is_err() {
                log::debug!("CertificateVerify signature check failed");
                send_alert(sink, AlertLevel::Fatal, AlertDescription::DecryptError);
                return Err(TlsError::AuthFailed);
            }
        }

        // Only now does the message join the transcript.
        self.update_checksum(hdr);
        let n = self.io_in.hslen;
        self.update_checksum(&buf[..n]);

        Ok(HsStep::Done)
    }

    /// Client Finished: 12 bytes of PRF output over the transcript.
    pub(crate) fn parse_finished(
        &mut self,
        hdr: &[u8],
        buf: &[u8],
        sink: &mut dyn RecordSink,
    ) -> Result<HsStep> {
        if self.io_in.msgtype != MSG_HANDSHAKE || self.io_in.hstype != HS_FINISHED {
            log::debug!("bad Finished message type");
            send_alert(sink, AlertLevel::Fatal, AlertDescription::DecodeError);
            return Err(TlsError::Decode);
        }
        if self.io_in.rlen == 0 && self.io_in.hslen != FINISHED_LEN {
            send_alert(sink, AlertLevel::Fatal, AlertDescription::DecodeError);
            return Err(TlsError::Decode);
        }

        let body = match self.collect_message(buf, FINISHED_LEN)? {
            Some(b) => b,
            None => return Ok(HsStep::Postpone),
        };

        let mut expected = [0u8; FINISHED_LEN];
        self.hs_ref()?
            .transcript
            .finished_tag(&self.sess.master, b"client finished", &mut expected);

        let mut diff = 0u8;
        for i in 0..FINISHED_LEN {
            diff |= expected[i] ^ body[i];
        }
        if diff != 0 {
            log::debug!("client Finished verify data mismatch");
            send_alert(sink, AlertLevel::Fatal, AlertDescription::DecryptError);
            return Err(TlsError::AuthFailed);
        }

        // The peer Finished joins the transcript for our own.
        self.update_checksum(hdr);
        self.update_checksum(&body);

        Ok(HsStep::Done)
    }
}
