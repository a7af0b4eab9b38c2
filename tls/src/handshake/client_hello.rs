//! Incremental ClientHello parser.
//!
//! Fields are consumed in wire order and every multi-byte field has its
//! own partial state, so the parser can hand control back after any byte
//! and resume on the next chunk. Split 16-bit fields are accumulated as
//! `high << 8 | low` with the first byte parked in the high half.
//!
//! Wire layout:
//!
//! ```text
//!  0 .  1   protocol version
//!  2 . 33   client random
//! 34 . 34   session id length
//! .. . ..   session id
//! .. . ..   cipher suite list length (2) and list
//! .. . ..   compression list length (1) and list (must contain null)
//! .. . ..   extensions length (2, optional) and (type, len, body) loop
//! ```

use crate::alert::{send_alert, AlertDescription, AlertLevel};
use crate::ciphersuite::{
    HashAlg, KeyExchangeType, EMPTY_RENEGOTIATION_INFO_SCSV, FALLBACK_SCSV,
};
use crate::handshake::{ClientHelloState, HsFlags, KxContext, TlsContext};
use crate::io::{IoIn, RecordSink};
use crate::{
    HsStep, Result, TlsError, CSS_MAX, HS_CLIENT_HELLO, HS_RBUF_SZ, MAJOR_VERSION_3,
    MINOR_VERSION_3,
};

/// Extension identifiers dispatched by the parser.
const EXT_SERVERNAME: u16 = 0;
const EXT_SUPPORTED_GROUPS: u16 = 10;
const EXT_POINT_FORMATS: u16 = 11;
const EXT_SIG_ALGS: u16 = 13;
const EXT_ALPN: u16 = 16;
const EXT_EXTENDED_MS: u16 = 0x0017;
const EXT_SESSION_TICKET: u16 = 0x0023;
const EXT_RENEGOTIATION_INFO: u16 = 0xff01;

/// Account `n` consumed bytes against the message body length.
fn consume_hslen(io: &mut IoIn, sink: &mut dyn RecordSink, n: usize) -> Result<()> {
    match io.hslen.checked_sub(n) {
        Some(v) => {
            io.hslen = v;
            Ok(())
        }
        None => {
            log::debug!("ClientHello: message shorter than its declared fields");
            send_alert(sink, AlertLevel::Fatal, AlertDescription::DecodeError);
            Err(TlsError::Decode)
        }
    }
}

impl<'a> TlsContext<'a> {
    /// Consume one chunk of the ClientHello. Alerts are emitted for every
    /// failure except a wrong message type, which may mean the peer is
    /// not speaking TLS at all.
    pub(crate) fn parse_client_hello(
        &mut self,
        hdr: &[u8],
        buf: &[u8],
        sink: &mut dyn RecordSink,
    ) -> Result<HsStep> {
        if self.io_in.hstype != HS_CLIENT_HELLO {
            log::debug!("bad type in ClientHello message");
            return Err(TlsError::Decode);
        }

        let mut pos = 0usize;
        let status = loop {
            let st = self.hs_ref()?.ch_state;
            let avail = buf.len() - pos;

            match st {
                ClientHelloState::Version => {
                    if avail == 0 {
                        break HsStep::Postpone;
                    }
                    if self.io_in.rlen == 1 {
                        self.minor = buf[pos];
                        pos += 1;
                    } else if avail == 1 {
                        self.major = buf[pos];
                        pos += 1;
                        self.io_in.rlen = 1;
                        break HsStep::Postpone;
                    } else {
                        self.major = buf[pos];
                        self.minor = buf[pos + 1];
                        pos += 2;
                    }
                    consume_hslen(&mut self.io_in, sink, 2)?;
                    if self.major != MAJOR_VERSION_3 || self.minor != MINOR_VERSION_3 {
                        log::debug!(
                            "ClientHello: bad version {}:{}",
                            self.major,
                            self.minor
                        );
                        send_alert(sink, AlertLevel::Fatal, AlertDescription::ProtocolVersion);
                        return Err(TlsError::ProtocolVersion);
                    }
                    let hs = self.hs.as_deref_mut().ok_or(TlsError::Internal)?;
                    hs.ch_state = ClientHelloState::Random;
                    self.io_in.rlen = 0;
                }

                ClientHelloState::Random => {
                    let hs = self.hs.as_deref_mut().ok_or(TlsError::Internal)?;
                    let n = (32 - self.io_in.rlen).min(avail);
                    hs.randbytes[self.io_in.rlen..self.io_in.rlen + n]
                        .copy_from_slice(&buf[pos..pos + n]);
                    pos += n;
                    consume_hslen(&mut self.io_in, sink, n)?;
                    if self.io_in.rlen + n < 32 {
                        self.io_in.rlen += n;
                        break HsStep::Postpone;
                    }
                    hs.ch_state = ClientHelloState::SessLen;
                    self.io_in.rlen = 0;
                }

                ClientHelloState::SessLen => {
                    if avail == 0 {
                        break HsStep::Postpone;
                    }
                    let n = buf[pos] as usize;
                    // 9 = 2 (suite list length) + 2 (one suite)
                    //   + 1 (compression count) + 1 (compression)
                    //   + 2 (extensions length) + 1 (this byte).
                    if n > 32 || n + 9 > self.io_in.hslen {
                        log::debug!("ClientHello: bad session id length {}", n);
                        send_alert(sink, AlertLevel::Fatal, AlertDescription::DecodeError);
                        return Err(TlsError::Decode);
                    }
                    self.sess.id_len = n;
                    pos += 1;
                    consume_hslen(&mut self.io_in, sink, 1)?;
                    let hs = self.hs.as_deref_mut().ok_or(TlsError::Internal)?;
                    hs.ch_state = if n > 0 {
                        ClientHelloState::Sess
                    } else {
                        ClientHelloState::CsLen
                    };
                    self.io_in.rlen = 0;
                }

                ClientHelloState::Sess => {
                    let need = self.sess.id_len;
                    let n = (need - self.io_in.rlen).min(avail);
                    self.sess.id[self.io_in.rlen..self.io_in.rlen + n]
                        .copy_from_slice(&buf[pos..pos + n]);
                    pos += n;
                    consume_hslen(&mut self.io_in, sink, n)?;
                    if self.io_in.rlen + n < need {
                        self.io_in.rlen += n;
                        break HsStep::Postpone;
                    }
                    let hs = self.hs.as_deref_mut().ok_or(TlsError::Internal)?;
                    hs.ch_state = ClientHelloState::CsLen;
                    self.io_in.rlen = 0;
                }

                ClientHelloState::CsLen => {
                    if avail == 0 {
                        break HsStep::Postpone;
                    }
                    let hs = self.hs.as_deref_mut().ok_or(TlsError::Internal)?;
                    if self.io_in.rlen == 1 {
                        hs.cs_total_len += buf[pos] as usize;
                        pos += 1;
                    } else if avail == 1 {
                        hs.cs_total_len = (buf[pos] as usize) << 8;
                        pos += 1;
                        self.io_in.rlen = 1;
                        break HsStep::Postpone;
                    } else {
                        hs.cs_total_len = ((buf[pos] as usize) << 8) + buf[pos + 1] as usize;
                        pos += 2;
                    }
                    let n = hs.cs_total_len;
                    hs.cs_cur_len = 0;
                    consume_hslen(&mut self.io_in, sink, 2)?;
                    // 1 for the compression list length.
                    if n < 2 || n + 1 > self.io_in.hslen || (n & 1) != 0 {
                        log::debug!("ClientHello: bad cipher suite list length {}", n);
                        send_alert(sink, AlertLevel::Fatal, AlertDescription::DecodeError);
                        return Err(TlsError::Decode);
                    }
                    let hs = self.hs.as_deref_mut().ok_or(TlsError::Internal)?;
                    hs.ch_state = ClientHelloState::Cs;
                    self.io_in.rlen = 0;
                }

                ClientHelloState::Cs => {
                    let hs = self.hs.as_deref_mut().ok_or(TlsError::Internal)?;
                    if hs.cs_cur_len >= 2 * CSS_MAX {
                        // No room for the tail; it only holds the peer's
                        // lowest-priority entries.
                        log::warn!(
                            "ClientHello: clamping the cipher suite list to {} entries",
                            CSS_MAX
                        );
                        hs.ch_state = ClientHelloState::CsSkip;
                        self.io_in.rlen = 0;
                        continue;
                    }
                    if avail == 0 {
                        break HsStep::Postpone;
                    }
                    let idx = hs.cs_cur_len / 2;
                    if self.io_in.rlen == 1 {
                        hs.css[idx] |= buf[pos] as u16;
                        pos += 1;
                    } else if avail == 1 {
                        hs.css[idx] = (buf[pos] as u16) << 8;
                        pos += 1;
                        self.io_in.rlen = 1;
                        break HsStep::Postpone;
                    } else {
                        hs.css[idx] = ((buf[pos] as u16) << 8) | buf[pos + 1] as u16;
                        pos += 2;
                    }
                    let cs = hs.css[idx];
                    if cs == FALLBACK_SCSV {
                        log::debug!("received FALLBACK_SCSV");
                        if self.minor < self.conf.max_minor_ver {
                            send_alert(
                                sink,
                                AlertLevel::Fatal,
                                AlertDescription::InappropriateFallback,
                            );
                            return Err(TlsError::InappropriateFallback);
                        }
                    } else if cs == EMPTY_RENEGOTIATION_INFO_SCSV {
                        log::debug!("received EMPTY_RENEGOTIATION_INFO_SCSV");
                        let hs = self.hs.as_deref_mut().ok_or(TlsError::Internal)?;
                        hs.flags |= HsFlags::SECURE_RENEGOTIATION;
                    }
                    consume_hslen(&mut self.io_in, sink, 2)?;
                    let hs = self.hs.as_deref_mut().ok_or(TlsError::Internal)?;
                    hs.cs_cur_len += 2;
                    self.io_in.rlen = 0;
                    if hs.cs_cur_len == hs.cs_total_len {
                        hs.ch_state = ClientHelloState::ComprLen;
                    }
                }

                ClientHelloState::CsSkip => {
                    let hs = self.hs.as_deref_mut().ok_or(TlsError::Internal)?;
                    let delta = avail.min(hs.cs_total_len - hs.cs_cur_len);
                    pos += delta;
                    hs.cs_cur_len += delta;
                    consume_hslen(&mut self.io_in, sink, delta)?;
                    let hs = self.hs.as_deref_mut().ok_or(TlsError::Internal)?;
                    if hs.cs_cur_len == hs.cs_total_len {
                        // Clamp the declared size to what was stored.
                        hs.cs_total_len = 2 * CSS_MAX;
                        hs.ch_state = ClientHelloState::ComprLen;
                        self.io_in.rlen = 0;
                    } else {
                        break HsStep::Postpone;
                    }
                }

                ClientHelloState::ComprLen => {
                    if avail == 0 {
                        break HsStep::Postpone;
                    }
                    let n = buf[pos] as usize;
                    if n < 1 || n > 16 || n + 1 > self.io_in.hslen {
                        log::debug!("ClientHello: bad compression count {}", n);
                        send_alert(sink, AlertLevel::Fatal, AlertDescription::DecodeError);
                        return Err(TlsError::Decode);
                    }
                    pos += 1;
                    consume_hslen(&mut self.io_in, sink, 1)?;
                    let hs = self.hs.as_deref_mut().ok_or(TlsError::Internal)?;
                    hs.compr_n = n as u8;
                    hs.compr_has_null = false;
                    hs.ch_state = ClientHelloState::Compr;
                    self.io_in.rlen = 0;
                }

                ClientHelloState::Compr => {
                    if avail == 0 {
                        break HsStep::Postpone;
                    }
                    let hs = self.hs.as_deref_mut().ok_or(TlsError::Internal)?;
                    if buf[pos] == 0 {
                        hs.compr_has_null = true;
                    }
                    pos += 1;
                    hs.compr_n -= 1;
                    let done = hs.compr_n == 0;
                    let has_null = hs.compr_has_null;
                    consume_hslen(&mut self.io_in, sink, 1)?;
                    if done {
                        if !has_null {
                            log::debug!("ClientHello: no null compression offered");
                            send_alert(sink, AlertLevel::Fatal, AlertDescription::DecodeError);
                            return Err(TlsError::Decode);
                        }
                        if self.io_in.hslen == 0 {
                            // Extensions are optional.
                            break HsStep::Done;
                        }
                        let hs = self.hs.as_deref_mut().ok_or(TlsError::Internal)?;
                        hs.ch_state = ClientHelloState::ExtLen;
                        self.io_in.rlen = 0;
                    }
                }

                ClientHelloState::ExtLen => {
                    if avail == 0 {
                        break HsStep::Postpone;
                    }
                    let hs = self.hs.as_deref_mut().ok_or(TlsError::Internal)?;
                    if self.io_in.rlen == 1 {
                        hs.ext_rem_sz += buf[pos] as usize;
                        pos += 1;
                    } else if avail == 1 {
                        hs.ext_rem_sz = (buf[pos] as usize) << 8;
                        pos += 1;
                        self.io_in.rlen = 1;
                        break HsStep::Postpone;
                    } else {
                        hs.ext_rem_sz = ((buf[pos] as usize) << 8) + buf[pos + 1] as usize;
                        pos += 2;
                    }
                    let n = hs.ext_rem_sz;
                    consume_hslen(&mut self.io_in, sink, 2)?;
                    if self.io_in.hslen != n || (n > 0 && n < 4) {
                        log::debug!("ClientHello: bad extensions length {}", n);
                        send_alert(sink, AlertLevel::Fatal, AlertDescription::DecodeError);
                        return Err(TlsError::Decode);
                    }
                    if n == 0 {
                        break HsStep::Done;
                    }
                    let hs = self.hs.as_deref_mut().ok_or(TlsError::Internal)?;
                    hs.ch_state = ClientHelloState::ExtType;
                    self.io_in.rlen = 0;
                }

                ClientHelloState::ExtType => {
                    if avail == 0 {
                        break HsStep::Postpone;
                    }
                    let hs = self.hs.as_deref_mut().ok_or(TlsError::Internal)?;
                    if self.io_in.rlen == 1 {
                        hs.ext_type |= buf[pos] as u16;
                        pos += 1;
                    } else if avail == 1 {
                        hs.ext_type = (buf[pos] as u16) << 8;
                        pos += 1;
                        self.io_in.rlen = 1;
                        break HsStep::Postpone;
                    } else {
                        hs.ext_type = ((buf[pos] as u16) << 8) | buf[pos + 1] as u16;
                        pos += 2;
                    }
                    consume_hslen(&mut self.io_in, sink, 2)?;
                    let hs = self.hs.as_deref_mut().ok_or(TlsError::Internal)?;
                    hs.ch_state = ClientHelloState::ExtSize;
                    self.io_in.rlen = 0;
                }

                ClientHelloState::ExtSize => {
                    if avail == 0 {
                        break HsStep::Postpone;
                    }
                    let hs = self.hs.as_deref_mut().ok_or(TlsError::Internal)?;
                    if self.io_in.rlen == 1 {
                        hs.ext_sz += buf[pos] as usize;
                        pos += 1;
                    } else if avail == 1 {
                        hs.ext_sz = (buf[pos] as usize) << 8;
                        pos += 1;
                        self.io_in.rlen = 1;
                        break HsStep::Postpone;
                    } else {
                        hs.ext_sz = ((buf[pos] as usize) << 8) + buf[pos + 1] as usize;
                        pos += 2;
                    }
                    consume_hslen(&mut self.io_in, sink, 2)?;
                    let hs = self.hs.as_deref_mut().ok_or(TlsError::Internal)?;
                    let n = hs.ext_sz;
                    if n + 4 > hs.ext_rem_sz || n > HS_RBUF_SZ {
                        log::debug!(
                            "ClientHello: bad extension size {} (remaining {})",
                            n,
                            hs.ext_rem_sz
                        );
                        send_alert(sink, AlertLevel::Fatal, AlertDescription::DecodeError);
                        return Err(TlsError::Decode);
                    }
                    hs.rbuf.clear();
                    hs.ch_state = ClientHelloState::ExtBody;
                    self.io_in.rlen = 0;
                }

                ClientHelloState::ExtBody => {
                    // The body is copied out because the handlers hand
                    // contiguous buffers to callbacks; extensions are
                    // small, the copy is bounded by HS_RBUF_SZ.
                    let hs = self.hs.as_deref_mut().ok_or(TlsError::Internal)?;
                    let need = hs.ext_sz;
                    let n = (need - hs.rbuf.len()).min(avail);
                    hs.rbuf.extend_from_slice(&buf[pos..pos + n]);
                    pos += n;
                    consume_hslen(&mut self.io_in, sink, n)?;
                    let hs = self.hs.as_deref_mut().ok_or(TlsError::Internal)?;
                    if hs.rbuf.len() < need {
                        break HsStep::Postpone;
                    }

                    let ext_type = hs.ext_type;
                    let ext_sz = hs.ext_sz;
                    let body = core::mem::take(&mut hs.rbuf);
                    self.dispatch_extension(ext_type, &body, sink)?;
                    let hs = self.hs.as_deref_mut().ok_or(TlsError::Internal)?;
                    hs.rbuf = body;
                    hs.rbuf.clear();
                    hs.ext_type = 0;
                    hs.ext_sz = 0;

                    hs.ext_rem_sz -= 4 + ext_sz;
                    if hs.ext_rem_sz > 0 && hs.ext_rem_sz < 4 {
                        log::debug!("ClientHello: bad extensions list");
                        send_alert(sink, AlertLevel::Fatal, AlertDescription::DecodeError);
                        return Err(TlsError::Decode);
                    }
                    if hs.ext_rem_sz > 0 {
                        hs.ch_state = ClientHelloState::ExtType;
                        self.io_in.rlen = 0;
                    } else {
                        break HsStep::Done;
                    }
                }
            }
        };

        // Feed everything consumed by this call to the transcript, header
        // bytes first on the chunk that carried them.
        self.update_checksum(hdr);
        self.update_checksum(&buf[..pos]);

        if status == HsStep::Postpone {
            return Ok(HsStep::Postpone);
        }

        self.finish_client_hello(sink)?;
        Ok(HsStep::Done)
    }

    /// Final checks and setup once the message is fully parsed: bind a
    /// virtual host, settle the signature hashes, pick the suite and
    /// initialise the key-exchange context.
    fn finish_client_hello(&mut self, sink: &mut dyn RecordSink) -> Result<()> {
        if self.peer_conf.is_none() {
            let fallback = self.conf.sni.and_then(|s| s.resolve(None));
            match fallback {
                Some(idx) if self.conf.vhost(idx).is_some() => self.peer_conf = Some(idx),
                _ => {
                    log::warn!("no virtual host configured for the connection");
                    return Err(TlsError::UnrecognizedName);
                }
            }
        }

        self.match_sig_hashes()?;
        self.choose_ciphersuite(sink)?;

        let suite = self.suite.ok_or(TlsError::Internal)?;
        let kx = match suite.kx {
            KeyExchangeType::EcdheEcdsa | KeyExchangeType::EcdheRsa => {
                KxContext::Ecdh(self.conf.crypto.new_ecdh())
            }
            KeyExchangeType::DheRsa => KxContext::Dhm(crate::dhm::DhmContext::new()),
            KeyExchangeType::Rsa => KxContext::Rsa,
        };
        self.hs_mut()?.kx = kx;
        Ok(())
    }

    /// Give signature kinds the peer never constrained a server-side
    /// default, so suite selection has a hash to sign with.
    fn match_sig_hashes(&mut self) -> Result<()> {
        let default = self
            .conf
            .hash_prefs
            .first()
            .copied()
            .unwrap_or(HashAlg::Sha256);
        let hs = self.hs_mut()?;
        if !hs.sig_algs_seen {
            hs.hash_algs.fill_defaults(default);
        }
        Ok(())
    }

    fn dispatch_extension(
        &mut self,
        ext_type: u16,
        body: &[u8],
        sink: &mut dyn RecordSink,
    ) -> Result<()> {
        match ext_type {
            EXT_SERVERNAME => self.parse_servername_ext(body, sink),
            EXT_SIG_ALGS => self.parse_signature_algorithms_ext(body, sink),
            EXT_SUPPORTED_GROUPS => self.parse_supported_groups_ext(body, sink),
            EXT_POINT_FORMATS => self.parse_point_formats_ext(body, sink),
            EXT_EXTENDED_MS => self.parse_extended_ms_ext(body, sink),
            EXT_SESSION_TICKET => self.parse_session_ticket_ext(body, sink),
            EXT_ALPN => self.parse_alpn_ext(body, sink),
            EXT_RENEGOTIATION_INFO => self.parse_renegotiation_info_ext(body, sink),
            other => {
                log::debug!("ignoring unknown extension {}", other);
                Ok(())
            }
        }
    }
}
