//! ClientHello extension handlers.
//!
//! Each handler receives one fully reassembled extension body. Unknown
//! extensions never reach this module; the parser drops them.

use crate::alert::{send_alert, AlertDescription, AlertLevel};
use crate::ciphersuite::{HashAlg, SigAlg};
use crate::handshake::{HsFlags, TlsContext};
use crate::io::RecordSink;
use crate::{Result, TlsError, MAX_CURVES};

use edgetls_bignum::ecp::{curve_info_from_tls_id, PF_COMPRESSED, PF_UNCOMPRESSED};

const SNI_HOSTNAME: u8 = 0;

fn be16(b: &[u8]) -> usize {
    ((b[0] as usize) << 8) | b[1] as usize
}

impl<'a> TlsContext<'a> {
    /// server_name (RFC 6066): bind a virtual host from the first
    /// host_name entry.
    pub(crate) fn parse_servername_ext(
        &mut self,
        buf: &[u8],
        sink: &mut dyn RecordSink,
    ) -> Result<()> {
        if buf.len() < 2 {
            send_alert(sink, AlertLevel::Fatal, AlertDescription::DecodeError);
            return Err(TlsError::Decode);
        }
        let list_size = be16(buf);
        if list_size + 2 != buf.len() {
            log::debug!("ClientHello: bad SNI list size");
            send_alert(sink, AlertLevel::Fatal, AlertDescription::DecodeError);
            return Err(TlsError::Decode);
        }

        let mut rest = &buf[2..];
        let mut remaining = list_size;
        while remaining > 0 {
            if rest.len() < 3 {
                send_alert(sink, AlertLevel::Fatal, AlertDescription::DecodeError);
                return Err(TlsError::Decode);
            }
            let name_type = rest[0];
            let hostname_len = be16(&rest[1..3]);
            if hostname_len + 3 > remaining {
                log::debug!("ClientHello: bad SNI hostname size {}", hostname_len);
                send_alert(sink, AlertLevel::Fatal, AlertDescription::DecodeError);
                return Err(TlsError::Decode);
            }
            if name_type == SNI_HOSTNAME {
                if let Some(resolver) = self.conf.sni {
                    let name = &rest[3..3 + hostname_len];
                    match resolver.resolve(Some(name)) {
                        Some(idx) if self.conf.vhost(idx).is_some() => {
                            self.peer_conf = Some(idx);
                            return Ok(());
                        }
                        _ => {
                            log::warn!("server requested by the client is not known");
                            send_alert(
                                sink,
                                AlertLevel::Fatal,
                                AlertDescription::UnrecognizedName,
                            );
                            return Err(TlsError::UnrecognizedName);
                        }
                    }
                }
            }
            remaining -= hostname_len + 3;
            rest = &rest[3 + hostname_len..];
        }

        Ok(())
    }

    /// signature_algorithms (RFC 5246 7.4.1.4.1): remember the first
    /// acceptable hash per signature kind. Only the ServerKeyExchange
    /// signature is constrained by this; certificate chain signatures are
    /// a later concern.
    pub(crate) fn parse_signature_algorithms_ext(
        &mut self,
        buf: &[u8],
        sink: &mut dyn RecordSink,
    ) -> Result<()> {
        if buf.len() < 2 {
            send_alert(sink, AlertLevel::Fatal, AlertDescription::DecodeError);
            return Err(TlsError::Decode);
        }
        let list_size = be16(buf);
        if list_size + 2 != buf.len() || list_size % 2 != 0 {
            log::debug!("ClientHello: bad signature algorithms extension");
            send_alert(sink, AlertLevel::Fatal, AlertDescription::DecodeError);
            return Err(TlsError::Decode);
        }

        let hs = self.hs.as_deref_mut().ok_or(TlsError::Internal)?;
        hs.sig_algs_seen = true;
        for pair in buf[2..].chunks_exact(2) {
            // Silently ignore unknown hash or signature encodings.
            let sig = match SigAlg::from_wire(pair[1]) {
                Some(s) => s,
                None => {
                    log::debug!("unknown signature algorithm encoding {}", pair[1]);
                    continue;
                }
            };
            let md = match HashAlg::from_wire(pair[0]) {
                Some(m) => m,
                None => {
                    log::debug!("unknown hash algorithm encoding {}", pair[0]);
                    continue;
                }
            };
            hs.hash_algs.add(sig, md);
        }

        Ok(())
    }

    /// supported_groups (RFC 8422): map TLS NamedCurve values to internal
    /// identifiers. A duplicate extension is an error; unknown curves are
    /// skipped; the stored list is clamped.
    pub(crate) fn parse_supported_groups_ext(
        &mut self,
        buf: &[u8],
        sink: &mut dyn RecordSink,
    ) -> Result<()> {
        if buf.len() < 2 {
            send_alert(sink, AlertLevel::Fatal, AlertDescription::DecodeError);
            return Err(TlsError::Decode);
        }
        let list_size = be16(buf);
        if list_size + 2 != buf.len() || list_size % 2 != 0 {
            log::debug!("ClientHello: bad supported groups extension");
            send_alert(sink, AlertLevel::Fatal, AlertDescription::DecodeError);
            return Err(TlsError::Decode);
        }

        let hs = self.hs.as_deref_mut().ok_or(TlsError::Internal)?;
        if hs.flags.contains(HsFlags::CURVES_EXT) {
            log::debug!("ClientHello: duplicate supported groups extension");
            send_alert(sink, AlertLevel::Fatal, AlertDescription::DecodeError);
            return Err(TlsError::Decode);
        }
        hs.flags |= HsFlags::CURVES_EXT;

        for pair in buf[2..].chunks_exact(2) {
            let tls_id = ((pair[0] as u16) << 8) | pair[1] as u16;
            if let Some(info) = curve_info_from_tls_id(tls_id) {
                // Bound what the peer can make us store.
                if hs.curves.len() < MAX_CURVES {
                    log::debug!("negotiated curve {}", info.name);
                    hs.curves.push(info.id);
                }
            }
        }

        Ok(())
    }

    /// ec_point_formats (RFC 8422): select a format we can emit, staying
    /// on uncompressed when nothing matches.
    pub(crate) fn parse_point_formats_ext(
        &mut self,
        buf: &[u8],
        sink: &mut dyn RecordSink,
    ) -> Result<()> {
        if buf.is_empty() || buf[0] as usize + 1 != buf.len() {
            log::debug!("ClientHello: bad point formats extension");
            send_alert(sink, AlertLevel::Fatal, AlertDescription::DecodeError);
            return Err(TlsError::Decode);
        }

        let hs = self.hs.as_deref_mut().ok_or(TlsError::Internal)?;
        hs.flags |= HsFlags::CLI_EXTS;
        for &pf in &buf[1..] {
            if pf == PF_UNCOMPRESSED || pf == PF_COMPRESSED {
                hs.point_format = pf;
                log::debug!("point format selected: {}", pf);
                return Ok(());
            }
        }

        Ok(())
    }

    /// extended_master_secret (RFC 7627): must be empty.
    pub(crate) fn parse_extended_ms_ext(
        &mut self,
        buf: &[u8],
        sink: &mut dyn RecordSink,
    ) -> Result<()> {
        if !buf.is_empty() {
            log::debug!("ClientHello: bad extended master secret extension");
            send_alert(sink, AlertLevel::Fatal, AlertDescription::DecodeError);
            return Err(TlsError::Decode);
        }
        self.hs.as_deref_mut().ok_or(TlsError::Internal)?.flags |= HsFlags::EXTENDED_MS;
        Ok(())
    }

    /// session_ticket (RFC 5077): try restoring the session; any ticket
    /// failure just falls back to a full handshake.
    pub(crate) fn parse_session_ticket_ext(
        &mut self,
        buf: &[u8],
        _sink: &mut dyn RecordSink,
    ) -> Result<()> {
        let codec = match self.conf.ticket {
            Some(c) => c,
            None => return Ok(()),
        };

        // The client asked for a ticket; remember to send one.
        {
            let hs = self.hs.as_deref_mut().ok_or(TlsError::Internal)?;
            hs.flags |= HsFlags::NEW_SESSION_TICKET;
        }
        log::debug!("ClientHello: ticket length {}", buf.len());
        if buf.is_empty() {
            return Ok(());
        }

        let mut session = match codec.parse(buf) {
            Ok(s) => s,
            Err(e) => {
                log::debug!("ClientHello: ticket rejected: {}", e);
                return Ok(());
            }
        };

        // Keep the id the client sent; it must be echoed to signal the
        // ticket was accepted (RFC 5077 3.4).
        session.id = self.sess.id;
        session.id_len = self.sess.id_len;
        self.sess = session;

        log::debug!("ClientHello: session restored from ticket");
        let hs = self.hs.as_deref_mut().ok_or(TlsError::Internal)?;
        hs.flags |= HsFlags::RESUME;
        hs.flags.remove(HsFlags::NEW_SESSION_TICKET);

        Ok(())
    }

    /// application_layer_protocol_negotiation (RFC 7301): the server
    /// applies its own preference order.
    pub(crate) fn parse_alpn_ext(&mut self, buf: &[u8], sink: &mut dyn RecordSink) -> Result<()> {
        if self.conf.alpn.is_empty() {
            log::debug!("ClientHello: ALPN offered but not configured");
            return Ok(());
        }

        // Minimum is 2 (list length) + 1 (name length) + 1 (name).
        if buf.len() < 4 {
            send_alert(sink, AlertLevel::Fatal, AlertDescription::DecodeError);
            return Err(TlsError::Decode);
        }
        let list_len = be16(buf);
        if list_len != buf.len() - 2 {
            send_alert(sink, AlertLevel::Fatal, AlertDescription::DecodeError);
            return Err(TlsError::Decode);
        }

        // Validate all name lengths before matching anything.
        let names = &buf[2..];
        let mut off = 0;
        while off < names.len() {
            let cur = names[off] as usize;
            off += 1;
            if cur > names.len() - off {
                send_alert(sink, AlertLevel::Fatal, AlertDescription::DecodeError);
                return Err(TlsError::Decode);
            }
            if cur == 0 {
                // Empty protocol names are forbidden.
                send_alert(sink, AlertLevel::Fatal, AlertDescription::IllegalParameter);
                return Err(TlsError::IllegalParameter);
            }
            off += cur;
        }

        for (i, ours) in self.conf.alpn.iter().enumerate() {
            let mut off = 0;
            while off < names.len() {
                let cur = names[off] as usize;
                off += 1;
                if &names[off..off + cur] == *ours {
                    log::debug!("ALPN protocol selected");
                    self.alpn_chosen = Some(i);
                    return Ok(());
                }
                off += cur;
            }
        }

        send_alert(
            sink,
            AlertLevel::Fatal,
            AlertDescription::NoApplicationProtocol,
        );
        Err(TlsError::NoApplicationProtocol)
    }

    /// renegotiation_info (RFC 5746 3.6): only the initial-handshake empty
    /// form is valid; it must be acknowledged in ServerHello.
    pub(crate) fn parse_renegotiation_info_ext(
        &mut self,
        buf: &[u8],
        sink: &mut dyn RecordSink,
    ) -> Result<()> {
        if buf.len() != 1 || buf[0] != 0 {
            log::debug!("ClientHello: bad renegotiation_info extension");
            send_alert(sink, AlertLevel::Fatal, AlertDescription::DecodeError);
            return Err(TlsError::Decode);
        }
        self.hs.as_deref_mut().ok_or(TlsError::Internal)?.flags |=
            HsFlags::SECURE_RENEGOTIATION;
        Ok(())
    }
}
