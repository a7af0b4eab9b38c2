//! Batched write of the server end block: optional NewSessionTicket,
//! ChangeCipherSpec and Finished, flushed as one scatter-gather send.

use crate::alert::{send_alert, AlertDescription, AlertLevel};
use crate::handshake::{HandshakeState, HsFlags, TlsContext};
use crate::io::{RecordSink, SgTable};
use crate::{
    Result, TlsError, FINISHED_LEN, HS_FINISHED, HS_HDR_LEN, HS_NEW_SESSION_TICKET,
    MAX_TICKET_LEN, MSG_CHANGE_CIPHER_SPEC, MSG_HANDSHAKE,
};

impl<'a> TlsContext<'a> {
    pub(crate) fn write_finished_flight(&mut self, sink: &mut dyn RecordSink) -> Result<()> {
        match self.finished_flight(sink) {
            Ok(()) => Ok(()),
            Err(e) => {
                send_alert(sink, AlertLevel::Fatal, AlertDescription::InternalError);
                Err(e)
            }
        }
    }

    fn finished_flight(&mut self, sink: &mut dyn RecordSink) -> Result<()> {
        let mut sgt = SgTable::with_capacity(1024);

        if self.hs_flags().contains(HsFlags::NEW_SESSION_TICKET) {
            self.write_new_session_ticket(&mut sgt)?;
            // The ticket precedes Finished in the transcript.
            self.checksum_last_frag(&sgt);
        }

        // ChangeCipherSpec: one unencrypted byte, never part of the
        // transcript.
        let start = sgt.begin();
        sgt.put_u8(1);
        sgt.push_frag(start, MSG_CHANGE_CIPHER_SPEC)?;

        let start = sgt.begin();
        let hdr = sgt.reserve(HS_HDR_LEN);
        let mut tag = [0u8; FINISHED_LEN];
        self.hs_ref()?
            .transcript
            .finished_tag(&self.sess.master, b"server finished", &mut tag);
        sgt.put_slice(&tag);
        sgt.patch_hshdr(hdr, HS_FINISHED, FINISHED_LEN);
        sgt.push_frag(start, MSG_HANDSHAKE)?;
        self.checksum_last_frag(&sgt);

        sink.append_record(&sgt, true)?;

        // On resumption the client's ChangeCipherSpec and Finished come
        // after ours.
        self.state = if self.hs_flags().contains(HsFlags::RESUME) {
            HandshakeState::ClientChangeCipherSpec
        } else {
            HandshakeState::HandshakeWrapup
        };
        Ok(())
    }

    fn checksum_last_frag(&mut self, sgt: &SgTable) {
        if let Some(ent) = sgt.entries().last() {
            let bytes = sgt.frag_bytes(ent).to_vec();
            self.update_checksum(&bytes);
        }
    }

    /// NewSessionTicket: lifetime hint plus the opaque ticket body. A
    /// codec failure degrades to an empty ticket rather than failing the
    /// handshake.
    fn write_new_session_ticket(&mut self, sgt: &mut SgTable) -> Result<()> {
        let codec = self.conf.ticket.ok_or(TlsError::Internal)?;

        let start = sgt.begin();
        let hdr = sgt.reserve(HS_HDR_LEN);

        let mut body = [0u8; MAX_TICKET_LEN];
        let (tlen, lifetime) = match codec.write(&self.sess, &mut body) {
            Ok(v) => v,
            Err(e) => {
                log::debug!("cannot write a session ticket: {}", e);
                (0, 0)
            }
        };
        let tlen = tlen.min(MAX_TICKET_LEN);

        sgt.put_u32(lifetime);
        sgt.put_u16(tlen as u16);
        sgt.put_slice(&body[..tlen]);

        sgt.patch_hshdr(hdr, HS_NEW_SESSION_TICKET, 6 + tlen);
        sgt.push_frag(start, MSG_HANDSHAKE)?;

        // This one satisfies the client's request.
        self.hs_mut()?.flags.remove(HsFlags::NEW_SESSION_TICKET);
        Ok(())
    }
}
