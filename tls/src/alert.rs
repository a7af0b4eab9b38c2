//! TLS alert messages.

use crate::io::{RecordSink, SgTable};
use crate::{Result, MSG_ALERT};

/// Alert severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum AlertLevel {
    Warning = 1,
    Fatal = 2,
}

/// Alert descriptions emitted by the handshake layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum AlertDescription {
    CloseNotify = 0,
    BadRecordMac = 20,
    HandshakeFailure = 40,
    BadCertificate = 42,
    IllegalParameter = 47,
    DecodeError = 50,
    DecryptError = 51,
    ProtocolVersion = 70,
    InternalError = 80,
    InappropriateFallback = 86,
    UnrecognizedName = 112,
    NoApplicationProtocol = 120,
}

/// Stage and flush one fatal alert record before tear-down. Failures to
/// transmit are ignored; the connection is closing either way.
pub fn send_alert(sink: &mut dyn RecordSink, level: AlertLevel, desc: AlertDescription) {
    if send_alert_checked(sink, level, desc).is_err() {
        log::debug!("alert {:?} could not be flushed", desc);
    }
}

fn send_alert_checked(
    sink: &mut dyn RecordSink,
    level: AlertLevel,
    desc: AlertDescription,
) -> Result<()> {
    let mut sgt = SgTable::with_capacity(2);
    let start = sgt.begin();
    sgt.put_u8(level as u8);
    sgt.put_u8(desc as u8);
    sgt.push_frag(start, MSG_ALERT)?;
    sink.append_record(&sgt, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec::Vec;

    struct CaptureSink(Vec<(u8, Vec<u8>)>);

    impl RecordSink for CaptureSink {
        fn append_record(&mut self, sgt: &SgTable, _last: bool) -> Result<()> {
            for ent in sgt.entries() {
                self.0.push((ent.ctype, sgt.frag_bytes(ent).to_vec()));
            }
            Ok(())
        }
    }

    #[test]
    fn alert_wire_form() {
        let mut sink = CaptureSink(Vec::new());
        send_alert(
            &mut sink,
            AlertLevel::Fatal,
            AlertDescription::InappropriateFallback,
        );
        assert_eq!(sink.0.len(), 1);
        let (ctype, bytes) = &sink.0[0];
        assert_eq!(*ctype, MSG_ALERT);
        assert_eq!(bytes.as_slice(), &[2, 86]);
    }
}
