//! Batched handshake output and incoming-message bookkeeping.
//!
//! Outgoing flights are assembled into one page: every handshake message
//! is appended in place and referenced by one scatter-gather entry, then
//! the whole table is handed to the record layer as a single send. The
//! record layer owns framing, encryption and the socket write.

use alloc::vec::Vec;

use crate::{Result, TlsError, HS_HDR_LEN, MAX_FRAGS};

/// One scatter-gather entry: a byte range of the output page plus the
/// record content type it must be framed with.
#[derive(Debug, Clone, Copy)]
pub struct SgEntry {
    pub off: usize,
    pub len: usize,
    pub ctype: u8,
}

/// Output page with its scatter-gather list.
#[derive(Debug)]
pub struct SgTable {
    buf: Vec<u8>,
    ents: Vec<SgEntry>,
}

impl SgTable {
    /// Allocate one output page.
    pub fn with_capacity(bytes: usize) -> Self {
        SgTable {
            buf: Vec::with_capacity(bytes),
            ents: Vec::with_capacity(MAX_FRAGS),
        }
    }

    /// Current append offset; the start of the next fragment.
    pub fn begin(&self) -> usize {
        self.buf.len()
    }

    pub fn put_u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    pub fn put_u16(&mut self, v: u16) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }

    pub fn put_u24(&mut self, v: usize) {
        self.buf.push((v >> 16) as u8);
        self.buf.push((v >> 8) as u8);
        self.buf.push(v as u8);
    }

    pub fn put_u32(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }

    pub fn put_slice(&mut self, s: &[u8]) {
        self.buf.extend_from_slice(s);
    }

    /// Append `n` zero bytes and return their offset, for fields whose
    /// value is patched after the body is written.
    pub fn reserve(&mut self, n: usize) -> usize {
        let off = self.buf.len();
        self.buf.resize(off + n, 0);
        off
    }

    pub fn patch_u16(&mut self, off: usize, v: u16) {
        self.buf[off..off + 2].copy_from_slice(&v.to_be_bytes());
    }

    /// Write a handshake message header (type + 24-bit body length) at
    /// `off`, which must have been `reserve`d.
    pub fn patch_hshdr(&mut self, off: usize, hstype: u8, body_len: usize) {
        self.buf[off] = hstype;
        self.buf[off + 1] = (body_len >> 16) as u8;
        self.buf[off + 2] = (body_len >> 8) as u8;
        self.buf[off + 3] = body_len as u8;
    }

    /// Close the fragment started at `start` as one scatter-gather entry.
    pub fn push_frag(&mut self, start: usize, ctype: u8) -> Result<()> {
        if self.ents.len() >= MAX_FRAGS {
            log::warn!("too many fragments in one handshake flight");
            return Err(TlsError::Capacity);
        }
        self.ents.push(SgEntry {
            off: start,
            len: self.buf.len() - start,
            ctype,
        });
        Ok(())
    }

    pub fn entries(&self) -> &[SgEntry] {
        &self.ents
    }

    pub fn frag_bytes(&self, ent: &SgEntry) -> &[u8] {
        &self.buf[ent.off..ent.off + ent.len]
    }

    pub fn bytes(&self) -> &[u8] {
        &self.buf
    }
}

/// Reserved space for one handshake header.
pub const HSHDR_RESERVE: usize = HS_HDR_LEN;

/// Transport capability consumed by the handshake layer: takes a list of
/// already-formatted fragments and is responsible for record framing,
/// encryption and the socket write.
pub trait RecordSink {
    fn append_record(&mut self, sgt: &SgTable, last: bool) -> Result<()>;
}

/// Incoming handshake-message bookkeeping, shared between the record layer
/// (which identifies message boundaries) and the incremental parsers.
#[derive(Debug, Clone, Copy, Default)]
pub struct IoIn {
    /// Record content type of the current message.
    pub msgtype: u8,
    /// Handshake type of the current message.
    pub hstype: u8,
    /// Remaining body bytes of the current message.
    pub hslen: usize,
    /// Bytes of the current wire field consumed by previous chunks.
    pub rlen: usize,
}

impl IoIn {
    pub fn new() -> Self {
        Self::default()
    }

    /// Begin a new incoming handshake message.
    pub fn start_message(&mut self, msgtype: u8, hstype: u8, hslen: usize) {
        self.msgtype = msgtype;
        self.hstype = hstype;
        self.hslen = hslen;
        self.rlen = 0;
    }
}
