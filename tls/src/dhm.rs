//! Ephemeral finite-field Diffie-Hellman over the MPI engine.

use core::cmp::Ordering;

use edgetls_bignum::exp::exp_mod;
use edgetls_bignum::{Mpi, WindowPool};

use crate::crypto::Rng;
use crate::{Result, TlsError};

/// DHE context: configured group, our ephemeral pair, the peer public
/// value and the shared secret. `rr` caches the Montgomery constant for
/// the modulus across the two exponentiations of a handshake.
#[derive(Debug, Default)]
pub struct DhmContext {
    p: Mpi,
    g: Mpi,
    x: Mpi,
    gx: Mpi,
    gy: Mpi,
    k: Mpi,
    rr: Mpi,
    len: usize,
}

impl DhmContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Modulus size in bytes.
    pub fn modulus_len(&self) -> usize {
        self.len
    }

    /// Install the configured (P, G) group. P must be odd.
    pub fn set_group(&mut self, p: &[u8], g: &[u8]) -> Result<()> {
        self.p.read_binary(p)?;
        self.g.read_binary(g)?;
        if self.p.get_bit(0) == 0 || self.p.cmp_int(2) != Ordering::Greater {
            return Err(TlsError::BadInput);
        }
        if self.g.cmp_int(1) != Ordering::Greater || self.g.cmp_mpi(&self.p) != Ordering::Less {
            return Err(TlsError::BadInput);
        }
        self.len = self.p.byte_len();
        Ok(())
    }

    /// Generate the ephemeral secret and write `ServerDHParams`
    /// (dh_p, dh_g, dh_Ys, each with a 16-bit length prefix). Returns the
    /// number of bytes written.
    pub fn make_params(
        &mut self,
        rng: &dyn Rng,
        out: &mut [u8],
        pool: &mut WindowPool,
    ) -> Result<usize> {
        if self.len == 0 {
            return Err(TlsError::BadInput);
        }

        self.x.fill_random(self.len, rng)?;
        while self.x.cmp_mpi(&self.p) != Ordering::Less {
            self.x.shift_r(1)?;
        }
        if self.x.cmp_int(2) == Ordering::Less {
            self.x.set_int(2)?;
        }

        exp_mod(&mut self.gx, &self.g, &self.x, &self.p, &mut self.rr, pool)?;

        let plen = self.len;
        let glen = self.g.byte_len().max(1);
        let total = 6 + plen + glen + plen;
        if out.len() < total {
            return Err(TlsError::Capacity);
        }

        let mut off = 0;
        for (len, v) in [(plen, &self.p), (glen, &self.g), (plen, &self.gx)] {
            out[off] = (len >> 8) as u8;
            out[off + 1] = len as u8;
            v.write_binary(&mut out[off + 2..off + 2 + len])?;
            off += 2 + len;
        }
        Ok(off)
    }

    /// Read the peer's public value G^Y.
    pub fn read_public(&mut self, buf: &[u8]) -> Result<()> {
        if buf.is_empty() || buf.len() > self.len {
            return Err(TlsError::Decode);
        }
        self.gy.read_binary(buf)?;
        self.check_public()
    }

    fn check_public(&self) -> Result<()> {
        // Require 2 <= G^Y <= P - 2.
        let mut p1 = Mpi::new();
        p1.sub_int(&self.p, 1)?;
        if self.gy.cmp_int(2) == Ordering::Less || self.gy.cmp_mpi(&p1) != Ordering::Less {
            return Err(TlsError::BadInput);
        }
        Ok(())
    }

    /// Shared secret `(G^Y)^X mod P` into `out`; returns its size.
    pub fn calc_secret(&mut self, out: &mut [u8], pool: &mut WindowPool) -> Result<usize> {
        self.check_public()?;
        exp_mod(&mut self.k, &self.gy, &self.x, &self.p, &mut self.rr, pool)?;

        // A secret in the trivial subgroup means a malicious public value.
        if self.k.cmp_int(1) != Ordering::Greater {
            return Err(TlsError::BadInput);
        }

        let n = self.k.byte_len();
        if out.len() < n {
            return Err(TlsError::Capacity);
        }
        self.k.write_binary(&mut out[..n])?;
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::cell::Cell;

    struct TestRng(Cell<u64>);

    impl Rng for TestRng {
        fn fill(&self, buf: &mut [u8]) {
            let mut x = self.0.get();
            for b in buf.iter_mut() {
                x ^= x << 13;
                x ^= x >> 7;
                x ^= x << 17;
                *b = x as u8;
            }
            self.0.set(x);
        }
    }

    // RFC 3526 group 14 would be the production choice; a small odd
    // modulus keeps the test fast (agreement does not need primality).
    const P: [u8; 9] = [0x01, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0x13];
    const G: [u8; 1] = [2];

    #[test]
    fn group_validation() {
        let mut ctx = DhmContext::new();
        assert!(ctx.set_group(&[0x04], &G).is_err()); // even modulus
        assert!(ctx.set_group(&P, &[0x01]).is_err()); // trivial generator
        ctx.set_group(&P, &G).unwrap();
        assert_eq!(ctx.modulus_len(), 9);
    }

    #[test]
    fn exchange_agrees() {
        let rng = TestRng(Cell::new(0x1357_9bdf_2468_ace0));
        let mut pool = WindowPool::new();

        let mut server = DhmContext::new();
        server.set_group(&P, &G).unwrap();
        let mut params = [0u8; 64];
        let n = server.make_params(&rng, &mut params, &mut pool).unwrap();
        assert!(n > 6);

        // Act as the peer with a second context over the same group.
        let mut client = DhmContext::new();
        client.set_group(&P, &G).unwrap();
        let mut cparams = [0u8; 64];
        client.make_params(&rng, &mut cparams, &mut pool).unwrap();

        // Exchange publics: server's G^X is the last field of params.
        let plen = ((params[0] as usize) << 8) | params[1] as usize;
        let glen_off = 2 + plen;
        let glen = ((params[glen_off] as usize) << 8) | params[glen_off + 1] as usize;
        let gx_off = glen_off + 2 + glen;
        let gx_len = ((params[gx_off] as usize) << 8) | params[gx_off + 1] as usize;
        let server_pub = &params[gx_off + 2..gx_off + 2 + gx_len];

        let cplen = ((cparams[0] as usize) << 8) | cparams[1] as usize;
        let cglen_off = 2 + cplen;
        let cglen = ((cparams[cglen_off] as usize) << 8) | cparams[cglen_off + 1] as usize;
        let cgx_off = cglen_off + 2 + cglen;
        let cgx_len = ((cparams[cgx_off] as usize) << 8) | cparams[cgx_off + 1] as usize;
        let client_pub = &cparams[cgx_off + 2..cgx_off + 2 + cgx_len];

        server.read_public(client_pub).unwrap();
        client.read_public(server_pub).unwrap();

        let mut k1 = [0u8; 16];
        let mut k2 = [0u8; 16];
        let n1 = server.calc_secret(&mut k1, &mut pool).unwrap();
        let n2 = client.calc_secret(&mut k2, &mut pool).unwrap();
        assert_eq!(&k1[..n1], &k2[..n2]);
        assert!(n1 > 0);
    }

    #[test]
    fn trivial_publics_are_rejected() {
        let mut ctx = DhmContext::new();
        ctx.set_group(&P, &G).unwrap();
        assert!(ctx.read_public(&[0x01]).is_err());
        assert!(ctx.read_public(&[0x00]).is_err());
    }
}
