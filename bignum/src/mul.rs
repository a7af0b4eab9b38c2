//! Schoolbook multiplication over limb vectors.

use crate::{Limb, Mpi, Result};

/// Multiply-add-accumulate kernel: `d += s * b`.
///
/// The contract matches a platform multiply-add unit: one
/// (limb x scalar) + carry per step, with the final carry chain rippled
/// past `s`'s extent into the tail of `d`. The caller must size `d` so the
/// carry cannot run off its end. Implementations may swap in wide-multiply
/// intrinsics as long as the carry semantics stay exact.
pub(crate) fn mla(d: &mut [Limb], s: &[Limb], b: Limb) {
    let mut carry: Limb = 0;
    for i in 0..s.len() {
        let wide = (s[i] as u128) * (b as u128) + (carry as u128) + (d[i] as u128);
        d[i] = wide as Limb;
        carry = (wide >> 64) as Limb;
    }
    let mut i = s.len();
    while carry != 0 {
        let (v, over) = d[i].overflowing_add(carry);
        d[i] = v;
        carry = over as Limb;
        i += 1;
    }
}

impl Mpi {
    /// Baseline multiplication: `self = a * b`. The sign of the product is
    /// the product of the operand signs; a zero product is positive.
    pub fn mul_mpi(&mut self, a: &Mpi, b: &Mpi) -> Result<()> {
        let i = a.used.max(1);
        let j = b.used.max(1);
        self.grow(i + j)?;
        for l in self.limbs.iter_mut() {
            *l = 0;
        }
        self.used = i + j;
        for jj in 0..b.used {
            mla(&mut self.limbs[jj..i + j], &a.limbs[..a.used], b.limbs[jj]);
        }
        self.sign = a.sign * b.sign;
        self.fixup_used(i + j);
        if self.is_zero() {
            self.sign = 1;
        }
        Ok(())
    }

    /// In-place multiplication: `self *= b`, via an internal copy.
    pub fn mul_mpi_assign(&mut self, b: &Mpi) -> Result<()> {
        let a = self.clone();
        self.mul_mpi(&a, b)
    }

    /// Scalar multiplication: `self = a * b`.
    pub fn mul_uint(&mut self, a: &Mpi, b: Limb) -> Result<()> {
        self.copy_from(a)?;
        self.mul_uint_assign(b)
    }

    /// In-place scalar multiplication: `self *= b`.
    pub fn mul_uint_assign(&mut self, b: Limb) -> Result<()> {
        if self.is_zero() {
            return Ok(());
        }
        let mut carry: u128 = 0;
        for i in 0..self.used {
            let wide = (self.limbs[i] as u128) * (b as u128) + carry;
            self.limbs[i] = wide as Limb;
            carry = wide >> 64;
        }
        if carry != 0 {
            self.grow(self.used + 1)?;
            self.limbs[self.used] = carry as Limb;
            self.used += 1;
        }
        self.fixup_used(self.used);
        if self.is_zero() {
            self.sign = 1;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::cmp::Ordering;

    #[test]
    fn small_products() {
        let a = Mpi::from_int(1_000_003);
        let b = Mpi::from_int(999_983);
        let mut r = Mpi::new();
        r.mul_mpi(&a, &b).unwrap();
        assert_eq!(r.cmp_int(1_000_003i64 * 999_983), Ordering::Equal);
    }

    #[test]
    fn sign_rules() {
        let a = Mpi::from_int(-3);
        let b = Mpi::from_int(5);
        let mut r = Mpi::new();
        r.mul_mpi(&a, &b).unwrap();
        assert_eq!(r.cmp_int(-15), Ordering::Equal);
        r.mul_mpi(&a, &a).unwrap();
        assert_eq!(r.cmp_int(9), Ordering::Equal);

        let z = Mpi::new();
        r.mul_mpi(&a, &z).unwrap();
        assert!(r.is_zero());
        assert_eq!(r.sign(), 1);
    }

    #[test]
    fn cross_limb_carry() {
        // (2^64 - 1)^2 = 2^128 - 2^65 + 1
        let a = Mpi::from_limb(Limb::MAX);
        let mut r = Mpi::new();
        r.mul_mpi(&a, &a).unwrap();
        assert_eq!(r.bitlen(), 128);
        assert_eq!(r.get_bit(0), 1);
        assert_eq!(r.get_bit(64), 0);
        assert_eq!(r.get_bit(65), 1);
        assert_eq!(r.get_bit(127), 1);
    }

    #[test]
    fn mul_assign_matches() {
        let a = Mpi::from_binary(&[0x12, 0x34, 0x56, 0x78, 0x9a, 0xbc, 0xde, 0xf0, 0x42]).unwrap();
        let b = Mpi::from_binary(&[0xfe, 0xdc, 0xba]).unwrap();
        let mut r1 = Mpi::new();
        r1.mul_mpi(&a, &b).unwrap();
        let mut r2 = a.clone();
        r2.mul_mpi_assign(&b).unwrap();
        assert_eq!(r1.cmp_mpi(&r2), Ordering::Equal);

        let mut r3 = Mpi::new();
        r3.mul_uint(&a, 0xfedcba).unwrap();
        assert_eq!(r1.cmp_mpi(&r3), Ordering::Equal);
    }
}
