//! Constant-time conditional primitives.
//!
//! Both routines run with a limb count and branch pattern independent of
//! the condition flag; only the respective sizes of the operands may leak.
//! Callers arrange the sizes of secret-dependent operands beforehand.

use crate::{Limb, Mpi, Result};

/// Normalise an arbitrary flag byte to exactly 0 or 1 without branching.
#[inline]
fn norm_flag(flag: u8) -> Limb {
    ((flag | flag.wrapping_neg()) >> 7) as Limb
}

/// Conditional assignment `x = y` when `flag` is non-zero, executed with a
/// uniform access pattern.
pub fn safe_cond_assign(x: &mut Mpi, y: &Mpi, flag: u8) -> Result<()> {
    let f = norm_flag(flag);
    let nf = 1 - f;

    x.grow(y.used.max(1))?;

    x.sign = x.sign * nf as i32 + y.sign * f as i32;
    x.used = x.used * nf as usize + y.used * f as usize;
    for i in 0..y.used {
        x.limbs[i] = x.limbs[i]
            .wrapping_mul(nf)
            .wrapping_add(y.limbs[i].wrapping_mul(f));
    }

    Ok(())
}

/// Conditional swap of `x` and `y` when `flag` is non-zero, executed with a
/// uniform access pattern. Pointer swaps are not an option here: they would
/// change later access patterns.
pub fn safe_cond_swap(x: &mut Mpi, y: &mut Mpi, flag: u8) -> Result<()> {
    let f = norm_flag(flag);
    let nf = 1 - f;

    x.grow(y.used.max(1))?;
    y.grow(x.used.max(1))?;

    let s = x.sign;
    x.sign = x.sign * nf as i32 + y.sign * f as i32;
    y.sign = y.sign * nf as i32 + s * f as i32;

    let ux = x.used;
    x.used = ux * nf as usize + y.used * f as usize;
    y.used = y.used * nf as usize + ux * f as usize;

    let span = x.used.max(y.used).max(ux);
    for i in 0..span {
        let tmp = x.limbs[i];
        x.limbs[i] = tmp
            .wrapping_mul(nf)
            .wrapping_add(y.limbs[i].wrapping_mul(f));
        y.limbs[i] = y.limbs[i]
            .wrapping_mul(nf)
            .wrapping_add(tmp.wrapping_mul(f));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::cmp::Ordering;

    #[test]
    fn assign_respects_flag() {
        let y = Mpi::from_binary(&[0xde, 0xad, 0xbe, 0xef, 0x01, 0x02, 0x03, 0x04, 0x05]).unwrap();

        let mut x = Mpi::from_int(-7);
        safe_cond_assign(&mut x, &y, 0).unwrap();
        assert_eq!(x.cmp_int(-7), Ordering::Equal);

        safe_cond_assign(&mut x, &y, 1).unwrap();
        assert_eq!(x.cmp_mpi(&y), Ordering::Equal);
    }

    #[test]
    fn flag_is_normalised() {
        let y = Mpi::from_limb(99);
        let mut x = Mpi::from_limb(1);
        // Any non-zero byte means "assign".
        safe_cond_assign(&mut x, &y, 0x80).unwrap();
        assert_eq!(x.cmp_mpi(&y), Ordering::Equal);
    }

    #[test]
    fn swap_respects_flag() {
        let a = Mpi::from_binary(&[0x11; 20]).unwrap();
        let b = Mpi::from_int(-42);

        let mut x = a.clone();
        let mut y = b.clone();
        safe_cond_swap(&mut x, &mut y, 0).unwrap();
        assert_eq!(x.cmp_mpi(&a), Ordering::Equal);
        assert_eq!(y.cmp_mpi(&b), Ordering::Equal);

        safe_cond_swap(&mut x, &mut y, 1).unwrap();
        assert_eq!(x.cmp_mpi(&b), Ordering::Equal);
        assert_eq!(y.cmp_mpi(&a), Ordering::Equal);
    }
}
