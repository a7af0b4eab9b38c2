//! Greatest common divisor and modular inverse.

use core::cmp::Ordering;

use crate::div::mod_mpi;
use crate::{Mpi, MpiError, Result};

/// Binary GCD: `g = gcd(a, b)` (HAC 14.54). Signs are ignored.
pub fn gcd(g: &mut Mpi, a: &Mpi, b: &Mpi) -> Result<()> {
    let mut ta = Mpi::new();
    let mut tb = Mpi::new();
    ta.copy_from(a)?;
    tb.copy_from(b)?;

    let lz = a.lsb().min(b.lsb());
    ta.shift_r(lz)?;
    tb.shift_r(lz)?;
    ta.sign = 1;
    tb.sign = 1;

    while !ta.is_zero() {
        let s = ta.lsb();
        ta.shift_r(s)?;
        let s = tb.lsb();
        tb.shift_r(s)?;

        if ta.cmp_mpi(&tb) != Ordering::Less {
            ta.sub_abs_assign(&tb)?;
            ta.shift_r(1)?;
        } else {
            tb.sub_abs_assign(&ta)?;
            tb.shift_r(1)?;
        }
    }

    tb.shift_l(lz)?;
    g.copy_from(&tb)
}

/// Modular inverse: `x = a^-1 mod n` (HAC 14.61 / 14.64). Fails when the
/// modulus is not greater than one or when `gcd(a, n) != 1`.
pub fn inv_mod(x: &mut Mpi, a: &Mpi, n: &Mpi) -> Result<()> {
    if n.cmp_int(1) != Ordering::Greater {
        return Err(MpiError::BadInput);
    }

    let mut g = Mpi::new();
    gcd(&mut g, a, n)?;
    if g.cmp_int(1) != Ordering::Equal {
        return Err(MpiError::BadInput);
    }

    let mut ta = Mpi::new();
    mod_mpi(&mut ta, a, n)?;
    let mut tu = Mpi::new();
    tu.copy_from(&ta)?;
    let mut tb = Mpi::new();
    tb.copy_from(n)?;
    let mut tv = Mpi::new();
    tv.copy_from(n)?;

    let mut u1 = Mpi::from_limb(1);
    let mut u2 = Mpi::from_limb(0);
    let mut v1 = Mpi::from_limb(0);
    let mut v2 = Mpi::from_limb(1);

    loop {
        while tu.get_bit(0) == 0 {
            tu.shift_r(1)?;
            if u1.get_bit(0) == 1 || u2.get_bit(0) == 1 {
                u1.add_mpi_assign(&tb)?;
                u2.sub_mpi_assign(&ta)?;
            }
            u1.shift_r(1)?;
            u2.shift_r(1)?;
        }

        while tv.get_bit(0) == 0 {
            tv.shift_r(1)?;
            if v1.get_bit(0) == 1 || v2.get_bit(0) == 1 {
                v1.add_mpi_assign(&tb)?;
                v2.sub_mpi_assign(&ta)?;
            }
            v1.shift_r(1)?;
            v2.shift_r(1)?;
        }

        if tu.cmp_mpi(&tv) != Ordering::Less {
            tu.sub_mpi_assign(&tv)?;
            u1.sub_mpi_assign(&v1)?;
            u2.sub_mpi_assign(&v2)?;
        } else {
            tv.sub_mpi_assign(&tu)?;
            v1.sub_mpi_assign(&u1)?;
            v2.sub_mpi_assign(&u2)?;
        }

        if tu.is_zero() {
            break;
        }
    }

    while v1.cmp_int(0) == Ordering::Less {
        v1.add_mpi_assign(n)?;
    }
    while v1.cmp_mpi(n) != Ordering::Less {
        v1.sub_mpi_assign(n)?;
    }

    x.copy_from(&v1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{rand_mpi, XorShift};

    #[test]
    fn small_gcds() {
        let mut g = Mpi::new();
        gcd(&mut g, &Mpi::from_limb(12), &Mpi::from_limb(18)).unwrap();
        assert_eq!(g.cmp_int(6), Ordering::Equal);

        gcd(&mut g, &Mpi::from_limb(17), &Mpi::from_limb(31)).unwrap();
        assert_eq!(g.cmp_int(1), Ordering::Equal);

        gcd(&mut g, &Mpi::new(), &Mpi::from_limb(42)).unwrap();
        assert_eq!(g.cmp_int(42), Ordering::Equal);
    }

    #[test]
    fn gcd_divides_both_operands() {
        let mut rng = XorShift::new(0x0123_4567_89ab_cdef);
        for _ in 0..20 {
            let a = rand_mpi(&mut rng, 2);
            let b = rand_mpi(&mut rng, 3);
            if a.is_zero() || b.is_zero() {
                continue;
            }
            let mut g = Mpi::new();
            gcd(&mut g, &a, &b).unwrap();

            let mut r = Mpi::new();
            mod_mpi(&mut r, &a, &g).unwrap();
            assert!(r.is_zero());
            mod_mpi(&mut r, &b, &g).unwrap();
            assert!(r.is_zero());
        }
    }

    #[test]
    fn inverse_times_value_is_one() {
        let n = Mpi::from_limb(0xffff_ffff_ffff_ffc5); // prime
        let mut rng = XorShift::new(0xc0ff_ee00_1234_5678);
        for _ in 0..20 {
            let a = rand_mpi(&mut rng, 2);
            if a.is_zero() {
                continue;
            }
            let mut inv = Mpi::new();
            if inv_mod(&mut inv, &a, &n).is_err() {
                continue; // gcd != 1
            }
            let mut prod = Mpi::new();
            prod.mul_mpi(&a, &inv).unwrap();
            let mut r = Mpi::new();
            mod_mpi(&mut r, &prod, &n).unwrap();
            assert_eq!(r.cmp_int(1), Ordering::Equal);
        }
    }

    #[test]
    fn non_coprime_is_rejected() {
        let mut inv = Mpi::new();
        assert_eq!(
            inv_mod(&mut inv, &Mpi::from_limb(6), &Mpi::from_limb(9)),
            Err(MpiError::BadInput)
        );
        assert_eq!(
            inv_mod(&mut inv, &Mpi::from_limb(3), &Mpi::from_limb(1)),
            Err(MpiError::BadInput)
        );
    }
}
