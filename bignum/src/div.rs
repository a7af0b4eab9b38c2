//! Long division and modular reduction.

use core::cmp::Ordering;

use crate::{Limb, Mpi, MpiError, Result, LIMB_BITS};

/// Double-limb by single-limb trial divide (Knuth D3): returns
/// `floor((u1*2^64 + u0) / d)`. Overflow (`d == 0` or `u1 >= d`) saturates
/// to the limb maximum.
pub(crate) fn int_div_int(u1: Limb, u0: Limb, d: Limb) -> Limb {
    if d == 0 || u1 >= d {
        return Limb::MAX;
    }
    let num = ((u1 as u128) << 64) | u0 as u128;
    (num / d as u128) as Limb
}

/// Division with remainder: `a = q*b + r` (Knuth Algorithm D). Either
/// output may be omitted. The remainder carries the dividend's sign and
/// its magnitude is already below `|b|` on return.
pub fn div_mpi(q: Option<&mut Mpi>, r: Option<&mut Mpi>, a: &Mpi, b: &Mpi) -> Result<()> {
    if b.is_zero() {
        return Err(MpiError::BadInput);
    }
    if b.cmp_int(1) == Ordering::Equal {
        if let Some(q) = q {
            q.copy_from(a)?;
        }
        if let Some(r) = r {
            r.set_int(0)?;
        }
        return Ok(());
    }
    if a.cmp_abs(b) == Ordering::Less {
        if let Some(q) = q {
            q.set_int(0)?;
        }
        if let Some(r) = r {
            r.copy_from(a)?;
        }
        return Ok(());
    }

    let mut x = Mpi::new();
    let mut y = Mpi::new();
    x.copy_from(a)?;
    y.copy_from(b)?;
    x.sign = 1;
    y.sign = 1;

    let mut qt = Mpi::new();
    qt.grow(a.used + 1)?;
    qt.used = a.used + 1;

    let mut t1 = Mpi::new();
    let mut t2 = Mpi::new();
    t1.grow(3)?;
    t2.grow(3)?;

    // Normalise the divisor so its top limb is large (Knuth D1).
    let k_mod = y.bitlen() % LIMB_BITS;
    let k = if k_mod < LIMB_BITS - 1 {
        LIMB_BITS - 1 - k_mod
    } else {
        0
    };
    if k > 0 {
        x.shift_l(k)?;
        y.shift_l(k)?;
    }

    let n = x.used - 1;
    let t = y.used - 1;

    y.shift_l(LIMB_BITS * (n - t))?;
    while x.cmp_mpi(&y) != Ordering::Less {
        qt.limbs[n - t] += 1;
        x.sub_mpi_assign(&y)?;
    }
    y.shift_r(LIMB_BITS * (n - t))?;

    for i in (t + 1..=n).rev() {
        let xi = x.limb_or_zero(i);
        let xi1 = x.limb_or_zero(i - 1);
        let xi2 = if i >= 2 { x.limb_or_zero(i - 2) } else { 0 };
        let yt = y.limbs[t];

        // Overestimate the quotient digit by one; the trial loop below
        // decrements before its first comparison (Knuth D3).
        let mut qd: Limb = if xi >= yt {
            0
        } else {
            int_div_int(xi, xi1, yt).wrapping_add(1)
        };

        t2.sign = 1;
        t2.limbs[0] = xi2;
        t2.limbs[1] = xi1;
        t2.limbs[2] = xi;
        t2.fixup_used(3);

        loop {
            qd = qd.wrapping_sub(1);
            t1.sign = 1;
            t1.limbs[0] = if t >= 1 { y.limbs[t - 1] } else { 0 };
            t1.limbs[1] = y.limbs[t];
            t1.limbs[2] = 0;
            t1.fixup_used(2);
            t1.mul_uint_assign(qd)?;
            if t1.cmp_mpi(&t2) != Ordering::Greater {
                break;
            }
        }

        t1.mul_uint(&y, qd)?;
        t1.shift_l(LIMB_BITS * (i - t - 1))?;
        x.sub_mpi_assign(&t1)?;

        if x.cmp_int(0) == Ordering::Less {
            t1.copy_from(&y)?;
            t1.shift_l(LIMB_BITS * (i - t - 1))?;
            x.add_mpi_assign(&t1)?;
            qd = qd.wrapping_sub(1);
        }
        qt.limbs[i - t - 1] = qd;
    }

    qt.sign = a.sign * b.sign;
    qt.fixup_used(qt.used);

    if let Some(r) = r {
        x.shift_r(k)?;
        x.sign = a.sign;
        let used = x.used;
        x.fixup_used(used);
        r.copy_from(&x)?;
        if r.is_zero() {
            r.sign = 1;
        }
    }
    if let Some(q) = q {
        q.copy_from(&qt)?;
    }

    Ok(())
}

/// Modulo: `r = a mod b`, normalised into `[0, b)`. The modulus must be
/// positive.
pub fn mod_mpi(r: &mut Mpi, a: &Mpi, b: &Mpi) -> Result<()> {
    if b.cmp_int(0) == Ordering::Less {
        return Err(MpiError::BadInput);
    }
    div_mpi(None, Some(r), a, b)?;
    // The division already leaves |r| < |b|, so one step each way suffices.
    if r.cmp_int(0) == Ordering::Less {
        r.add_mpi_assign(b)?;
    }
    if r.cmp_mpi(b) != Ordering::Less {
        r.sub_mpi_assign(b)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{rand_mpi, XorShift};

    #[test]
    fn div_by_zero_is_rejected() {
        let a = Mpi::from_int(10);
        let z = Mpi::new();
        let mut q = Mpi::new();
        assert_eq!(div_mpi(Some(&mut q), None, &a, &z), Err(MpiError::BadInput));
    }

    #[test]
    fn negative_modulus_is_rejected() {
        let a = Mpi::from_int(10);
        let b = Mpi::from_int(-3);
        let mut r = Mpi::new();
        assert_eq!(mod_mpi(&mut r, &a, &b), Err(MpiError::BadInput));
    }

    #[test]
    fn small_known_quotients() {
        let a = Mpi::from_int(1000);
        let b = Mpi::from_int(7);
        let mut q = Mpi::new();
        let mut r = Mpi::new();
        div_mpi(Some(&mut q), Some(&mut r), &a, &b).unwrap();
        assert_eq!(q.cmp_int(142), Ordering::Equal);
        assert_eq!(r.cmp_int(6), Ordering::Equal);

        // Negative dividend: remainder keeps the dividend sign.
        let an = Mpi::from_int(-1000);
        div_mpi(Some(&mut q), Some(&mut r), &an, &b).unwrap();
        assert_eq!(q.cmp_int(-142), Ordering::Equal);
        assert_eq!(r.cmp_int(-6), Ordering::Equal);

        // ... and mod normalises it into [0, b).
        mod_mpi(&mut r, &an, &b).unwrap();
        assert_eq!(r.cmp_int(1), Ordering::Equal);
    }

    #[test]
    fn mul_then_div_roundtrip() {
        let mut rng = XorShift::new(0x1234_5678_9abc_def0);
        for _ in 0..40 {
            let a_size = 1 + (rng.next() % 6) as usize;
            let a = rand_mpi(&mut rng, a_size);
            let b_size = 1 + (rng.next() % 4) as usize;
            let mut b = rand_mpi(&mut rng, b_size);
            if b.is_zero() {
                b = Mpi::from_limb(3);
            }
            let mut p = Mpi::new();
            p.mul_mpi(&a, &b).unwrap();
            let mut q = Mpi::new();
            let mut r = Mpi::new();
            div_mpi(Some(&mut q), Some(&mut r), &p, &b).unwrap();
            assert_eq!(q.cmp_mpi(&a), Ordering::Equal);
            assert!(r.is_zero());
        }
    }

    #[test]
    fn division_identity_holds() {
        let mut rng = XorShift::new(0xdead_beef_cafe_f00d);
        for _ in 0..40 {
            let a_size = 1 + (rng.next() % 6) as usize;
            let a = rand_mpi(&mut rng, a_size);
            let b_size = 1 + (rng.next() % 3) as usize;
            let mut b = rand_mpi(&mut rng, b_size);
            if b.is_zero() {
                b = Mpi::from_limb(5);
            }
            let mut q = Mpi::new();
            let mut r = Mpi::new();
            div_mpi(Some(&mut q), Some(&mut r), &a, &b).unwrap();

            // a == q*b + r and |r| < |b|
            let mut back = Mpi::new();
            back.mul_mpi(&q, &b).unwrap();
            back.add_mpi_assign(&r).unwrap();
            assert_eq!(back.cmp_mpi(&a), Ordering::Equal);
            assert_eq!(r.cmp_abs(&b), Ordering::Less);

            let mut m = Mpi::new();
            mod_mpi(&mut m, &a, &b).unwrap();
            assert_ne!(m.cmp_int(0), Ordering::Less);
            assert_eq!(m.cmp_mpi(&b), Ordering::Less);
        }
    }
}
