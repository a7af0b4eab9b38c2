//! Sliding-window Montgomery exponentiation.

use core::cmp::Ordering;

use crate::div::mod_mpi;
use crate::mpi::sub_limbs;
use crate::mul::mla;
use crate::pool::WindowPool;
use crate::{Limb, Mpi, MpiError, Result, LIMB_BITS};

/// Fast Montgomery constant: `-N^-1 mod 2^64` by Hensel lifting.
pub(crate) fn montg_init(n: &Mpi) -> Limb {
    let m0 = n.limbs[0];
    let mut x = m0;
    x = x.wrapping_add((m0.wrapping_add(2) & 4) << 1);
    let mut bits = LIMB_BITS;
    while bits >= 8 {
        x = x.wrapping_mul(2u64.wrapping_sub(m0.wrapping_mul(x)));
        bits /= 2;
    }
    x.wrapping_neg()
}

/// One pass of the Montgomery product into the accumulator `t`:
/// after `n.used` iterations `t` holds `a*b*R^-1 mod N` (plus at most one
/// extra `N`) in its top `n.used + 1` limbs. `t` must be sized
/// `2*n.used + 2`.
fn montmul_step(t: &mut Mpi, a: &Mpi, b: &Mpi, n: &Mpi, mm: Limb) {
    let nl = n.used;
    let m = b.used.min(nl);
    for l in t.limbs.iter_mut() {
        *l = 0;
    }
    let b0 = b.limb_or_zero(0);
    let mut d = 0usize;
    for i in 0..nl {
        let u0 = if i < a.used { a.limbs[i] } else { 0 };
        let u1 = t.limbs[d]
            .wrapping_add(u0.wrapping_mul(b0))
            .wrapping_mul(mm);
        mla(&mut t.limbs[d..], &b.limbs[..m], u0);
        mla(&mut t.limbs[d..], &n.limbs[..nl], u1);
        t.limbs[d] = u0;
        d += 1;
        t.limbs[d + nl + 1] = 0;
    }
    let cap = t.limbs.len();
    t.fixup_used(cap);
}

/// Copy the accumulator window back into `a` and reduce by one conditional
/// subtraction of `N`. The non-chosen branch subtracts `a` from the
/// accumulator instead, keeping the access pattern symmetric.
fn montmul_fin(a: &mut Mpi, t: &mut Mpi, n: &Mpi) -> Result<()> {
    let nl = n.used;
    a.grow(nl + 1)?;
    for i in 0..=nl {
        a.limbs[i] = t.limbs[nl + i];
    }
    for l in a.limbs[nl + 1..].iter_mut() {
        *l = 0;
    }
    a.sign = 1;
    a.fixup_used(nl + 1);

    if a.cmp_abs(n) != Ordering::Less {
        let au = a.used;
        sub_limbs(&mut a.limbs[..au], &n.limbs[..nl]);
        a.fixup_used(au);
    } else {
        let tu = t.used.max(1);
        let bu = a.used.min(tu);
        sub_limbs(&mut t.limbs[..tu], &a.limbs[..bu]);
        let cap = t.limbs.len();
        t.fixup_used(cap);
    }
    Ok(())
}

/// Montgomery multiplication: `a = a * b * R^-1 mod N` (HAC 14.36).
fn montmul(a: &mut Mpi, b: &Mpi, n: &Mpi, mm: Limb, t: &mut Mpi) -> Result<()> {
    montmul_step(t, a, b, n, mm);
    montmul_fin(a, t, n)
}

/// Montgomery squaring: `a = a^2 * R^-1 mod N`.
fn montmul_sqr(a: &mut Mpi, n: &Mpi, mm: Limb, t: &mut Mpi) -> Result<()> {
    {
        let ar = &*a;
        montmul_step(t, ar, ar, n, mm);
    }
    montmul_fin(a, t, n)
}

/// Montgomery reduction: `a = a * R^-1 mod N`.
fn montred(a: &mut Mpi, n: &Mpi, mm: Limb, t: &mut Mpi) -> Result<()> {
    let one = Mpi::from_limb(1);
    montmul(a, &one, n, mm, t)
}

/// Sliding-window exponentiation: `x = a^e mod n` (HAC 14.85).
///
/// `n` must be odd and positive, `e` non-negative. `rr` is a long-lived
/// scratch holding `R^2 mod N`; it is populated on first use and reused on
/// later calls with the same modulus. The window table comes from the
/// worker's pre-allocated `pool`, which the call borrows exclusively.
pub fn exp_mod(
    x: &mut Mpi,
    a: &Mpi,
    e: &Mpi,
    n: &Mpi,
    rr: &mut Mpi,
    pool: &mut WindowPool,
) -> Result<()> {
    if n.cmp_int(0) != Ordering::Greater || n.get_bit(0) == 0 {
        return Err(MpiError::BadInput);
    }
    if e.cmp_int(0) == Ordering::Less {
        return Err(MpiError::BadInput);
    }

    let mm = montg_init(n);
    let ebits = e.bitlen();
    let wsize: usize = if ebits > 671 {
        6
    } else if ebits > 239 {
        5
    } else if ebits > 79 {
        4
    } else if ebits > 23 {
        3
    } else {
        1
    };

    let j = n.used + 1;
    x.grow(j)?;
    let mut t = Mpi::new();
    t.grow(2 * n.used + 2)?;

    // Compensate for a negative base; corrected again at the end.
    let neg = a.sign == -1;
    let apos;
    let a = if neg {
        let mut p = a.clone();
        p.sign = 1;
        apos = p;
        &apos
    } else {
        a
    };

    // First call with this modulus: pre-compute R^2 mod N.
    if rr.is_empty() {
        let mut r2 = Mpi::new();
        r2.set_int(1)?;
        r2.shift_l(n.used * 2 * LIMB_BITS)?;
        mod_mpi(rr, &r2, n)?;
    }

    pool.reset();

    // W[1] = A * R^2 * R^-1 mod N = A * R mod N
    {
        let w = pool.slots_mut();
        if a.cmp_mpi(n) != Ordering::Less {
            mod_mpi(&mut w[1], a, n)?;
        } else {
            w[1].copy_from(a)?;
        }
        w[1].grow(j)?;
        montmul(&mut w[1], rr, n, mm, &mut t)?;
    }

    // X = R^2 * R^-1 mod N = R mod N
    x.copy_from(rr)?;
    montred(x, n, mm, &mut t)?;

    if wsize > 1 {
        // W[2^(w-1)] = W[1] ^ 2^(w-1)
        let base = 1usize << (wsize - 1);
        {
            let w = pool.slots_mut();
            let (lo, hi) = w.split_at_mut(base);
            hi[0].grow(j)?;
            hi[0].copy_from(&lo[1])?;
            for _ in 0..wsize - 1 {
                montmul_sqr(&mut hi[0], n, mm, &mut t)?;
            }
        }
        // W[i] = W[i-1] * W[1]
        for idx in base + 1..(1usize << wsize) {
            let w = pool.slots_mut();
            let (lo, hi) = w.split_at_mut(idx);
            hi[0].grow(j)?;
            hi[0].copy_from(&lo[idx - 1])?;
            montmul(&mut hi[0], &lo[1], n, mm, &mut t)?;
        }
    }

    // Scan the exponent from the most significant bit.
    let mut nblimbs = e.used;
    let mut bufsize = 0usize;
    let mut nbits = 0usize;
    let mut wbits = 0usize;
    let mut in_window = false;
    let mut seen_one = false;
    loop {
        if bufsize == 0 {
            if nblimbs == 0 {
                break;
            }
            nblimbs -= 1;
            bufsize = LIMB_BITS;
        }
        bufsize -= 1;
        let ei = ((e.limbs[nblimbs] >> bufsize) & 1) as usize;

        // Skip leading zeros.
        if ei == 0 && !seen_one {
            continue;
        }
        if ei == 0 && !in_window {
            // Outside a window: square only.
            montmul_sqr(x, n, mm, &mut t)?;
            continue;
        }

        // Accumulate one window bit.
        seen_one = true;
        in_window = true;
        nbits += 1;
        wbits |= ei << (wsize - nbits);

        if nbits == wsize {
            for _ in 0..wsize {
                montmul_sqr(x, n, mm, &mut t)?;
            }
            montmul(x, &pool.slots()[wbits], n, mm, &mut t)?;
            in_window = false;
            nbits = 0;
            wbits = 0;
        }
    }

    // Apply the residual window bits.
    for _ in 0..nbits {
        montmul_sqr(x, n, mm, &mut t)?;
        wbits <<= 1;
        if wbits & (1 << wsize) != 0 {
            montmul(x, &pool.slots()[1], n, mm, &mut t)?;
        }
    }

    // Leave Montgomery form.
    montred(x, n, mm, &mut t)?;

    if neg && !e.is_zero() && (e.limbs[0] & 1) == 1 {
        x.sign = -1;
        x.add_mpi_assign(n)?;
    }

    Ok(())
}
