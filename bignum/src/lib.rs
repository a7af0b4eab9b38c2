//! Multi-precision integer engine for asymmetric cryptography.
//!
//! This crate provides the arbitrary-precision arithmetic that backs the
//! edgetls key exchanges: sign-magnitude integers over 64-bit limbs with
//! addition, subtraction, multiplication, long division, sliding-window
//! Montgomery exponentiation, binary GCD and modular inverse, plus the
//! constant-time conditional primitives needed on secret-dependent paths.
//!
//! The engine is sized for 256-521 bit moduli. Every growth of a value is
//! bounded by [`MAX_LIMBS`]; exceeding the bound is reported as
//! [`MpiError::Capacity`] rather than aborting the worker.
//!
//! Modular exponentiation draws its window table from a per-worker
//! pre-allocated pool (see [`pool`]) so that no allocations happen inside
//! the hot Montgomery loop.

#![no_std]

extern crate alloc;

pub mod ct;
pub mod div;
pub mod ecp;
pub mod exp;
pub mod gcd;
pub mod mpi;
pub mod mul;
pub mod pool;

use core::fmt;

/// One machine word of an MPI magnitude.
pub type Limb = u64;

/// Bits per limb.
pub const LIMB_BITS: usize = 64;

/// Bytes per limb.
pub const LIMB_BYTES: usize = 8;

/// Hard cap on the limb count of a single value, scratch included.
pub const MAX_LIMBS: usize = 1024;

/// Hard cap on the byte size of any imported or exported value.
pub const MAX_SIZE: usize = 1024;

/// Number of limbs needed to hold `n` bits.
pub(crate) const fn bits_to_limbs(n: usize) -> usize {
    (n + LIMB_BITS - 1) / LIMB_BITS
}

/// Number of limbs needed to hold `n` bytes.
pub(crate) const fn bytes_to_limbs(n: usize) -> usize {
    (n + LIMB_BYTES - 1) / LIMB_BYTES
}

/// MPI engine error types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MpiError {
    /// A value grew past `MAX_LIMBS`.
    Capacity,
    /// Invalid operand: division by zero, negative modulus, subtracting a
    /// larger magnitude from a smaller one, non-invertible residue.
    BadInput,
    /// The output buffer cannot hold the value.
    BufferTooSmall,
}

impl fmt::Display for MpiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MpiError::Capacity => write!(f, "value exceeds the limb budget"),
            MpiError::BadInput => write!(f, "invalid operand"),
            MpiError::BufferTooSmall => write!(f, "output buffer too small"),
        }
    }
}

/// Result alias used across the engine.
pub type Result<T> = core::result::Result<T, MpiError>;

/// Source of cryptographic randomness.
///
/// Implementations may use interior mutability; the engine only requires a
/// shared reference so one generator can serve a whole worker.
pub trait Rng {
    /// Fill `buf` with random bytes.
    fn fill(&self, buf: &mut [u8]);
}

pub use ecp::{CurveInfo, EcpGroup, EcpPoint, GroupId};
pub use mpi::Mpi;
pub use pool::WindowPool;

#[cfg(test)]
pub(crate) mod test_support {
    use crate::{Mpi, Rng};
    use core::cell::Cell;

    /// Deterministic xorshift64 generator for reproducible tests.
    pub struct XorShift(pub u64);

    impl XorShift {
        pub fn new(seed: u64) -> Self {
            XorShift(if seed == 0 { 0x9e3779b97f4a7c15 } else { seed })
        }

        pub fn next(&mut self) -> u64 {
            let mut x = self.0;
            x ^= x << 13;
            x ^= x >> 7;
            x ^= x << 17;
            self.0 = x;
            x
        }
    }

    /// Random value of `limbs` limbs (top limb may be zero).
    pub fn rand_mpi(rng: &mut XorShift, limbs: usize) -> Mpi {
        let mut bytes = alloc::vec![0u8; limbs * 8];
        for b in bytes.iter_mut() {
            *b = rng.next() as u8;
        }
        match Mpi::from_binary(&bytes) {
            Ok(x) => x,
            Err(_) => Mpi::new(),
        }
    }

    /// `Rng` adapter over the xorshift state.
    pub struct TestRng(pub Cell<u64>);

    impl TestRng {
        pub fn new(seed: u64) -> Self {
            TestRng(Cell::new(if seed == 0 { 1 } else { seed }))
        }
    }

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
}
