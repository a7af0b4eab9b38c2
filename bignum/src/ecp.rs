//! Elliptic curve data model over GF(p).
//!
//! Short-Weierstrass prime-field curves in Jacobian coordinates. Only
//! well-known named domains are loadable; arbitrary domain parameters are
//! deliberately not supported. At the interface every point satisfies
//! `Z == 0` (the point at infinity) or `Z == 1`; internal consumers may
//! produce non-normalised `Z`.

use alloc::vec::Vec;
use core::fmt;

use crate::{Mpi, MpiError};

/// Maximum bit size of the supported groups (P and N).
pub const MAX_BITS: usize = 521;

/// Maximum byte size of a field element.
pub const MAX_BYTES: usize = (MAX_BITS + 7) / 8;

/// Maximum byte size of an encoded point.
pub const MAX_PT_LEN: usize = 2 * MAX_BYTES + 1;

/// Uncompressed point format (RFC 4492 ECPointFormat).
pub const PF_UNCOMPRESSED: u8 = 0;

/// Compressed point format.
pub const PF_COMPRESSED: u8 = 1;

/// The only ECCurveType allowed by RFC 8422 5.4.
pub const TLS_NAMED_CURVE: u8 = 3;

/// ECP error types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EcpError {
    /// Bad input parameters.
    BadInput,
    /// The output buffer is too small.
    BufferTooSmall,
    /// Requested curve or point format not available.
    FeatureUnavailable,
    /// MPI capacity exceeded.
    Capacity,
}

impl From<MpiError> for EcpError {
    fn from(e: MpiError) -> Self {
        match e {
            MpiError::Capacity => EcpError::Capacity,
            MpiError::BadInput => EcpError::BadInput,
            MpiError::BufferTooSmall => EcpError::BufferTooSmall,
        }
    }
}

impl fmt::Display for EcpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EcpError::BadInput => write!(f, "bad input parameters"),
            EcpError::BufferTooSmall => write!(f, "buffer too small"),
            EcpError::FeatureUnavailable => write!(f, "curve or format not available"),
            EcpError::Capacity => write!(f, "value exceeds the limb budget"),
        }
    }
}

/// Identifiers of the supported prime-field domains.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GroupId {
    /// 256-bit NIST curve.
    Secp256r1,
    /// 384-bit NIST curve.
    Secp384r1,
    /// 521-bit NIST curve.
    Secp521r1,
}

/// Curve information for use by other modules.
#[derive(Debug, Clone, Copy)]
pub struct CurveInfo {
    /// Internal identifier.
    pub id: GroupId,
    /// TLS NamedCurve identifier.
    pub tls_id: u16,
    /// Curve size in bits.
    pub bit_size: u16,
    /// Human-friendly name.
    pub name: &'static str,
}

/// Supported curves in order of preference.
pub const CURVES: [CurveInfo; 3] = [
    CurveInfo {
        id: GroupId::Secp256r1,
        tls_id: 23,
        bit_size: 256,
        name: "secp256r1",
    },
    CurveInfo {
        id: GroupId::Secp384r1,
        tls_id: 24,
        bit_size: 384,
        name: "secp384r1",
    },
    CurveInfo {
        id: GroupId::Secp521r1,
        tls_id: 25,
        bit_size: 521,
        name: "secp521r1",
    },
];

/// Curve information from a TLS NamedCurve value.
pub fn curve_info_from_tls_id(tls_id: u16) -> Option<&'static CurveInfo> {
    CURVES.iter().find(|c| c.tls_id == tls_id)
}

/// Curve information from an internal group identifier.
pub fn curve_info_from_grp_id(id: GroupId) -> Option<&'static CurveInfo> {
    CURVES.iter().find(|c| c.id == id)
}

/// Supported group identifiers in order of preference.
pub fn grp_id_list() -> &'static [GroupId] {
    const IDS: [GroupId; 3] = [GroupId::Secp256r1, GroupId::Secp384r1, GroupId::Secp521r1];
    &IDS
}

/// ECP point in Jacobian coordinates.
#[derive(Debug, Clone, Default)]
pub struct EcpPoint {
    pub x: Mpi,
    pub y: Mpi,
    pub z: Mpi,
}

impl EcpPoint {
    /// A fresh point at infinity.
    pub fn new() -> Self {
        EcpPoint {
            x: Mpi::new(),
            y: Mpi::new(),
            z: Mpi::new(),
        }
    }

    /// Reset to the point at infinity.
    pub fn set_zero(&mut self) -> Result<(), EcpError> {
        self.x.set_int(1)?;
        self.y.set_int(1)?;
        self.z.set_int(0)?;
        Ok(())
    }

    /// True for the point at infinity.
    pub fn is_zero(&self) -> bool {
        self.z.is_zero()
    }

    /// Copy the contents of `other`.
    pub fn copy_from(&mut self, other: &EcpPoint) -> Result<(), EcpError> {
        self.x.copy_from(&other.x)?;
        self.y.copy_from(&other.y)?;
        self.z.copy_from(&other.z)?;
        Ok(())
    }
}

/// Immutable description of a named curve: modulus, coefficients, subgroup
/// order, generator and a slot for pre-computed comb points.
#[derive(Debug, Clone)]
pub struct EcpGroup {
    pub id: GroupId,
    /// Number of bits in P.
    pub pbits: usize,
    /// Number of bits in N.
    pub nbits: usize,
    /// Prime modulus of the base field.
    pub p: Mpi,
    /// A coefficient in the curve equation.
    pub a: Mpi,
    /// B coefficient in the curve equation.
    pub b: Mpi,
    /// Order of the generator.
    pub n: Mpi,
    /// Generator of the subgroup.
    pub g: EcpPoint,
    /// Pre-computed points for fixed-base multiplication; filled by the
    /// scalar-multiplication backend, not safe for concurrent fills.
    pub t: Vec<EcpPoint>,
}

const P256_P: [u8; 32] = [
    0xff, 0xff, 0xff, 0xff, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
    0x00, 0x00, 0x00, 0x00, 0x00, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff,
    0xff, 0xff,
];
const P256_B: [u8; 32] = [
    0x5a, 0xc6, 0x35, 0xd8, 0xaa, 0x3a, 0x93, 0xe7, 0xb3, 0xeb, 0xbd, 0x55, 0x76, 0x98, 0x86,
    0xbc, 0x65, 0x1d, 0x06, 0xb0, 0xcc, 0x53, 0xb0, 0xf6, 0x3b, 0xce, 0x3c, 0x3e, 0x27, 0xd2,
    0x60, 0x4b,
];
const P256_N: [u8; 32] = [
    0xff, 0xff, 0xff, 0xff, 0x00, 0x00, 0x00, 0x00, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff,
    0xff, 0xbc, 0xe6, 0xfa, 0xad, 0xa7, 0x17, 0x9e, 0x84, 0xf3, 0xb9, 0xca, 0xc2, 0xfc, 0x63,
    0x25, 0x51,
];
const P256_GX: [u8; 32] = [
    0x6b, 0x17, 0xd1, 0xf2, 0xe1, 0x2c, 0x42, 0x47, 0xf8, 0xbc, 0xe6, 0xe5, 0x63, 0xa4, 0x40,
    0xf2, 0x77, 0x03, 0x7d, 0x81, 0x2d, 0xeb, 0x33, 0xa0, 0xf4, 0xa1, 0x39, 0x45, 0xd8, 0x98,
    0xc2, 0x96,
];
const P256_GY: [u8; 32] = [
    0x4f, 0xe3, 0x42, 0xe2, 0xfe, 0x1a, 0x7f, 0x9b, 0x8e, 0xe7, 0xeb, 0x4a, 0x7c, 0x0f, 0x9e,
    0x16, 0x2b, 0xce, 0x33, 0x57, 0x6b, 0x31, 0x5e, 0xce, 0xcb, 0xb6, 0x40, 0x68, 0x37, 0xbf,
    0x51, 0xf5,
];

const P384_P: [u8; 48] = [
    0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff,
    0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff,
    0xff, 0xfe, 0xff, 0xff, 0xff, 0xff, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0xff,
    0xff, 0xff, 0xff,
];
const P384_B: [u8; 48] = [
    0xb3, 0x31, 0x2f, 0xa7, 0xe2, 0x3e, 0xe7, 0xe4, 0x98, 0x8e, 0x05, 0x6b, 0xe3, 0xf8, 0x2d,
    0x19, 0x18, 0x1d, 0x9c, 0x6e, 0xfe, 0x81, 0x41, 0x12, 0x03, 0x14, 0x08, 0x8f, 0x50, 0x13,
    0x87, 0x5a, 0xc6, 0x56, 0x39, 0x8d, 0x8a, 0x2e, 0xd1, 0x9d, 0x2a, 0x85, 0xc8, 0xed, 0xd3,
    0xec, 0x2a, 0xef,
];
const P384_N: [u8; 48] = [
    0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff,
    0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xc7, 0x63, 0x4d, 0x81, 0xf4, 0x37,
    0x2d, 0xdf, 0x58, 0x1a, 0x0d, 0xb2, 0x48, 0xb0, 0xa7, 0x7a, 0xec, 0xec, 0x19, 0x6a, 0xcc,
    0xc5, 0x29, 0x73,
];
const P384_GX: [u8; 48] = [
    0xaa, 0x87, 0xca, 0x22, 0xbe, 0x8b, 0x05, 0x37, 0x8e, 0xb1, 0xc7, 0x1e, 0xf3, 0x20, 0xad,
    0x74, 0x6e, 0x1d, 0x3b, 0x62, 0x8b, 0xa7, 0x9b, 0x98, 0x59, 0xf7, 0x41, 0xe0, 0x82, 0x54,
    0x2a, 0x38, 0x55, 0x02, 0xf2, 0x5d, 0xbf, 0x55, 0x29, 0x6c, 0x3a, 0x54, 0x5e, 0x38, 0x72,
    0x76, 0x0a, 0xb7,
];
const P384_GY: [u8; 48] = [
    0x36, 0x17, 0xde, 0x4a, 0x96, 0x26, 0x2c, 0x6f, 0x5d, 0x9e, 0x98, 0xbf, 0x92, 0x92, 0xdc,
    0x29, 0xf8, 0xf4, 0x1d, 0xbd, 0x28, 0x9a, 0x14, 0x7c, 0xe9, 0xda, 0x31, 0x13, 0xb5, 0xf0,
    0xb8, 0xc0, 0x0a, 0x60, 0xb1, 0xce, 0x1d, 0x7e, 0x81, 0x9d, 0x7a, 0x43, 0x1d, 0x7c, 0x90,
    0xea, 0x0e, 0x5f,
];

const P521_B: [u8; 66] = [
    0x00, 0x51, 0x95, 0x3e, 0xb9, 0x61, 0x8e, 0x1c, 0x9a, 0x1f, 0x92, 0x9a, 0x21, 0xa0, 0xb6,
    0x85, 0x40, 0xee, 0xa2, 0xda, 0x72, 0x5b, 0x99, 0xb3, 0x15, 0xf3, 0xb8, 0xb4, 0x89, 0x91,
    0x8e, 0xf1, 0x09, 0xe1, 0x56, 0x19, 0x39, 0x51, 0xec, 0x7e, 0x93, 0x7b, 0x16, 0x52, 0xc0,
    0xbd, 0x3b, 0xb1, 0xbf, 0x07, 0x35, 0x73, 0xdf, 0x88, 0x3d, 0x2c, 0x34, 0xf1, 0xef, 0x45,
    0x1f, 0xd4, 0x6b, 0x50, 0x3f, 0x00,
];
const P521_N: [u8; 66] = [
    0x01, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff,
    0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff,
    0xff, 0xff, 0xff, 0xfa, 0x51, 0x86, 0x87, 0x83, 0xbf, 0x2f, 0x96, 0x6b, 0x7f, 0xcc, 0x01,
    0x48, 0xf7, 0x09, 0xa5, 0xd0, 0x3b, 0xb5, 0xc9, 0xb8, 0x89, 0x9c, 0x47, 0xae, 0xbb, 0x6f,
    0xb7, 0x1e, 0x91, 0x38, 0x64, 0x09,
];
const P521_GX: [u8; 66] = [
    0x00, 0xc6, 0x85, 0x8e, 0x06, 0xb7, 0x04, 0x04, 0xe9, 0xcd, 0x9e, 0x3e, 0xcb, 0x66, 0x23,
    0x95, 0xb4, 0x42, 0x9c, 0x64, 0x81, 0x39, 0x05, 0x3f, 0xb5, 0x21, 0xf8, 0x28, 0xaf, 0x60,
    0x6b, 0x4d, 0x3d, 0xba, 0xa1, 0x4b, 0x5e, 0x77, 0xef, 0xe7, 0x59, 0x28, 0xfe, 0x1d, 0xc1,
    0x27, 0xa2, 0xff, 0xa8, 0xde, 0x33, 0x48, 0xb3, 0xc1, 0x85, 0x6a, 0x42, 0x9b, 0xf9, 0x7e,
    0x7e, 0x31, 0xc2, 0xe5, 0xbd, 0x66,
];
const P521_GY: [u8; 66] = [
    0x01, 0x18, 0x39, 0x29, 0x6a, 0x78, 0x9a, 0x3b, 0xc0, 0x04, 0x5c, 0x8a, 0x5f, 0xb4, 0x2c,
    0x7d, 0x1b, 0xd9, 0x98, 0xf5, 0x44, 0x49, 0x57, 0x9b, 0x44, 0x68, 0x17, 0xaf, 0xbd, 0x17,
    0x27, 0x3e, 0x66, 0x2c, 0x97, 0xee, 0x72, 0x99, 0x5e, 0xf4, 0x26, 0x40, 0xc5, 0x50, 0xb9,
    0x01, 0x3f, 0xad, 0x07, 0x61, 0x35, 0x3c, 0x70, 0x86, 0xa2, 0x72, 0xc2, 0x40, 0x88, 0xbe,
    0x94, 0x76, 0x9f, 0xd1, 0x66, 0x50,
];

impl EcpGroup {
    /// Load a named domain. The A coefficient of the NIST curves is
    /// `P - 3`, stored explicitly.
    pub fn load(id: GroupId) -> Result<Self, EcpError> {
        let (pbits, p_bytes, b_bytes, n_bytes, gx, gy): (usize, Mpi, &[u8], &[u8], &[u8], &[u8]) =
            match id {
                GroupId::Secp256r1 => (
                    256,
                    Mpi::from_binary(&P256_P)?,
                    &P256_B,
                    &P256_N,
                    &P256_GX,
                    &P256_GY,
                ),
                GroupId::Secp384r1 => (
                    384,
                    Mpi::from_binary(&P384_P)?,
                    &P384_B,
                    &P384_N,
                    &P384_GX,
                    &P384_GY,
                ),
                GroupId::Secp521r1 => {
                    // P = 2^521 - 1
                    let mut p = Mpi::new();
                    p.set_int(1)?;
                    p.shift_l(521)?;
                    let one = Mpi::from_limb(1);
                    p.sub_mpi_assign(&one)?;
                    (521, p, &P521_B, &P521_N, &P521_GX, &P521_GY)
                }
            };

        let mut a = Mpi::new();
        a.sub_int(&p_bytes, 3)?;

        let mut g = EcpPoint::new();
        g.x.read_binary(gx)?;
        g.y.read_binary(gy)?;
        g.z.set_int(1)?;

        Ok(EcpGroup {
            id,
            pbits,
            nbits: pbits,
            p: p_bytes,
            a,
            b: Mpi::from_binary(b_bytes)?,
            n: Mpi::from_binary(n_bytes)?,
            g,
            t: Vec::new(),
        })
    }

    /// Byte length of one field element.
    pub fn p_len(&self) -> usize {
        (self.pbits + 7) / 8
    }

    /// Export a point into unsigned binary data. Only the uncompressed
    /// format is emitted; the point at infinity encodes as a single zero
    /// byte.
    pub fn point_write_binary(
        &self,
        pt: &EcpPoint,
        format: u8,
        buf: &mut [u8],
    ) -> Result<usize, EcpError> {
        if format != PF_UNCOMPRESSED {
            return Err(EcpError::FeatureUnavailable);
        }
        if pt.is_zero() {
            if buf.is_empty() {
                return Err(EcpError::BufferTooSmall);
            }
            buf[0] = 0;
            return Ok(1);
        }
        let plen = self.p_len();
        let olen = 2 * plen + 1;
        if buf.len() < olen {
            return Err(EcpError::BufferTooSmall);
        }
        buf[0] = 0x04;
        pt.x.write_binary(&mut buf[1..1 + plen])?;
        pt.y.write_binary(&mut buf[1 + plen..olen])?;
        Ok(olen)
    }

    /// Import a point from unsigned binary data. Coordinates are not
    /// checked against the curve equation here.
    pub fn point_read_binary(&self, pt: &mut EcpPoint, buf: &[u8]) -> Result<(), EcpError> {
        if buf.is_empty() {
            return Err(EcpError::BadInput);
        }
        if buf[0] == 0x00 {
            if buf.len() == 1 {
                return pt.set_zero();
            }
            return Err(EcpError::BadInput);
        }
        if buf[0] != 0x04 {
            return Err(EcpError::FeatureUnavailable);
        }
        let plen = self.p_len();
        if buf.len() != 2 * plen + 1 {
            return Err(EcpError::BadInput);
        }
        pt.x.read_binary(&buf[1..1 + plen])?;
        pt.y.read_binary(&buf[1 + plen..])?;
        pt.z.set_int(1)?;
        Ok(())
    }

    /// Import a point from a TLS ECPoint record (one length byte followed
    /// by the encoding). Returns the number of bytes consumed.
    pub fn tls_read_point(&self, pt: &mut EcpPoint, buf: &[u8]) -> Result<usize, EcpError> {
        if buf.len() < 2 {
            return Err(EcpError::BadInput);
        }
        let plen = buf[0] as usize;
        if buf.len() < 1 + plen {
            return Err(EcpError::BadInput);
        }
        self.point_read_binary(pt, &buf[1..1 + plen])?;
        Ok(1 + plen)
    }

    /// Export a point as a TLS ECPoint record.
    pub fn tls_write_point(
        &self,
        pt: &EcpPoint,
        format: u8,
        buf: &mut [u8],
    ) -> Result<usize, EcpError> {
        if buf.is_empty() {
            return Err(EcpError::BufferTooSmall);
        }
        let olen = self.point_write_binary(pt, format, &mut buf[1..])?;
        if olen > 255 {
            return Err(EcpError::BadInput);
        }
        buf[0] = olen as u8;
        Ok(1 + olen)
    }

    /// Write the TLS ECParameters record for this group (named_curve form).
    pub fn tls_write_group(&self, buf: &mut [u8]) -> Result<usize, EcpError> {
        let info = curve_info_from_grp_id(self.id).ok_or(EcpError::FeatureUnavailable)?;
        if buf.len() < 3 {
            return Err(EcpError::BufferTooSmall);
        }
        buf[0] = TLS_NAMED_CURVE;
        buf[1] = (info.tls_id >> 8) as u8;
        buf[2] = info.tls_id as u8;
        Ok(3)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::cmp::Ordering;

    #[test]
    fn curve_lookup() {
        assert_eq!(curve_info_from_tls_id(23).map(|c| c.id), Some(GroupId::Secp256r1));
        assert_eq!(curve_info_from_tls_id(24).map(|c| c.id), Some(GroupId::Secp384r1));
        assert_eq!(curve_info_from_tls_id(25).map(|c| c.id), Some(GroupId::Secp521r1));
        assert!(curve_info_from_tls_id(29).is_none()); // x25519 is out of scope
        assert_eq!(grp_id_list()[0], GroupId::Secp256r1);
    }

    #[test]
    fn groups_load_consistently() {
        for info in CURVES.iter() {
            let grp = EcpGroup::load(info.id).unwrap();
            assert_eq!(grp.pbits, info.bit_size as usize);
            assert_eq!(grp.p.bitlen(), info.bit_size as usize);
            assert_eq!(grp.n.bitlen(), info.bit_size as usize);
            // A = P - 3
            let mut a3 = Mpi::new();
            a3.add_int(&grp.a, 3).unwrap();
            assert_eq!(a3.cmp_mpi(&grp.p), Ordering::Equal);
            // Generator coordinates are field elements.
            assert_eq!(grp.g.x.cmp_mpi(&grp.p), Ordering::Less);
            assert_eq!(grp.g.y.cmp_mpi(&grp.p), Ordering::Less);
            assert!(!grp.g.is_zero());
        }
    }

    #[test]
    fn point_binary_roundtrip() {
        let grp = EcpGroup::load(GroupId::Secp256r1).unwrap();
        let mut buf = [0u8; MAX_PT_LEN];
        let olen = grp
            .point_write_binary(&grp.g, PF_UNCOMPRESSED, &mut buf)
            .unwrap();
        assert_eq!(olen, 65);
        assert_eq!(buf[0], 0x04);

        let mut pt = EcpPoint::new();
        grp.point_read_binary(&mut pt, &buf[..olen]).unwrap();
        assert_eq!(pt.x.cmp_mpi(&grp.g.x), Ordering::Equal);
        assert_eq!(pt.y.cmp_mpi(&grp.g.y), Ordering::Equal);
        assert_eq!(pt.z.cmp_int(1), Ordering::Equal);

        // Compressed input is recognised but unsupported.
        let mut compressed = [0u8; 33];
        compressed[0] = 0x02;
        assert_eq!(
            grp.point_read_binary(&mut pt, &compressed),
            Err(EcpError::FeatureUnavailable)
        );
    }

    #[test]
    fn zero_point_encoding() {
        let grp = EcpGroup::load(GroupId::Secp384r1).unwrap();
        let mut zero = EcpPoint::new();
        zero.set_zero().unwrap();
        assert!(zero.is_zero());

        let mut buf = [0u8; 4];
        let olen = grp
            .point_write_binary(&zero, PF_UNCOMPRESSED, &mut buf)
            .unwrap();
        assert_eq!(&buf[..olen], &[0x00]);

        let mut back = EcpPoint::new();
        grp.point_read_binary(&mut back, &buf[..olen]).unwrap();
        assert!(back.is_zero());
    }

    #[test]
    fn tls_wire_forms() {
        let grp = EcpGroup::load(GroupId::Secp521r1).unwrap();
        let mut buf = [0u8; MAX_PT_LEN + 1];
        let olen = grp
            .tls_write_point(&grp.g, PF_UNCOMPRESSED, &mut buf)
            .unwrap();
        assert_eq!(buf[0] as usize, olen - 1);

        let mut pt = EcpPoint::new();
        let consumed = grp.tls_read_point(&mut pt, &buf[..olen]).unwrap();
        assert_eq!(consumed, olen);
        assert_eq!(pt.x.cmp_mpi(&grp.g.x), Ordering::Equal);

        let mut params = [0u8; 3];
        grp.tls_write_group(&mut params).unwrap();
        assert_eq!(params, [3, 0, 25]);
    }
}
