//! Fixed-point scalar arithmetic: the `Weight` type every number stored in a
//! [`crate::network::Network`] is made of.
//!
//! `Weight` is a signed 32-bit integer interpreted as Q(31-P).P fixed point,
//! where `P` is [`PRECISION`]. All arithmetic below operates purely on
//! integers; there is no floating-point weight storage anywhere in this
//! crate (see the crate's Non-goals).

use std::io::{self, Read, Write};

/// A single fixed-point network weight or bias.
pub type Weight = i32;

/// Fractional precision `P`: the number of bits below the binary point.
pub const PRECISION: u32 = 21;

/// `1.0` in Q(31-P).P fixed point.
pub const ONE: Weight = 1 << PRECISION;

/// Multiplies two fixed-point values, widening to `i64` for the
/// intermediate product and truncating the result *toward zero*.
///
/// This is deliberately integer division (`/`), not an arithmetic right
/// shift: shifting a negative `i64` right rounds toward negative infinity,
/// which would silently bias every negative product down by up to one ULP.
/// The fixed-point contract for this crate truncates toward zero instead.
pub fn mul(a: Weight, b: Weight) -> Weight {
    let product = (a as i64) * (b as i64);
    (product / (1i64 << PRECISION)) as Weight
}

/// Computes `min + (max - min) * r16 / 65536` in a 64-bit intermediate,
/// treating `r16` as a fixed-point fraction of the `[0, 1)` interval.
pub fn rate(min_value: Weight, max_value: Weight, r16: u16) -> Weight {
    let span = (max_value as i64) - (min_value as i64);
    (min_value as i64 + span * (r16 as i64) / 65536) as Weight
}

/// Converts a fixed-point value to a real number, for reporting only.
pub fn normalize(value: Weight) -> f64 {
    (value as f64) / (ONE as f64)
}

/// Reads one little-endian 32-bit weight from `reader`.
pub fn read_weight(reader: &mut impl Read) -> io::Result<Weight> {
    let mut buf = [0u8; 4];
    reader.read_exact(&mut buf)?;
    Ok(i32::from_le_bytes(buf))
}

/// Writes one little-endian 32-bit weight to `writer`.
pub fn write_weight(writer: &mut impl Write, w: Weight) -> io::Result<()> {
    writer.write_all(&w.to_le_bytes())
}

/// Reads one little-endian unsigned 32-bit integer (layer counts, sizes,
/// activation ids) from `reader`.
pub fn read_u32(reader: &mut impl Read) -> io::Result<u32> {
    let mut buf = [0u8; 4];
    reader.read_exact(&mut buf)?;
    Ok(u32::from_le_bytes(buf))
}

/// Writes one little-endian unsigned 32-bit integer to `writer`.
pub fn write_u32(writer: &mut impl Write, u: u32) -> io::Result<()> {
    writer.write_all(&u.to_le_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn multiplication_identity() {
        for x in [-ONE * 3, -1, 0, 1, 42, ONE, ONE * 7 + 123] {
            assert_eq!(mul(x, ONE), x, "x={x}");
        }
    }

    #[test]
    fn mul_truncates_toward_zero() {
        // -1 * 1 in Q(P) space: product is -1, which / 2^21 truncates to 0,
        // not -1 (which an arithmetic right shift would produce).
        assert_eq!(mul(-1, 1), 0);
        assert_eq!(mul(1, -1), 0);
    }

    #[test]
    fn rate_endpoints() {
        assert_eq!(rate(0, ONE, 0), 0);
        assert_eq!(rate(-ONE, ONE, 0), -ONE);
    }

    #[test]
    fn weight_roundtrip() {
        let mut buf = Vec::new();
        write_weight(&mut buf, -12345).unwrap();
        let mut cursor = &buf[..];
        assert_eq!(read_weight(&mut cursor).unwrap(), -12345);
    }
}
