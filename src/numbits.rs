//! IEEE 754 float64 to ordered bytes conversion for automaton numeric matching.
//!
//! Numbers are matched by the same byte automaton that matches strings, so a
//! number has to be turned into a byte string whose lexical order equals the
//! numeric order of the original value. That lets numeric equality become an
//! exact byte match and numeric ranges become a fixed-width digit range.
//!
//! The implementation is based on Arne Hormann's "numbits" construct:
//!
//! IEEE 754 float64 representation: (sign | exponent | mantissa)
//! - For positive numbers (sign bit 0): XOR with sign bit (1 << 63)
//! - For negative numbers (sign bit 1): Negate (XOR with !0)
//!
//! The resulting u64 is then written as exactly [`COMPARABLE_LENGTH`] uppercase
//! hex digits, big-endian. Fixed width matters: the range automaton compares
//! digit by digit and relies on every encoded number having the same length.

/// Number of hex digits in a comparable number.
pub const COMPARABLE_LENGTH: usize = 16;

/// Ordered digit alphabet shared by comparable numbers and IP addresses.
pub const HEX_DIGITS: &[u8; 16] = b"0123456789ABCDEF";

/// A numbits is an alternative binary representation of float64 numbers.
pub type Numbits = u64;

/// Convert a float64 to its numbits representation.
///
/// If a < b as floats, then numbits_from_f64(a) < numbits_from_f64(b) as u64.
/// Negative zero is folded onto zero so that `-0` and `0` compare equal.
pub fn numbits_from_f64(f: f64) -> Numbits {
    let f = if f == 0.0 { 0.0 } else { f };
    let u = f.to_bits();
    // If high bit is 0, xor with sign bit (1 << 63), else negate (xor with !0).
    let mask = ((u as i64 >> 63) as u64) | (1 << 63);
    u ^ mask
}

/// Write a u64 as fixed-width uppercase hex digits.
pub fn to_hex_digits(nb: Numbits) -> Vec<u8> {
    let mut result = vec![0u8; COMPARABLE_LENGTH];
    let mut nb = nb;
    for slot in result.iter_mut().rev() {
        *slot = HEX_DIGITS[(nb & 0xf) as usize];
        nb >>= 4;
    }
    result
}

/// Convert a float64 to its comparable byte encoding.
pub fn comparable_from_f64(f: f64) -> Vec<u8> {
    to_hex_digits(numbits_from_f64(f))
}

/// Parse a string as a finite float64 and return its comparable encoding.
///
/// Returns `None` for anything that is not a plain number, including quoted
/// JSON strings, `NaN` and infinities.
pub fn comparable_number(value: &str) -> Option<Vec<u8>> {
    let first = *value.as_bytes().first()?;
    if !(first == b'-' || first == b'+' || first == b'.' || first.is_ascii_digit()) {
        return None;
    }
    let f: f64 = value.parse().ok()?;
    if !f.is_finite() {
        return None;
    }
    Some(comparable_from_f64(f))
}

/// Decode a comparable encoding back into a float64, for diagnostics.
pub fn comparable_to_f64(encoded: &[u8]) -> Option<f64> {
    if encoded.len() != COMPARABLE_LENGTH {
        return None;
    }
    let mut nb: u64 = 0;
    for &digit in encoded {
        let value = HEX_DIGITS.iter().position(|&d| d == digit)? as u64;
        nb = (nb << 4) | value;
    }
    let u = if nb & (1 << 63) != 0 { nb ^ (1 << 63) } else { !nb };
    Some(f64::from_bits(u))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[allow(clippy::inconsistent_digit_grouping)]
    fn test_wildly_varying_numbers_are_comparable() {
        let data: Vec<f64> = vec![
            -5_000_000_000.0,
            -4_999_999_999.99999,
            -4_999_999_999.99998,
            -999999999.99,
            -10000.0,
            -122.413496,
            -0.000002,
            0.0,
            0.000001,
            3.8,
            3.9,
            11.0,
            12.0,
            122.415028,
            2.5e4,
            999999999.999999,
            4_999_999_999.99999,
            5_000_000_000.0,
        ];

        for i in 1..data.len() {
            let s0 = comparable_from_f64(data[i - 1]);
            let s1 = comparable_from_f64(data[i]);
            assert!(
                s0 < s1,
                "Ordering failed at index {}: {} should be < {}",
                i,
                data[i - 1],
                data[i]
            );
        }
    }

    #[test]
    fn test_string_variants_encode_identically() {
        let strings = ["350", "350.0", "350.0000", "3.5e2"];
        let encoded: Vec<Vec<u8>> = strings
            .iter()
            .map(|s| comparable_number(s).unwrap())
            .collect();
        for pair in encoded.windows(2) {
            assert_eq!(pair[0], pair[1]);
        }
    }

    #[test]
    fn test_fixed_width() {
        for f in [0.0, -1.0, 1e300, -1e-300, 42.5] {
            assert_eq!(comparable_from_f64(f).len(), COMPARABLE_LENGTH);
        }
    }

    #[test]
    fn test_bad_numbers() {
        for bad in ["xy", "- 53", "124x", "1.5ee7", "\"12\"", "", "NaN", "inf", "infinity"] {
            assert!(comparable_number(bad).is_none(), "Should reject: {}", bad);
        }
    }

    #[test]
    fn test_zero_handling() {
        assert_eq!(comparable_from_f64(0.0), comparable_from_f64(-0.0));
        assert_eq!(comparable_number("-0"), comparable_number("0"));
    }

    #[test]
    fn test_decode_round_trip_for_diagnostics() {
        for f in [-122.413496, 0.0, 1e9, 7.25] {
            assert_eq!(comparable_to_f64(&comparable_from_f64(f)), Some(f));
        }
        assert_eq!(comparable_to_f64(b"XYZ"), None);
    }
}
