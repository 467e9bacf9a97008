//! IP address and CIDR block encoding.
//!
//! Addresses are written as fixed-width uppercase hex digits, 8 for IPv4 and
//! 32 for IPv6, so that a CIDR block becomes an ordinary closed digit range
//! [network, broadcast] in the byte automaton.

use std::net::IpAddr;

use crate::error::{Result, RulerError};
use crate::numbits::HEX_DIGITS;
use crate::pattern::Range;

fn hex_digits(bytes: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(bytes.len() * 2);
    for b in bytes {
        out.push(HEX_DIGITS[(b >> 4) as usize]);
        out.push(HEX_DIGITS[(b & 0xf) as usize]);
    }
    out
}

fn strip_quotes(value: &str) -> &str {
    if value.len() >= 2 && value.starts_with('"') && value.ends_with('"') {
        &value[1..value.len() - 1]
    } else {
        value
    }
}

/// Encode an IP literal, optionally wrapped in one layer of JSON quotes.
///
/// Returns `None` when the value is not an IP address.
pub fn ip_to_comparable(value: &str) -> Option<Vec<u8>> {
    let addr: IpAddr = strip_quotes(value).parse().ok()?;
    Some(match addr {
        IpAddr::V4(v4) => hex_digits(&v4.octets()),
        IpAddr::V6(v6) => hex_digits(&v6.octets()),
    })
}

impl Range {
    /// A closed range covering every address of a CIDR block such as
    /// `10.0.0.0/24` or `2001:db8::/32`. A bare address is a single-address
    /// block.
    pub fn cidr(block: &str) -> Result<Range> {
        let block = strip_quotes(block.trim());
        let (addr, prefix) = match block.split_once('/') {
            Some((addr, prefix)) => (addr, Some(prefix)),
            None => (block, None),
        };
        let addr: IpAddr = addr
            .parse()
            .map_err(|_| RulerError::InvalidPattern(format!("{} is not an IP address", addr)))?;
        let max_prefix = match addr {
            IpAddr::V4(_) => 32,
            IpAddr::V6(_) => 128,
        };
        let prefix: u32 = match prefix {
            Some(p) => p
                .parse()
                .ok()
                .filter(|p| *p <= max_prefix)
                .ok_or_else(|| {
                    RulerError::InvalidPattern(format!("{} is not a valid CIDR prefix", p))
                })?,
            None => max_prefix,
        };

        let (bottom, top) = match addr {
            IpAddr::V4(v4) => {
                let bits = u32::from(v4);
                let host_mask = u32::MAX.checked_shr(prefix).unwrap_or(0);
                (
                    hex_digits(&(bits & !host_mask).to_be_bytes()),
                    hex_digits(&(bits | host_mask).to_be_bytes()),
                )
            }
            IpAddr::V6(v6) => {
                let bits = u128::from(v6);
                let host_mask = u128::MAX.checked_shr(prefix).unwrap_or(0);
                (
                    hex_digits(&(bits & !host_mask).to_be_bytes()),
                    hex_digits(&(bits | host_mask).to_be_bytes()),
                )
            }
        };
        Range::from_encoded(bottom, false, top, false, true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ipv4_encoding() {
        assert_eq!(ip_to_comparable("10.0.0.1"), Some(b"0A000001".to_vec()));
        assert_eq!(ip_to_comparable("\"255.255.255.0\""), Some(b"FFFFFF00".to_vec()));
    }

    #[test]
    fn test_ipv6_encoding_width() {
        let encoded = ip_to_comparable("2001:db8::1").unwrap();
        assert_eq!(encoded.len(), 32);
        assert!(encoded.starts_with(b"20010DB8"));
    }

    #[test]
    fn test_non_ip_values() {
        for value in ["", "foo", "\"10.0.0\"", "10.0.0.256", "12"] {
            assert!(ip_to_comparable(value).is_none(), "Should reject: {}", value);
        }
    }

    #[test]
    fn test_cidr_range_bounds() {
        let range = Range::cidr("10.0.0.0/24").unwrap();
        assert!(range.is_cidr());
        assert_eq!(range.bottom, b"0A000000".to_vec());
        assert_eq!(range.top, b"0A0000FF".to_vec());
        assert!(!range.open_bottom && !range.open_top);

        let host = Range::cidr("10.1.2.3").unwrap();
        assert_eq!(host.bottom, host.top);

        let all = Range::cidr("0.0.0.0/0").unwrap();
        assert_eq!(all.bottom, b"00000000".to_vec());
        assert_eq!(all.top, b"FFFFFFFF".to_vec());
    }

    #[test]
    fn test_cidr_masks_host_bits() {
        let range = Range::cidr("192.168.7.9/16").unwrap();
        assert_eq!(range.bottom, b"C0A80000".to_vec());
        assert_eq!(range.top, b"C0A8FFFF".to_vec());
    }

    #[test]
    fn test_bad_cidr() {
        for bad in ["10.0.0.0/33", "10.0.0.0/x", "nonsense/8", "::/129"] {
            assert!(Range::cidr(bad).is_err(), "Should reject: {}", bad);
        }
    }
}
