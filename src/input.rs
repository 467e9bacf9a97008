//! Turning pattern values into the characters the byte automaton is built from.
//!
//! Most kinds map one-to-one onto UTF-8 bytes. Ignore-case kinds expand every
//! character into the set of its case variants, suffix kinds reverse the
//! sequence so it can be matched against a reversed value, and wildcard kinds
//! recognise `*` with `\*` and `\\` as escapes.

use crate::error::{Result, RulerError};
use crate::pattern::MatchType;

/// One position of a pattern value as seen by the automaton builder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputCharacter {
    Byte(u8),
    /// Alternative byte sequences for one character, at least two of them.
    MultiByteSet(Vec<Vec<u8>>),
    Wildcard,
}

/// Parse `value` according to the rules of `match_type`.
pub fn parse(match_type: MatchType, value: &str) -> Result<Vec<InputCharacter>> {
    match match_type {
        MatchType::Wildcard | MatchType::AnythingButWildcard => parse_wildcard(value),
        MatchType::EqualsIgnoreCase
        | MatchType::PrefixEqualsIgnoreCase
        | MatchType::AnythingButIgnoreCase => Ok(parse_ignore_case(value)),
        MatchType::SuffixEqualsIgnoreCase => Ok(reverse(parse_ignore_case(value))),
        MatchType::Suffix | MatchType::AnythingButSuffix => {
            Ok(value.bytes().rev().map(InputCharacter::Byte).collect())
        }
        MatchType::Exact
        | MatchType::Prefix
        | MatchType::NumericEq
        | MatchType::AnythingBut
        | MatchType::AnythingButPrefix => Ok(value.bytes().map(InputCharacter::Byte).collect()),
        MatchType::NumericRange | MatchType::Exists | MatchType::Absent => {
            Err(RulerError::UnsupportedPattern(match_type))
        }
    }
}

/// Parse a wildcard value. Consecutive `*` and unknown escapes are rejected.
pub fn parse_wildcard(value: &str) -> Result<Vec<InputCharacter>> {
    let bytes = value.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => {
                match bytes.get(i + 1) {
                    Some(&escaped @ (b'*' | b'\\')) => out.push(InputCharacter::Byte(escaped)),
                    _ => {
                        return Err(RulerError::InvalidPattern(format!(
                            "invalid escape at offset {} in wildcard {}",
                            i, value
                        )))
                    }
                }
                i += 2;
            }
            b'*' => {
                if out.last() == Some(&InputCharacter::Wildcard) {
                    return Err(RulerError::InvalidPattern(format!(
                        "consecutive wildcard characters at offset {} in {}",
                        i, value
                    )));
                }
                out.push(InputCharacter::Wildcard);
                i += 1;
            }
            b => {
                out.push(InputCharacter::Byte(b));
                i += 1;
            }
        }
    }
    Ok(out)
}

fn parse_ignore_case(value: &str) -> Vec<InputCharacter> {
    let mut out = Vec::with_capacity(value.len());
    let mut buf = [0u8; 4];
    for c in value.chars() {
        let mut variants: Vec<Vec<u8>> = vec![c.encode_utf8(&mut buf).as_bytes().to_vec()];
        for variant in [
            c.to_lowercase().collect::<String>(),
            c.to_uppercase().collect::<String>(),
        ] {
            let variant = variant.into_bytes();
            if !variants.contains(&variant) {
                variants.push(variant);
            }
        }
        if variants.len() == 1 {
            out.extend(variants[0].iter().copied().map(InputCharacter::Byte));
        } else {
            out.push(InputCharacter::MultiByteSet(variants));
        }
    }
    out
}

fn reverse(chars: Vec<InputCharacter>) -> Vec<InputCharacter> {
    chars
        .into_iter()
        .rev()
        .map(|c| match c {
            InputCharacter::MultiByteSet(variants) => InputCharacter::MultiByteSet(
                variants
                    .into_iter()
                    .map(|mut v| {
                        v.reverse();
                        v
                    })
                    .collect(),
            ),
            other => other,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use InputCharacter::*;

    #[test]
    fn test_plain_bytes() {
        assert_eq!(
            parse(MatchType::Exact, "ab").unwrap(),
            vec![Byte(b'a'), Byte(b'b')]
        );
    }

    #[test]
    fn test_suffix_reverses() {
        assert_eq!(
            parse(MatchType::Suffix, "ab\"").unwrap(),
            vec![Byte(b'"'), Byte(b'b'), Byte(b'a')]
        );
    }

    #[test]
    fn test_wildcard_and_escapes() {
        assert_eq!(
            parse(MatchType::Wildcard, "a*\\*\\\\").unwrap(),
            vec![Byte(b'a'), Wildcard, Byte(b'*'), Byte(b'\\')]
        );
        assert!(parse(MatchType::Wildcard, "a**").is_err());
        assert!(parse(MatchType::Wildcard, "a\\b").is_err());
        assert!(parse(MatchType::Wildcard, "trailing\\").is_err());
    }

    #[test]
    fn test_ignore_case_variants() {
        let chars = parse(MatchType::EqualsIgnoreCase, "a1").unwrap();
        assert_eq!(
            chars,
            vec![MultiByteSet(vec![b"a".to_vec(), b"A".to_vec()]), Byte(b'1')]
        );
    }

    #[test]
    fn test_ignore_case_multibyte() {
        let chars = parse(MatchType::EqualsIgnoreCase, "é").unwrap();
        assert_eq!(
            chars,
            vec![MultiByteSet(vec![vec![0xc3, 0xa9], vec![0xc3, 0x89]])]
        );
    }

    #[test]
    fn test_suffix_ignore_case_reverses_variants() {
        let chars = parse(MatchType::SuffixEqualsIgnoreCase, "é\"").unwrap();
        assert_eq!(
            chars,
            vec![
                Byte(b'"'),
                MultiByteSet(vec![vec![0xa9, 0xc3], vec![0x89, 0xc3]])
            ]
        );
    }

    #[test]
    fn test_valueless_kinds_are_unsupported() {
        assert_eq!(
            parse(MatchType::Absent, "x"),
            Err(RulerError::UnsupportedPattern(MatchType::Absent))
        );
    }
}
