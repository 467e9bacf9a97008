//! The predicate vocabulary understood by the automaton.
//!
//! A [`Pattern`] is a match kind plus the *encoded* value(s) it compares
//! against. Encoding conventions are those of the event flattener: string
//! values carry their JSON quotes (`"foo"`), while numbers, booleans and null
//! are bare literals. Numeric patterns hold comparable-number bytes (see
//! [`crate::numbits`]) and CIDR ranges hold hex-encoded addresses (see
//! [`crate::cidr`]).
//!
//! Patterns are immutable and compare structurally, so two rules that ask for
//! the same thing on the same field end up sharing one path in the automaton.

use std::collections::BTreeSet;
use std::fmt;

use crate::error::{Result, RulerError};
use crate::input;
use crate::numbits::{comparable_from_f64, comparable_to_f64, HEX_DIGITS};

/// The kind of a pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MatchType {
    Exact,
    Prefix,
    PrefixEqualsIgnoreCase,
    Suffix,
    SuffixEqualsIgnoreCase,
    EqualsIgnoreCase,
    Wildcard,
    NumericEq,
    NumericRange,
    AnythingBut,
    AnythingButIgnoreCase,
    AnythingButPrefix,
    AnythingButSuffix,
    AnythingButWildcard,
    Exists,
    Absent,
}

impl MatchType {
    /// Kinds whose automaton path is built over the reversed value.
    pub fn is_suffix(self) -> bool {
        matches!(
            self,
            MatchType::Suffix | MatchType::SuffixEqualsIgnoreCase | MatchType::AnythingButSuffix
        )
    }

    /// Kinds that are satisfied as soon as their last byte is consumed,
    /// without requiring the value to end there.
    pub fn matches_before_end(self) -> bool {
        matches!(
            self,
            MatchType::Prefix
                | MatchType::PrefixEqualsIgnoreCase
                | MatchType::Suffix
                | MatchType::SuffixEqualsIgnoreCase
                | MatchType::AnythingButPrefix
                | MatchType::AnythingButSuffix
        )
    }

    /// Kinds whose match *excludes* the value rather than accepting it.
    pub fn is_anything_but(self) -> bool {
        matches!(
            self,
            MatchType::AnythingBut
                | MatchType::AnythingButIgnoreCase
                | MatchType::AnythingButPrefix
                | MatchType::AnythingButSuffix
                | MatchType::AnythingButWildcard
        )
    }

    /// Kinds whose automaton can branch without bound on arbitrary input.
    pub fn has_complexity(self) -> bool {
        matches!(self, MatchType::Wildcard | MatchType::AnythingButWildcard)
    }
}

/// A numeric or IP range over fixed-width hex digit strings.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Range {
    pub(crate) bottom: Vec<u8>,
    pub(crate) open_bottom: bool,
    pub(crate) top: Vec<u8>,
    pub(crate) open_top: bool,
    pub(crate) is_cidr: bool,
}

impl Range {
    /// A numeric range between two bounds. An open bound excludes its value.
    pub fn between(bottom: f64, open_bottom: bool, top: f64, open_top: bool) -> Result<Range> {
        ensure_finite(bottom)?;
        ensure_finite(top)?;
        Range::from_encoded(
            comparable_from_f64(bottom),
            open_bottom,
            comparable_from_f64(top),
            open_top,
            false,
        )
    }

    pub fn less_than(value: f64) -> Result<Range> {
        Range::between(-f64::MAX, false, value, true)
    }

    pub fn less_than_or_equal_to(value: f64) -> Result<Range> {
        Range::between(-f64::MAX, false, value, false)
    }

    pub fn greater_than(value: f64) -> Result<Range> {
        Range::between(value, true, f64::MAX, false)
    }

    pub fn greater_than_or_equal_to(value: f64) -> Result<Range> {
        Range::between(value, false, f64::MAX, false)
    }

    /// Build a range from already-encoded bounds.
    ///
    /// Both bounds must have the same length, consist only of hex digits and
    /// satisfy `bottom <= top`.
    pub fn from_encoded(
        bottom: Vec<u8>,
        open_bottom: bool,
        top: Vec<u8>,
        open_top: bool,
        is_cidr: bool,
    ) -> Result<Range> {
        if bottom.len() != top.len() || bottom.is_empty() {
            return Err(RulerError::InvalidRange(format!(
                "bottom and top must have the same non-zero length ({} vs {})",
                bottom.len(),
                top.len()
            )));
        }
        if !bottom.iter().chain(top.iter()).all(|b| HEX_DIGITS.contains(b)) {
            return Err(RulerError::InvalidRange(
                "bounds must be hex digit strings".to_string(),
            ));
        }
        if bottom > top {
            return Err(RulerError::InvalidRange(
                "bottom must not be greater than top".to_string(),
            ));
        }
        Ok(Range {
            bottom,
            open_bottom,
            top,
            open_top,
            is_cidr,
        })
    }

    pub fn is_cidr(&self) -> bool {
        self.is_cidr
    }

    /// Number of digits in every value this range can match.
    pub fn width(&self) -> usize {
        self.bottom.len()
    }
}

impl fmt::Display for Range {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let open = if self.open_bottom { '(' } else { '[' };
        let close = if self.open_top { ')' } else { ']' };
        if self.is_cidr {
            write!(
                f,
                "{}{}..{}{} cidr",
                open,
                String::from_utf8_lossy(&self.bottom),
                String::from_utf8_lossy(&self.top),
                close
            )
        } else {
            let bottom = comparable_to_f64(&self.bottom).unwrap_or(f64::NAN);
            let top = comparable_to_f64(&self.top).unwrap_or(f64::NAN);
            write!(f, "{}{}..{}{}", open, bottom, top, close)
        }
    }
}

/// A compiled, encoded predicate on one field's value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Pattern {
    /// Single-valued kinds: exact, prefix, suffix, ignore-case variants,
    /// wildcard and numeric equality.
    Value { match_type: MatchType, value: String },
    Range(Range),
    /// Exact anything-but; `numeric` values are comparable-number encoded.
    AnythingBut {
        values: BTreeSet<String>,
        numeric: bool,
    },
    /// The anything-but variants that carry their own match kind.
    AnythingButSet {
        match_type: MatchType,
        values: BTreeSet<String>,
    },
    Exists,
    Absent,
}

impl Pattern {
    pub fn exact(value: impl Into<String>) -> Pattern {
        Pattern::value(MatchType::Exact, value)
    }

    pub fn prefix(value: impl Into<String>) -> Pattern {
        Pattern::value(MatchType::Prefix, value)
    }

    pub fn prefix_equals_ignore_case(value: impl Into<String>) -> Pattern {
        Pattern::value(MatchType::PrefixEqualsIgnoreCase, value)
    }

    /// A suffix match. The value is given in natural order; the automaton
    /// reverses it.
    pub fn suffix(value: impl Into<String>) -> Pattern {
        Pattern::value(MatchType::Suffix, value)
    }

    pub fn suffix_equals_ignore_case(value: impl Into<String>) -> Pattern {
        Pattern::value(MatchType::SuffixEqualsIgnoreCase, value)
    }

    pub fn equals_ignore_case(value: impl Into<String>) -> Pattern {
        Pattern::value(MatchType::EqualsIgnoreCase, value)
    }

    /// A wildcard match where `*` matches any run of bytes and `\*`, `\\`
    /// escape literal characters.
    pub fn wildcard(value: impl Into<String>) -> Result<Pattern> {
        let value = value.into();
        input::parse_wildcard(&value)?;
        Ok(Pattern::value(MatchType::Wildcard, value))
    }

    pub fn numeric_eq(value: f64) -> Result<Pattern> {
        ensure_finite(value)?;
        let encoded = comparable_from_f64(value);
        Ok(Pattern::value(
            MatchType::NumericEq,
            String::from_utf8_lossy(&encoded).into_owned(),
        ))
    }

    pub fn range(range: Range) -> Pattern {
        Pattern::Range(range)
    }

    pub fn anything_but<I, S>(values: I) -> Pattern
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Pattern::AnythingBut {
            values: values.into_iter().map(Into::into).collect(),
            numeric: false,
        }
    }

    pub fn anything_but_numbers<I>(values: I) -> Result<Pattern>
    where
        I: IntoIterator<Item = f64>,
    {
        let mut encoded = BTreeSet::new();
        for value in values {
            ensure_finite(value)?;
            encoded.insert(String::from_utf8_lossy(&comparable_from_f64(value)).into_owned());
        }
        Ok(Pattern::AnythingBut {
            values: encoded,
            numeric: true,
        })
    }

    pub fn anything_but_ignore_case<I, S>(values: I) -> Pattern
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Pattern::anything_but_set(MatchType::AnythingButIgnoreCase, values)
    }

    pub fn anything_but_prefix<I, S>(values: I) -> Pattern
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Pattern::anything_but_set(MatchType::AnythingButPrefix, values)
    }

    pub fn anything_but_suffix<I, S>(values: I) -> Pattern
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Pattern::anything_but_set(MatchType::AnythingButSuffix, values)
    }

    pub fn anything_but_wildcard<I, S>(values: I) -> Result<Pattern>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let pattern = Pattern::anything_but_set(MatchType::AnythingButWildcard, values);
        for value in pattern.values() {
            input::parse_wildcard(value)?;
        }
        Ok(pattern)
    }

    pub fn exists() -> Pattern {
        Pattern::Exists
    }

    pub fn absent() -> Pattern {
        Pattern::Absent
    }

    fn value(match_type: MatchType, value: impl Into<String>) -> Pattern {
        Pattern::Value {
            match_type,
            value: value.into(),
        }
    }

    fn anything_but_set<I, S>(match_type: MatchType, values: I) -> Pattern
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Pattern::AnythingButSet {
            match_type,
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    pub fn match_type(&self) -> MatchType {
        match self {
            Pattern::Value { match_type, .. } => *match_type,
            Pattern::Range(_) => MatchType::NumericRange,
            Pattern::AnythingBut { .. } => MatchType::AnythingBut,
            Pattern::AnythingButSet { match_type, .. } => *match_type,
            Pattern::Exists => MatchType::Exists,
            Pattern::Absent => MatchType::Absent,
        }
    }

    /// The encoded values a byte path is built for. Ranges, existence and
    /// absence have none.
    pub(crate) fn values(&self) -> Vec<&str> {
        match self {
            Pattern::Value { value, .. } => vec![value.as_str()],
            Pattern::AnythingBut { values, .. } | Pattern::AnythingButSet { values, .. } => {
                values.iter().map(String::as_str).collect()
            }
            Pattern::Range(_) | Pattern::Exists | Pattern::Absent => Vec::new(),
        }
    }

    /// True when the pattern compares comparable-number bytes.
    pub(crate) fn is_numeric(&self) -> bool {
        match self {
            Pattern::Value { match_type, .. } => *match_type == MatchType::NumericEq,
            Pattern::Range(range) => !range.is_cidr,
            Pattern::AnythingBut { numeric, .. } => *numeric,
            _ => false,
        }
    }

    pub(crate) fn is_cidr(&self) -> bool {
        matches!(self, Pattern::Range(range) if range.is_cidr)
    }
}

fn ensure_finite(value: f64) -> Result<()> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(RulerError::InvalidPattern(format!(
            "{} is not a finite number",
            value
        )))
    }
}
