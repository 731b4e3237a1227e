//! Fixed two-decimal grade values.
//!
//! Grades are held as exact integer hundredths so that a value written to
//! the target and a value read back compare without floating-point noise.
//!
//! Rounding rule: a value is first taken as its shortest round-trip decimal
//! text, then rounded half-to-even at the second decimal place. So
//! `0.005 -> 0.00`, `0.015 -> 0.02`, `55.555 -> 55.56`.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// A grade in hundredths, rendered with fixed two-decimal formatting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Grade {
    hundredths: i64,
}

/// Errors raised while converting raw values into a [`Grade`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GradeError {
    #[error("grade is empty")]
    Empty,

    #[error("grade is not a finite number")]
    NonFinite,

    #[error("grade is not a decimal number: {0:?}")]
    Malformed(String),

    #[error("grade is out of range: {0:?}")]
    OutOfRange(String),
}

impl Grade {
    pub const ZERO: Grade = Grade { hundredths: 0 };

    pub fn from_hundredths(hundredths: i64) -> Self {
        Self { hundredths }
    }

    pub fn hundredths(&self) -> i64 {
        self.hundredths
    }

    /// Convert a floating value through its shortest decimal text.
    pub fn from_f64(value: f64) -> Result<Self, GradeError> {
        if !value.is_finite() {
            return Err(GradeError::NonFinite);
        }
        Self::from_decimal_str(&format!("{value}"))
    }

    /// Parse plain decimal text (`[+-]digits[.digits]`), rounding half-to-even.
    pub fn from_decimal_str(raw: &str) -> Result<Self, GradeError> {
        let text = raw.trim();
        if text.is_empty() {
            return Err(GradeError::Empty);
        }

        let (negative, unsigned) = match text.as_bytes()[0] {
            b'-' => (true, &text[1..]),
            b'+' => (false, &text[1..]),
            _ => (false, text),
        };
        let (int_part, frac_part) = match unsigned.split_once('.') {
            Some((int_part, frac_part)) => (int_part, frac_part),
            None => (unsigned, ""),
        };
        let all_digits = |s: &str| s.bytes().all(|b| b.is_ascii_digit());
        if (int_part.is_empty() && frac_part.is_empty())
            || !all_digits(int_part)
            || !all_digits(frac_part)
        {
            return Err(GradeError::Malformed(raw.to_string()));
        }

        let out_of_range = || GradeError::OutOfRange(raw.to_string());
        let mut whole: i64 = 0;
        for digit in int_part.bytes() {
            whole = whole
                .checked_mul(10)
                .and_then(|w| w.checked_add(i64::from(digit - b'0')))
                .ok_or_else(out_of_range)?;
        }

        let frac = frac_part.as_bytes();
        let digit_at = |idx: usize| frac.get(idx).map_or(0, |b| i64::from(b - b'0'));
        let mut hundredths = whole
            .checked_mul(100)
            .and_then(|w| w.checked_add(digit_at(0) * 10 + digit_at(1)))
            .ok_or_else(out_of_range)?;

        if frac.len() > 2 {
            let first_dropped = frac[2];
            let tail_nonzero = frac[3..].iter().any(|b| *b != b'0');
            let round_up = first_dropped > b'5'
                || (first_dropped == b'5' && (tail_nonzero || hundredths % 2 == 1));
            if round_up {
                hundredths = hundredths.checked_add(1).ok_or_else(out_of_range)?;
            }
        }

        if negative {
            hundredths = -hundredths;
        }
        Ok(Self { hundredths })
    }

    /// Whether a value read back from the target equals this grade after
    /// both sides are formatted to two decimals.
    pub fn matches_rendered(&self, rendered: &str) -> bool {
        match Self::from_decimal_str(rendered) {
            Ok(parsed) => parsed == *self,
            Err(_) => rendered.trim() == self.to_string(),
        }
    }
}

impl fmt::Display for Grade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.hundredths < 0 { "-" } else { "" };
        let abs = self.hundredths.unsigned_abs();
        write!(f, "{sign}{}.{:02}", abs / 100, abs % 100)
    }
}

impl FromStr for Grade {
    type Err = GradeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_decimal_str(s)
    }
}

impl Serialize for Grade {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Grade {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Number(f64),
            Text(String),
        }

        let parsed = match Raw::deserialize(deserializer)? {
            Raw::Number(value) => Grade::from_f64(value),
            Raw::Text(text) => Grade::from_decimal_str(&text),
        };
        parsed.map_err(serde::de::Error::custom)
    }
}
