//! Canonical Brazilian postal codes (CEP).
//!
//! Every postal code entering the pipeline goes through [`PostalCode::parse`]
//! so that `"64000-000"`, `"64.000-000"`, `" 64000000 "` and the float-typed
//! export `"64000000.0"` all collapse to the same cache key.

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Number of digits in a canonical CEP.
pub const POSTAL_CODE_LEN: usize = 8;

/// Trailing fractional part left behind when a spreadsheet or dataframe
/// exported the postal code column as a float (e.g. `64000000.0`).
static FLOAT_SUFFIX_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([0-9]+)\.0+$").expect("valid regex"));

/// Reasons a raw postal code is rejected by the normalizer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvalidPostalCode {
    /// No digits at all.
    #[error("postal code is empty")]
    Empty,

    /// The all-zeros / all-nines "not informed" marker.
    #[error("postal code {digits} is the \"not informed\" sentinel")]
    Sentinel {
        /// The sentinel digits.
        digits: String,
    },

    /// Digit count does not match the CEP format.
    #[error("postal code {digits} has {len} digits, expected {POSTAL_CODE_LEN}")]
    WrongLength {
        /// The digits that were extracted.
        digits: String,
        /// Number of digits found.
        len: usize,
    },
}

/// A normalized, eight-digit postal code.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PostalCode(String);

impl PostalCode {
    /// Normalizes a raw postal code.
    ///
    /// Strips every non-digit character, restores a single leading zero
    /// lost by numeric exports (seven digits), and rejects empty values,
    /// the all-zeros and all-nines sentinels, and any other length.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidPostalCode`] describing why the value was rejected.
    pub fn parse(raw: &str) -> Result<Self, InvalidPostalCode> {
        let trimmed = raw.trim();
        let integral = FLOAT_SUFFIX_RE
            .captures(trimmed)
            .and_then(|caps| caps.get(1))
            .map_or(trimmed, |m| m.as_str());

        let mut digits: String = integral.chars().filter(char::is_ascii_digit).collect();

        if digits.is_empty() {
            return Err(InvalidPostalCode::Empty);
        }

        if digits.len() == POSTAL_CODE_LEN - 1 {
            digits.insert(0, '0');
        }

        if digits.len() != POSTAL_CODE_LEN {
            let len = digits.len();
            return Err(InvalidPostalCode::WrongLength { digits, len });
        }

        if is_sentinel(&digits) {
            return Err(InvalidPostalCode::Sentinel { digits });
        }

        Ok(Self(digits))
    }

    /// Returns the eight canonical digits.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the first `len` digits (clamped to the code length).
    #[must_use]
    pub fn prefix(&self, len: usize) -> &str {
        &self.0[..len.min(POSTAL_CODE_LEN)]
    }

    /// Returns the conventional `NNNNN-NNN` presentation.
    #[must_use]
    pub fn formatted(&self) -> String {
        format!("{}-{}", &self.0[..5], &self.0[5..])
    }
}

fn is_sentinel(digits: &str) -> bool {
    digits.bytes().all(|b| b == b'0') || digits.bytes().all(|b| b == b'9')
}

impl fmt::Display for PostalCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for PostalCode {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl FromStr for PostalCode {
    type Err = InvalidPostalCode;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for PostalCode {
    type Error = InvalidPostalCode;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<PostalCode> for String {
    fn from(code: PostalCode) -> Self {
        code.0
    }
}
