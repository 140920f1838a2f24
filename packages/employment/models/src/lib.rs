#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Employment record types and postal code normalization.
//!
//! One [`EmploymentRecord`] is one establishment row from the annual
//! formal-employment extract: the municipality, the establishment's postal
//! code, the number of active formal job bonds, and the reference year.

pub mod postal_code;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use postal_code::{InvalidPostalCode, POSTAL_CODE_LEN, PostalCode};

/// An accepted employment row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmploymentRecord {
    /// IBGE municipality code (e.g. `"2211001"` for Teresina).
    pub municipality_id: String,
    /// Normalized establishment postal code.
    pub postal_code: PostalCode,
    /// Active formal job bonds on December 31st. Always positive.
    pub active_bonds: u64,
    /// Reference year.
    pub year: u16,
}

/// A row as it appears in the extraction CSV, before validation.
///
/// Column names follow the upstream query (`id_municipio`, `cep`,
/// `quantidade_vinculos_ativos`, `ano`); the English names are accepted
/// too.
#[derive(Debug, Clone, Deserialize)]
pub struct RawEmploymentRow {
    /// Municipality identifier.
    #[serde(alias = "id_municipio")]
    pub municipality_id: String,
    /// Raw postal code, possibly formatted or float-typed.
    #[serde(alias = "cep", default)]
    pub postal_code: Option<String>,
    /// Raw bond count.
    #[serde(alias = "quantidade_vinculos_ativos")]
    pub active_bonds: String,
    /// Raw year.
    #[serde(alias = "ano")]
    pub year: String,
}

/// Why a raw row did not become an [`EmploymentRecord`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RecordRejection {
    /// The postal code failed normalization.
    #[error(transparent)]
    InvalidPostalCode(#[from] InvalidPostalCode),

    /// The bond count is zero or negative.
    #[error("non-positive active bond count {value}")]
    NonPositiveBonds {
        /// Parsed value.
        value: i64,
    },

    /// The bond count is not an integer.
    #[error("malformed active bond count {value:?}")]
    MalformedBonds {
        /// Raw value.
        value: String,
    },

    /// The year is not a four-digit integer.
    #[error("malformed year {value:?}")]
    MalformedYear {
        /// Raw value.
        value: String,
    },
}

impl RawEmploymentRow {
    /// Validates the row and normalizes its postal code.
    ///
    /// # Errors
    ///
    /// Returns [`RecordRejection`] if the postal code is invalid, or the
    /// bond count or year cannot be used.
    pub fn into_record(self) -> Result<EmploymentRecord, RecordRejection> {
        let postal_code = PostalCode::parse(self.postal_code.as_deref().unwrap_or_default())?;

        let bonds = parse_integral(&self.active_bonds).ok_or_else(|| {
            RecordRejection::MalformedBonds {
                value: self.active_bonds.clone(),
            }
        })?;
        let active_bonds = u64::try_from(bonds)
            .ok()
            .filter(|b| *b > 0)
            .ok_or(RecordRejection::NonPositiveBonds { value: bonds })?;

        let year = parse_integral(&self.year)
            .and_then(|y| u16::try_from(y).ok())
            .filter(|y| (1000..=9999).contains(y))
            .ok_or_else(|| RecordRejection::MalformedYear {
                value: self.year.clone(),
            })?;

        Ok(EmploymentRecord {
            municipality_id: self.municipality_id.trim().to_string(),
            postal_code,
            active_bonds,
            year,
        })
    }
}

/// Parses an integer that may have been exported as `"15"` or `"15.0"`.
fn parse_integral(raw: &str) -> Option<i64> {
    let raw = raw.trim();
    if let Ok(v) = raw.parse::<i64>() {
        return Some(v);
    }
    let (int_part, frac) = raw.split_once('.')?;
    if frac.bytes().all(|b| b == b'0') {
        int_part.parse().ok()
    } else {
        None
    }
}
