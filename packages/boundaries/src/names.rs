//! Region name field detection and name normalization.
//!
//! Municipal boundary files do not agree on what the name column is
//! called, and the same neighborhood is spelled with and without accents
//! across sources (`"Fátima"` vs `"FATIMA"`). Names are normalized so that
//! both spellings land in the same region.

/// Property names tried, in order, before falling back to
/// [`NAME_FIELD_HINTS`].
pub const NAME_FIELD_CANDIDATES: &[&str] = &[
    "nomebairro",
    "BAIRRO",
    "BAIRROS",
    "NOME",
    "NM_BAIRRO",
    "Nome_Bairro",
    "ZONA",
    "NM_ZONA",
];

/// Substrings (compared uppercased) that mark a likely name property.
pub const NAME_FIELD_HINTS: &[&str] = &["BAIRRO", "NOME", "NM_", "ZONA"];

/// Picks the name property from `keys`.
///
/// An exact [`NAME_FIELD_CANDIDATES`] match wins, in candidate order;
/// otherwise the first key containing one of the [`NAME_FIELD_HINTS`].
#[must_use]
pub fn detect_name_field(keys: &[&str]) -> Option<String> {
    NAME_FIELD_CANDIDATES
        .iter()
        .find(|candidate| keys.contains(candidate))
        .map(|candidate| (*candidate).to_string())
        .or_else(|| {
            keys.iter()
                .find(|key| {
                    let upper = key.to_uppercase();
                    NAME_FIELD_HINTS.iter().any(|hint| upper.contains(hint))
                })
                .map(|key| (*key).to_string())
        })
}

/// Normalizes a region name: trims, uppercases, folds Portuguese
/// diacritics to ASCII, and collapses internal whitespace.
///
/// ```
/// use employment_map_boundaries::names::normalize_name;
///
/// assert_eq!(normalize_name("  Fátima "), "FATIMA");
/// assert_eq!(normalize_name("São  Cristóvão"), "SAO CRISTOVAO");
/// ```
#[must_use]
pub fn normalize_name(raw: &str) -> String {
    raw.split_whitespace()
        .map(|word| {
            word.chars()
                .flat_map(char::to_uppercase)
                .filter_map(fold_diacritic)
                .collect::<String>()
        })
        .filter(|word| !word.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Maps an uppercase letter to its unaccented form. Combining marks are
/// dropped.
const fn fold_diacritic(c: char) -> Option<char> {
    let folded = match c {
        'Á' | 'À' | 'Â' | 'Ã' | 'Ä' => 'A',
        'É' | 'È' | 'Ê' | 'Ë' => 'E',
        'Í' | 'Ì' | 'Î' | 'Ï' => 'I',
        'Ó' | 'Ò' | 'Ô' | 'Õ' | 'Ö' => 'O',
        'Ú' | 'Ù' | 'Û' | 'Ü' => 'U',
        'Ç' => 'C',
        'Ñ' => 'N',
        '\u{0300}'..='\u{036F}' => return None,
        other => other,
    };
    Some(folded)
}
