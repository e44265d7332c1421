use crate::normalize::normalize;
use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref DECIMAL_PREFIX: Regex = Regex::new(r"^[+-]?\d+(?:[.,]\d+)?").unwrap();
}

/// One spreadsheet row: header names mapped to cell text, in column order.
///
/// Header spelling varies between exports (`KM INICIAL`, `km_inicial`,
/// `Km Inicial`), so fields are read through [`extract_field`] instead of by
/// exact name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawRecord {
    fields: Vec<(String, String)>,
}

impl RawRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets `key`, replacing the value if the header already exists.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.fields.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = value,
            None => self.fields.push((key, value)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(k, _)| k.as_str())
    }

    /// Positional access, for sheets whose headers are unusable.
    pub fn value_at(&self, index: usize) -> Option<&str> {
        self.fields.get(index).map(|(_, v)| v.trim())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for RawRecord {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let mut record = RawRecord::new();
        for (k, v) in iter {
            record.insert(k, v);
        }
        record
    }
}

/// Reads the first field matching one of `candidates`.
///
/// Every candidate is first tried verbatim. After that, candidate by
/// candidate, the diacritic and case insensitive key is tried, then any key
/// containing the candidate. The returned value is trimmed.
pub fn extract_field<'a>(record: &'a RawRecord, candidates: &[&str]) -> Option<&'a str> {
    for candidate in candidates {
        if let Some(value) = record.get(candidate) {
            return Some(value.trim());
        }
    }

    let normalized_keys: Vec<(String, &str)> = record
        .iter()
        .map(|(k, v)| (normalize(k), v))
        .collect();

    for candidate in candidates {
        let wanted = normalize(candidate);
        if wanted.is_empty() {
            continue;
        }

        if let Some((_, value)) = normalized_keys.iter().find(|(k, _)| *k == wanted) {
            return Some(value.trim());
        }

        if let Some((_, value)) = normalized_keys.iter().find(|(k, _)| k.contains(&wanted)) {
            return Some(value.trim());
        }
    }

    None
}

/// [`extract_field`] with a positional fallback column.
pub fn field_or_position<'a>(
    record: &'a RawRecord,
    candidates: &[&str],
    position: usize,
) -> Option<&'a str> {
    extract_field(record, candidates)
        .filter(|v| !v.is_empty())
        .or_else(|| record.value_at(position).filter(|v| !v.is_empty()))
}

/// Parses the leading number of a cell, accepting a decimal comma.
///
/// `"10,5"` and `"10.5 km"` both give `10.5`.
pub fn parse_decimal(text: &str) -> Option<f64> {
    let m = DECIMAL_PREFIX.find(text.trim())?;
    m.as_str()
        .replacen(',', ".", 1)
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
}
