use lazy_static::lazy_static;
use regex::Regex;
use unicode_normalization::UnicodeNormalization;
use unicode_normalization::char::is_combining_mark;

lazy_static! {
    static ref DIGIT_RUN: Regex = Regex::new(r"\d+").unwrap();
}

/// Lower-cases, strips diacritics and collapses whitespace.
///
/// `"  Rodovia   Raposo Tavares "` and `"RODOVIA RAPOSO TAVARES"` both become
/// `"rodovia raposo tavares"`.
pub fn normalize(input: &str) -> String {
    // lowercasing first, some uppercase letters decompose into a base plus a mark
    let lowered = input.to_lowercase();
    let stripped: String = lowered.nfd().filter(|c| !is_combining_mark(*c)).collect();
    stripped.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// `normalize` followed by dropping every non-alphanumeric character.
///
/// `"SP-270"`, `"sp 270"` and `"SP270"` all become `"sp270"`.
pub fn normalize_aggressive(input: &str) -> String {
    normalize(input)
        .chars()
        .filter(|c| c.is_alphanumeric())
        .collect()
}

/// Runs of ASCII digits in order of appearance.
pub fn numeric_tokens(input: &str) -> Vec<&str> {
    DIGIT_RUN.find_iter(input).map(|m| m.as_str()).collect()
}

/// How a candidate road name was matched against a query.
/// Variants are ordered from strongest to weakest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RoadMatch {
    Exact,
    CandidateContainsQuery,
    QueryContainsCandidate,
    SharedNumbers,
}

/// Ranks road identity between a query and a candidate name.
pub fn road_match(query: &str, candidate: &str) -> Option<RoadMatch> {
    let q = normalize_aggressive(query);
    let c = normalize_aggressive(candidate);

    if q.is_empty() || c.is_empty() {
        return None;
    }

    if q == c {
        return Some(RoadMatch::Exact);
    }
    if c.contains(q.as_str()) {
        return Some(RoadMatch::CandidateContainsQuery);
    }
    if q.contains(c.as_str()) {
        return Some(RoadMatch::QueryContainsCandidate);
    }

    let query_numbers = numeric_tokens(query);
    if !query_numbers.is_empty() && query_numbers.iter().all(|n| c.contains(*n)) {
        return Some(RoadMatch::SharedNumbers);
    }

    None
}

/// Best matching key for `query`, ties broken by the smallest key.
pub fn best_road_key<'a, I>(query: &str, keys: I) -> Option<(&'a str, RoadMatch)>
where
    I: IntoIterator<Item = &'a str>,
{
    keys.into_iter()
        .filter_map(|key| road_match(query, key).map(|tier| (key, tier)))
        .min_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.cmp(b.0)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize() {
        assert_eq!(normalize("  Rodovia   Raposo Tavares "), "rodovia raposo tavares");
        assert_eq!(normalize("LOCALIZAÇÃO"), "localizacao");
        assert_eq!(normalize("Município\tde  São Paulo"), "municipio de sao paulo");
        assert_eq!(normalize(""), "");
    }

    #[test]
    fn test_normalize_idempotent() {
        for s in ["São Roque", "İstanbul", "SPA 294/250", "  ÁÉÍ  óú ", "km_inicial"] {
            let once = normalize(s);
            assert_eq!(normalize(&once), once, "{s}");

            let once = normalize_aggressive(s);
            assert_eq!(normalize_aggressive(&once), once, "{s}");
        }
    }

    #[test]
    fn test_normalize_aggressive() {
        assert_eq!(normalize_aggressive("SP-270"), "sp270");
        assert_eq!(normalize_aggressive("sp 270"), "sp270");
        assert_eq!(normalize_aggressive("SPA 294/250"), "spa294250");
    }

    #[test]
    fn test_numeric_tokens() {
        assert_eq!(numeric_tokens("SPA 294/250"), vec!["294", "250"]);
        assert!(numeric_tokens("Rodovia").is_empty());
    }

    #[test]
    fn test_road_match_tiers() {
        assert_eq!(road_match("SP 270", "sp-270"), Some(RoadMatch::Exact));
        assert_eq!(
            road_match("SP270", "SP270 Raposo Tavares"),
            Some(RoadMatch::CandidateContainsQuery)
        );
        assert_eq!(
            road_match("SP270 Vang", "SP270"),
            Some(RoadMatch::QueryContainsCandidate)
        );
        assert_eq!(
            road_match("SPA 294/250", "Acesso 294 - 250"),
            Some(RoadMatch::SharedNumbers)
        );
        assert_eq!(road_match("SP270", "SP280"), None);
        assert_eq!(road_match("", "SP280"), None);
    }

    #[test]
    fn test_best_road_key() {
        let keys = ["SP270 Raposo", "SP270", "SP 280"];
        assert_eq!(
            best_road_key("sp-270", keys.iter().copied()),
            Some(("SP270", RoadMatch::Exact))
        );
        assert_eq!(best_road_key("SP999", keys.iter().copied()), None);
    }
}
