//! Facility name normalization.

use std::sync::LazyLock;

use regex::{Captures, Regex};

use super::{collapse_whitespace, to_title_case};

static QUOTES: LazyLock<Regex> = LazyLock::new(|| Regex::new(r#"['"]"#).unwrap());
static LEADING_THE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^THE\s+").unwrap());
static GENERIC_SUFFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\s+(POOL|SPA|HOT TUB|SWIMMING POOL|AQUATIC CENTER)$").unwrap()
});

static CORPORATE: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    [
        (r"\bL\.?L\.?C\b\.?", "LLC"),
        (r"\bINC\b\.?", "INC"),
        (r"\bCORP\b\.?", "CORP"),
        (r"\bCO\b\.?", "CO"),
        (r"\bL\.?P\b\.?", "LP"),
    ]
    .into_iter()
    .map(|(pattern, canonical)| (Regex::new(pattern).unwrap(), canonical))
    .collect()
});

static DISPLAY_ACRONYMS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(co|hoa|ymca)\b").unwrap());

/// Identity form of a facility name.
///
/// ```rust
/// use poolwatch_core::normalizers::normalize_facility_name;
///
/// assert_eq!(normalize_facility_name("City Pool"), "CITY");
/// assert_eq!(normalize_facility_name("CITY POOL"), "CITY");
/// assert_eq!(normalize_facility_name("The Oaks Swimming Pool"), "OAKS");
/// assert_eq!(normalize_facility_name("Acme Pools, L.L.C."), "ACME POOLS, LLC");
/// ```
pub fn normalize_facility_name(raw: &str) -> String {
    let upper = collapse_whitespace(&raw.to_uppercase());
    if upper.is_empty() {
        return upper;
    }
    let mut name = QUOTES.replace_all(&upper, "").into_owned();
    name = LEADING_THE.replace(&name, "").into_owned();
    name = GENERIC_SUFFIX.replace(&name, "").into_owned();
    for (pattern, canonical) in CORPORATE.iter() {
        name = pattern.replace_all(&name, *canonical).into_owned();
    }
    name.trim().to_string()
}

/// Cosmetic facility name: title case with common acronyms restored.
///
/// ```rust
/// use poolwatch_core::normalizers::format_display_name;
/// assert_eq!(format_display_name("WESTLAKE HOA POOL"), "Westlake HOA Pool");
/// ```
pub fn format_display_name(raw: &str) -> String {
    let titled = to_title_case(collapse_whitespace(raw).as_str());
    DISPLAY_ACRONYMS
        .replace_all(&titled, |c: &Captures| c[1].to_uppercase())
        .into_owned()
}
