//! Street address normalization and display formatting.

use std::sync::LazyLock;

use regex::{Captures, Regex};

use super::{collapse_whitespace, to_title_case};

const STREET_ABBREVIATIONS: &[(&str, &str)] = &[
    ("STREET", "ST"),
    ("AVENUE", "AVE"),
    ("BOULEVARD", "BLVD"),
    ("DRIVE", "DR"),
    ("ROAD", "RD"),
    ("LANE", "LN"),
    ("COURT", "CT"),
    ("CIRCLE", "CIR"),
    ("PLACE", "PL"),
    ("PARKWAY", "PKWY"),
    ("HIGHWAY", "HWY"),
    ("TERRACE", "TER"),
    ("TRAIL", "TRL"),
    ("WAY", "WAY"),
    ("NORTH", "N"),
    ("SOUTH", "S"),
    ("EAST", "E"),
    ("WEST", "W"),
    ("NORTHEAST", "NE"),
    ("NORTHWEST", "NW"),
    ("SOUTHEAST", "SE"),
    ("SOUTHWEST", "SW"),
    ("APARTMENT", "APT"),
    ("SUITE", "STE"),
    ("BUILDING", "BLDG"),
    ("FLOOR", "FL"),
    ("UNIT", "UNIT"),
];

static PUNCTUATION: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[.,#]").unwrap());

/// Unit designator glued to its number: `APT5`, `SUITE4`, `BLDG 2`.
static UNIT_NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(SUITE|STE|APT|UNIT|BLDG)\s*(\d)").unwrap());

static ABBREVIATIONS: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    STREET_ABBREVIATIONS
        .iter()
        .map(|(full, abbr)| (Regex::new(&format!(r"\b{}\b", full)).unwrap(), *abbr))
        .collect()
});

/// Identity form of a street address.
///
/// Uppercases, drops `.`, `,` and `#`, collapses whitespace, separates unit
/// designators from their numbers (`APT5` and `Apt. 5` both become
/// `APT 5`), then applies the street/direction/unit abbreviation table on
/// whole words only.
///
/// ```rust
/// use poolwatch_core::normalizers::normalize_address;
///
/// assert_eq!(normalize_address("100 Main St."), "100 MAIN ST");
/// assert_eq!(normalize_address("100 MAIN ST"), "100 MAIN ST");
/// assert_eq!(
///     normalize_address("2200 north  Lamar Boulevard, Suite #4"),
///     "2200 N LAMAR BLVD STE 4"
/// );
/// ```
pub fn normalize_address(raw: &str) -> String {
    if raw.trim().is_empty() {
        return String::new();
    }
    let upper = raw.to_uppercase();
    let mut normalized = PUNCTUATION.replace_all(&upper, "").into_owned();
    normalized = collapse_whitespace(&normalized);
    normalized = UNIT_NUMBER
        .replace_all(&normalized, |c: &Captures| {
            let unit = if &c[1] == "SUITE" { "STE" } else { &c[1] };
            format!("{} {}", unit, &c[2])
        })
        .into_owned();
    for (pattern, abbr) in ABBREVIATIONS.iter() {
        normalized = pattern.replace_all(&normalized, *abbr).into_owned();
    }
    collapse_whitespace(&normalized)
}

/// Discrete address parts for [`format_display_address`].
#[derive(Debug, Clone, Copy, Default)]
pub struct AddressParts<'a> {
    pub address: &'a str,
    pub city: Option<&'a str>,
    pub state: Option<&'a str>,
    pub zip: Option<&'a str>,
}

/// Cosmetic single-line address: `"123 Main St, Austin, TX 78701"`.
pub fn format_display_address(parts: AddressParts<'_>) -> String {
    let address = to_title_case(parts.address.trim());
    let city = to_title_case(parts.city.unwrap_or("").trim());
    let state = parts.state.unwrap_or("").trim().to_uppercase();
    let zip = parts.zip.unwrap_or("").trim();

    let city_state = [city.as_str(), state.as_str()]
        .iter()
        .filter(|s| !s.is_empty())
        .copied()
        .collect::<Vec<_>>()
        .join(", ");
    let tail = [city_state.as_str(), zip]
        .iter()
        .filter(|s| !s.is_empty())
        .copied()
        .collect::<Vec<_>>()
        .join(" ");

    if tail.is_empty() {
        address
    } else if address.is_empty() {
        tail
    } else {
        format!("{}, {}", address, tail)
    }
}
