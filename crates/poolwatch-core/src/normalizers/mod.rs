//! Source-agnostic normalizers.
//!
//! Pure functions that map free text onto identity keys and controlled
//! vocabularies. Identity keys ([`normalize_address`],
//! [`normalize_facility_name`]) must be stable across sources; the display
//! formatters are cosmetic and never feed back into identity.

mod address;
mod inspection;
mod name;

use std::sync::LazyLock;

use regex::{Captures, Regex};

pub use address::{format_display_address, normalize_address, AddressParts};
pub use inspection::{is_closure, is_passing, normalize_inspection_result, normalize_inspection_type};
pub use name::{format_display_name, normalize_facility_name};

static CORPORATE_SUFFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(llc|inc|lp|corp)\b").unwrap());
static MC_PREFIX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\bMc([a-z])").unwrap());
static O_PREFIX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\bO'([a-z])").unwrap());

/// Trim and squeeze runs of whitespace to one space.
pub(crate) fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Capitalize the first letter of each word and lowercase the rest.
///
/// Corporate suffixes stay uppercase; `Mc` and `O'` prefixes capitalize the
/// following letter.
///
/// ```rust
/// use poolwatch_core::normalizers::to_title_case;
/// assert_eq!(to_title_case("MCDONALD POOLS LLC"), "McDonald Pools LLC");
/// assert_eq!(to_title_case("o'brien court"), "O'Brien Court");
/// ```
pub fn to_title_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut at_word_start = true;
    for ch in s.chars() {
        if ch.is_alphanumeric() {
            if at_word_start {
                out.extend(ch.to_uppercase());
            } else {
                out.extend(ch.to_lowercase());
            }
            at_word_start = false;
        } else {
            out.push(ch);
            at_word_start = true;
        }
    }

    let out = CORPORATE_SUFFIX.replace_all(&out, |c: &Captures| c[1].to_uppercase());
    let out = MC_PREFIX.replace_all(&out, |c: &Captures| format!("Mc{}", c[1].to_uppercase()));
    let out = O_PREFIX.replace_all(&out, |c: &Captures| format!("O'{}", c[1].to_uppercase()));
    out.into_owned()
}
