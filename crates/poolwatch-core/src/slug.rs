//! Human-readable facility slugs.
//!
//! A slug is `<slugified name>-<jurisdiction slug>`; collisions get a
//! numeric suffix (`-1`, `-2`, …) and, if a concurrent writer still wins
//! the race, one random suffix. Uniqueness checks against storage live in
//! the resolver; this module is pure.

use uuid::Uuid;

/// Lowercase ASCII alphanumerics separated by single dashes.
///
/// ```rust
/// use poolwatch_core::slug::slugify;
/// assert_eq!(slugify("  The Oaks @ Barton Creek!! "), "the-oaks-barton-creek");
/// assert_eq!(slugify("Café Pool"), "caf-pool");
/// ```
pub fn slugify(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut pending_dash = false;
    for ch in text.chars() {
        if ch.is_ascii_alphanumeric() {
            if pending_dash && !out.is_empty() {
                out.push('-');
            }
            pending_dash = false;
            out.push(ch.to_ascii_lowercase());
        } else if ch.is_whitespace() || ch == '-' || ch == '_' || ch == '/' || ch == '&' || ch == '@'
        {
            pending_dash = true;
        }
    }
    out
}

/// Base slug for a facility name within a jurisdiction.
pub fn base_slug(name: &str, jurisdiction_slug: &str) -> String {
    let base = slugify(name);
    let base = if base.is_empty() {
        "facility".to_string()
    } else {
        base
    };
    if jurisdiction_slug.is_empty() {
        base
    } else {
        format!("{}-{}", base, jurisdiction_slug)
    }
}

/// The `n`-th collision candidate: `base` for 0, `base-n` otherwise.
pub fn numbered_slug(base: &str, n: u32) -> String {
    if n == 0 {
        base.to_string()
    } else {
        format!("{}-{}", base, n)
    }
}

/// `base` plus a short random suffix, used once after losing a slug race.
pub fn randomized_slug(base: &str) -> String {
    let id = Uuid::new_v4().simple().to_string();
    format!("{}-{}", base, &id[..8])
}
