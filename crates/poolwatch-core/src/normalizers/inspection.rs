//! Inspection result and type vocabularies.
//!
//! Lookup is an exact match on the uppercased, trimmed text first. Failing
//! that, the longest table key contained in the text wins, so
//! `"UNSATISFACTORY"` resolves through its own entry rather than through
//! `"SATISFACTORY"`. Anything left over maps to `Other`.

use crate::models::{InspectionResult, InspectionType};

const RESULT_TABLE: &[(&str, InspectionResult)] = &[
    ("PASS", InspectionResult::Pass),
    ("PASSED", InspectionResult::Pass),
    ("COMPLIANT", InspectionResult::Pass),
    ("APPROVED", InspectionResult::Pass),
    ("SATISFACTORY", InspectionResult::Pass),
    ("IN COMPLIANCE", InspectionResult::Pass),
    ("ADEQUATE", InspectionResult::Pass),
    ("FAIL", InspectionResult::Fail),
    ("FAILED", InspectionResult::Fail),
    ("NON-COMPLIANT", InspectionResult::Fail),
    ("NON COMPLIANT", InspectionResult::Fail),
    ("NONCOMPLIANT", InspectionResult::Fail),
    ("NOT IN COMPLIANCE", InspectionResult::Fail),
    ("UNSATISFACTORY", InspectionResult::Fail),
    ("CLOSED", InspectionResult::Closed),
    ("CLOSURE", InspectionResult::Closed),
    ("CLOSED FOR INSPECTION", InspectionResult::Closed),
    ("SUSPENDED", InspectionResult::Closed),
    ("CONDITIONAL", InspectionResult::ConditionalPass),
    ("CONDITIONAL PASS", InspectionResult::ConditionalPass),
    ("CONDITIONALLY APPROVED", InspectionResult::ConditionalPass),
    ("PASS WITH CONDITIONS", InspectionResult::ConditionalPass),
    ("NOT INSPECTED", InspectionResult::NotInspected),
    ("NO INSPECTION", InspectionResult::NotInspected),
    ("CANCELLED", InspectionResult::NotInspected),
    ("CANCELED", InspectionResult::NotInspected),
    ("NO ACCESS", InspectionResult::NotInspected),
    ("PENDING", InspectionResult::Pending),
    ("IN PROGRESS", InspectionResult::Pending),
    ("SCHEDULED", InspectionResult::Pending),
];

const TYPE_TABLE: &[(&str, InspectionType)] = &[
    ("ROUTINE", InspectionType::Routine),
    ("REGULAR", InspectionType::Routine),
    ("ANNUAL", InspectionType::Routine),
    ("SCHEDULED", InspectionType::Routine),
    ("FOLLOW-UP", InspectionType::FollowUp),
    ("FOLLOW_UP", InspectionType::FollowUp),
    ("FOLLOWUP", InspectionType::FollowUp),
    ("FOLLOW UP", InspectionType::FollowUp),
    ("REINSPECTION", InspectionType::Reinspection),
    ("RE-INSPECTION", InspectionType::Reinspection),
    ("COMPLAINT", InspectionType::Complaint),
    ("COMPLAINT BASED", InspectionType::Complaint),
    ("OPENING", InspectionType::Opening),
    ("PRE-OPENING", InspectionType::Opening),
    ("NEW CONSTRUCTION", InspectionType::Opening),
    ("INITIAL", InspectionType::Opening),
    ("CLOSING", InspectionType::Closing),
    ("CLOSURE", InspectionType::Closing),
];

fn lookup<T: Copy>(table: &[(&str, T)], raw: &str, fallback: T) -> Option<T> {
    let text = raw.trim().to_uppercase();
    if text.is_empty() {
        return None;
    }
    if let Some((_, v)) = table.iter().find(|(k, _)| *k == text) {
        return Some(*v);
    }
    let mut best: Option<(&str, T)> = None;
    for (key, value) in table {
        if text.contains(key) && best.map_or(true, |(b, _)| key.len() > b.len()) {
            best = Some((key, *value));
        }
    }
    Some(best.map_or(fallback, |(_, v)| v))
}

/// Map free-text result onto [`InspectionResult`]. `None` for blank input.
///
/// ```rust
/// use poolwatch_core::models::InspectionResult;
/// use poolwatch_core::normalizers::normalize_inspection_result;
///
/// assert_eq!(normalize_inspection_result("Satisfactory"), Some(InspectionResult::Pass));
/// assert_eq!(normalize_inspection_result("Violations Found"), Some(InspectionResult::Other));
/// assert_eq!(normalize_inspection_result("  "), None);
/// ```
pub fn normalize_inspection_result(raw: &str) -> Option<InspectionResult> {
    lookup(RESULT_TABLE, raw, InspectionResult::Other)
}

/// Map free-text inspection purpose onto [`InspectionType`].
pub fn normalize_inspection_type(raw: &str) -> Option<InspectionType> {
    lookup(TYPE_TABLE, raw, InspectionType::Other)
}

/// A closure is the `Closed` result or raw text mentioning closure or
/// suspension.
pub fn is_closure(result: Option<InspectionResult>, raw_result: Option<&str>) -> bool {
    if result == Some(InspectionResult::Closed) {
        return true;
    }
    match raw_result {
        Some(raw) => {
            let upper = raw.to_uppercase();
            upper.contains("CLOSED") || upper.contains("CLOSURE") || upper.contains("SUSPENDED")
        }
        None => false,
    }
}

/// Ternary pass predicate: `None` when the result says nothing either way.
pub fn is_passing(result: Option<InspectionResult>) -> Option<bool> {
    match result? {
        InspectionResult::Pass | InspectionResult::ConditionalPass => Some(true),
        InspectionResult::Fail | InspectionResult::Closed => Some(false),
        _ => None,
    }
}
