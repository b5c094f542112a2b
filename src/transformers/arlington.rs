//! Arlington, TX: ArcGIS feature server.
//!
//! `InspectionDate` is epoch milliseconds. The address is either the
//! composite `PropertyAddress` or the discrete `PROPHOUSE DIR STREET TYPE`
//! parts. The layer carries a numeric score rather than a verdict, so the
//! result is derived from it: 70 and above passes.

use chrono::DateTime;

use poolwatch_core::models::{
    CanonicalFacility, CanonicalInspection, CanonicalRecord, RawPayload, Source,
};
use poolwatch_core::parse::{parse_number, text};

use super::{describe, text_or, Transformer};
use crate::error::TransformError;

const PASSING_SCORE: f64 = 70.0;

pub struct ArlingtonTransformer;

impl Transformer for ArlingtonTransformer {
    fn transform(&self, raw: &RawPayload, _source: &Source) -> Result<CanonicalRecord, TransformError> {
        let d = &raw.data;

        let raw_date = d.get("InspectionDate").filter(|v| !v.is_null());
        let Some(raw_date) = raw_date else {
            return Err(TransformError::MissingField("InspectionDate".into()));
        };
        let inspection_date = parse_number(raw_date)
            .filter(|ms| *ms != 0.0)
            .and_then(|ms| DateTime::from_timestamp_millis(ms as i64))
            .map(|dt| dt.date_naive())
            .ok_or_else(|| TransformError::InvalidDate {
                field: "InspectionDate".into(),
                value: describe(Some(raw_date)),
            })?;

        let address = match text(d, "PropertyAddress") {
            Some(a) => a,
            None => ["PROPHOUSE", "DIR", "STREET", "TYPE"]
                .iter()
                .filter_map(|k| text(d, k))
                .collect::<Vec<_>>()
                .join(" "),
        };

        let raw_result = match d.get("InspectionScore").and_then(parse_number) {
            Some(score) if score >= PASSING_SCORE => Some("PASS".to_string()),
            Some(_) => Some("FAIL".to_string()),
            None => text(d, "Status"),
        };

        Ok(CanonicalRecord {
            external_id: raw.external_id.clone(),
            facility: CanonicalFacility {
                external_id: text(d, "FOLDERRSN").or_else(|| text(d, "OBJECTID")),
                raw_name: text_or(d, "FacilityName", "Unknown Pool"),
                raw_address: address,
                raw_city: Some(text_or(d, "CITY", "Arlington")),
                raw_state: Some(text_or(d, "STATE", "TX")),
                raw_zip: text(d, "ZIPCODE"),
                latitude: d.get("_geometry_y").and_then(parse_number),
                longitude: d.get("_geometry_x").and_then(parse_number),
            },
            inspection: CanonicalInspection {
                inspection_date,
                raw_inspection_type: text(d, "Inspection").or_else(|| text(d, "PoolType")),
                raw_result,
                raw_score: text(d, "InspectionScore"),
                demerits: None,
                source_url: None,
                report_url: None,
            },
            raw_payload: d.clone(),
        })
    }
}
