//! Austin, TX: Socrata open-data export.

use poolwatch_core::models::{
    CanonicalFacility, CanonicalInspection, CanonicalRecord, RawPayload, Source,
};
use poolwatch_core::parse::{parse_date, parse_number, text};

use super::{describe, text_or, Transformer};
use crate::error::TransformError;

pub struct AustinTransformer;

impl Transformer for AustinTransformer {
    fn transform(&self, raw: &RawPayload, _source: &Source) -> Result<CanonicalRecord, TransformError> {
        let d = &raw.data;

        let inspection_date = match d.get("inspection_date").filter(|v| !v.is_null()) {
            None => return Err(TransformError::MissingField("inspection_date".into())),
            Some(v) => parse_date(v).ok_or_else(|| TransformError::InvalidDate {
                field: "inspection_date".into(),
                value: describe(Some(v)),
            })?,
        };

        Ok(CanonicalRecord {
            external_id: raw.external_id.clone(),
            facility: CanonicalFacility {
                external_id: text(d, "facility_id"),
                raw_name: text_or(d, "facility_name", "Unknown Facility"),
                raw_address: text_or(d, "street_address", ""),
                raw_city: Some(text_or(d, "city_desc", "Austin")),
                raw_state: Some(text_or(d, "state_desc", "TX")),
                raw_zip: text(d, "zip_code"),
                latitude: d.get("latitude").and_then(parse_number),
                longitude: d.get("longitude").and_then(parse_number),
            },
            inspection: CanonicalInspection {
                inspection_date,
                raw_inspection_type: text(d, "inspection_type"),
                raw_result: text(d, "inspection_result"),
                raw_score: text(d, "score"),
                demerits: None,
                source_url: None,
                report_url: None,
            },
            raw_payload: d.clone(),
        })
    }
}
