//! Houston, TX: records produced by the portal scraper.
//!
//! The portal shows violations but no verdict; an inspection with none is
//! a pass. The violation count doubles as demerits.

use poolwatch_core::models::{
    CanonicalFacility, CanonicalInspection, CanonicalRecord, RawPayload, Source,
};
use poolwatch_core::parse::{extract_us_date, text};

use super::{describe, text_or, Transformer};
use crate::adapters::scraper::houston::{facility_url, DEFAULT_BASE_URL};
use crate::error::TransformError;

pub struct HoustonTransformer;

impl Transformer for HoustonTransformer {
    fn transform(&self, raw: &RawPayload, source: &Source) -> Result<CanonicalRecord, TransformError> {
        let d = &raw.data;

        let Some(date_text) = text(d, "inspectionDate") else {
            return Err(TransformError::MissingField("inspectionDate".into()));
        };
        let inspection_date = extract_us_date(&date_text).ok_or_else(|| TransformError::InvalidDate {
            field: "inspectionDate".into(),
            value: describe(d.get("inspectionDate")),
        })?;

        let violation_count = d
            .get("violations")
            .and_then(|v| v.as_array())
            .map_or(0, |v| v.len()) as i64;
        let result = if violation_count == 0 {
            "Pass"
        } else {
            "Violations Found"
        };

        let facility_id = text(d, "facilityId");
        let base_url = match source.endpoint.trim().trim_end_matches('/') {
            "" => DEFAULT_BASE_URL,
            url => url,
        };
        let source_url = facility_id.as_deref().map(|id| facility_url(base_url, id));

        Ok(CanonicalRecord {
            external_id: raw.external_id.clone(),
            facility: CanonicalFacility {
                external_id: Some(facility_id.unwrap_or_else(|| raw.external_id.clone())),
                raw_name: text_or(d, "facilityName", "Unknown Facility"),
                raw_address: text_or(d, "address", ""),
                raw_city: Some(text_or(d, "city", "HOUSTON")),
                raw_state: Some("TX".to_string()),
                raw_zip: text(d, "zip"),
                latitude: None,
                longitude: None,
            },
            inspection: CanonicalInspection {
                inspection_date,
                raw_inspection_type: Some("Routine".to_string()),
                raw_result: Some(result.to_string()),
                raw_score: (violation_count > 0).then(|| violation_count.to_string()),
                demerits: Some(violation_count),
                source_url,
                report_url: None,
            },
            raw_payload: d.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transformers::test_source;
    use serde_json::json;

    fn run(data: serde_json::Value) -> Result<CanonicalRecord, TransformError> {
        HoustonTransformer.transform(
            &RawPayload::new("houston-ABC-05-14-2024", data),
            &test_source("houston-tx"),
        )
    }

    #[test]
    fn test_violations_drive_result() {
        let rec = run(json!({
            "facilityId": "ABC",
            "facilityName": "OAKS APARTMENTS POOL",
            "address": "1200 MAIN ST",
            "zip": "77002",
            "inspectionDate": "05/14/2024",
            "violations": ["757.004 Gates", "757.011 Water clarity"]
        }))
        .unwrap();
        assert_eq!(rec.inspection.inspection_date.to_string(), "2024-05-14");
        assert_eq!(rec.inspection.raw_result.as_deref(), Some("Violations Found"));
        assert_eq!(rec.inspection.raw_score.as_deref(), Some("2"));
        assert_eq!(rec.inspection.demerits, Some(2));
        assert_eq!(
            rec.inspection.source_url.as_deref(),
            Some("https://tx.healthinspections.us/houston/estab.cfm?facilityID=ABC")
        );
        assert_eq!(rec.facility.raw_city.as_deref(), Some("HOUSTON"));
    }

    #[test]
    fn test_clean_inspection_passes() {
        let rec = run(json!({"facilityId": "ABC", "inspectionDate": "01/03/2024", "violations": []}))
            .unwrap();
        assert_eq!(rec.inspection.raw_result.as_deref(), Some("Pass"));
        assert_eq!(rec.inspection.raw_score, None);
        assert_eq!(rec.inspection.demerits, Some(0));
        assert_eq!(rec.inspection.raw_inspection_type.as_deref(), Some("Routine"));
    }

    #[test]
    fn test_bad_date_rejected() {
        assert_eq!(
            run(json!({"facilityId": "ABC"})).unwrap_err(),
            TransformError::MissingField("inspectionDate".into())
        );
        assert!(matches!(
            run(json!({"inspectionDate": "2024-05-14"})).unwrap_err(),
            TransformError::InvalidDate { .. }
        ));
    }
}
