//! Payloads exchanged with the external registry services.
//!
//! The services themselves (auto-correction, validation, consolidation) live
//! outside of this crate. Their request and response shapes are fixed here so
//! that the pipeline works on typed records and not on whatever keys a
//! response happens to contain. Unknown keys in responses are ignored.

use std::error::Error;
use std::fmt::Display;

use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::config::*;
use crate::dates::normalize_date;
use crate::pipeline::Session;
use crate::stratify::StratificationResult;

/// Request body of both the auto-correction and the validation services.
#[derive(PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct DatasetRequest {
    pub dataset: Vec<Record>,
}

#[derive(PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct Correction {
    #[serde(default)]
    pub original_value: Option<Scalar>,
    #[serde(default)]
    pub corrected_value: Option<Scalar>,
    pub confidence: f64,
}

#[derive(PartialEq, Debug, Clone, Default, Serialize, Deserialize)]
pub struct Corrections {
    #[serde(default)]
    pub topography: Vec<Correction>,
    #[serde(default)]
    pub histology: Vec<Correction>,
    #[serde(default)]
    pub sex: Vec<Correction>,
}

impl Corrections {
    pub fn len(&self) -> usize {
        self.topography.len() + self.histology.len() + self.sex.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct AutoCorrectResponse {
    pub upload_id: String,
    pub corrected_data: Vec<Record>,
    #[serde(default)]
    pub corrections: Corrections,
}

/// Why a record was rejected by the validation service.
#[derive(PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct ValidationFailure {
    #[serde(default)]
    pub registration_number: Option<Scalar>,
    pub reason: String,
}

#[derive(PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct ValidationResponse {
    pub validation_id: String,
    #[serde(default)]
    pub validation_results: Vec<ValidationFailure>,
    pub valid_entries: Vec<Record>,
}

#[derive(PartialEq, Debug, Clone, Serialize)]
pub struct ConsolidationRequest {
    pub upload_id: String,
    pub valid_entries: Vec<Record>,
    pub stratified_data: StratificationResult,
}

/// A failed call to an external service (transport failure or non-success
/// answer).
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct ServiceError {
    pub message: String,
}

impl ServiceError {
    pub fn new(message: impl Into<String>) -> ServiceError {
        ServiceError {
            message: message.into(),
        }
    }
}

impl Error for ServiceError {}

impl Display for ServiceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "service error: {}", self.message)
    }
}

/// The external services, as seen by the pipeline.
///
/// Calls are made with the session the pipeline was created with.
pub trait RegistryServices {
    fn auto_correct(
        &self,
        session: &Session,
        request: &DatasetRequest,
    ) -> Result<AutoCorrectResponse, ServiceError>;

    fn validate(
        &self,
        session: &Session,
        request: &DatasetRequest,
    ) -> Result<ValidationResponse, ServiceError>;

    fn consolidate(
        &self,
        session: &Session,
        request: &ConsolidationRequest,
    ) -> Result<(), ServiceError>;
}

/// Rewrites the birth and incidence dates as `yyyy-mm-dd`.
///
/// Returns `None` if either date cannot be parsed.
pub fn normalize_entry(record: &Record) -> Option<Record> {
    let birth = record.get(BIRTH_DATE).and_then(normalize_date)?;
    let incidence = record.get(DATE_OF_INCIDENCE).and_then(normalize_date)?;
    let mut res = record.clone();
    res.insert(BIRTH_DATE, birth);
    res.insert(DATE_OF_INCIDENCE, incidence);
    Some(res)
}

/// Assembles the consolidation payload. Entries whose dates cannot be
/// normalized are left out.
pub fn build_consolidation_request(
    upload_id: &str,
    valid_entries: &[Record],
    stratified: &StratificationResult,
) -> ConsolidationRequest {
    let mut entries: Vec<Record> = Vec::new();
    for r in valid_entries.iter() {
        match normalize_entry(r) {
            Some(n) => entries.push(n),
            None => warn!(
                "build_consolidation_request: invalid date in entry {:?}, skipping",
                r.registration_key()
            ),
        }
    }
    info!(
        "build_consolidation_request: upload {}: {} of {} entries",
        upload_id,
        entries.len(),
        valid_entries.len()
    );
    ConsolidationRequest {
        upload_id: upload_id.to_string(),
        valid_entries: entries,
        stratified_data: stratified.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stratify::stratify;

    #[test]
    fn parses_auto_correct_response() {
        let js = r#"{
            "upload_id": "u-1",
            "corrected_data": [{"registration_number": "R1", "sex": "1", "comment": null}],
            "corrections": {
                "topography": [{"original_value": "C5O", "corrected_value": "C50", "confidence": 0.9}],
                "histology": [],
                "sex": [{"original_value": "m", "corrected_value": "1", "confidence": 1.0}]
            },
            "extra": 12
        }"#;
        let res: AutoCorrectResponse = serde_json::from_str(js).unwrap();
        assert_eq!(res.upload_id, "u-1");
        assert_eq!(res.corrected_data[0].len(), 2);
        assert_eq!(res.corrections.len(), 2);
        assert_eq!(
            res.corrections.topography[0].corrected_value,
            Some(Scalar::from("C50"))
        );
    }

    #[test]
    fn parses_validation_response() {
        let js = r#"{
            "validation_id": "v-1",
            "validation_results": [{"registration_number": 42, "reason": "Invalid topography"}],
            "valid_entries": [{"registration_number": "R1"}]
        }"#;
        let res: ValidationResponse = serde_json::from_str(js).unwrap();
        assert_eq!(
            res.validation_results[0].registration_number,
            Some(Scalar::Integer(42))
        );
        assert_eq!(res.valid_entries.len(), 1);
    }

    #[test]
    fn consolidation_normalizes_dates_and_skips_bad_ones() {
        let good = record_of(&[
            (REGISTRATION_NUMBER, "R1"),
            (BIRTH_DATE, "02/03/1960"),
            (DATE_OF_INCIDENCE, "15/06/2019"),
        ]);
        let bad = record_of(&[
            (REGISTRATION_NUMBER, "R2"),
            (BIRTH_DATE, "1960"),
            (DATE_OF_INCIDENCE, "15/06/2019"),
        ]);
        let entries = vec![good, bad];
        let req = build_consolidation_request("u-1", &entries, &stratify(&entries));
        assert_eq!(req.valid_entries.len(), 1);
        assert_eq!(req.valid_entries[0].code(BIRTH_DATE), Some("1960-03-02".to_string()));
        assert_eq!(
            req.valid_entries[0].code(DATE_OF_INCIDENCE),
            Some("2019-06-15".to_string())
        );
        // The stratification is passed through untouched.
        assert_eq!(req.stratified_data.behavior.total(), 2);
        let js = serde_json::to_value(&req).unwrap();
        assert_eq!(js["upload_id"], "u-1");
        assert!(js["stratified_data"]["ageGroups"].is_object());
    }
}
