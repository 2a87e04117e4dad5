//! Local stand-ins for the registry services.
//!
//! The auto-correction only applies rules that need no reference tables
//! (spellings of sex, histology behavior suffixes, case of the topography).
//! The validation checks presence of the fields and the dates.

use std::cell::RefCell;

use registry_reconciliation::dates::age_at;
use registry_reconciliation::pipeline::Session;
use registry_reconciliation::services::*;

use crate::intake::*;

const BEHAVIOR_CODES: [&str; 4] = ["0", "1", "2", "3"];

#[derive(Debug, Default)]
pub struct OfflineServices {
    upload_id: String,
    consolidated: RefCell<Option<ConsolidationRequest>>,
}

impl OfflineServices {
    pub fn new(upload_id: &str) -> OfflineServices {
        OfflineServices {
            upload_id: upload_id.to_string(),
            consolidated: RefCell::new(None),
        }
    }

    /// The last payload received for consolidation.
    pub fn take_consolidated(&self) -> Option<ConsolidationRequest> {
        self.consolidated.borrow_mut().take()
    }
}

pub fn correct_sex(v: &Scalar) -> Option<Scalar> {
    let s = v.as_text()?;
    match s.trim().to_lowercase().as_str() {
        "m" | "male" => Some(Scalar::from("1")),
        "f" | "female" => Some(Scalar::from("2")),
        _ => None,
    }
}

/// `8140/3` -> `8140`
pub fn correct_histology(v: &Scalar) -> Option<Scalar> {
    let s = v.as_text()?;
    let (code, _) = s.split_once('/')?;
    Some(Scalar::from(code.trim()))
}

pub fn correct_topography(v: &Scalar) -> Option<Scalar> {
    let s = v.as_text()?;
    let corrected = s.trim().to_uppercase();
    if corrected == s {
        None
    } else {
        Some(Scalar::Text(corrected))
    }
}

fn apply_correction(
    record: &mut Record,
    field: &str,
    correct: fn(&Scalar) -> Option<Scalar>,
    corrections: &mut Vec<Correction>,
) {
    let original = match record.get(field) {
        Some(v) => v.clone(),
        None => return,
    };
    if let Some(corrected) = correct(&original) {
        if corrected != original {
            debug!(
                "apply_correction: {:?}: {}: {} -> {}",
                record.registration_key(),
                field,
                original,
                corrected
            );
            record.insert(field, corrected.clone());
            corrections.push(Correction {
                original_value: Some(original),
                corrected_value: Some(corrected),
                confidence: 1.0,
            });
        }
    }
}

/// The reasons why a record is rejected. Empty for a valid record.
pub fn validate_record(record: &Record) -> Vec<String> {
    let mut reasons: Vec<String> = Vec::new();
    for c in REQUIRED_COLUMNS.iter() {
        if !record.contains_field(c) {
            reasons.push(format!("{}: missing", c));
        }
    }
    if let Some(v) = record.get(BIRTH_DATE) {
        if record.birth_date().is_none() {
            reasons.push(format!("{}: invalid date {}", BIRTH_DATE, v));
        }
    }
    if let Some(v) = record.get(DATE_OF_INCIDENCE) {
        if record.incidence_date().is_none() {
            reasons.push(format!("{}: invalid date {}", DATE_OF_INCIDENCE, v));
        }
    }
    if let (Some(birth), Some(incidence)) = (record.birth_date(), record.incidence_date()) {
        if incidence < birth {
            reasons.push(format!("{}: before {}", DATE_OF_INCIDENCE, BIRTH_DATE));
        }
    }
    if let Some(behavior) = record.code(BEHAVIOR) {
        if !BEHAVIOR_CODES.contains(&behavior.as_str()) {
            reasons.push(format!("{}: invalid behavior code {}", BEHAVIOR, behavior));
        }
    }
    reasons
}

impl RegistryServices for OfflineServices {
    fn auto_correct(
        &self,
        session: &Session,
        request: &DatasetRequest,
    ) -> Result<AutoCorrectResponse, ServiceError> {
        info!(
            "auto_correct: {} records for {}",
            request.dataset.len(),
            session.username()
        );
        let mut corrections = Corrections::default();
        let mut corrected_data: Vec<Record> = Vec::with_capacity(request.dataset.len());
        for r in request.dataset.iter() {
            let mut record = r.clone();
            apply_correction(&mut record, TOPOGRAPHY, correct_topography, &mut corrections.topography);
            apply_correction(&mut record, HISTOLOGY, correct_histology, &mut corrections.histology);
            apply_correction(&mut record, SEX, correct_sex, &mut corrections.sex);
            corrected_data.push(record);
        }
        info!("auto_correct: {} corrections", corrections.len());
        Ok(AutoCorrectResponse {
            upload_id: self.upload_id.clone(),
            corrected_data,
            corrections,
        })
    }

    fn validate(
        &self,
        session: &Session,
        request: &DatasetRequest,
    ) -> Result<ValidationResponse, ServiceError> {
        info!(
            "validate: {} records for {}",
            request.dataset.len(),
            session.username()
        );
        let mut validation_results: Vec<ValidationFailure> = Vec::new();
        let mut valid_entries: Vec<Record> = Vec::new();
        for r in request.dataset.iter() {
            let reasons = validate_record(r);
            if !reasons.is_empty() {
                warn!("validate: {:?} rejected: {:?}", r.registration_key(), reasons);
                validation_results.push(ValidationFailure {
                    registration_number: r.get(REGISTRATION_NUMBER).cloned(),
                    reason: reasons.join("; "),
                });
                continue;
            }
            let mut record = r.clone();
            if let (Some(birth), Some(incidence)) = (r.birth_date(), r.incidence_date()) {
                record.insert(AGE_AT_INCIDENCE, age_at(birth, incidence));
            }
            valid_entries.push(record);
        }
        Ok(ValidationResponse {
            validation_id: format!("{}-validation", self.upload_id),
            validation_results,
            valid_entries,
        })
    }

    fn consolidate(
        &self,
        session: &Session,
        request: &ConsolidationRequest,
    ) -> Result<(), ServiceError> {
        info!(
            "consolidate: {} entries of {} for {}",
            request.valid_entries.len(),
            request.upload_id,
            session.username()
        );
        if request.upload_id != self.upload_id {
            return Err(ServiceError::new(format!(
                "unknown upload {}",
                request.upload_id
            )));
        }
        *self.consolidated.borrow_mut() = Some(request.clone());
        Ok(())
    }
}
