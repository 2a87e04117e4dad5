//! The wizard: a linear sequence of stages over a single working dataset.
//!
//! The controller owns the dataset. Each stage transforms it and hands it to
//! the next one. Moving forward is gated by the completion predicate of the
//! current stage; moving back is always allowed (except from the first
//! stage).
//!
//! Calls to the external services are split in two: `begin_*` produces the
//! request and marks the stage as busy, `finish_*` consumes the outcome. While
//! a stage is busy, no second request can be issued for it.

use std::fmt::Display;

use log::{debug, info, warn};

use crate::config::*;
use crate::duplicates::{detect, resolve, unique_by_registration, Duplicate};
use crate::schema::{apply_mapping, missing_columns, ColumnMapping};
use crate::services::*;
use crate::stratify::{stratify, StratificationResult};

#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash, Ord, PartialOrd)]
pub enum Stage {
    Upload,
    InspectSchema,
    RemoveDuplicates,
    AutoCorrect,
    Validate,
    Stratify,
    Consolidate,
    Review,
    /// Past the last stage.
    Complete,
}

impl Stage {
    pub const STEPS: [Stage; 8] = [
        Stage::Upload,
        Stage::InspectSchema,
        Stage::RemoveDuplicates,
        Stage::AutoCorrect,
        Stage::Validate,
        Stage::Stratify,
        Stage::Consolidate,
        Stage::Review,
    ];

    pub fn index(self) -> usize {
        match self {
            Stage::Upload => 0,
            Stage::InspectSchema => 1,
            Stage::RemoveDuplicates => 2,
            Stage::AutoCorrect => 3,
            Stage::Validate => 4,
            Stage::Stratify => 5,
            Stage::Consolidate => 6,
            Stage::Review => 7,
            Stage::Complete => 8,
        }
    }

    pub fn from_index(idx: usize) -> Option<Stage> {
        match idx {
            8 => Some(Stage::Complete),
            _ => Stage::STEPS.get(idx).copied(),
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Stage::Upload => "Upload Raw Data",
            Stage::InspectSchema => "Inspect Data Schema",
            Stage::RemoveDuplicates => "Remove Duplicates",
            Stage::AutoCorrect => "Auto-Correct Codes",
            Stage::Validate => "Validate Data Integrity",
            Stage::Stratify => "Stratify Data",
            Stage::Consolidate => "Consolidate Data",
            Stage::Review => "Review & Finalize",
            Stage::Complete => "Complete",
        }
    }
}

impl Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// The credentials under which the wizard runs.
///
/// The session is handed to the wizard at construction and forwarded to the
/// external services. An empty token means no authenticated user.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct Session {
    username: String,
    token: String,
}

impl Session {
    pub fn new(username: impl Into<String>, token: impl Into<String>) -> Session {
        Session {
            username: username.into(),
            token: token.into(),
        }
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn is_authenticated(&self) -> bool {
        !self.token.trim().is_empty()
    }
}

/// The outcome of the auto-correction stage.
#[derive(PartialEq, Debug, Clone)]
pub struct AutoCorrection {
    pub upload_id: String,
    pub corrections: Corrections,
}

/// The outcome of the validation stage.
#[derive(PartialEq, Debug, Clone)]
pub struct Validation {
    pub validation_id: String,
    pub failures: Vec<ValidationFailure>,
}

#[derive(Debug)]
pub struct Wizard {
    session: Session,
    upload_id: String,
    stage: Stage,
    progress: Option<String>,
    dataset: Option<Vec<Record>>,
    missing_columns: Vec<String>,
    pending_duplicates: Vec<Duplicate>,
    duplicates_removed: usize,
    auto_correction: Option<AutoCorrection>,
    auto_correction_busy: bool,
    validation: Option<Validation>,
    validation_busy: bool,
    valid_entries: Vec<Record>,
    stratified: Option<StratificationResult>,
    consolidation_busy: bool,
    consolidated: bool,
}

impl Wizard {
    /// Starts a wizard for one upload. `upload_id` identifies the upload in
    /// the consolidation request.
    pub fn new(session: Session, upload_id: impl Into<String>) -> Result<Wizard, ReconcileError> {
        if !session.is_authenticated() {
            return Err(ReconcileError::Unauthenticated);
        }
        let upload_id = upload_id.into();
        info!(
            "Wizard::new: user {} upload {}",
            session.username(),
            upload_id
        );
        Ok(Wizard {
            session,
            upload_id,
            stage: Stage::Upload,
            progress: None,
            dataset: None,
            missing_columns: Vec::new(),
            pending_duplicates: Vec::new(),
            duplicates_removed: 0,
            auto_correction: None,
            auto_correction_busy: false,
            validation: None,
            validation_busy: false,
            valid_entries: Vec::new(),
            stratified: None,
            consolidation_busy: false,
            consolidated: false,
        })
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn upload_id(&self) -> &str {
        &self.upload_id
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    /// The status message of the current stage, if any.
    pub fn progress_message(&self) -> Option<&str> {
        self.progress.as_deref()
    }

    pub fn dataset(&self) -> Option<&[Record]> {
        self.dataset.as_deref()
    }

    pub fn missing_columns(&self) -> &[String] {
        &self.missing_columns
    }

    pub fn pending_duplicates(&self) -> &[Duplicate] {
        &self.pending_duplicates
    }

    pub fn duplicates_removed(&self) -> usize {
        self.duplicates_removed
    }

    pub fn auto_correction(&self) -> Option<&AutoCorrection> {
        self.auto_correction.as_ref()
    }

    pub fn validation(&self) -> Option<&Validation> {
        self.validation.as_ref()
    }

    pub fn valid_entries(&self) -> &[Record] {
        &self.valid_entries
    }

    pub fn stratified(&self) -> Option<&StratificationResult> {
        self.stratified.as_ref()
    }

    pub fn is_consolidated(&self) -> bool {
        self.consolidated
    }

    pub fn is_busy(&self) -> bool {
        self.auto_correction_busy || self.validation_busy || self.consolidation_busy
    }

    // ******** Navigation ********

    /// The completion predicate of a stage.
    pub fn stage_complete(&self, stage: Stage) -> bool {
        match stage {
            Stage::Upload => self.dataset.is_some(),
            Stage::InspectSchema => self.missing_columns.is_empty(),
            Stage::RemoveDuplicates => self.pending_duplicates.is_empty(),
            Stage::AutoCorrect => self.auto_correction.is_some(),
            Stage::Validate => !self.validation_busy,
            Stage::Stratify | Stage::Consolidate | Stage::Review => true,
            Stage::Complete => false,
        }
    }

    pub fn can_next(&self) -> bool {
        self.stage_complete(self.stage)
    }

    /// Going back is refused while a service call is in flight.
    pub fn can_back(&self) -> bool {
        self.stage != Stage::Upload && self.stage != Stage::Complete && !self.is_busy()
    }

    /// Advances to the next stage if the current one is complete. Returns
    /// whether the stage changed.
    pub fn next(&mut self) -> bool {
        if !self.can_next() {
            debug!("Wizard::next: stage {} is not complete", self.stage);
            return false;
        }
        match Stage::from_index(self.stage.index() + 1) {
            Some(stage) => {
                self.enter(stage);
                true
            }
            None => false,
        }
    }

    pub fn back(&mut self) -> bool {
        if !self.can_back() {
            debug!("Wizard::back: refused at stage {}", self.stage);
            return false;
        }
        match Stage::from_index(self.stage.index() - 1) {
            Some(stage) => {
                self.enter(stage);
                true
            }
            None => false,
        }
    }

    /// Drops everything and returns to the first stage.
    pub fn reset(&mut self) {
        info!("Wizard::reset: upload {}", self.upload_id);
        self.stage = Stage::Upload;
        self.progress = None;
        self.dataset = None;
        self.missing_columns.clear();
        self.pending_duplicates.clear();
        self.duplicates_removed = 0;
        self.auto_correction = None;
        self.auto_correction_busy = false;
        self.validation = None;
        self.validation_busy = false;
        self.valid_entries.clear();
        self.stratified = None;
        self.consolidation_busy = false;
        self.consolidated = false;
    }

    fn enter(&mut self, stage: Stage) {
        info!("Wizard: {} -> {}", self.stage, stage);
        self.stage = stage;
        self.progress = None;
        if stage == Stage::RemoveDuplicates {
            self.detect_duplicates();
        }
    }

    // The results of the stages after `stage` were computed from a dataset
    // that just changed.
    fn discard_results_after(&mut self, stage: Stage) {
        let from = stage.index() + 1;
        if from <= Stage::RemoveDuplicates.index() {
            self.pending_duplicates.clear();
        }
        if from <= Stage::AutoCorrect.index() {
            self.auto_correction = None;
        }
        if from <= Stage::Validate.index() {
            self.validation = None;
            self.valid_entries.clear();
        }
        if from <= Stage::Stratify.index() {
            self.stratified = None;
        }
        if from <= Stage::Consolidate.index() {
            self.consolidated = false;
        }
        debug!("Wizard: results after {} discarded", stage);
    }

    fn expect_stage(&self, expected: Stage) -> Result<(), ReconcileError> {
        if self.stage == expected {
            Ok(())
        } else {
            Err(ReconcileError::WrongStage {
                expected,
                actual: self.stage,
            })
        }
    }

    fn set_progress(&mut self, message: impl Into<String>) {
        let message = message.into();
        info!("{}: {}", self.stage, message);
        self.progress = Some(message);
    }

    fn working_set(&self) -> Result<&Vec<Record>, ReconcileError> {
        self.dataset.as_ref().ok_or(ReconcileError::EmptyDataset)
    }

    // ******** Schema ********

    /// Loads a parsed (and cleaned) table. Returns the required columns that
    /// it misses.
    pub fn load(&mut self, records: Vec<Record>) -> Result<&[String], ReconcileError> {
        self.expect_stage(Stage::Upload)?;
        self.missing_columns = missing_columns(&REQUIRED_COLUMNS, &records);
        info!("Wizard::load: {} records", records.len());
        self.dataset = Some(records);
        self.duplicates_removed = 0;
        self.discard_results_after(Stage::Upload);
        if self.missing_columns.is_empty() {
            self.set_progress("File parsed and cleaned successfully.");
        } else {
            let msg = format!(
                "Missing required columns: {}",
                self.missing_columns.join(", ")
            );
            self.set_progress(msg);
        }
        Ok(self.missing_columns.as_slice())
    }

    /// Renames columns in every record, then checks the schema again.
    pub fn apply_mapping(&mut self, mapping: &ColumnMapping) -> Result<&[String], ReconcileError> {
        self.expect_stage(Stage::InspectSchema)?;
        let records = self.dataset.as_mut().ok_or(ReconcileError::EmptyDataset)?;
        apply_mapping(records, mapping);
        self.missing_columns = missing_columns(&REQUIRED_COLUMNS, records);
        self.discard_results_after(Stage::InspectSchema);
        if self.missing_columns.is_empty() {
            self.set_progress("Column mapping applied successfully.");
        } else {
            let msg = format!(
                "Missing required columns: {}",
                self.missing_columns.join(", ")
            );
            self.set_progress(msg);
        }
        Ok(self.missing_columns.as_slice())
    }

    // ******** Duplicates ********

    /// Scans the working dataset for duplicates, without removing them.
    pub fn detect_duplicates(&mut self) -> &[Duplicate] {
        self.pending_duplicates = match self.dataset.as_deref() {
            Some(records) => detect(records),
            None => Vec::new(),
        };
        if self.pending_duplicates.is_empty() {
            self.set_progress("No duplicates found in the dataset.");
        } else {
            self.set_progress("Duplicates found. Ready for removal.");
        }
        &self.pending_duplicates
    }

    /// Keeps one record per registration number. Returns the number of
    /// dropped records.
    pub fn remove_duplicates(&mut self) -> Result<usize, ReconcileError> {
        self.expect_stage(Stage::RemoveDuplicates)?;
        let resolution = resolve(self.working_set()?);
        self.pending_duplicates.clear();
        if resolution.dropped == 0 {
            self.set_progress("No duplicates found.");
        } else {
            self.duplicates_removed += resolution.dropped;
            self.dataset = Some(resolution.kept);
            self.discard_results_after(Stage::RemoveDuplicates);
            self.set_progress("Duplicates removed successfully.");
        }
        Ok(resolution.dropped)
    }

    // ******** Auto-correction ********

    pub fn begin_auto_correction(&mut self) -> Result<DatasetRequest, ReconcileError> {
        self.expect_stage(Stage::AutoCorrect)?;
        if self.auto_correction_busy {
            return Err(ReconcileError::Busy(Stage::AutoCorrect));
        }
        let dataset = self.working_set()?.clone();
        self.auto_correction_busy = true;
        self.progress = None;
        Ok(DatasetRequest { dataset })
    }

    pub fn finish_auto_correction(
        &mut self,
        outcome: Result<AutoCorrectResponse, ServiceError>,
    ) -> Result<(), ReconcileError> {
        if !self.auto_correction_busy {
            return Err(ReconcileError::NotStarted(Stage::AutoCorrect));
        }
        self.auto_correction_busy = false;
        match outcome {
            Ok(response) => {
                info!(
                    "Wizard: auto-correction {}: {} corrections",
                    response.upload_id,
                    response.corrections.len()
                );
                self.dataset = Some(response.corrected_data);
                self.discard_results_after(Stage::AutoCorrect);
                self.auto_correction = Some(AutoCorrection {
                    upload_id: response.upload_id,
                    corrections: response.corrections,
                });
                self.set_progress("Auto-correction completed successfully.");
            }
            Err(e) => {
                warn!("Wizard: auto-correction failed: {}", e);
                self.set_progress("Error during auto-correction.");
            }
        }
        Ok(())
    }

    /// Runs the auto-correction with the given services. Returns whether it
    /// succeeded.
    pub fn run_auto_correction<S: RegistryServices>(
        &mut self,
        services: &S,
    ) -> Result<bool, ReconcileError> {
        let request = self.begin_auto_correction()?;
        let outcome = services.auto_correct(&self.session, &request);
        let ok = outcome.is_ok();
        self.finish_auto_correction(outcome)?;
        Ok(ok)
    }

    // ******** Validation ********

    pub fn begin_validation(&mut self) -> Result<DatasetRequest, ReconcileError> {
        self.expect_stage(Stage::Validate)?;
        if self.validation_busy {
            return Err(ReconcileError::Busy(Stage::Validate));
        }
        let dataset = self.working_set()?.clone();
        self.validation_busy = true;
        self.progress = None;
        Ok(DatasetRequest { dataset })
    }

    /// On success, the valid entries are kept, one per registration number.
    pub fn finish_validation(
        &mut self,
        outcome: Result<ValidationResponse, ServiceError>,
    ) -> Result<(), ReconcileError> {
        if !self.validation_busy {
            return Err(ReconcileError::NotStarted(Stage::Validate));
        }
        self.validation_busy = false;
        match outcome {
            Ok(response) => {
                self.discard_results_after(Stage::Validate);
                self.valid_entries = unique_by_registration(&response.valid_entries);
                info!(
                    "Wizard: validation {}: {} valid entries, {} failures",
                    response.validation_id,
                    self.valid_entries.len(),
                    response.validation_results.len()
                );
                self.validation = Some(Validation {
                    validation_id: response.validation_id,
                    failures: response.validation_results,
                });
                self.set_progress("Validations completed successfully.");
            }
            Err(e) => {
                warn!("Wizard: validation failed: {}", e);
                self.set_progress("An error occurred during validations.");
            }
        }
        Ok(())
    }

    pub fn run_validation<S: RegistryServices>(
        &mut self,
        services: &S,
    ) -> Result<bool, ReconcileError> {
        let request = self.begin_validation()?;
        let outcome = services.validate(&self.session, &request);
        let ok = outcome.is_ok();
        self.finish_validation(outcome)?;
        Ok(ok)
    }

    // ******** Stratification ********

    pub fn stratify(&mut self) -> Result<&StratificationResult, ReconcileError> {
        self.expect_stage(Stage::Stratify)?;
        let res = stratify(&self.valid_entries);
        self.discard_results_after(Stage::Stratify);
        self.set_progress("Data stratified successfully.");
        Ok(&*self.stratified.insert(res))
    }

    // ******** Consolidation ********

    pub fn begin_consolidation(&mut self) -> Result<ConsolidationRequest, ReconcileError> {
        self.expect_stage(Stage::Consolidate)?;
        if self.consolidation_busy {
            return Err(ReconcileError::Busy(Stage::Consolidate));
        }
        let stratified = self.stratified.as_ref().ok_or(ReconcileError::NotStratified)?;
        let request = build_consolidation_request(&self.upload_id, &self.valid_entries, stratified);
        self.consolidation_busy = true;
        self.progress = None;
        Ok(request)
    }

    pub fn finish_consolidation(
        &mut self,
        outcome: Result<(), ServiceError>,
    ) -> Result<(), ReconcileError> {
        if !self.consolidation_busy {
            return Err(ReconcileError::NotStarted(Stage::Consolidate));
        }
        self.consolidation_busy = false;
        match outcome {
            Ok(()) => {
                self.consolidated = true;
                self.set_progress("Consolidation completed successfully.");
            }
            Err(e) => {
                warn!("Wizard: consolidation failed: {}", e);
                self.set_progress("Failed to consolidate data.");
            }
        }
        Ok(())
    }

    pub fn run_consolidation<S: RegistryServices>(
        &mut self,
        services: &S,
    ) -> Result<bool, ReconcileError> {
        let request = self.begin_consolidation()?;
        let outcome = services.consolidate(&self.session, &request);
        let ok = outcome.is_ok();
        self.finish_consolidation(outcome)?;
        Ok(ok)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    fn session() -> Session {
        let _ = env_logger::builder().is_test(true).try_init();
        Session::new("registrar", "secret-token")
    }

    fn case(reg: &str, date: &str, behavior: &str) -> Record {
        record_of(&[
            (REGISTRATION_NUMBER, reg),
            (SEX, "2"),
            (BIRTH_DATE, "01/01/1970"),
            (DATE_OF_INCIDENCE, date),
            (TOPOGRAPHY, "C50.9"),
            (HISTOLOGY, "8500"),
            (BEHAVIOR, behavior),
            (GRADE_CODE, "2"),
            (BASIS_OF_DIAGNOSIS, "7"),
        ])
    }

    /// Passes the dataset through and records the calls.
    #[derive(Default)]
    struct EchoServices {
        fail: bool,
        calls: RefCell<Vec<&'static str>>,
    }

    impl RegistryServices for EchoServices {
        fn auto_correct(
            &self,
            _session: &Session,
            request: &DatasetRequest,
        ) -> Result<AutoCorrectResponse, ServiceError> {
            self.calls.borrow_mut().push("auto_correct");
            if self.fail {
                return Err(ServiceError::new("503"));
            }
            Ok(AutoCorrectResponse {
                upload_id: "u-1".to_string(),
                corrected_data: request.dataset.clone(),
                corrections: Corrections::default(),
            })
        }

        fn validate(
            &self,
            _session: &Session,
            request: &DatasetRequest,
        ) -> Result<ValidationResponse, ServiceError> {
            self.calls.borrow_mut().push("validate");
            let mut valid_entries = request.dataset.clone();
            // The service may hand back the same entry twice.
            valid_entries.extend(request.dataset.first().cloned());
            Ok(ValidationResponse {
                validation_id: "v-1".to_string(),
                validation_results: Vec::new(),
                valid_entries,
            })
        }

        fn consolidate(
            &self,
            _session: &Session,
            _request: &ConsolidationRequest,
        ) -> Result<(), ServiceError> {
            self.calls.borrow_mut().push("consolidate");
            Ok(())
        }
    }

    #[test]
    fn unauthenticated_session_is_rejected() {
        let err = Wizard::new(Session::new("anonymous", " "), "u-1");
        assert_eq!(err.err(), Some(ReconcileError::Unauthenticated));
    }

    #[test]
    fn stage_indices() {
        for (idx, s) in Stage::STEPS.iter().enumerate() {
            assert_eq!(s.index(), idx);
            assert_eq!(Stage::from_index(idx), Some(*s));
        }
        assert_eq!(Stage::from_index(8), Some(Stage::Complete));
        assert_eq!(Stage::from_index(9), None);
    }

    #[test]
    fn upload_gates_progress() {
        let mut w = Wizard::new(session(), "u-1").unwrap();
        assert!(!w.can_back());
        assert!(!w.back());
        assert!(!w.next());
        assert_eq!(w.stage(), Stage::Upload);

        let mut partial = case("R1", "01/01/2020", "3");
        partial.remove(GRADE_CODE);
        partial.insert("grade", "2");
        let missing = w.load(vec![partial]).unwrap().to_vec();
        assert_eq!(missing, vec![GRADE_CODE]);
        assert!(w.progress_message().is_some());

        assert!(w.next());
        assert_eq!(w.stage(), Stage::InspectSchema);
        assert_eq!(w.progress_message(), None);
        assert!(!w.can_next());

        let mapping = ColumnMapping::from_pairs([(GRADE_CODE, "grade")]).unwrap();
        assert!(w.apply_mapping(&mapping).unwrap().is_empty());
        assert!(w.can_next());
    }

    #[test]
    fn duplicates_block_until_removed() {
        let mut w = Wizard::new(session(), "u-1").unwrap();
        w.load(vec![
            case("R1", "01/01/2020", "3"),
            case("R1", "15/06/2019", "3"),
            case("R2", "01/01/2020", "1"),
        ])
        .unwrap();
        assert!(w.next());
        assert!(w.next());
        assert_eq!(w.stage(), Stage::RemoveDuplicates);
        assert_eq!(w.pending_duplicates().len(), 1);
        assert!(!w.can_next());

        assert_eq!(w.remove_duplicates().unwrap(), 1);
        assert!(w.can_next());
        assert_eq!(w.dataset().unwrap().len(), 2);

        // Going back and forth runs the detection again, on the cleaned data.
        assert!(w.back());
        assert!(w.next());
        assert!(w.pending_duplicates().is_empty());
    }

    #[test]
    fn full_run() {
        let services = EchoServices::default();
        let mut w = Wizard::new(session(), "u-1").unwrap();
        w.load(vec![case("R1", "01/01/2020", "3"), case("R2", "bad date", "1")])
            .unwrap();
        assert!(w.next());
        assert!(w.next());
        assert!(w.next());
        assert_eq!(w.stage(), Stage::AutoCorrect);
        assert!(!w.can_next());
        assert!(w.run_auto_correction(&services).unwrap());
        assert!(w.next());

        assert!(w.run_validation(&services).unwrap());
        assert_eq!(w.valid_entries().len(), 2);
        assert!(w.next());

        assert_eq!(w.stage(), Stage::Stratify);
        assert_eq!(w.stratify().unwrap().behavior.total(), 2);
        assert!(w.next());

        assert!(w.run_consolidation(&services).unwrap());
        assert!(w.is_consolidated());
        assert!(w.next());
        assert_eq!(w.stage(), Stage::Review);
        assert!(w.next());
        assert_eq!(w.stage(), Stage::Complete);
        assert!(!w.next());
        assert!(!w.can_back());
        assert_eq!(
            *services.calls.borrow(),
            vec!["auto_correct", "validate", "consolidate"]
        );

        w.reset();
        assert_eq!(w.stage(), Stage::Upload);
        assert!(w.dataset().is_none());
    }

    #[test]
    fn single_flight_requests() {
        let mut w = Wizard::new(session(), "u-1").unwrap();
        w.load(vec![case("R1", "01/01/2020", "3")]).unwrap();
        w.next();
        w.next();
        w.next();
        let request = w.begin_auto_correction().unwrap();
        assert_eq!(request.dataset.len(), 1);
        assert!(w.is_busy());
        assert_eq!(
            w.begin_auto_correction(),
            Err(ReconcileError::Busy(Stage::AutoCorrect))
        );
        w.finish_auto_correction(Err(ServiceError::new("timeout")))
            .unwrap();
        assert!(!w.is_busy());
        assert!(!w.can_next());
        assert_eq!(w.dataset().unwrap().len(), 1);
        assert_eq!(
            w.finish_auto_correction(Err(ServiceError::new("late"))),
            Err(ReconcileError::NotStarted(Stage::AutoCorrect))
        );
    }

    #[test]
    fn validation_in_flight_blocks_next() {
        let services = EchoServices::default();
        let mut w = Wizard::new(session(), "u-1").unwrap();
        w.load(vec![case("R1", "01/01/2020", "3")]).unwrap();
        w.next();
        w.next();
        w.next();
        w.run_auto_correction(&services).unwrap();
        w.next();
        // Validation has not run, but nothing is in flight either.
        assert!(w.can_next());
        w.begin_validation().unwrap();
        assert!(!w.can_next());
        assert!(!w.next());
    }

    #[test]
    fn failed_service_keeps_stage_incomplete() {
        let services = EchoServices {
            fail: true,
            ..EchoServices::default()
        };
        let mut w = Wizard::new(session(), "u-1").unwrap();
        w.load(vec![case("R1", "01/01/2020", "3")]).unwrap();
        w.next();
        w.next();
        w.next();
        assert!(!w.run_auto_correction(&services).unwrap());
        assert_eq!(w.progress_message(), Some("Error during auto-correction."));
        assert!(!w.next());
        // Retrying is a manual action.
        assert!(!w.run_auto_correction(&services).unwrap());
        assert_eq!(services.calls.borrow().len(), 2);
    }

    #[test]
    fn keyless_copies_stay_removed() {
        let mut anonymous = Record::new();
        anonymous.insert(TOPOGRAPHY, "C50.9");
        let mut w = Wizard::new(session(), "u-1").unwrap();
        w.load(vec![case("R1", "01/01/2020", "3"), anonymous.clone(), anonymous])
            .unwrap();
        w.next();
        w.next();
        assert_eq!(w.pending_duplicates().len(), 1);
        assert_eq!(w.remove_duplicates().unwrap(), 1);
        assert!(w.back());
        assert!(w.next());
        assert!(w.pending_duplicates().is_empty());
        assert!(w.can_next());
    }

    #[test]
    fn reloading_discards_later_results() {
        let services = EchoServices::default();
        let mut w = Wizard::new(session(), "u-1").unwrap();
        w.load(vec![case("OLD", "01/01/2020", "3")]).unwrap();
        w.next();
        w.next();
        w.next();
        w.run_auto_correction(&services).unwrap();
        w.next();
        w.run_validation(&services).unwrap();
        assert_eq!(w.valid_entries().len(), 1);
        while w.back() {}
        assert_eq!(w.stage(), Stage::Upload);

        w.load(vec![case("NEW", "01/01/2020", "3")]).unwrap();
        assert!(w.auto_correction().is_none());
        assert!(w.validation().is_none());
        assert!(w.valid_entries().is_empty());
        w.next();
        w.next();
        w.next();
        assert_eq!(w.stage(), Stage::AutoCorrect);
        assert!(!w.can_next());
        w.run_auto_correction(&services).unwrap();
        w.next();
        w.run_validation(&services).unwrap();
        w.next();
        let regs: Vec<Option<String>> = w
            .valid_entries()
            .iter()
            .map(|r| r.registration_key())
            .collect();
        assert_eq!(regs, vec![Some("NEW".to_string())]);
        assert_eq!(w.stratify().unwrap().behavior.total(), 1);
    }

    #[test]
    fn mapping_discards_duplicate_scan() {
        let services = EchoServices::default();
        let mut w = Wizard::new(session(), "u-1").unwrap();
        w.load(vec![case("R1", "01/01/2020", "3")]).unwrap();
        w.next();
        w.next();
        w.next();
        w.run_auto_correction(&services).unwrap();
        assert!(w.back());
        assert!(w.back());
        assert_eq!(w.stage(), Stage::InspectSchema);
        let mapping = ColumnMapping::from_pairs([("grade", "grade_label")]).unwrap();
        w.apply_mapping(&mapping).unwrap();
        assert!(w.auto_correction().is_none());
    }

    #[test]
    fn no_going_back_while_in_flight() {
        let mut w = Wizard::new(session(), "u-1").unwrap();
        w.load(vec![case("R1", "01/01/2020", "3")]).unwrap();
        w.next();
        w.next();
        w.next();
        w.begin_auto_correction().unwrap();
        assert!(!w.can_back());
        assert!(!w.back());
        assert_eq!(w.stage(), Stage::AutoCorrect);
        w.finish_auto_correction(Err(ServiceError::new("timeout")))
            .unwrap();
        assert!(w.back());
    }

    #[test]
    fn actions_are_bound_to_their_stage() {
        let mut w = Wizard::new(session(), "u-1").unwrap();
        assert_eq!(
            w.remove_duplicates(),
            Err(ReconcileError::WrongStage {
                expected: Stage::RemoveDuplicates,
                actual: Stage::Upload
            })
        );
        assert!(matches!(
            w.begin_consolidation(),
            Err(ReconcileError::WrongStage { .. })
        ));
    }
}
