use log::{debug, info, warn};

use registry_reconciliation::pipeline::{Validation, Wizard};
use registry_reconciliation::services::{ConsolidationRequest, Corrections};
use registry_reconciliation::*;
use snafu::{prelude::*, Snafu};

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde_json::json;
use serde_json::Value as JSValue;
use text_diff::print_diff;

use crate::args::Args;
use crate::intake::config_reader::*;
use crate::intake::io_common::{simplify_file_name, InputType};
use crate::intake::offline::OfflineServices;

pub mod config_reader;
pub mod io_common;
pub mod io_csv;
pub mod io_excel;
pub mod io_json;
pub mod offline;

#[derive(Debug, Snafu)]
pub enum IntakeError {
    #[snafu(display("Error opening file {path}"))]
    OpeningExcel {
        source: calamine::XlsxError,
        path: String,
    },
    #[snafu(display("The worksheet {path} is empty"))]
    EmptyExcel { path: String },
    #[snafu(display("No worksheet named {name} in {path}"))]
    MissingWorksheet { name: String, path: String },
    #[snafu(display("The workbook {path} has several worksheets ({names}), use --excel-worksheet-name to choose one"))]
    AmbiguousWorksheet { path: String, names: String },
    #[snafu(display("Error opening file {path}"))]
    OpeningJson {
        source: std::io::Error,
        path: String,
    },
    #[snafu(display("Error parsing JSON"))]
    ParsingJson { source: serde_json::Error },
    #[snafu(display("Error opening CSV file {path}"))]
    CsvOpen { source: csv::Error, path: String },
    #[snafu(display("Error reading CSV line"))]
    CsvLineParse { source: csv::Error },
    #[snafu(display("Unknown input type {input_type:?} (expected csv, json or xlsx)"))]
    UnknownInputType { input_type: String },
    #[snafu(display("No input file: use --input or the inputSource section of the configuration"))]
    MissingInput {},
    #[snafu(display("Invalid column mapping {mapping:?} (expected missing=existing)"))]
    InvalidMapping { mapping: String },
    #[snafu(display("Error writing the summary to {path}"))]
    WritingOutput {
        source: std::io::Error,
        path: String,
    },
    #[snafu(display("{source}"))]
    Reconcile { source: ReconcileError },

    #[snafu(whatever, display("{message}"))]
    Whatever {
        message: String,
        #[snafu(source(from(Box<dyn std::error::Error>, Some)))]
        source: Option<Box<dyn std::error::Error>>,
    },
}

pub type IntakeResult<T> = Result<T, IntakeError>;

/// The options of a run, after merging the configuration file and the
/// command line.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct IntakeSettings {
    pub input_path: String,
    pub input_type: InputType,
    pub excel_worksheet_name: Option<String>,
    /// missing column -> existing column
    pub column_mapping: BTreeMap<String, String>,
    pub output_path: Option<String>,
    pub upload_id: String,
}

/// What the stages produced, for the summary.
#[derive(Debug, Clone)]
pub struct IntakeOutcome {
    pub duplicates: Vec<Duplicate>,
    pub duplicates_removed: usize,
    pub corrections: Corrections,
    pub validation: Validation,
    pub valid_entries: usize,
    pub consolidation: ConsolidationRequest,
}

/// Parses a `missing=existing` pair.
pub fn parse_mapping(s: &str) -> IntakeResult<(String, String)> {
    let (target, source) = s.split_once('=').context(InvalidMappingSnafu { mapping: s })?;
    let (target, source) = (target.trim(), source.trim());
    if target.is_empty() || source.is_empty() {
        return InvalidMappingSnafu { mapping: s }.fail();
    }
    Ok((target.to_string(), source.to_string()))
}

fn resolve_path(root: Option<&Path>, path: &str) -> String {
    match root {
        Some(root_p) => {
            let p: PathBuf = root_p.join(path);
            p.as_path().display().to_string()
        }
        None => path.to_string(),
    }
}

pub fn resolve_settings(args: &Args) -> IntakeResult<IntakeSettings> {
    let (config, root_p): (IntakeConfig, Option<PathBuf>) = match &args.config {
        Some(config_path) => {
            let config = read_config(config_path)?;
            let root_p = Path::new(config_path.as_str())
                .parent()
                .map(|p| p.to_path_buf());
            (config, root_p)
        }
        None => (IntakeConfig::default(), None),
    };
    debug!("resolve_settings: config: {:?}", config);
    let root = root_p.as_deref();
    let source = config.input_source.clone().unwrap_or_default();

    let input_path = match (&args.input, &source.file_path) {
        (Some(p), _) => p.clone(),
        (None, Some(p)) => resolve_path(root, p),
        (None, None) => return MissingInputSnafu {}.fail(),
    };

    let input_type = match args.input_type.as_ref().or(source.provider.as_ref()) {
        Some(s) => InputType::parse(s)?,
        None => InputType::infer(&input_path)?,
    };

    let mut column_mapping = config.column_mapping.clone();
    for m in args.mapping.iter() {
        let (target, source) = parse_mapping(m)?;
        column_mapping.insert(target, source);
    }

    let output_path = match (&args.out, &config.output_settings.output_path) {
        (Some(p), _) => Some(p.clone()),
        (None, Some(p)) if p == "stdout" => Some(p.clone()),
        (None, Some(p)) => Some(resolve_path(root, p)),
        (None, None) => None,
    };

    let upload_id = args
        .upload_id
        .clone()
        .or_else(|| config.output_settings.upload_id.clone())
        .unwrap_or_else(|| simplify_file_name(&input_path));

    Ok(IntakeSettings {
        input_path,
        input_type,
        excel_worksheet_name: args
            .excel_worksheet_name
            .clone()
            .or(source.excel_worksheet_name),
        column_mapping,
        output_path,
        upload_id,
    })
}

pub fn read_dataset(settings: &IntakeSettings) -> IntakeResult<Vec<Record>> {
    info!(
        "read_dataset: reading {} as {:?}",
        settings.input_path, settings.input_type
    );
    let records = match settings.input_type {
        InputType::Csv => io_csv::read_csv_dataset(&settings.input_path)?,
        InputType::Json => io_json::read_json_dataset(&settings.input_path)?,
        InputType::Xlsx => io_excel::read_excel_dataset(
            &settings.input_path,
            settings.excel_worksheet_name.as_deref(),
        )?,
    };
    info!("read_dataset: {} records", records.len());
    Ok(records)
}

// Moves to the next stage, or explains why it is not possible.
fn advance(wizard: &mut Wizard) -> IntakeResult<()> {
    let stage = wizard.stage();
    if !wizard.next() {
        whatever!(
            "Cannot complete stage {}: {}",
            stage,
            wizard.progress_message().unwrap_or("stage not completed")
        )
    }
    Ok(())
}

/// Runs all the stages of the wizard over a dataset, with the offline services.
pub fn reconcile(
    records: Vec<Record>,
    column_mapping: &BTreeMap<String, String>,
    upload_id: &str,
) -> IntakeResult<IntakeOutcome> {
    let mapping = ColumnMapping::from_pairs(column_mapping.clone()).context(ReconcileSnafu {})?;
    let services = OfflineServices::new(upload_id);
    let session = Session::new("regrecon", "offline");
    let mut wizard = Wizard::new(session, upload_id).context(ReconcileSnafu {})?;

    wizard.load(records).context(ReconcileSnafu {})?;
    advance(&mut wizard)?;

    if !mapping.is_empty() {
        wizard.apply_mapping(&mapping).context(ReconcileSnafu {})?;
    }
    if !wizard.missing_columns().is_empty() {
        whatever!(
            "Missing required columns: {} (use --mapping missing=existing)",
            wizard.missing_columns().join(", ")
        )
    }
    advance(&mut wizard)?;

    let duplicates = wizard.pending_duplicates().to_vec();
    for d in duplicates.iter() {
        debug!(
            "reconcile: record {} is a {:?} duplicate of record {}",
            d.index, d.kind, d.duplicate_of
        );
    }
    wizard.remove_duplicates().context(ReconcileSnafu {})?;
    advance(&mut wizard)?;

    if !wizard
        .run_auto_correction(&services)
        .context(ReconcileSnafu {})?
    {
        whatever!("Auto-correction failed")
    }
    advance(&mut wizard)?;

    if !wizard.run_validation(&services).context(ReconcileSnafu {})? {
        whatever!("Validation failed")
    }
    advance(&mut wizard)?;

    wizard.stratify().context(ReconcileSnafu {})?;
    advance(&mut wizard)?;

    if !wizard
        .run_consolidation(&services)
        .context(ReconcileSnafu {})?
    {
        whatever!("Consolidation failed")
    }
    // Review, then complete.
    advance(&mut wizard)?;
    advance(&mut wizard)?;

    let consolidation = services
        .take_consolidated()
        .whatever_context("No consolidation payload was produced")?;
    let validation = wizard
        .validation()
        .cloned()
        .whatever_context("No validation outcome")?;
    let corrections = wizard
        .auto_correction()
        .map(|a| a.corrections.clone())
        .unwrap_or_default();

    Ok(IntakeOutcome {
        duplicates,
        duplicates_removed: wizard.duplicates_removed(),
        corrections,
        validation,
        valid_entries: wizard.valid_entries().len(),
        consolidation,
    })
}

fn build_summary_js(settings: &IntakeSettings, outcome: &IntakeOutcome) -> JSValue {
    let c = OutputConfig {
        input: simplify_file_name(&settings.input_path),
        input_type: settings.input_type.name().to_string(),
        upload_id: settings.upload_id.clone(),
        column_mapping: settings.column_mapping.clone(),
    };
    json!({
        "config": c,
        "duplicates": {
            "removed": outcome.duplicates_removed,
            "detected": outcome.duplicates,
        },
        "corrections": outcome.corrections,
        "validation": {
            "validationId": outcome.validation.validation_id,
            "failures": outcome.validation.failures,
            "validEntries": outcome.valid_entries,
        },
        "consolidation": outcome.consolidation,
    })
}

fn write_summary(output_path: &Option<String>, pretty_js: &str) -> IntakeResult<()> {
    match output_path.as_deref() {
        Some("stdout") => {
            println!("{}", pretty_js);
        }
        Some(path) => {
            info!("write_summary: writing summary to {}", path);
            fs::write(path, pretty_js).context(WritingOutputSnafu { path })?;
        }
        None => {
            debug!("write_summary: no output requested");
        }
    }
    Ok(())
}

fn check_reference(reference_path: &str, pretty_js_stats: &str) -> IntakeResult<()> {
    let summary_ref = read_summary(reference_path)?;
    let pretty_js_summary_ref =
        serde_json::to_string_pretty(&summary_ref).context(ParsingJsonSnafu {})?;
    if pretty_js_summary_ref != pretty_js_stats {
        warn!("Found differences with the reference summary");
        print_diff(pretty_js_summary_ref.as_str(), pretty_js_stats, "\n");
        whatever!("Difference detected between calculated summary and reference summary")
    }
    info!("check_reference: the summary matches {}", reference_path);
    Ok(())
}

pub fn run_intake(args: &Args) -> IntakeResult<()> {
    let settings = resolve_settings(args)?;
    info!("settings: {:?}", settings);

    let records = read_dataset(&settings)?;
    let outcome = reconcile(records, &settings.column_mapping, &settings.upload_id)?;

    let result_js = build_summary_js(&settings, &outcome);
    let pretty_js_stats = serde_json::to_string_pretty(&result_js).context(ParsingJsonSnafu {})?;
    write_summary(&settings.output_path, &pretty_js_stats)?;

    if let Some(reference_path) = &args.reference {
        check_reference(reference_path, &pretty_js_stats)?;
    }
    Ok(())
}

#[cfg(test)]
fn run_intake_test(test_name: &str, config_lpath: &str, summary_lpath: &str) {
    let test_dir = concat!(env!("CARGO_MANIFEST_DIR"), "/tests/data");
    info!("Running test {}", test_name);
    let args = Args {
        config: Some(format!("{}/{}/{}", test_dir, test_name, config_lpath)),
        reference: Some(format!("{}/{}/{}", test_dir, test_name, summary_lpath)),
        out: None,
        input: None,
        input_type: None,
        mapping: vec![],
        excel_worksheet_name: None,
        upload_id: None,
        verbose: false,
    };
    let res = run_intake(&args);
    if let Err(e) = res {
        warn!("Error occured {:?}", e);
        eprintln!("An error occured {}", e);
        if let Some(bt) = snafu::ErrorCompat::backtrace(&e) {
            eprintln!("trace: {}", bt);
        }
        panic!("test {} failed", test_name);
    }
}

#[cfg(test)]
pub fn test_wrapper(test_name: &str) {
    run_intake_test(
        test_name,
        format!("{}_config.json", test_name).as_str(),
        format!("{}_expected_summary.json", test_name).as_str(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn init() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    fn case(reg: &str, sex: &str, histology: &str) -> Record {
        record_of(&[
            (REGISTRATION_NUMBER, reg),
            (SEX, sex),
            (BIRTH_DATE, "01/01/1970"),
            (DATE_OF_INCIDENCE, "01/01/2020"),
            (TOPOGRAPHY, "C50.9"),
            (HISTOLOGY, histology),
            (BEHAVIOR, "3"),
            (GRADE_CODE, "2"),
            (BASIS_OF_DIAGNOSIS, "7"),
        ])
    }

    fn args() -> Args {
        Args {
            config: None,
            reference: None,
            out: None,
            input: Some("data/cases.csv".to_string()),
            input_type: None,
            mapping: vec![],
            excel_worksheet_name: None,
            upload_id: None,
            verbose: false,
        }
    }

    #[test]
    fn mapping_pairs() {
        assert_eq!(
            parse_mapping(" histology = morphology_code").unwrap(),
            ("histology".to_string(), "morphology_code".to_string())
        );
        assert!(parse_mapping("histology").is_err());
        assert!(parse_mapping("histology=").is_err());
    }

    #[test]
    fn settings_from_the_command_line() {
        let mut a = args();
        a.mapping = vec!["grade_code=grade".to_string()];
        let s = resolve_settings(&a).unwrap();
        assert_eq!(s.input_type, InputType::Csv);
        assert_eq!(s.upload_id, "cases.csv");
        assert_eq!(s.column_mapping.get("grade_code").unwrap(), "grade");
        assert_eq!(s.output_path, None);

        a.input = None;
        assert!(matches!(
            resolve_settings(&a),
            Err(IntakeError::MissingInput {})
        ));
    }

    #[test]
    fn reconcile_in_memory() {
        init();
        let records = vec![
            case("R1", "female", "8500/3"),
            case("R1", "2", "8500"),
            case("R2", "M", "8140"),
        ];
        let outcome = reconcile(records, &BTreeMap::new(), "u-1").unwrap();
        assert_eq!(outcome.duplicates_removed, 1);
        assert_eq!(outcome.duplicates.len(), 1);
        assert_eq!(outcome.corrections.sex.len(), 2);
        assert_eq!(outcome.corrections.histology.len(), 1);
        assert_eq!(outcome.valid_entries, 2);
        assert_eq!(outcome.consolidation.upload_id, "u-1");
        let entries = &outcome.consolidation.valid_entries;
        assert_eq!(entries[0].code(SEX), Some("2".to_string()));
        assert_eq!(entries[0].code(DATE_OF_INCIDENCE), Some("2020-01-01".to_string()));
        assert_eq!(entries[1].code(SEX), Some("1".to_string()));
    }

    #[test]
    fn unmapped_missing_columns_stop_the_run() {
        init();
        let mut r = case("R1", "1", "8500");
        r.remove(GRADE_CODE);
        r.insert("grade", "2");
        let res = reconcile(vec![r.clone()], &BTreeMap::new(), "u-1");
        assert!(res.is_err());

        let mut mapping = BTreeMap::new();
        mapping.insert(GRADE_CODE.to_string(), "grade".to_string());
        let outcome = reconcile(vec![r], &mapping, "u-1").unwrap();
        assert_eq!(outcome.valid_entries, 1);
    }

    #[test]
    fn degenerate_mapping_is_rejected() {
        let mut mapping = BTreeMap::new();
        mapping.insert(GRADE_CODE.to_string(), "x".to_string());
        mapping.insert(HISTOLOGY.to_string(), "x".to_string());
        let res = reconcile(vec![case("R1", "1", "8500")], &mapping, "u-1");
        assert!(matches!(
            res,
            Err(IntakeError::Reconcile {
                source: ReconcileError::DegenerateMapping { .. }
            })
        ));
    }

    #[test]
    fn csv_basic() {
        init();
        test_wrapper("csv_basic");
    }

    #[test]
    fn json_numeric_codes() {
        init();
        test_wrapper("json_numeric_codes");
    }
}
