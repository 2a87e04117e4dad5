// ********* Input data structures ***********

use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::Display;

use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value as JSValue;

use crate::builder::clean_json_row;
use crate::dates::{age_at, parse_date_value};
use crate::pipeline::Stage;

pub const REGISTRATION_NUMBER: &str = "registration_number";
pub const SEX: &str = "sex";
pub const BIRTH_DATE: &str = "birth_date";
pub const DATE_OF_INCIDENCE: &str = "date_of_incidence";
pub const TOPOGRAPHY: &str = "topography";
pub const HISTOLOGY: &str = "histology";
pub const BEHAVIOR: &str = "behavior";
pub const GRADE_CODE: &str = "grade_code";
pub const BASIS_OF_DIAGNOSIS: &str = "basis_of_diagnosis";
pub const AGE_AT_INCIDENCE: &str = "age_at_incidence";

/// The columns that every uploaded table must provide, possibly after a
/// column mapping has been applied.
pub const REQUIRED_COLUMNS: [&str; 9] = [
    REGISTRATION_NUMBER,
    SEX,
    BIRTH_DATE,
    DATE_OF_INCIDENCE,
    TOPOGRAPHY,
    HISTOLOGY,
    BEHAVIOR,
    GRADE_CODE,
    BASIS_OF_DIAGNOSIS,
];

/// A single cell of an uploaded table.
///
/// Spreadsheets and JSON exports do not agree on the types of the codes (a
/// sex code may come as `"1"` or as `1`), so the readers keep what they found
/// and the rest of the pipeline works on the [key form](Scalar::key).
#[derive(PartialEq, Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Bool(bool),
    Integer(i64),
    Float(f64),
    Text(String),
}

impl Scalar {
    /// The textual form used to compare codes and to name buckets.
    ///
    /// Floats without a fractional part are printed as integers, so that a
    /// grade read as `2.0` from a spreadsheet is the same code as `"2"`.
    pub fn key(&self) -> String {
        match self {
            Scalar::Text(s) => s.clone(),
            Scalar::Integer(i) => i.to_string(),
            Scalar::Float(f) if f.is_finite() && f.fract() == 0.0 && f.abs() < 1e15 => {
                (*f as i64).to_string()
            }
            Scalar::Float(f) => f.to_string(),
            Scalar::Bool(b) => b.to_string(),
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Scalar::Text(s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Numeric interpretation, also for numbers stored as text.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Scalar::Integer(i) => Some(*i as f64),
            Scalar::Float(f) => Some(*f),
            Scalar::Text(s) => s.trim().parse::<f64>().ok(),
            Scalar::Bool(_) => None,
        }
    }

    /// Empty strings, zero and `false` are not truthy.
    pub fn is_truthy(&self) -> bool {
        match self {
            Scalar::Text(s) => !s.is_empty(),
            Scalar::Integer(i) => *i != 0,
            Scalar::Float(f) => *f != 0.0 && !f.is_nan(),
            Scalar::Bool(b) => *b,
        }
    }
}

impl Display for Scalar {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.key())
    }
}

impl From<&str> for Scalar {
    fn from(s: &str) -> Scalar {
        Scalar::Text(s.to_string())
    }
}

impl From<String> for Scalar {
    fn from(s: String) -> Scalar {
        Scalar::Text(s)
    }
}

impl From<i64> for Scalar {
    fn from(i: i64) -> Scalar {
        Scalar::Integer(i)
    }
}

impl From<f64> for Scalar {
    fn from(f: f64) -> Scalar {
        Scalar::Float(f)
    }
}

/// One cancer-registry case: a flat mapping from field name to scalar.
///
/// Deserializing a record applies the row cleaning rules: blank field names,
/// nulls, empty strings and nested values are dropped.
#[derive(PartialEq, Debug, Clone, Default, Serialize)]
#[serde(transparent)]
pub struct Record {
    fields: BTreeMap<String, Scalar>,
}

impl Record {
    pub fn new() -> Record {
        Record::default()
    }

    pub fn get(&self, field: &str) -> Option<&Scalar> {
        self.fields.get(field)
    }

    pub fn contains_field(&self, field: &str) -> bool {
        self.fields.contains_key(field)
    }

    pub fn insert(&mut self, field: impl Into<String>, value: impl Into<Scalar>) -> Option<Scalar> {
        self.fields.insert(field.into(), value.into())
    }

    pub fn remove(&mut self, field: &str) -> Option<Scalar> {
        self.fields.remove(field)
    }

    pub fn field_names(&self) -> impl Iterator<Item = &String> {
        self.fields.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Scalar)> {
        self.fields.iter()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// The key form of a field, if present.
    pub fn code(&self, field: &str) -> Option<String> {
        self.fields.get(field).map(|v| v.key())
    }

    /// The identity key: the registration number without surrounding whitespace.
    pub fn registration_key(&self) -> Option<String> {
        self.fields
            .get(REGISTRATION_NUMBER)
            .map(|v| v.key().trim().to_string())
    }

    pub fn incidence_date(&self) -> Option<NaiveDate> {
        self.fields.get(DATE_OF_INCIDENCE).and_then(parse_date_value)
    }

    pub fn birth_date(&self) -> Option<NaiveDate> {
        self.fields.get(BIRTH_DATE).and_then(parse_date_value)
    }

    /// The recorded age at incidence, or the age derived from the birth and
    /// incidence dates when the field is absent.
    pub fn age_at_incidence(&self) -> Option<f64> {
        match self.fields.get(AGE_AT_INCIDENCE) {
            Some(v) => v.as_f64().filter(|a| a.is_finite()),
            None => {
                let birth = self.birth_date()?;
                let incidence = self.incidence_date()?;
                Some(age_at(birth, incidence) as f64)
            }
        }
    }
}

impl FromIterator<(String, Scalar)> for Record {
    fn from_iter<I: IntoIterator<Item = (String, Scalar)>>(iter: I) -> Record {
        Record {
            fields: iter.into_iter().collect(),
        }
    }
}

impl<'de> Deserialize<'de> for Record {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Record, D::Error> {
        let raw: BTreeMap<String, JSValue> = BTreeMap::deserialize(deserializer)?;
        Ok(clean_json_row(raw))
    }
}

/// Helper for tests and examples: builds a record out of text pairs.
pub fn record_of(pairs: &[(&str, &str)]) -> Record {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), Scalar::from(*v)))
        .collect()
}

// ******** Errors *********

/// Errors raised by the reconciliation pipeline.
///
/// None of them are data errors: duplicates and missing columns are reported
/// as values. These cover misuse of the pipeline controller and invalid inputs
/// from the caller.
#[derive(Eq, PartialEq, Debug, Clone)]
pub enum ReconcileError {
    /// The session carries no credentials.
    Unauthenticated,
    /// Two missing columns were mapped to the same source column.
    DegenerateMapping {
        column: String,
        first_target: String,
        second_target: String,
    },
    /// A data row has more cells than the header.
    RowTooLong { row: usize, cells: usize, columns: usize },
    /// The action belongs to another stage of the pipeline.
    WrongStage { expected: Stage, actual: Stage },
    /// An external call for this stage is already in flight.
    Busy(Stage),
    /// A service outcome was delivered but no call was in flight.
    NotStarted(Stage),
    /// No dataset has been loaded.
    EmptyDataset,
    /// Consolidation was requested before stratification.
    NotStratified,
}

impl Error for ReconcileError {}

impl Display for ReconcileError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReconcileError::Unauthenticated => write!(f, "the session is not authenticated"),
            ReconcileError::DegenerateMapping {
                column,
                first_target,
                second_target,
            } => write!(
                f,
                "column {} cannot be mapped to both {} and {}",
                column, first_target, second_target
            ),
            ReconcileError::RowTooLong {
                row,
                cells,
                columns,
            } => write!(
                f,
                "row {} has {} cells but the header only has {} columns",
                row, cells, columns
            ),
            ReconcileError::WrongStage { expected, actual } => write!(
                f,
                "action only allowed at stage {} (current stage: {})",
                expected, actual
            ),
            ReconcileError::Busy(stage) => {
                write!(f, "a request for stage {} is already in flight", stage)
            }
            ReconcileError::NotStarted(stage) => {
                write!(f, "no request for stage {} is in flight", stage)
            }
            ReconcileError::EmptyDataset => write!(f, "no dataset has been loaded"),
            ReconcileError::NotStratified => write!(f, "the valid entries have not been stratified"),
        }
    }
}
