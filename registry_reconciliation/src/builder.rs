use std::collections::BTreeMap;

use log::{debug, warn};
use serde_json::Value as JSValue;

pub use crate::config::*;

/// A builder for assembling a dataset out of the rows of a table.
///
/// The readers of tabular files (CSV, spreadsheets) use it to attach the
/// header to every row and to apply the row cleaning rules.
///
/// ```
/// use registry_reconciliation::builder::DatasetBuilder;
/// use registry_reconciliation::{ReconcileError, Scalar};
///
/// let mut builder = DatasetBuilder::new()
///     .columns(&["registration_number".to_string(), "sex".to_string()]);
///
/// builder.add_row(&[Some(Scalar::from("R1")), Some(Scalar::from(""))])?;
///
/// let records = builder.build();
/// assert_eq!(records.len(), 1);
/// assert!(!records[0].contains_field("sex"));
/// # Ok::<(), ReconcileError>(())
/// ```
#[derive(Debug, Default)]
pub struct DatasetBuilder {
    pub(crate) _columns: Vec<String>,
    pub(crate) _records: Vec<Record>,
}

impl DatasetBuilder {
    pub fn new() -> DatasetBuilder {
        DatasetBuilder::default()
    }

    /// Sets the header. Rows added before are kept.
    pub fn columns(self, header: &[String]) -> DatasetBuilder {
        DatasetBuilder {
            _columns: header.to_vec(),
            _records: self._records,
        }
    }

    /// Adds a row of cells, in header order.
    ///
    /// Rows shorter than the header are accepted: the trailing fields are
    /// absent. Rows longer than the header are rejected.
    pub fn add_row(&mut self, cells: &[Option<Scalar>]) -> Result<(), ReconcileError> {
        if cells.len() > self._columns.len() {
            return Err(ReconcileError::RowTooLong {
                row: self._records.len() + 1,
                cells: cells.len(),
                columns: self._columns.len(),
            });
        }
        let raw = self
            ._columns
            .iter()
            .cloned()
            .zip(cells.iter().cloned());
        self._records.push(clean_row(raw));
        Ok(())
    }

    /// Adds a row that already carries its field names.
    pub fn add_record<I>(&mut self, raw: I)
    where
        I: IntoIterator<Item = (String, Option<Scalar>)>,
    {
        self._records.push(clean_row(raw));
    }

    pub fn build(self) -> Vec<Record> {
        debug!("DatasetBuilder: built {} records", self._records.len());
        self._records
    }
}

/// Keeps only the fields that have a non-blank name and a non-empty value.
pub fn clean_row<I>(raw: I) -> Record
where
    I: IntoIterator<Item = (String, Option<Scalar>)>,
{
    raw.into_iter()
        .filter(|(name, _)| !name.trim().is_empty())
        .filter_map(|(name, value)| match value {
            Some(Scalar::Text(s)) if s.is_empty() => None,
            Some(v) => Some((name, v)),
            None => None,
        })
        .collect()
}

/// Row cleaning for JSON objects. Nested values cannot be represented in a
/// record and are dropped.
pub fn clean_json_row(raw: BTreeMap<String, JSValue>) -> Record {
    let cells = raw.into_iter().map(|(name, value)| {
        let scalar = match value {
            JSValue::Null => None,
            JSValue::Bool(b) => Some(Scalar::Bool(b)),
            JSValue::Number(n) => match n.as_i64() {
                Some(i) => Some(Scalar::Integer(i)),
                None => n.as_f64().map(Scalar::Float),
            },
            JSValue::String(s) => Some(Scalar::Text(s)),
            JSValue::Array(_) | JSValue::Object(_) => {
                warn!("clean_json_row: dropping nested value in field {:?}", name);
                None
            }
        };
        (name, scalar)
    });
    clean_row(cells)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header() -> Vec<String> {
        vec![
            REGISTRATION_NUMBER.to_string(),
            " ".to_string(),
            SEX.to_string(),
        ]
    }

    #[test]
    fn blank_headers_and_empty_cells_are_dropped() {
        let mut b = DatasetBuilder::new().columns(&header());
        b.add_row(&[
            Some(Scalar::from("R1")),
            Some(Scalar::from("x")),
            Some(Scalar::from("")),
        ])
        .unwrap();
        let records = b.build();
        assert_eq!(records, vec![record_of(&[(REGISTRATION_NUMBER, "R1")])]);
    }

    #[test]
    fn short_rows_are_padded_long_rows_rejected() {
        let mut b = DatasetBuilder::new().columns(&header());
        b.add_row(&[Some(Scalar::from("R1"))]).unwrap();
        let err = b.add_row(&[None, None, None, Some(Scalar::from("extra"))]);
        assert_eq!(
            err,
            Err(ReconcileError::RowTooLong {
                row: 2,
                cells: 4,
                columns: 3
            })
        );
        assert_eq!(b.build().len(), 1);
    }

    #[test]
    fn whitespace_values_are_kept() {
        let r = clean_row(vec![(SEX.to_string(), Some(Scalar::from(" ")))]);
        assert_eq!(r.get(SEX), Some(&Scalar::from(" ")));
    }
}
