use std::collections::BTreeSet;

use log::{debug, info};

use crate::config::*;

/// The column set of an uploaded table.
///
/// It is inferred from the first record only: uploaded tables are assumed to
/// have a uniform schema across rows. Rows that deviate from the first one are
/// not detected here.
#[derive(Eq, PartialEq, Debug, Clone, Default)]
pub struct InferredSchema {
    columns: BTreeSet<String>,
}

impl InferredSchema {
    pub fn infer(records: &[Record]) -> InferredSchema {
        let columns: BTreeSet<String> = records
            .first()
            .map(|r| r.field_names().cloned().collect())
            .unwrap_or_default();
        debug!("InferredSchema::infer: columns: {:?}", columns);
        InferredSchema { columns }
    }

    pub fn contains(&self, column: &str) -> bool {
        self.columns.contains(column)
    }

    pub fn columns(&self) -> impl Iterator<Item = &String> {
        self.columns.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// The required columns absent from this schema, in the order of `required`.
    pub fn missing(&self, required: &[&str]) -> Vec<String> {
        required
            .iter()
            .filter(|c| !self.contains(c))
            .map(|c| c.to_string())
            .collect()
    }
}

/// `required − columns(records[0])`. An empty dataset misses every column.
pub fn missing_columns(required: &[&str], records: &[Record]) -> Vec<String> {
    let missing = InferredSchema::infer(records).missing(required);
    if !missing.is_empty() {
        info!("missing_columns: missing required columns: {}", missing.join(", "));
    }
    missing
}

/// A user-supplied renaming: missing column -> existing column.
///
/// Each existing column may feed only one missing column.
#[derive(Eq, PartialEq, Debug, Clone, Default)]
pub struct ColumnMapping {
    pairs: Vec<(String, String)>,
}

impl ColumnMapping {
    pub fn new() -> ColumnMapping {
        ColumnMapping::default()
    }

    pub fn from_pairs<I, S, T>(pairs: I) -> Result<ColumnMapping, ReconcileError>
    where
        I: IntoIterator<Item = (S, T)>,
        S: Into<String>,
        T: Into<String>,
    {
        let mut mapping = ColumnMapping::new();
        for (target, source) in pairs {
            mapping.insert(target, source)?;
        }
        Ok(mapping)
    }

    /// Maps `target` to `source`. Mapping a target again replaces the
    /// previous choice.
    pub fn insert(
        &mut self,
        target: impl Into<String>,
        source: impl Into<String>,
    ) -> Result<(), ReconcileError> {
        let target = target.into();
        let source = source.into();
        if let Some((other, _)) = self
            .pairs
            .iter()
            .find(|(t, s)| *s == source && *t != target)
        {
            return Err(ReconcileError::DegenerateMapping {
                column: source,
                first_target: other.clone(),
                second_target: target,
            });
        }
        match self.pairs.iter_mut().find(|(t, _)| *t == target) {
            Some(pair) => pair.1 = source,
            None => self.pairs.push((target, source)),
        }
        Ok(())
    }

    pub fn source_for(&self, target: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(t, _)| t == target)
            .map(|(_, s)| s.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.pairs.iter().map(|(t, s)| (t.as_str(), s.as_str()))
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}

/// Renames the mapped columns in every record.
///
/// The value of the source column moves to the target column. A record that
/// lacks the source column is left without the target column.
pub fn apply_mapping(records: &mut [Record], mapping: &ColumnMapping) {
    info!(
        "apply_mapping: applying {} renames to {} records",
        mapping.len(),
        records.len()
    );
    for record in records.iter_mut() {
        for (target, source) in mapping.iter() {
            if let Some(v) = record.remove(source) {
                record.insert(target, v);
            }
        }
    }
}
