use log::{debug, info};
use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;

use crate::config::*;

pub const AGE_GROUPS: [&str; 4] = ["0-18", "19-35", "36-55", "56+"];
pub const SEX_BUCKETS: [&str; 2] = ["male", "female"];
pub const BEHAVIOR_BUCKETS: [&str; 4] = ["benign", "malignant", "uncertain", "unspecified"];
pub const GRADE_BUCKETS: [&str; 4] = ["1", "2", "3", "4"];

/// The buckets of one dimension, in insertion order.
///
/// Serialized as a map from bucket key to the list of records.
#[derive(PartialEq, Debug, Clone, Default)]
pub struct Buckets {
    entries: Vec<(String, Vec<Record>)>,
}

impl Buckets {
    fn with_keys(keys: &[&str]) -> Buckets {
        Buckets {
            entries: keys.iter().map(|k| (k.to_string(), Vec::new())).collect(),
        }
    }

    fn push(&mut self, key: &str, record: &Record) {
        match self.entries.iter_mut().find(|(k, _)| k == key) {
            Some((_, records)) => records.push(record.clone()),
            None => self.entries.push((key.to_string(), vec![record.clone()])),
        }
    }

    pub fn get(&self, key: &str) -> Option<&[Record]> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, records)| records.as_slice())
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[Record])> {
        self.entries
            .iter()
            .map(|(k, records)| (k.as_str(), records.as_slice()))
    }

    /// Number of buckets.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of records placed in this dimension.
    pub fn total(&self) -> usize {
        self.entries.iter().map(|(_, records)| records.len()).sum()
    }
}

impl Serialize for Buckets {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (k, records) in self.entries.iter() {
            map.serialize_entry(k, records)?;
        }
        map.end()
    }
}

#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash)]
pub enum Dimension {
    AgeGroup,
    Sex,
    Topography,
    Histology,
    Behavior,
    Grade,
    BasisOfDiagnosis,
}

impl Dimension {
    pub const ALL: [Dimension; 7] = [
        Dimension::AgeGroup,
        Dimension::Sex,
        Dimension::Topography,
        Dimension::Histology,
        Dimension::Behavior,
        Dimension::Grade,
        Dimension::BasisOfDiagnosis,
    ];

    /// The name used by the consolidation service.
    pub fn name(self) -> &'static str {
        match self {
            Dimension::AgeGroup => "ageGroups",
            Dimension::Sex => "gender",
            Dimension::Topography => "topography",
            Dimension::Histology => "histology",
            Dimension::Behavior => "behavior",
            Dimension::Grade => "grade",
            Dimension::BasisOfDiagnosis => "basisOfDiagnosis",
        }
    }
}

/// Valid records grouped along every dimension.
#[derive(PartialEq, Debug, Clone, Serialize)]
pub struct StratificationResult {
    #[serde(rename = "ageGroups")]
    pub age_groups: Buckets,
    pub gender: Buckets,
    pub topography: Buckets,
    pub histology: Buckets,
    pub behavior: Buckets,
    pub grade: Buckets,
    #[serde(rename = "basisOfDiagnosis")]
    pub basis_of_diagnosis: Buckets,
}

impl Default for StratificationResult {
    fn default() -> StratificationResult {
        StratificationResult {
            age_groups: Buckets::with_keys(&AGE_GROUPS),
            gender: Buckets::with_keys(&SEX_BUCKETS),
            topography: Buckets::default(),
            histology: Buckets::default(),
            behavior: Buckets::with_keys(&BEHAVIOR_BUCKETS),
            grade: Buckets::with_keys(&GRADE_BUCKETS),
            basis_of_diagnosis: Buckets::default(),
        }
    }
}

impl StratificationResult {
    pub fn dimension(&self, dimension: Dimension) -> &Buckets {
        match dimension {
            Dimension::AgeGroup => &self.age_groups,
            Dimension::Sex => &self.gender,
            Dimension::Topography => &self.topography,
            Dimension::Histology => &self.histology,
            Dimension::Behavior => &self.behavior,
            Dimension::Grade => &self.grade,
            Dimension::BasisOfDiagnosis => &self.basis_of_diagnosis,
        }
    }
}

/// Upper bounds are inclusive.
pub fn age_group(age: f64) -> &'static str {
    if age <= 18.0 {
        "0-18"
    } else if age <= 35.0 {
        "19-35"
    } else if age <= 55.0 {
        "36-55"
    } else {
        "56+"
    }
}

pub fn sex_bucket(sex: Option<&Scalar>) -> Option<&'static str> {
    match sex.map(|s| s.key()).as_deref() {
        Some("1") => Some("male"),
        Some("2") => Some("female"),
        _ => None,
    }
}

/// Every record has a behavior bucket: unknown codes are unspecified.
pub fn behavior_bucket(behavior: Option<&Scalar>) -> &'static str {
    match behavior.map(|s| s.key()).as_deref() {
        Some("1") => "benign",
        Some("3") => "malignant",
        Some("2") => "uncertain",
        _ => "unspecified",
    }
}

pub fn grade_bucket(grade: Option<&Scalar>) -> Option<&'static str> {
    let grade = grade.filter(|g| g.is_truthy())?;
    let key = grade.key();
    GRADE_BUCKETS.iter().find(|b| **b == key).copied()
}

/// Groups the valid records along every dimension.
///
/// A record lands in at most one bucket per dimension. It is absent from a
/// dimension when its value does not fit any bucket (unknown sex, invalid
/// grade, no age) or when the field is missing for the open dimensions. This
/// does not affect the other dimensions.
pub fn stratify(records: &[Record]) -> StratificationResult {
    info!("stratify: stratifying {} records", records.len());
    let mut res = StratificationResult::default();
    for r in records.iter() {
        match r.age_at_incidence() {
            Some(age) => res.age_groups.push(age_group(age), r),
            None => debug!(
                "stratify: no age at incidence for {:?}",
                r.registration_key()
            ),
        }
        if let Some(b) = sex_bucket(r.get(SEX)) {
            res.gender.push(b, r);
        }
        if let Some(topography) = r.code(TOPOGRAPHY) {
            res.topography.push(&topography, r);
        }
        if let Some(histology) = r.code(HISTOLOGY) {
            res.histology.push(&histology, r);
        }
        res.behavior.push(behavior_bucket(r.get(BEHAVIOR)), r);
        if let Some(b) = grade_bucket(r.get(GRADE_CODE)) {
            res.grade.push(b, r);
        }
        if let Some(basis) = r.code(BASIS_OF_DIAGNOSIS) {
            res.basis_of_diagnosis.push(&basis, r);
        }
    }
    for d in Dimension::ALL {
        debug!(
            "stratify: {}: {} records in {} buckets",
            d.name(),
            res.dimension(d).total(),
            res.dimension(d).len()
        );
    }
    res
}
