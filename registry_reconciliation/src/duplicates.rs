//! Duplicate detection and resolution.
//!
//! Two notions of duplicates coexist:
//! - exact duplicates: a record whose content is identical to an earlier one;
//! - key duplicates: records that share the same registration number. Among
//!   them, the record with the earliest date of incidence is retained.
//!
//! Dates that cannot be parsed sort after every parseable date. On equal
//! dates the record seen first is retained. Records without a registration
//! number are only dropped as exact duplicates.

use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::NaiveDate;
use log::{debug, info, warn};
use serde::Serialize;

use crate::config::*;

#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DuplicateKind {
    Exact,
    Key,
}

/// A record that would be dropped by the resolution.
#[derive(PartialEq, Debug, Clone, Serialize)]
pub struct Duplicate {
    /// Position of the dropped record in the input.
    pub index: usize,
    /// Position of the record it duplicates, or that won the tie-break
    /// against it.
    pub duplicate_of: usize,
    pub kind: DuplicateKind,
    pub record: Record,
}

#[derive(PartialEq, Debug, Clone, Default)]
pub struct Resolution {
    pub kept: Vec<Record>,
    pub dropped: usize,
}

// True if `candidate` should replace the record currently retained.
fn is_earlier(candidate: Option<NaiveDate>, retained: Option<NaiveDate>) -> bool {
    match (candidate, retained) {
        (Some(c), Some(r)) => c < r,
        (Some(_), None) => true,
        (None, _) => false,
    }
}

// Fields are sorted, so the JSON form is a canonical form of the content.
fn signature(idx: usize, r: &Record) -> Option<String> {
    match serde_json::to_string(r) {
        Ok(s) => Some(s),
        Err(e) => {
            warn!("signature: record {} skipped: {}", idx, e);
            None
        }
    }
}

/// Records whose content is identical to an earlier record.
///
/// Returns pairs `(index, index of the first identical record)`, in input order.
pub fn find_exact_duplicates(records: &[Record]) -> Vec<(usize, usize)> {
    let mut first_seen: HashMap<String, usize> = HashMap::new();
    let mut res: Vec<(usize, usize)> = Vec::new();
    for (idx, r) in records.iter().enumerate() {
        let signature = match signature(idx, r) {
            Some(s) => s,
            None => continue,
        };
        match first_seen.get(&signature) {
            Some(first) => res.push((idx, *first)),
            None => {
                first_seen.insert(signature, idx);
            }
        }
    }
    debug!("find_exact_duplicates: {} exact duplicates", res.len());
    res
}

/// Records that lose the earliest-date tie-break against another record with
/// the same registration number.
///
/// Returns pairs `(dropped index, winning index)`, sorted by dropped index.
/// The winning index is the record retained at the time of the comparison.
pub fn find_key_duplicates(records: &[Record]) -> Vec<(usize, usize)> {
    let mut retained: HashMap<String, (usize, Option<NaiveDate>)> = HashMap::new();
    let mut res: Vec<(usize, usize)> = Vec::new();
    for (idx, r) in records.iter().enumerate() {
        let key = match r.registration_key() {
            Some(k) => k,
            None => continue,
        };
        let date = r.incidence_date();
        match retained.get_mut(&key) {
            Some(entry) => {
                if is_earlier(date, entry.1) {
                    res.push((entry.0, idx));
                    *entry = (idx, date);
                } else {
                    res.push((idx, entry.0));
                }
            }
            None => {
                retained.insert(key, (idx, date));
            }
        }
    }
    res.sort();
    debug!("find_key_duplicates: {} key duplicates", res.len());
    res
}

/// Read-only scan listing every record that the resolution would drop.
///
/// Both detectors run and their results are merged by record index: a record
/// flagged by both is reported once, as an exact duplicate.
pub fn detect(records: &[Record]) -> Vec<Duplicate> {
    let mut merged: BTreeMap<usize, (usize, DuplicateKind)> = BTreeMap::new();
    for (idx, of) in find_key_duplicates(records) {
        merged.insert(idx, (of, DuplicateKind::Key));
    }
    for (idx, of) in find_exact_duplicates(records) {
        merged.insert(idx, (of, DuplicateKind::Exact));
    }
    let res: Vec<Duplicate> = merged
        .into_iter()
        .map(|(index, (duplicate_of, kind))| Duplicate {
            index,
            duplicate_of,
            kind,
            record: records[index].clone(),
        })
        .collect();
    info!(
        "detect: {} duplicates found among {} records",
        res.len(),
        records.len()
    );
    res
}

/// Keeps one record per registration number, the one with the earliest date
/// of incidence.
///
/// Retained records come out in the order in which their registration number
/// first appears. Records without a registration number are kept in place,
/// except for exact copies of an earlier one. The dropped records are the ones
/// listed by [detect]. Running the resolution on its own output changes
/// nothing.
pub fn resolve(records: &[Record]) -> Resolution {
    // Positions in the output, each holding the index of the retained record.
    let mut slots: Vec<usize> = Vec::new();
    let mut slot_by_key: HashMap<String, usize> = HashMap::new();
    let mut keyless_seen: HashSet<String> = HashSet::new();
    for (idx, r) in records.iter().enumerate() {
        let key = match r.registration_key() {
            Some(k) => k,
            None => {
                let first = match signature(idx, r) {
                    Some(s) => keyless_seen.insert(s),
                    None => true,
                };
                if first {
                    slots.push(idx);
                } else {
                    debug!("resolve: record {} is a copy of a keyless record", idx);
                }
                continue;
            }
        };
        match slot_by_key.get(&key) {
            Some(slot) => {
                let current = slots[*slot];
                if is_earlier(r.incidence_date(), records[current].incidence_date()) {
                    debug!(
                        "resolve: {}: record {} replaces record {}",
                        key, idx, current
                    );
                    slots[*slot] = idx;
                }
            }
            None => {
                slot_by_key.insert(key, slots.len());
                slots.push(idx);
            }
        }
    }
    let kept: Vec<Record> = slots.iter().map(|idx| records[*idx].clone()).collect();
    let dropped = records.len() - kept.len();
    info!("resolve: kept {} records, dropped {}", kept.len(), dropped);
    Resolution { kept, dropped }
}

/// Keeps the first record seen for each registration number.
pub fn unique_by_registration(records: &[Record]) -> Vec<Record> {
    let mut seen: HashSet<String> = HashSet::new();
    records
        .iter()
        .filter(|r| match r.registration_key() {
            Some(k) => seen.insert(k),
            None => true,
        })
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn case(reg: &str, date: &str, topo: &str) -> Record {
        record_of(&[
            (REGISTRATION_NUMBER, reg),
            (DATE_OF_INCIDENCE, date),
            (TOPOGRAPHY, topo),
        ])
    }

    fn sample() -> Vec<Record> {
        vec![
            case("R1", "01/01/2020", "C50"),
            case("R2", "03/03/2018", "C34"),
            case(" R1", "15/06/2019", "C50"),
            case("R2", "03/03/2018", "C34"),
            case("R3", "garbage", "C18"),
            case("R3", "10/10/2010", "C18"),
            case("R1 ", "20/06/2019", "C61"),
        ]
    }

    #[test]
    fn earlier_date_wins() {
        let first = case(" R1 ", "01/01/2020", "C50");
        let second = case("R1", "15/06/2019", "C50");
        let res = resolve(&[first, second.clone()]);
        assert_eq!(res.kept, vec![second]);
        assert_eq!(res.dropped, 1);
    }

    #[test]
    fn identical_rows_are_flagged_and_resolved_to_one() {
        let r = case("R9", "01/01/2020", "C50");
        let rows = vec![r.clone(), r.clone()];
        let dups = detect(&rows);
        assert_eq!(
            dups,
            vec![Duplicate {
                index: 1,
                duplicate_of: 0,
                kind: DuplicateKind::Exact,
                record: r.clone(),
            }]
        );
        assert_eq!(resolve(&rows).kept, vec![r]);
    }

    #[test]
    fn at_most_one_record_per_key() {
        let res = resolve(&sample());
        let keys: Vec<String> = res
            .kept
            .iter()
            .filter_map(|r| r.registration_key())
            .collect();
        let distinct: HashSet<&String> = keys.iter().collect();
        assert_eq!(keys.len(), distinct.len());
        assert_eq!(keys, vec!["R1", "R2", "R3"]);
        assert_eq!(res.dropped, 4);
        assert_eq!(res.kept[0].code(DATE_OF_INCIDENCE), Some("15/06/2019".to_string()));
    }

    #[test]
    fn unparseable_dates_sort_last() {
        let res = resolve(&sample());
        assert_eq!(res.kept[2].code(DATE_OF_INCIDENCE), Some("10/10/2010".to_string()));

        let rows = vec![case("R4", "bad", "A"), case("R4", "worse", "B")];
        assert_eq!(resolve(&rows).kept, vec![rows[0].clone()]);
    }

    #[test]
    fn resolution_is_idempotent() {
        let once = resolve(&sample()).kept;
        let twice = resolve(&once);
        assert_eq!(twice.kept, once);
        assert_eq!(twice.dropped, 0);
        assert!(detect(&once).is_empty());
    }

    #[test]
    fn detect_matches_resolution() {
        let rows = sample();
        let dups = detect(&rows);
        let dropped: Vec<usize> = dups.iter().map(|d| d.index).collect();
        // Record 3 is both an exact and a key duplicate of record 1; it is
        // reported once.
        assert_eq!(dropped, vec![0, 3, 4, 6]);
        assert_eq!(dups[1].kind, DuplicateKind::Exact);
        assert_eq!(dups[1].duplicate_of, 1);
        assert_eq!(dups[0].kind, DuplicateKind::Key);
        assert_eq!(dups[0].duplicate_of, 2);
        assert_eq!(dups.len(), resolve(&rows).dropped);
        // The input is untouched.
        assert_eq!(rows, sample());
    }

    #[test]
    fn keyless_records_are_kept() {
        let mut anonymous = Record::new();
        anonymous.insert(TOPOGRAPHY, "C50");
        let mut other = Record::new();
        other.insert(TOPOGRAPHY, "C34");
        let rows = vec![anonymous.clone(), case("R1", "01/01/2020", "C50"), other.clone()];
        let res = resolve(&rows);
        assert_eq!(res.kept, rows);
        assert!(find_key_duplicates(&rows).is_empty());
        assert!(detect(&rows).is_empty());
    }

    #[test]
    fn keyless_copies_are_dropped() {
        let complete = case("R1", "01/01/2020", "C50");
        let mut anonymous = Record::new();
        anonymous.insert(TOPOGRAPHY, "C50");
        let rows = vec![complete.clone(), anonymous.clone(), anonymous.clone()];
        assert!(find_key_duplicates(&rows).is_empty());
        assert_eq!(find_exact_duplicates(&rows), vec![(2, 1)]);

        let dups = detect(&rows);
        let res = resolve(&rows);
        assert_eq!(dups.len(), res.dropped);
        assert_eq!(dups[0].index, 2);
        assert_eq!(res.kept, vec![complete, anonymous]);
        assert!(detect(&res.kept).is_empty());
        assert_eq!(resolve(&res.kept).dropped, 0);
    }

    #[test]
    fn unique_by_registration_keeps_first() {
        let rows = sample();
        let unique = unique_by_registration(&rows);
        assert_eq!(unique.len(), 3);
        assert_eq!(unique[0], rows[0]);
    }
}
