//! Date handling for the registry fields.
//!
//! Uploaded tables carry dates as `dd/mm/yyyy`. Consolidation expects
//! `yyyy-mm-dd`.

use chrono::{Datelike, NaiveDate};

use crate::config::Scalar;

pub const SOURCE_DATE_FORMAT: &str = "%d/%m/%Y";
pub const NORMALIZED_DATE_FORMAT: &str = "%Y-%m-%d";

/// Parses a date in the source format. Dates that were already normalized are
/// accepted as well.
pub fn parse_source_date(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    NaiveDate::parse_from_str(s, SOURCE_DATE_FORMAT)
        .or_else(|_| NaiveDate::parse_from_str(s, NORMALIZED_DATE_FORMAT))
        .ok()
}

/// Only text cells hold dates. Readers convert spreadsheet date cells to text.
pub fn parse_date_value(v: &Scalar) -> Option<NaiveDate> {
    v.as_text().and_then(parse_source_date)
}

pub fn normalize_date(v: &Scalar) -> Option<String> {
    parse_date_value(v).map(|d| d.format(NORMALIZED_DATE_FORMAT).to_string())
}

pub fn format_source_date(d: NaiveDate) -> String {
    d.format(SOURCE_DATE_FORMAT).to_string()
}

/// Age in whole years on the date `at`.
pub fn age_at(birth: NaiveDate, at: NaiveDate) -> i64 {
    let mut age = (at.year() - birth.year()) as i64;
    if (at.month(), at.day()) < (birth.month(), birth.day()) {
        age -= 1;
    }
    age
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_both_formats() {
        let d = NaiveDate::from_ymd_opt(2019, 6, 15).unwrap();
        assert_eq!(parse_source_date("15/06/2019"), Some(d));
        assert_eq!(parse_source_date(" 2019-06-15 "), Some(d));
        assert_eq!(parse_source_date("31/02/2019"), None);
        assert_eq!(parse_source_date("not a date"), None);
    }

    #[test]
    fn normalizes() {
        assert_eq!(
            normalize_date(&Scalar::from("01/02/2003")),
            Some("2003-02-01".to_string())
        );
        assert_eq!(normalize_date(&Scalar::Integer(20030201)), None);
    }

    #[test]
    fn age_on_birthday() {
        let birth = NaiveDate::from_ymd_opt(1980, 3, 1).unwrap();
        assert_eq!(age_at(birth, NaiveDate::from_ymd_opt(2020, 3, 1).unwrap()), 40);
        assert_eq!(age_at(birth, NaiveDate::from_ymd_opt(2020, 2, 29).unwrap()), 39);
    }
}
