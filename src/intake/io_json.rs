use crate::intake::*;

/// Reads an array of flat objects. Rows are cleaned while parsing.
pub fn read_json_dataset(path: &str) -> IntakeResult<Vec<Record>> {
    let contents = fs::read_to_string(path).context(OpeningJsonSnafu { path })?;
    let records: Vec<Record> =
        serde_json::from_str(contents.as_str()).context(ParsingJsonSnafu {})?;
    debug!("read_json_dataset: {} records", records.len());
    Ok(records)
}
