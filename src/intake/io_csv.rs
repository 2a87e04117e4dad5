// Primitives for reading CSV files.

use registry_reconciliation::builder::DatasetBuilder;

use crate::intake::*;

/// Reads a CSV file with a header row. All the values are read as text.
pub fn read_csv_dataset(path: &str) -> IntakeResult<Vec<Record>> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_path(path)
        .context(CsvOpenSnafu { path })?;

    let header: Vec<String> = rdr
        .headers()
        .context(CsvLineParseSnafu {})?
        .iter()
        .map(|s| s.to_string())
        .collect();
    debug!("read_csv_dataset: header: {:?}", header);

    let mut builder = DatasetBuilder::new().columns(&header);
    for (idx, line_r) in rdr.records().enumerate() {
        // The header is line 1.
        let lineno = idx + 2;
        let line = line_r.context(CsvLineParseSnafu {})?;
        let cells: Vec<Option<Scalar>> = line.iter().map(|s| Some(Scalar::from(s))).collect();
        debug!("read_csv_dataset: lineno: {:?} row: {:?}", lineno, &cells);
        builder.add_row(&cells).context(ReconcileSnafu {})?;
    }
    Ok(builder.build())
}
