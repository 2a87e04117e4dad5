use calamine::{open_workbook, DataType, Reader, Xlsx};
use chrono::{Duration, NaiveDate};

use registry_reconciliation::builder::DatasetBuilder;
use registry_reconciliation::dates::format_source_date;

use crate::intake::*;

// Serial 2958465 is 9999-12-31, the last date Excel can represent.
const MAX_EXCEL_SERIAL: f64 = 2958466.0;

/// Converts an Excel serial date (days since 1899-12-30, the fractional part
/// being the time of the day).
pub fn excel_serial_to_date(serial: f64) -> Option<NaiveDate> {
    if !serial.is_finite() || !(0.0..MAX_EXCEL_SERIAL).contains(&serial) {
        return None;
    }
    let epoch = NaiveDate::from_ymd_opt(1899, 12, 30)?;
    epoch.checked_add_signed(Duration::days(serial.floor() as i64))
}

fn read_cell(lineno: usize, cell: &DataType) -> Option<Scalar> {
    match cell {
        DataType::String(s) => Some(Scalar::Text(s.clone())),
        DataType::Int(i) => Some(Scalar::Integer(*i)),
        DataType::Float(f) => Some(Scalar::Float(*f)),
        DataType::Bool(b) => Some(Scalar::Bool(*b)),
        DataType::DateTime(serial) => match excel_serial_to_date(*serial) {
            Some(d) => Some(Scalar::Text(format_source_date(d))),
            None => {
                warn!("read_cell: lineno {}: invalid date {:?}", lineno, serial);
                None
            }
        },
        DataType::Error(e) => {
            warn!("read_cell: lineno {}: cell error {:?}", lineno, e);
            None
        }
        DataType::Empty => None,
    }
}

fn header_name(cell: &DataType) -> String {
    match cell {
        DataType::String(s) => s.clone(),
        DataType::Empty => String::new(),
        x => x.to_string(),
    }
}

/// Reads the first row of the worksheet as the header and the other rows as
/// records.
pub fn read_excel_dataset(path: &str, worksheet_name: Option<&str>) -> IntakeResult<Vec<Record>> {
    let wrange = get_range(path, worksheet_name)?;
    let mut rows = wrange.rows();
    let header: Vec<String> = rows
        .next()
        .context(EmptyExcelSnafu { path })?
        .iter()
        .map(header_name)
        .collect();
    debug!("read_excel_dataset: header: {:?}", header);

    let mut builder = DatasetBuilder::new().columns(&header);
    for (idx, row) in rows.enumerate() {
        let lineno = idx + 2;
        let cells: Vec<Option<Scalar>> = row.iter().map(|c| read_cell(lineno, c)).collect();
        debug!("read_excel_dataset: lineno: {:?} row: {:?}", lineno, &cells);
        builder.add_row(&cells).context(ReconcileSnafu {})?;
    }
    Ok(builder.build())
}

fn get_range(path: &str, worksheet_name_o: Option<&str>) -> IntakeResult<calamine::Range<DataType>> {
    debug!(
        "get_range: path: {:?} worksheet: {:?}",
        &path, &worksheet_name_o
    );
    let mut workbook: Xlsx<_> = open_workbook(path).context(OpeningExcelSnafu { path })?;

    // A worksheet name was provided, use it.
    if let Some(worksheet_name) = worksheet_name_o {
        let wrange = workbook
            .worksheet_range(worksheet_name)
            .context(MissingWorksheetSnafu {
                name: worksheet_name,
                path,
            })?
            .context(OpeningExcelSnafu { path })?;
        return Ok(wrange);
    }

    let all_worksheets = workbook.worksheets();
    match all_worksheets.as_slice() {
        [] => EmptyExcelSnafu { path }.fail(),
        [(worksheet_name, wrange)] => {
            debug!("get_range: path: {:?} worksheet: {:?}", &path, &worksheet_name);
            Ok(wrange.clone())
        }
        _ => {
            let names: Vec<String> = all_worksheets.iter().map(|(n, _)| n.clone()).collect();
            AmbiguousWorksheetSnafu {
                path,
                names: names.join(", "),
            }
            .fail()
        }
    }
}
