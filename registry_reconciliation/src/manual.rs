/*!

This is the long-form manual for `registry_reconciliation` and `regrecon`.

## Records

A record is a flat mapping from field names to scalars (text, integer,
floating point number or boolean). The following fields are required:

| field                 | content                                       |
|-----------------------|-----------------------------------------------|
| `registration_number` | identity of the case, compared after trimming |
| `sex`                 | `1` (male), `2` (female), anything else is unknown |
| `birth_date`          | `dd/mm/yyyy`                                  |
| `date_of_incidence`   | `dd/mm/yyyy`                                  |
| `topography`          | ICD-O topography code                         |
| `histology`           | ICD-O morphology code                         |
| `behavior`            | `1` benign, `2` uncertain, `3` malignant      |
| `grade_code`          | `1` to `4`                                    |
| `basis_of_diagnosis`  | open code                                     |

Codes are compared on their textual form: the grade `2`, the grade `"2"` and
the grade `2.0` (as read from a spreadsheet) are the same code.

When a row is read, fields with a blank name, empty values and nested values
are removed.

## Input formats

The following formats are supported by `regrecon`:
* `csv` Comma Separated Values, with a header row
* `json` an array of objects
* `xlsx` Excel spreadsheets

If not specified, the format is inferred from the extension of the file.

### `csv`

The first row holds the column names. All the values are read as text.

```text
registration_number,sex,birth_date,date_of_incidence,topography,histology,behavior,grade_code,basis_of_diagnosis
R1,2,02/03/1960,01/01/2020,C50.9,8500,3,2,7
```

### `json`

```text
[{"registration_number": "R1", "sex": 2, "birth_date": "02/03/1960", ...}]
```

Null values are treated as absent fields.

### `xlsx`

The first row of the worksheet holds the column names. If the workbook has
more than one worksheet, the worksheet must be named with
`--excel-worksheet-name`. Cells formatted as dates are read as `dd/mm/yyyy`.

## Stages

1. **Upload**: the file is read and cleaned.
2. **Inspect schema**: the columns of the first row are compared to the
   required columns. Missing columns can be mapped to existing ones with
   `--mapping missing=existing`. An existing column can only be mapped once.
3. **Remove duplicates**: among the cases sharing a registration number, the
   one with the earliest date of incidence is kept. Dates that cannot be read
   come last. Rows that are identical to an earlier row are reported as exact
   duplicates.
4. **Auto-correct**: the codes are corrected. `regrecon` uses an offline
   correction that normalizes the spellings of sex (`m`, `male`, `f`,
   `female`) and removes the behavior suffix of histology codes (`8500/3`).
5. **Validate**: records with a missing field or an unreadable date are
   rejected. The age at incidence is computed for the others.
6. **Stratify**: the valid records are grouped by age group (`0-18`, `19-35`,
   `36-55`, `56+`), sex, topography, histology, behavior, grade and basis of
   diagnosis. A record that does not fit a dimension (unknown sex, grade
   outside of `1` to `4`) is left out of that dimension only.
7. **Consolidate**: the valid records, with their dates as `yyyy-mm-dd`, and
   their stratification form the consolidation payload. Records whose dates
   cannot be normalized are left out.
8. **Review**

## Configuration

The options can also be given in a JSON configuration file with `--config`.
Options on the command line take precedence.

```text
{
  "outputSettings": {
    "outputPath": "summary.json",
    "uploadId": "upload-2024-05"
  },
  "inputSource": {
    "provider": "csv",
    "filePath": "cases.csv"
  },
  "columnMapping": {
    "histology": "morphology_code"
  }
}
```

Paths are relative to the directory of the configuration file.

 - `excelWorksheetName` (string, optional, in `inputSource`): for Excel-based
   inputs, the name of the worksheet.

With `--reference`, the summary is compared with a previously produced summary
and the differences are printed.

 */
