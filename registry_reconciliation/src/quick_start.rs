/*!

# Quick start

This example reconciles a small export from a hospital information system,
end to end, with the `regrecon` command line tool. The library can also be
used directly, see the bottom of this page.

The export is a CSV file with one case per row. The hospital used its own
name for the morphology column, and one patient was entered twice:

```text
registration_number,sex,birth_date,date_of_incidence,topography,morphology_code,behavior,grade_code,basis_of_diagnosis
R1,2,02/03/1960,01/01/2020,C50.9,8500,3,2,7
R1 ,F,02/03/1960,15/06/2019,C50.9,8500/3,3,2,7
R2,m,11/11/1990,03/03/2021,C34.1,8140,3,5,7
```

Run `regrecon` on the file:

```bash
regrecon -i cases.csv --mapping histology=morphology_code --out summary.json
```

The `--mapping` flag tells the tool that the required column `histology` is
called `morphology_code` in this file. Without it, the tool stops at the
schema inspection and lists the missing columns.

The tool then goes through all the stages and logs its progress:

```text
[2024-05-02T10:12:41Z INFO  registry_reconciliation::pipeline] Inspect Data Schema: Column mapping applied successfully.
[2024-05-02T10:12:41Z INFO  registry_reconciliation::duplicates] detect: 1 duplicates found among 3 records
[2024-05-02T10:12:41Z INFO  registry_reconciliation::duplicates] resolve: kept 2 records, dropped 1
[2024-05-02T10:12:41Z INFO  registry_reconciliation::pipeline] Auto-Correct Codes: Auto-correction completed successfully.
[2024-05-02T10:12:41Z INFO  registry_reconciliation::pipeline] Validate Data Integrity: Validations completed successfully.
[2024-05-02T10:12:41Z INFO  registry_reconciliation::pipeline] Stratify Data: Data stratified successfully.
```

Of the two `R1` cases, the one with the earliest date of incidence is kept.
The sex codes `F` and `m` are corrected to `2` and `1`, and the suffix of the
histology code `8500/3` is removed. Both cases are valid. The case `R2` has a
grade of `5`: it is kept, but it does not appear in any grade bucket.

The summary written to `summary.json` contains the consolidation payload: the
valid entries with their dates as `yyyy-mm-dd`, and their stratification.

## From Rust

```
use registry_reconciliation::*;

let rows = vec![
    record_of(&[("registration_number", " R1 "), ("date_of_incidence", "01/01/2020")]),
    record_of(&[("registration_number", "R1"), ("date_of_incidence", "15/06/2019")]),
];
let dups = detect(&rows);
assert_eq!(dups.len(), 1);
assert_eq!(dups[0].index, 0);

let res = resolve(&rows);
assert_eq!(res.kept, vec![rows[1].clone()]);
```

*/
