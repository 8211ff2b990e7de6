//! CSV ingest for the analysis stage.
//!
//! - results tables: one row per fitted object (ids, masses, redshift, formation age)
//! - template SFHs: `time,sfr` as written by the fitting run
//! - mass-return kernels: retained fraction per Myr
//!
//! Header names are matched case-insensitively (BOM stripped). Bad result rows are
//! skipped and reported; an unusable template or kernel is an error.

use std::collections::HashMap;
use std::fs::File;
use std::path::Path;

use csv::StringRecord;

use crate::domain::{ResultsRecord, TemplateSfh};
use crate::error::AppError;
use crate::math::MassReturnKernel;

pub const COL_ID: &str = "id";
pub const COL_MASS_BEST: &str = "best.stellar.m_star";
pub const COL_MASS_BAYES: &str = "bayes.stellar.m_star";
pub const COL_REDSHIFT: &str = "best.universe.redshift";
pub const COL_AGE_FORM: &str = "bayes.sfh.age";

/// A row-level error encountered during ingest.
#[derive(Debug, Clone)]
pub struct RowError {
    pub line: usize,
    pub id: Option<String>,
    pub message: String,
}

/// Parsed results table plus what was skipped.
#[derive(Debug, Clone)]
pub struct ResultsIngest {
    pub records: Vec<ResultsRecord>,
    pub row_errors: Vec<RowError>,
    pub rows_read: usize,
}

struct Table {
    header_map: HashMap<String, usize>,
    reader: csv::Reader<File>,
}

fn open_table(path: &Path, what: &str) -> Result<Table, AppError> {
    let file = File::open(path)
        .map_err(|e| AppError::config(format!("Failed to open {what} CSV '{}': {e}", path.display())))?;

    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(file);

    let headers = reader
        .headers()
        .map_err(|e| AppError::config(format!("Failed to read {what} CSV headers: {e}")))?
        .clone();

    Ok(Table {
        header_map: build_header_map(&headers),
        reader,
    })
}

/// Load the results table, keeping only rows with every required value.
pub fn load_results(path: &Path) -> Result<ResultsIngest, AppError> {
    let mut table = open_table(path, "results")?;
    for col in [COL_ID, COL_MASS_BEST, COL_MASS_BAYES, COL_REDSHIFT, COL_AGE_FORM] {
        ensure_column(&table.header_map, col, "results")?;
    }

    let mut records = Vec::new();
    let mut row_errors = Vec::new();
    let mut rows_read = 0usize;

    for (idx, result) in table.reader.records().enumerate() {
        // +2: header line, 1-based numbering.
        let line = idx + 2;
        rows_read += 1;

        let record = match result {
            Ok(r) => r,
            Err(e) => {
                row_errors.push(RowError {
                    line,
                    id: None,
                    message: format!("CSV parse error: {e}"),
                });
                continue;
            }
        };

        match parse_result_row(&record, &table.header_map) {
            Ok(row) => records.push(row),
            Err(message) => row_errors.push(RowError {
                line,
                id: get_optional(&record, &table.header_map, COL_ID).map(str::to_string),
                message,
            }),
        }
    }

    if records.is_empty() {
        return Err(AppError::data(format!("No usable rows in results CSV '{}'.", path.display())));
    }

    Ok(ResultsIngest {
        records,
        row_errors,
        rows_read,
    })
}

/// Load a template SFH (`time`, `sfr`).
pub fn load_template(path: &Path) -> Result<TemplateSfh, AppError> {
    let mut table = open_table(path, "template SFH")?;
    ensure_column(&table.header_map, "time", "template SFH")?;
    ensure_column(&table.header_map, "sfr", "template SFH")?;

    let mut time = Vec::new();
    let mut sfr = Vec::new();
    for (idx, result) in table.reader.records().enumerate() {
        let line = idx + 2;
        let record = result.map_err(|e| AppError::data(format!("Template SFH line {line}: {e}")))?;
        let t = get_f64(&record, &table.header_map, "time")
            .map_err(|e| AppError::data(format!("Template SFH line {line}: {e}")))?;
        let s = get_f64(&record, &table.header_map, "sfr")
            .map_err(|e| AppError::data(format!("Template SFH line {line}: {e}")))?;
        time.push(t);
        sfr.push(s);
    }

    if time.is_empty() {
        return Err(AppError::data(format!("Template SFH '{}' has no rows.", path.display())));
    }
    Ok(TemplateSfh { time, sfr })
}

/// Load a tabulated mass-return kernel (column `retained`, one row per Myr from 0).
pub fn load_kernel(path: &Path) -> Result<MassReturnKernel, AppError> {
    let mut table = open_table(path, "mass-return kernel")?;
    ensure_column(&table.header_map, "retained", "mass-return kernel")?;

    let mut values = Vec::new();
    for (idx, result) in table.reader.records().enumerate() {
        let line = idx + 2;
        let record = result.map_err(|e| AppError::data(format!("Kernel line {line}: {e}")))?;
        let v = get_f64(&record, &table.header_map, "retained")
            .map_err(|e| AppError::data(format!("Kernel line {line}: {e}")))?;
        if !(0.0..=1.0).contains(&v) {
            return Err(AppError::data(format!("Kernel line {line}: retained fraction {v} is outside [0, 1].")));
        }
        values.push(v);
    }
    if values.is_empty() {
        return Err(AppError::data(format!("Kernel '{}' has no rows.", path.display())));
    }
    Ok(MassReturnKernel::Tabulated(values))
}

fn parse_result_row(record: &StringRecord, header_map: &HashMap<String, usize>) -> Result<ResultsRecord, String> {
    let id = get_required(record, header_map, COL_ID)?.to_string();
    Ok(ResultsRecord {
        id,
        mass_best: get_f64(record, header_map, COL_MASS_BEST)?,
        mass_bayes: get_f64(record, header_map, COL_MASS_BAYES)?,
        redshift: get_f64(record, header_map, COL_REDSHIFT)?,
        age_form: get_f64(record, header_map, COL_AGE_FORM)?,
    })
}

fn ensure_column(header_map: &HashMap<String, usize>, name: &str, what: &str) -> Result<(), AppError> {
    if !header_map.contains_key(name) {
        return Err(AppError::config(format!("Missing required column in {what} CSV: `{name}`")));
    }
    Ok(())
}

fn build_header_map(headers: &StringRecord) -> HashMap<String, usize> {
    headers
        .iter()
        .enumerate()
        .map(|(idx, name)| (normalize_header_name(name), idx))
        .collect()
}

fn normalize_header_name(name: &str) -> String {
    // Spreadsheet exports often prefix the first header with a UTF-8 BOM.
    let name = name.trim().trim_start_matches('\u{feff}');
    name.to_ascii_lowercase()
}

fn get_required<'a>(
    record: &'a StringRecord,
    header_map: &HashMap<String, usize>,
    name: &str,
) -> Result<&'a str, String> {
    let idx = header_map
        .get(name)
        .ok_or_else(|| format!("Missing required column: `{name}`"))?;
    record
        .get(*idx)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| format!("Missing required value: `{name}`"))
}

fn get_optional<'a>(record: &'a StringRecord, header_map: &HashMap<String, usize>, name: &str) -> Option<&'a str> {
    let idx = header_map.get(name)?;
    record.get(*idx).map(str::trim).filter(|s| !s.is_empty())
}

fn get_f64(record: &StringRecord, header_map: &HashMap<String, usize>, name: &str) -> Result<f64, String> {
    let raw = get_required(record, header_map, name)?;
    parse_opt_f64(Some(raw)).ok_or_else(|| format!("Invalid number for `{name}`: '{raw}'"))
}

fn parse_opt_f64(s: Option<&str>) -> Option<f64> {
    let s = s?;
    let v = s.parse::<f64>().ok()?;
    if v.is_finite() { Some(v) } else { None }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn csv_file(contents: &str) -> NamedTempFile {
        let mut f = NamedTempFile::new().unwrap();
        f.write_all(contents.as_bytes()).unwrap();
        f
    }

    #[test]
    fn results_rows_are_parsed_and_bad_rows_reported() {
        let f = csv_file(
            "\u{feff}ID,Best.Stellar.M_star,bayes.stellar.m_star,best.universe.redshift,bayes.sfh.age\n\
             g1,1e10,1.2e10,0.3,2500\n\
             g2,abc,1e10,0.1,1000\n\
             g3,5e9,6e9,1.1,900\n",
        );
        let ingest = load_results(f.path()).unwrap();
        assert_eq!(ingest.rows_read, 3);
        assert_eq!(ingest.records.len(), 2);
        assert_eq!(ingest.records[1].id, "g3");
        assert_eq!(ingest.records[0].age_form, 2500.0);
        assert_eq!(ingest.row_errors.len(), 1);
        assert_eq!(ingest.row_errors[0].line, 3);
        assert_eq!(ingest.row_errors[0].id.as_deref(), Some("g2"));
    }

    #[test]
    fn missing_results_column_is_config_error() {
        let f = csv_file("id,best.stellar.m_star\ng1,1e10\n");
        assert_eq!(load_results(f.path()).unwrap_err().exit_code(), 2);
    }

    #[test]
    fn template_is_loaded_in_file_order() {
        let f = csv_file("time,sfr\n0.0,1.5\n0.5,2.0\n1.0,0.25\n");
        let t = load_template(f.path()).unwrap();
        assert_eq!(t.time, vec![0.0, 0.5, 1.0]);
        assert_eq!(t.sfr, vec![1.5, 2.0, 0.25]);

        let empty = csv_file("time,sfr\n");
        assert_eq!(load_template(empty.path()).unwrap_err().exit_code(), 3);
    }

    #[test]
    fn kernel_fractions_must_be_in_unit_interval() {
        let ok = csv_file("age,retained\n0,1.0\n1,0.98\n");
        assert_eq!(
            load_kernel(ok.path()).unwrap(),
            MassReturnKernel::Tabulated(vec![1.0, 0.98])
        );
        let bad = csv_file("retained\n1.2\n");
        assert_eq!(load_kernel(bad.path()).unwrap_err().exit_code(), 3);
    }
}
