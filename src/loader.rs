// CSV ingestion for the two input sheets: the funded portfolio and the
// postcode-to-geography lookup. Everything downstream works on the
// in-memory `Table`, so swapping the file format only touches this module.
use crate::table::{Table, Value};
use csv::ReaderBuilder;
use std::path::Path;
use thiserror::Error;

/// Raised only for truly invalid input: an unreadable file or one with no
/// header row. Malformed data rows are skipped and counted instead.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: csv::Error,
    },
    #[error("{path} has no header row")]
    NoColumns { path: String },
}

#[derive(Debug, Clone)]
pub struct LoadReport {
    pub rows: usize,
    pub skipped: usize,
}

/// Load a CSV export into a raw `Table`. Cells stay untyped text; blank
/// cells become nulls. Rows the CSV reader cannot decode are skipped and
/// reported, not fatal.
pub fn load_table(path: &Path) -> Result<(Table, LoadReport), LoadError> {
    let display = path.display().to_string();
    let mut rdr = ReaderBuilder::new()
        .flexible(true)
        .from_path(path)
        .map_err(|source| LoadError::Read {
            path: display.clone(),
            source,
        })?;

    let headers: Vec<String> = rdr
        .headers()
        .map_err(|source| LoadError::Read {
            path: display.clone(),
            source,
        })?
        .iter()
        .map(|h| h.to_string())
        .collect();
    if headers.is_empty() {
        return Err(LoadError::NoColumns { path: display });
    }

    let mut table = Table::new(headers);
    let mut skipped = 0usize;
    for result in rdr.records() {
        match result {
            Ok(record) => {
                table.push_row(record.iter().map(Value::from_raw).collect());
            }
            Err(e) => {
                log::warn!("skipping undecodable row in {}: {}", display, e);
                skipped += 1;
            }
        }
    }

    let report = LoadReport {
        rows: table.n_rows(),
        skipped,
    };
    Ok((table, report))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_temp(name: &str, contents: &str) -> std::path::PathBuf {
        let path = std::env::temp_dir().join(name);
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(contents.as_bytes()).unwrap();
        path
    }

    #[test]
    fn loads_ragged_rows_and_blanks() {
        let path = write_temp(
            "portfolio_report_loader_test.csv",
            "Project_ID,Award_Amount,Postcode\nP1,100,SO17 1BJ\nP2,,\nP3\n",
        );
        let (table, report) = load_table(&path).unwrap();
        assert_eq!(report.rows, 3);
        assert_eq!(report.skipped, 0);
        assert_eq!(table.text(0, 2), Some("SO17 1BJ"));
        assert!(table.cell(1, 1).is_null());
        // Short row padded out to the header width.
        assert!(table.cell(2, 1).is_null());
    }

    #[test]
    fn missing_file_is_fatal() {
        let err = load_table(Path::new("definitely_not_here.csv")).unwrap_err();
        assert!(matches!(err, LoadError::Read { .. }));
    }
}
