//! Reference data sources
//!
//! The broker publishes its scrip master as one JSON array of row objects.
//! Cached copies are kept as CSV with the same column names, or as JSON
//! Lines. Both are read record by record, so a single corrupt record is
//! skipped instead of failing the file.

use std::fs;
use std::path::{Path, PathBuf};

use serde_json::{Map, Value};
use tracing::debug;

use crate::error::{CatalogError, RowError};

/// One row as read from the source, before field parsing.
pub type SourceRow = Result<Map<String, Value>, RowError>;

/// On-disk layout of a reference dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
    /// `[ {...}, {...} ]`
    JsonArray,
    /// One object per line; blank lines ignored.
    JsonLines,
    /// Header row of column names, then one instrument per record.
    Csv,
}

impl SourceFormat {
    /// Format implied by a catalog file extension, ignoring case.
    pub fn from_extension(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?;
        if ext.eq_ignore_ascii_case("json") {
            Some(SourceFormat::JsonArray)
        } else if ext.eq_ignore_ascii_case("jsonl") || ext.eq_ignore_ascii_case("ndjson") {
            Some(SourceFormat::JsonLines)
        } else if ext.eq_ignore_ascii_case("csv") {
            Some(SourceFormat::Csv)
        } else {
            None
        }
    }

    /// Guess from a file extension; unknown extensions are read as a JSON
    /// array.
    pub fn from_path(path: &Path) -> Self {
        Self::from_extension(path).unwrap_or(SourceFormat::JsonArray)
    }
}

/// Where a load or refresh reads its rows from.
#[derive(Debug, Clone)]
pub enum CatalogSource {
    File { path: PathBuf, format: SourceFormat },
    Bytes { data: Vec<u8>, format: SourceFormat },
}

impl CatalogSource {
    pub fn file(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let format = SourceFormat::from_path(&path);
        CatalogSource::File { path, format }
    }

    pub fn bytes(data: impl Into<Vec<u8>>, format: SourceFormat) -> Self {
        CatalogSource::Bytes {
            data: data.into(),
            format,
        }
    }

    /// The most recently modified catalog file (`.json`, `.jsonl`,
    /// `.ndjson` or `.csv`, any case) in `dir`.
    pub fn latest_in(dir: &Path) -> Result<Self, CatalogError> {
        let io_err = |source: std::io::Error| CatalogError::Io {
            path: dir.to_path_buf(),
            source,
        };

        let mut newest: Option<(std::time::SystemTime, PathBuf)> = None;
        for entry in fs::read_dir(dir).map_err(io_err)? {
            let entry = entry.map_err(io_err)?;
            let path = entry.path();
            if SourceFormat::from_extension(&path).is_none() || !path.is_file() {
                continue;
            }
            let modified = entry
                .metadata()
                .and_then(|m| m.modified())
                .map_err(io_err)?;
            if newest.as_ref().map_or(true, |(t, _)| modified > *t) {
                newest = Some((modified, path));
            }
        }

        match newest {
            Some((_, path)) => {
                debug!(path = %path.display(), "Selected latest catalog file");
                Ok(Self::file(path))
            }
            None => Err(CatalogError::NoSource(dir.to_path_buf())),
        }
    }

    /// Human-readable origin for logs.
    pub fn describe(&self) -> String {
        match self {
            CatalogSource::File { path, .. } => path.display().to_string(),
            CatalogSource::Bytes { data, .. } => format!("<{} bytes in memory>", data.len()),
        }
    }

    /// Read every row. Only an unreadable source or an unparsable JSON array
    /// fails the call; individual bad rows come back as `Err` entries.
    pub fn read_rows(&self) -> Result<Vec<SourceRow>, CatalogError> {
        match self {
            CatalogSource::File { path, format } => {
                let data = fs::read(path).map_err(|source| CatalogError::Io {
                    path: path.clone(),
                    source,
                })?;
                parse_rows(&data, *format)
            }
            CatalogSource::Bytes { data, format } => parse_rows(data, *format),
        }
    }
}

fn parse_rows(data: &[u8], format: SourceFormat) -> Result<Vec<SourceRow>, CatalogError> {
    match format {
        SourceFormat::JsonArray => {
            let values: Vec<Value> = serde_json::from_slice(data)?;
            Ok(values.into_iter().map(into_object).collect())
        }
        SourceFormat::JsonLines => Ok(data
            .split(|b| *b == b'\n')
            .enumerate()
            .filter(|(_, line)| !line.iter().all(u8::is_ascii_whitespace))
            .map(|(idx, line)| match serde_json::from_slice::<Value>(line) {
                Ok(value) => into_object(value),
                Err(_) => Err(RowError::Unparsable { line: idx + 1 }),
            })
            .collect()),
        SourceFormat::Csv => parse_csv(data),
    }
}

/// Every CSV field becomes a string value keyed by its header, so CSV rows
/// go through the same column parsing as JSON rows.
fn parse_csv(data: &[u8]) -> Result<Vec<SourceRow>, CatalogError> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(data);
    let headers = reader.headers()?.clone();

    Ok(reader
        .records()
        .enumerate()
        .map(|(idx, record)| -> SourceRow {
            match record {
                Ok(record) => Ok(headers
                    .iter()
                    .zip(record.iter())
                    .map(|(column, value)| (column.to_string(), Value::String(value.to_string())))
                    .collect()),
                Err(err) => {
                    // Header is line 1
                    let line = err
                        .position()
                        .map(|p| p.line() as usize)
                        .unwrap_or(idx + 2);
                    Err(RowError::Unparsable { line })
                }
            }
        })
        .collect())
}

fn into_object(value: Value) -> SourceRow {
    match value {
        Value::Object(map) => Ok(map),
        _ => Err(RowError::NotAnObject),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_from_extension() {
        let format = |p: &str| SourceFormat::from_path(Path::new(p));
        assert_eq!(format("a/master.json"), SourceFormat::JsonArray);
        assert_eq!(format("a/master.JSONL"), SourceFormat::JsonLines);
        assert_eq!(format("a/master.ndjson"), SourceFormat::JsonLines);
        assert_eq!(format("a/angel_scrip_master_20260101.CSV"), SourceFormat::Csv);
        assert_eq!(format("a/master.dat"), SourceFormat::JsonArray);
        assert_eq!(SourceFormat::from_extension(Path::new("a/README.txt")), None);
    }

    #[test]
    fn test_json_array_rows() {
        let data = r#"[{"token":"1"}, 42, {"token":"2"}]"#;
        let source = CatalogSource::bytes(data, SourceFormat::JsonArray);
        let rows = source.read_rows().unwrap();
        assert_eq!(rows.len(), 3);
        assert!(rows[0].is_ok());
        assert_eq!(rows[1], Err(RowError::NotAnObject));
    }

    #[test]
    fn test_json_array_must_parse() {
        let source = CatalogSource::bytes(r#"{"token":"1"}"#, SourceFormat::JsonArray);
        match source.read_rows() {
            Err(CatalogError::Format(_)) => {}
            other => panic!("Expected Format error, got {:?}", other),
        }
    }

    #[test]
    fn test_json_lines_skip_bad_line() {
        let data = "{\"token\":\"1\"}\n\nnot json\n{\"token\":\"2\"}\n";
        let rows = CatalogSource::bytes(data, SourceFormat::JsonLines).read_rows().unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[1], Err(RowError::Unparsable { line: 3 }));
    }

    #[test]
    fn test_csv_rows_keyed_by_header() {
        let data = concat!(
            "token,symbol,name,expiry,strike,lotsize,instrumenttype,exch_seg,tick_size\n",
            "3045,SBIN-EQ,SBIN,,-1.000000,1,,NSE,5.000000\n",
            "43650,NIFTY26FEB2622500CE,NIFTY,26FEB2026,22500.000000,75\n",
            " 1594 , INFY-EQ ,INFY,,-1.000000,1,,NSE,5.000000\n",
        );
        let rows = CatalogSource::bytes(data, SourceFormat::Csv).read_rows().unwrap();

        assert_eq!(rows.len(), 3);
        let sbin = rows[0].as_ref().unwrap();
        assert_eq!(sbin["symbol"], Value::String("SBIN-EQ".into()));
        assert_eq!(sbin["expiry"], Value::String(String::new()));
        // Short record
        assert_eq!(rows[1], Err(RowError::Unparsable { line: 3 }));
        assert_eq!(rows[2].as_ref().unwrap()["token"], Value::String("1594".into()));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let source = CatalogSource::file("/definitely/not/here.json");
        match source.read_rows() {
            Err(CatalogError::Io { path, .. }) => assert!(path.ends_with("here.json")),
            other => panic!("Expected Io error, got {:?}", other),
        }
    }
}
