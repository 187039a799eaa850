//! Raw extract loading.
//!
//! Eurostat extracts arrive comma separated in UTF-8 most of the time, but
//! older downloads are semicolon separated and/or Latin-1 encoded. Every
//! delimiter/encoding combination is tried before giving up.

use std::path::{Path, PathBuf};

use csv::ReaderBuilder;
use tracing::{debug, instrument, warn};

use crate::{config::RenewablesConfig, error::RenewablesError};

use super::table::RawTable;

const DELIMITERS: [u8; 2] = [b',', b';'];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Encoding {
    Utf8,
    Latin1,
}

/// Locates and parses raw extracts by dataset identifier.
#[derive(Debug, Clone)]
pub struct RawLoader {
    data_dir: PathBuf,
}

impl RawLoader {
    pub fn new(config: &RenewablesConfig) -> Self {
        Self {
            data_dir: config.data_dir.clone(),
        }
    }

    pub fn from_dir<P: AsRef<Path>>(data_dir: P) -> Self {
        Self {
            data_dir: data_dir.as_ref().to_path_buf(),
        }
    }

    /// Path of the backing file for `dataset_id`, if it exists.
    pub fn locate(&self, dataset_id: &str) -> Result<PathBuf, RenewablesError> {
        let path = self.data_dir.join(format!("{}.csv", dataset_id.trim()));
        if path.is_file() {
            Ok(path)
        } else {
            Err(RenewablesError::NotFound(format!(
                "No backing file for dataset {} at {}",
                dataset_id,
                path.display()
            )))
        }
    }

    #[instrument(skip(self))]
    pub fn load(&self, dataset_id: &str) -> Result<RawTable, RenewablesError> {
        let path = self.locate(dataset_id)?;
        read_table(&path)
    }
}

/// Parses a delimited file, falling back across delimiters and encodings.
pub fn read_table(path: &Path) -> Result<RawTable, RenewablesError> {
    let bytes = std::fs::read(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => {
            RenewablesError::NotFound(format!("File not found: {}", path.display()))
        }
        _ => RenewablesError::IoError(e),
    })?;

    let mut last_reason = "no delimiter/encoding combination produced more than one column".to_string();
    for encoding in [Encoding::Utf8, Encoding::Latin1] {
        let Some(text) = decode(&bytes, encoding) else {
            debug!(path = %path.display(), "File is not valid UTF-8, trying Latin-1");
            continue;
        };
        for delimiter in DELIMITERS {
            match parse_text(&text, delimiter) {
                Ok((headers, rows)) if headers.len() > 1 => {
                    debug!(
                        path = %path.display(),
                        ?encoding,
                        delimiter = %(delimiter as char),
                        rows = rows.len(),
                        "Parsed raw table"
                    );
                    return Ok(RawTable::new(path.to_path_buf(), headers, rows));
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(path = %path.display(), ?encoding, "CSV parse attempt failed: {}", e);
                    last_reason = e.to_string();
                }
            }
        }
    }

    Err(RenewablesError::Parse {
        path: path.to_path_buf(),
        reason: last_reason,
    })
}

fn decode(bytes: &[u8], encoding: Encoding) -> Option<String> {
    match encoding {
        Encoding::Utf8 => std::str::from_utf8(bytes).ok().map(|s| s.to_string()),
        // Latin-1 maps every byte to the code point of the same value.
        Encoding::Latin1 => Some(bytes.iter().map(|&b| b as char).collect()),
    }
}

fn parse_text(text: &str, delimiter: u8) -> Result<(Vec<String>, Vec<Vec<String>>), csv::Error> {
    let mut reader = ReaderBuilder::new()
        .delimiter(delimiter)
        .flexible(true)
        .from_reader(text.as_bytes());
    let headers = reader.headers()?.iter().map(|h| h.to_string()).collect();
    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        rows.push(record.iter().map(|v| v.to_string()).collect());
    }
    Ok((headers, rows))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn reads_comma_separated_utf8() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("nrg_ind_ren.csv"), "geo,TIME_PERIOD,OBS_VALUE\nPortugal,2020,33.9\n").unwrap();
        let table = RawLoader::from_dir(dir.path()).load("nrg_ind_ren").unwrap();
        assert_eq!(table.headers(), &["geo", "TIME_PERIOD", "OBS_VALUE"]);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn falls_back_to_semicolon() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("nrg_bal.csv"), "geo;TIME_PERIOD;OBS_VALUE\nAustria;2019;12,5\n").unwrap();
        let table = RawLoader::from_dir(dir.path()).load("nrg_bal").unwrap();
        assert_eq!(table.headers().len(), 3);
        assert_eq!(table.cell(0, 2), Some("12,5"));
    }

    #[test]
    fn falls_back_to_latin1() {
        let dir = tempfile::tempdir().unwrap();
        let mut bytes = b"geo,TIME_PERIOD\nT".to_vec();
        bytes.push(0xFC); // 'ü' in Latin-1, invalid as UTF-8
        bytes.extend_from_slice(b"rkiye,2020\n");
        fs::write(dir.path().join("nrg_bal.csv"), bytes).unwrap();
        let table = RawLoader::from_dir(dir.path()).load("nrg_bal").unwrap();
        assert_eq!(table.cell(0, 0), Some("Türkiye"));
    }

    #[test]
    fn single_column_file_is_a_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("nrg_bal.csv"), "just one column\nvalue\n").unwrap();
        let result = RawLoader::from_dir(dir.path()).load("nrg_bal");
        assert!(matches!(result, Err(RenewablesError::Parse { .. })));
    }

    #[test]
    fn missing_file_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let result = RawLoader::from_dir(dir.path()).load("nrg_bal");
        assert!(matches!(result, Err(RenewablesError::NotFound(_))));
    }
}
