//! CSV-backed historical source.
//!
//! One row per raw record, headers matching `RawRecord` field names:
//! `ts,venue,symbol,resolution,price,size,end,open,high,low,close,volume,bids,asks`.
//! Timestamps are RFC 3339. Empty cells are absent fields. Rows that do not
//! deserialize surface as read errors and are counted, never fatal.

use std::path::{Path, PathBuf};

use tandem_core::data::{HistoricalSource, RawRecord, RecordIter, SourceError};

#[derive(Debug, Clone)]
pub struct CsvSource {
    name: String,
    path: PathBuf,
}

impl CsvSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Self { name, path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl HistoricalSource for CsvSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn open(&self) -> Result<RecordIter, SourceError> {
        let reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_path(&self.path)
            .map_err(|e| SourceError::Read {
                name: self.name.clone(),
                message: e.to_string(),
            })?;
        let name = self.name.clone();
        Ok(Box::new(reader.into_deserialize::<RawRecord>().map(
            move |row| {
                row.map_err(|e| SourceError::Read {
                    name: name.clone(),
                    message: e.to_string(),
                })
            },
        )))
    }
}

/// Write records in the format `CsvSource` reads.
pub fn write_records(path: &Path, records: &[RawRecord]) -> Result<(), csv::Error> {
    let mut writer = csv::Writer::from_path(path)?;
    for record in records {
        writer.serialize(record)?;
    }
    writer.flush()?;
    Ok(())
}
