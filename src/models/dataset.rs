use crate::error::{AppError, Result};
use crate::models::record::CrimeRecord;
use std::collections::BTreeSet;
use std::fs::File;
use std::io::{BufReader, Read, Write};
use std::path::Path;
use tracing::{debug, info};
use validator::Validate;

/// Tabular collection of crime records consumed by training
#[derive(Debug, Clone, Default)]
pub struct Dataset {
    records: Vec<CrimeRecord>,
}

impl Dataset {
    /// Wrap already-parsed records
    pub fn new(records: Vec<CrimeRecord>) -> Self {
        Self { records }
    }

    /// Load a dataset, choosing the parser by file extension (`.json` or CSV otherwise)
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let is_json = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.eq_ignore_ascii_case("json"))
            .unwrap_or(false);

        if is_json {
            Self::from_json_path(path)
        } else {
            Self::from_csv_path(path)
        }
    }

    /// Load records from a CSV file with a header row
    pub fn from_csv_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| {
            AppError::NotFound(format!("Dataset {}: {}", path.display(), e))
        })?;
        let dataset = Self::from_csv_reader(BufReader::new(file))?;
        info!("Loaded {} records from {}", dataset.len(), path.display());
        Ok(dataset)
    }

    /// Load records from any CSV source with a header row
    pub fn from_csv_reader<R: Read>(reader: R) -> Result<Self> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .trim(csv::Trim::All)
            .from_reader(reader);

        let mut records = Vec::new();
        for (idx, row) in csv_reader.deserialize::<CrimeRecord>().enumerate() {
            // +2: one for the header, one for 1-based numbering
            let record = row.map_err(|e| {
                AppError::Validation(format!("Row {}: {}", idx + 2, e))
            })?;
            record.validate().map_err(|e| {
                AppError::Validation(format!("Row {}: {}", idx + 2, e))
            })?;
            records.push(record);
        }

        debug!("Parsed {} CSV rows", records.len());
        Ok(Self { records })
    }

    /// Load records from a JSON array
    pub fn from_json_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| {
            AppError::NotFound(format!("Dataset {}: {}", path.display(), e))
        })?;
        let records: Vec<CrimeRecord> = serde_json::from_reader(BufReader::new(file))?;

        for (idx, record) in records.iter().enumerate() {
            record
                .validate()
                .map_err(|e| AppError::Validation(format!("Record {}: {}", idx, e)))?;
        }

        info!("Loaded {} records from {}", records.len(), path.display());
        Ok(Self { records })
    }

    /// Write the dataset as CSV using the source column names
    pub fn write_csv<W: Write>(&self, writer: W) -> Result<()> {
        let mut csv_writer = csv::Writer::from_writer(writer);
        for record in &self.records {
            csv_writer.serialize(record)?;
        }
        csv_writer.flush()?;
        Ok(())
    }

    pub fn records(&self) -> &[CrimeRecord] {
        &self.records
    }

    pub fn into_records(self) -> Vec<CrimeRecord> {
        self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Distinct cities present in the dataset
    pub fn cities(&self) -> BTreeSet<&str> {
        self.records.iter().map(|r| r.city.as_str()).collect()
    }

    /// Distinct crime categories present in the dataset
    pub fn crime_types(&self) -> BTreeSet<&str> {
        self.records.iter().map(|r| r.crime_type.as_str()).collect()
    }
}

impl From<Vec<CrimeRecord>> for Dataset {
    fn from(records: Vec<CrimeRecord>) -> Self {
        Self::new(records)
    }
}
