//! Delimited tables with named columns
//!
//! Uploaded and training data arrive as CSV with a header row. Cells are kept
//! as trimmed strings so the feature extractor can report exactly which cell
//! failed to parse, and so batch output can echo every input column untouched.

use crate::error::{PredictionError, Result};
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

/// In-memory table: a header row plus string cells
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Table {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl Table {
    /// Build a table from headers and rows; every row must match the header width
    pub fn new(headers: Vec<String>, rows: Vec<Vec<String>>) -> Result<Self> {
        if let Some((i, row)) = rows
            .iter()
            .enumerate()
            .find(|(_, row)| row.len() != headers.len())
        {
            return Err(PredictionError::validation(
                "table",
                format!(
                    "row {} has {} cells but the header has {} columns",
                    i + 1,
                    row.len(),
                    headers.len()
                ),
            ));
        }
        Ok(Self { headers, rows })
    }

    /// Read a CSV file with a header row
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| PredictionError::io(path, e))?;
        Self::from_reader(file)
    }

    /// Read CSV with a header row from any reader
    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let mut rdr = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(reader);

        let headers: Vec<String> = rdr.headers()?.iter().map(String::from).collect();
        let mut rows = Vec::new();
        for record in rdr.records() {
            let record = record?;
            rows.push(record.iter().map(String::from).collect());
        }

        Ok(Self { headers, rows })
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    /// Number of data rows
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Position of a column by exact name
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }

    /// Cells of one column, top to bottom
    pub fn column(&self, name: &str) -> Option<Vec<&str>> {
        let idx = self.column_index(name)?;
        Some(self.rows.iter().map(|row| row[idx].as_str()).collect())
    }

    /// Required columns that the table does not have, in the order asked for
    pub fn missing_columns(&self, required: &[&str]) -> Vec<String> {
        required
            .iter()
            .filter(|name| self.column_index(name).is_none())
            .map(|name| name.to_string())
            .collect()
    }

    /// Fail with a schema error naming every absent column
    pub fn require_columns(&self, required: &[&str]) -> Result<()> {
        let missing = self.missing_columns(required);
        if missing.is_empty() {
            Ok(())
        } else {
            Err(PredictionError::MissingColumns { columns: missing })
        }
    }

    /// Copy of this table with one extra column appended on the right
    pub fn with_column(&self, name: &str, values: Vec<String>) -> Result<Table> {
        if values.len() != self.rows.len() {
            return Err(PredictionError::validation(
                name,
                format!(
                    "column has {} values but the table has {} rows",
                    values.len(),
                    self.rows.len()
                ),
            ));
        }

        let mut headers = self.headers.clone();
        headers.push(name.to_string());
        let rows = self
            .rows
            .iter()
            .zip(values)
            .map(|(row, value)| {
                let mut row = row.clone();
                row.push(value);
                row
            })
            .collect();

        Ok(Table { headers, rows })
    }

    /// Write as CSV with a header row
    pub fn write_to<W: Write>(&self, writer: W) -> Result<()> {
        let mut wtr = csv::Writer::from_writer(writer);
        wtr.write_record(&self.headers)?;
        for row in &self.rows {
            wtr.write_record(row)?;
        }
        wtr.flush().map_err(csv::Error::from)?;
        Ok(())
    }

    /// Write as a CSV file
    pub fn write_path<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let file = File::create(path).map_err(|e| PredictionError::io(path, e))?;
        self.write_to(file)
    }
}
