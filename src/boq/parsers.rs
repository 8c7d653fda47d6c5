// Row parsers for CSV and JSON exports of BOQ / WBS sheets

use anyhow::{bail, Context, Result};
use serde_json::Value;
use std::path::Path;

use super::rows::RawRow;
use super::traits::RowParser;

/// Header row followed by data rows; short rows are accepted
#[derive(Debug, Clone, Copy, Default)]
pub struct CsvRowParser;

impl CsvRowParser {
    pub fn parse_str(&self, text: &str) -> Result<Vec<RawRow>> {
        // Strip UTF-8 BOM if present
        let text = text.trim_start_matches('\u{FEFF}');

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(text.as_bytes());

        let headers = reader
            .headers()
            .context("Failed to read CSV headers")?
            .clone();

        let mut rows = Vec::new();
        for (index, record) in reader.records().enumerate() {
            let record = record.with_context(|| format!("Failed to read CSV row {index}"))?;
            let mut row = RawRow::new(index);
            for (header, value) in headers.iter().zip(record.iter()) {
                if !header.trim().is_empty() {
                    row = row.with(header, value);
                }
            }
            rows.push(row);
        }

        tracing::debug!(rows = rows.len(), columns = headers.len(), "CSV parsed");
        Ok(rows)
    }
}

impl RowParser for CsvRowParser {
    fn parse(&self, path: &Path) -> Result<Vec<RawRow>> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        self.parse_str(&text)
    }
}

/// A JSON array of objects keyed by column header
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonRowParser;

impl JsonRowParser {
    pub fn parse_str(&self, text: &str) -> Result<Vec<RawRow>> {
        let value: Value = serde_json::from_str(text).context("Invalid JSON row file")?;
        let Value::Array(items) = value else {
            bail!("Expected a JSON array of row objects");
        };

        let mut rows = Vec::with_capacity(items.len());
        for (index, item) in items.into_iter().enumerate() {
            let Value::Object(fields) = item else {
                bail!("Row {index} is not a JSON object");
            };
            let mut row = RawRow::new(index);
            for (column, value) in fields {
                let text = match value {
                    Value::Null => continue,
                    Value::String(s) => s,
                    Value::Number(n) => n.to_string(),
                    Value::Bool(b) => b.to_string(),
                    other => bail!("Row {index} column '{column}' holds a nested value: {other}"),
                };
                row = row.with(&column, text);
            }
            rows.push(row);
        }
        Ok(rows)
    }
}

impl RowParser for JsonRowParser {
    fn parse(&self, path: &Path) -> Result<Vec<RawRow>> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        self.parse_str(&text)
    }
}

/// Pick a parser from the file extension
pub fn parser_for(path: &Path) -> Result<Box<dyn RowParser>> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    match extension.as_deref() {
        Some("csv") => Ok(Box::new(CsvRowParser)),
        Some("json") => Ok(Box::new(JsonRowParser)),
        _ => bail!("Unsupported row file {} (expected .csv or .json)", path.display()),
    }
}
