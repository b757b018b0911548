//! Header-carrying CSV tables exchanged between pipeline stages.
//!
//! Format: first record is the header, comma delimiter, fields containing a
//! comma, quote or newline are double-quoted with `""` escaping.

use std::collections::BTreeMap;

use crate::error::PipelineError;
use crate::types::{FeatureMatrix, PredictionSet};

#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl Table {
    pub fn new(headers: Vec<String>) -> Self {
        Self {
            headers,
            rows: Vec::new(),
        }
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }

    pub fn push_row(&mut self, row: Vec<String>) -> Result<(), PipelineError> {
        if row.len() != self.headers.len() {
            return Err(PipelineError::Malformed {
                artifact: "table".to_string(),
                reason: format!(
                    "row has {} fields, header has {}",
                    row.len(),
                    self.headers.len()
                ),
            });
        }
        self.rows.push(row);
        Ok(())
    }

    pub fn push_numeric_row(&mut self, row: &[f64]) -> Result<(), PipelineError> {
        self.push_row(row.iter().map(|v| v.to_string()).collect())
    }

    pub fn from_matrix(matrix: &FeatureMatrix) -> Self {
        Self {
            headers: matrix.columns().to_vec(),
            rows: matrix
                .rows()
                .iter()
                .map(|r| r.iter().map(|v| v.to_string()).collect())
                .collect(),
        }
    }

    /// One column per target, one row per window row.
    pub fn from_predictions(set: &PredictionSet) -> Result<Self, PipelineError> {
        let headers: Vec<String> = set.targets().map(str::to_string).collect();
        let expected = set.iter().next().map_or(0, |(_, v)| v.len());
        for (target, values) in set.iter() {
            if values.len() != expected {
                return Err(PipelineError::PredictionShape {
                    target: target.clone(),
                    expected,
                    actual: values.len(),
                });
            }
        }

        let mut table = Self::new(headers);
        for row_idx in 0..expected {
            let row: Vec<f64> = set.iter().map(|(_, v)| v[row_idx]).collect();
            table.push_numeric_row(&row)?;
        }
        Ok(table)
    }

    // ========================================================================
    // Codec
    // ========================================================================

    /// Parse CSV text. `artifact` names the source in error messages.
    pub fn parse(artifact: &str, text: &str) -> Result<Self, PipelineError> {
        let text = text.strip_prefix('\u{feff}').unwrap_or(text);
        let mut records = split_records(text).into_iter();

        let headers = records.next().ok_or_else(|| PipelineError::Malformed {
            artifact: artifact.to_string(),
            reason: "missing header row".to_string(),
        })?;
        let headers: Vec<String> = headers.into_iter().map(|h| h.trim().to_string()).collect();

        let mut rows = Vec::new();
        for (idx, record) in records.enumerate() {
            if record.len() != headers.len() {
                return Err(PipelineError::Malformed {
                    artifact: artifact.to_string(),
                    reason: format!(
                        "data row {} has {} fields, header has {}",
                        idx + 1,
                        record.len(),
                        headers.len()
                    ),
                });
            }
            rows.push(record);
        }

        Ok(Self { headers, rows })
    }

    pub fn to_csv(&self) -> String {
        let mut out = String::new();
        write_record(&mut out, &self.headers);
        for row in &self.rows {
            write_record(&mut out, row);
        }
        out
    }

    // ========================================================================
    // Numeric views
    // ========================================================================

    /// Every cell as a number, in column order.
    pub fn to_matrix(&self, artifact: &str) -> Result<FeatureMatrix, PipelineError> {
        let rows = self
            .rows
            .iter()
            .map(|row| {
                row.iter()
                    .zip(&self.headers)
                    .map(|(cell, header)| parse_cell(artifact, header, cell))
                    .collect::<Result<Vec<_>, _>>()
            })
            .collect::<Result<Vec<_>, _>>()?;
        FeatureMatrix::new(self.headers.clone(), rows)
    }

    /// Select `columns` (in that order) as a numeric matrix.
    pub fn project(&self, artifact: &str, columns: &[String]) -> Result<FeatureMatrix, PipelineError> {
        let indices = columns
            .iter()
            .map(|c| {
                self.column_index(c).ok_or_else(|| PipelineError::MissingColumn {
                    artifact: artifact.to_string(),
                    column: c.clone(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let rows = self
            .rows
            .iter()
            .map(|row| {
                indices
                    .iter()
                    .zip(columns)
                    .map(|(&i, name)| parse_cell(artifact, name, &row[i]))
                    .collect::<Result<Vec<_>, _>>()
            })
            .collect::<Result<Vec<_>, _>>()?;
        FeatureMatrix::new(columns.to_vec(), rows)
    }

    /// Columns whose every value parses as a finite number.
    pub fn numeric_columns(&self) -> Vec<String> {
        self.headers
            .iter()
            .enumerate()
            .filter(|(i, _)| {
                self.rows
                    .iter()
                    .all(|row| row[*i].trim().parse::<f64>().is_ok_and(f64::is_finite))
            })
            .map(|(_, h)| h.clone())
            .collect()
    }

    /// Values of `keys` in the last row.
    pub fn last_row_values(
        &self,
        artifact: &str,
        keys: &[String],
    ) -> Result<BTreeMap<String, f64>, PipelineError> {
        let last = self.rows.last().ok_or(PipelineError::InsufficientData { have: 0, need: 1 })?;
        keys.iter()
            .map(|key| {
                let idx = self.column_index(key).ok_or_else(|| PipelineError::MissingColumn {
                    artifact: artifact.to_string(),
                    column: key.clone(),
                })?;
                Ok((key.clone(), parse_cell(artifact, key, &last[idx])?))
            })
            .collect()
    }
}

fn parse_cell(artifact: &str, column: &str, cell: &str) -> Result<f64, PipelineError> {
    match cell.trim().parse::<f64>() {
        Ok(v) if v.is_finite() => Ok(v),
        _ => Err(PipelineError::conversion(format!("{artifact}:{column}"), cell)),
    }
}

/// Split CSV text into records, honouring double-quoted fields.
/// Blank lines are skipped.
fn split_records(text: &str) -> Vec<Vec<String>> {
    let mut records = Vec::new();
    let mut record: Vec<String> = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        if in_quotes {
            match c {
                '"' if chars.peek() == Some(&'"') => {
                    field.push('"');
                    chars.next();
                }
                '"' => in_quotes = false,
                _ => field.push(c),
            }
            continue;
        }

        match c {
            '"' => in_quotes = true,
            ',' => record.push(std::mem::take(&mut field)),
            '\r' => {}
            '\n' => {
                record.push(std::mem::take(&mut field));
                if !(record.len() == 1 && record[0].trim().is_empty()) {
                    records.push(std::mem::take(&mut record));
                }
                record.clear();
            }
            _ => field.push(c),
        }
    }

    if !field.is_empty() || !record.is_empty() {
        record.push(field);
        if !(record.len() == 1 && record[0].trim().is_empty()) {
            records.push(record);
        }
    }
    records
}

fn write_record(out: &mut String, fields: &[String]) {
    for (i, field) in fields.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        if field.contains([',', '"', '\n', '\r']) {
            out.push('"');
            out.push_str(&field.replace('"', "\"\""));
            out.push('"');
        } else {
            out.push_str(field);
        }
    }
    out.push('\n');
}
