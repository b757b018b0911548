//! Numeric feature matrices read off the staged data bus.

use crate::error::PipelineError;

/// Ordered rows of numeric features sharing one named column layout.
///
/// Invariant: every row has exactly `columns.len()` values.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureMatrix {
    columns: Vec<String>,
    rows: Vec<Vec<f64>>,
}

impl FeatureMatrix {
    /// Build a matrix, rejecting rows whose width differs from the header.
    pub fn new(columns: Vec<String>, rows: Vec<Vec<f64>>) -> Result<Self, PipelineError> {
        if let Some((idx, row)) = rows
            .iter()
            .enumerate()
            .find(|(_, row)| row.len() != columns.len())
        {
            return Err(PipelineError::Malformed {
                artifact: "feature matrix".to_string(),
                reason: format!(
                    "row {} has {} values, header has {} columns",
                    idx,
                    row.len(),
                    columns.len()
                ),
            });
        }
        Ok(Self { columns, rows })
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<f64>] {
        &self.rows
    }

    pub fn width(&self) -> usize {
        self.columns.len()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// The last `size` rows, in their original order.
    ///
    /// Fewer rows than `size` is an error: a short window is never
    /// silently accepted.
    pub fn window(&self, size: usize) -> Result<Self, PipelineError> {
        if self.rows.len() < size {
            return Err(PipelineError::InsufficientData {
                have: self.rows.len(),
                need: size,
            });
        }
        Ok(Self {
            columns: self.columns.clone(),
            rows: self.rows[self.rows.len() - size..].to_vec(),
        })
    }

    /// Values of one column, top to bottom.
    pub fn column(&self, idx: usize) -> impl Iterator<Item = f64> + '_ {
        self.rows.iter().map(move |row| row[idx])
    }

    /// Replace every row through `f`, keeping the column layout.
    pub(crate) fn map_rows<F>(&self, f: F) -> Self
    where
        F: Fn(&[f64]) -> Vec<f64>,
    {
        Self {
            columns: self.columns.clone(),
            rows: self.rows.iter().map(|r| f(r)).collect(),
        }
    }
}
