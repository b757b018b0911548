//! Min-max scaler with persisted training-time statistics.
//!
//! `x_scaled = (x - data_min) / data_range * (hi - lo) + lo`, where a zero
//! data range is treated as 1 so constant columns map to `lo`.

use serde::{Deserialize, Serialize};

use crate::error::PipelineError;
use crate::types::FeatureMatrix;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MinMaxScaler {
    #[serde(default = "default_feature_range")]
    pub feature_range: (f64, f64),
    pub data_min: Vec<f64>,
    pub data_max: Vec<f64>,
}

fn default_feature_range() -> (f64, f64) {
    (0.0, 1.0)
}

impl MinMaxScaler {
    /// Fit per-column statistics on `matrix`.
    pub fn fit(matrix: &FeatureMatrix) -> Result<Self, PipelineError> {
        if matrix.is_empty() {
            return Err(PipelineError::InsufficientData { have: 0, need: 1 });
        }
        let (data_min, data_max) = (0..matrix.width())
            .map(|c| {
                matrix
                    .column(c)
                    .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
                        (lo.min(v), hi.max(v))
                    })
            })
            .unzip();
        Ok(Self {
            feature_range: default_feature_range(),
            data_min,
            data_max,
        })
    }

    pub fn width(&self) -> usize {
        self.data_min.len()
    }

    /// Check internal consistency after deserialization.
    pub fn validate(&self) -> Result<(), String> {
        if self.data_min.len() != self.data_max.len() {
            return Err(format!(
                "data_min has {} entries, data_max has {}",
                self.data_min.len(),
                self.data_max.len()
            ));
        }
        if self.data_min.is_empty() {
            return Err("scaler has no columns".to_string());
        }
        let (lo, hi) = self.feature_range;
        if !(lo.is_finite() && hi.is_finite() && lo < hi) {
            return Err(format!("invalid feature_range ({lo}, {hi})"));
        }
        if self
            .data_min
            .iter()
            .chain(&self.data_max)
            .any(|v| !v.is_finite())
        {
            return Err("scaler statistics must be finite".to_string());
        }
        Ok(())
    }

    fn range(&self, col: usize) -> f64 {
        let r = self.data_max[col] - self.data_min[col];
        if r == 0.0 {
            1.0
        } else {
            r
        }
    }

    /// Scale every row of `matrix`.
    pub fn transform(&self, matrix: &FeatureMatrix) -> Result<FeatureMatrix, PipelineError> {
        self.check_width("input scaler", matrix.width())?;
        let (lo, hi) = self.feature_range;
        Ok(matrix.map_rows(|row| {
            row.iter()
                .enumerate()
                .map(|(c, x)| (x - self.data_min[c]) / self.range(c) * (hi - lo) + lo)
                .collect()
        }))
    }

    /// Map single-column scaled values back to original units.
    pub fn inverse_transform_column(&self, target: &str, values: &[f64]) -> Result<Vec<f64>, PipelineError> {
        self.check_width(target, 1)?;
        let (lo, hi) = self.feature_range;
        Ok(values
            .iter()
            .map(|v| (v - lo) / (hi - lo) * self.range(0) + self.data_min[0])
            .collect())
    }

    fn check_width(&self, target: &str, actual: usize) -> Result<(), PipelineError> {
        if self.width() != actual {
            return Err(PipelineError::FeatureWidth {
                target: target.to_string(),
                expected: self.width(),
                actual,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matrix(rows: Vec<Vec<f64>>) -> FeatureMatrix {
        let width = rows[0].len();
        FeatureMatrix::new((0..width).map(|i| format!("c{i}")).collect(), rows).unwrap()
    }

    #[test]
    fn test_fit_transform_bounds() {
        let m = matrix(vec![vec![10.0, 5.0], vec![20.0, 5.0], vec![15.0, 5.0]]);
        let scaler = MinMaxScaler::fit(&m).unwrap();
        let scaled = scaler.transform(&m).unwrap();
        assert_eq!(scaled.rows()[0][0], 0.0);
        assert_eq!(scaled.rows()[1][0], 1.0);
        assert_eq!(scaled.rows()[2][0], 0.5);
        // Constant column maps to the lower bound
        assert!(scaled.rows().iter().all(|r| r[1] == 0.0));
    }

    #[test]
    fn test_inverse_transform_column() {
        let scaler = MinMaxScaler {
            feature_range: (0.0, 1.0),
            data_min: vec![200.0],
            data_max: vec![220.0],
        };
        let values = scaler.inverse_transform_column("UTS", &[0.0, 0.5, 1.0]).unwrap();
        assert_eq!(values, vec![200.0, 210.0, 220.0]);
    }

    #[test]
    fn test_inverse_rejects_multi_column_scaler() {
        let scaler = MinMaxScaler {
            feature_range: (0.0, 1.0),
            data_min: vec![0.0, 0.0],
            data_max: vec![1.0, 1.0],
        };
        assert!(matches!(
            scaler.inverse_transform_column("UTS", &[0.5]),
            Err(PipelineError::FeatureWidth { .. })
        ));
    }

    #[test]
    fn test_validate_rejects_inverted_range() {
        let scaler = MinMaxScaler {
            feature_range: (1.0, 0.0),
            data_min: vec![0.0],
            data_max: vec![1.0],
        };
        assert!(scaler.validate().is_err());
    }

    #[test]
    fn test_deserialize_defaults_feature_range() {
        let scaler: MinMaxScaler =
            serde_json::from_str(r#"{"data_min": [0.0], "data_max": [2.0]}"#).unwrap();
        assert_eq!(scaler.feature_range, (0.0, 1.0));
    }
}
