//! Predictor artifacts.
//!
//! Models are stored as JSON tagged by `booster`:
//!
//! - `gbtree`: gradient-boosted regression trees. Each tree is a flat node
//!   array rooted at index 0. Split nodes send `x[f] < threshold` left,
//!   NaN by `missing_left`. Prediction is `base_score + Σ leaf`.
//! - `gblinear`: `bias + Σ w[i] * x[i]`.

use serde::{Deserialize, Serialize};

use crate::error::PipelineError;
use crate::types::FeatureMatrix;

/// Anything that maps a scaled feature window to one value per row.
pub trait Predictor: Send + Sync + std::fmt::Debug {
    /// Predict in the model's (scaled) target space.
    fn predict(&self, target: &str, window: &FeatureMatrix) -> Result<Vec<f64>, PipelineError>;

    /// Short label for logs.
    fn kind(&self) -> &'static str;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "booster", rename_all = "lowercase")]
pub enum ModelArtifact {
    Gbtree(TreeEnsemble),
    Gblinear(LinearModel),
}

impl ModelArtifact {
    pub fn from_json(bytes: &[u8]) -> Result<Self, String> {
        let model: Self = serde_json::from_slice(bytes).map_err(|e| e.to_string())?;
        model.validate()?;
        Ok(model)
    }

    fn validate(&self) -> Result<(), String> {
        match self {
            Self::Gbtree(ensemble) => ensemble.validate(),
            Self::Gblinear(linear) => linear.validate(),
        }
    }
}

impl Predictor for ModelArtifact {
    fn predict(&self, target: &str, window: &FeatureMatrix) -> Result<Vec<f64>, PipelineError> {
        match self {
            Self::Gbtree(ensemble) => ensemble.predict(target, window),
            Self::Gblinear(linear) => linear.predict(target, window),
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            Self::Gbtree(_) => "gbtree",
            Self::Gblinear(_) => "gblinear",
        }
    }
}

// ============================================================================
// Tree ensemble
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreeEnsemble {
    #[serde(default)]
    pub base_score: f64,
    /// Declared input width; checked against the window when present.
    #[serde(default)]
    pub num_features: Option<usize>,
    pub trees: Vec<Tree>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tree {
    pub nodes: Vec<TreeNode>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TreeNode {
    Split {
        split_feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
        #[serde(default = "default_missing_left")]
        missing_left: bool,
    },
    Leaf {
        leaf: f64,
    },
}

fn default_missing_left() -> bool {
    true
}

impl TreeEnsemble {
    fn validate(&self) -> Result<(), String> {
        for (t, tree) in self.trees.iter().enumerate() {
            if tree.nodes.is_empty() {
                return Err(format!("tree {t} has no nodes"));
            }
            for (n, node) in tree.nodes.iter().enumerate() {
                if let TreeNode::Split { left, right, .. } = node {
                    // Children must point forward so evaluation always terminates.
                    if *left <= n || *right <= n || *left >= tree.nodes.len() || *right >= tree.nodes.len() {
                        return Err(format!("tree {t} node {n} has invalid children ({left}, {right})"));
                    }
                }
            }
        }
        Ok(())
    }

    fn max_feature(&self) -> Option<usize> {
        self.trees
            .iter()
            .flat_map(|t| &t.nodes)
            .filter_map(|n| match n {
                TreeNode::Split { split_feature, .. } => Some(*split_feature),
                TreeNode::Leaf { .. } => None,
            })
            .max()
    }

    fn predict(&self, target: &str, window: &FeatureMatrix) -> Result<Vec<f64>, PipelineError> {
        let width = window.width();
        if let Some(expected) = self.num_features {
            if expected != width {
                return Err(PipelineError::FeatureWidth {
                    target: target.to_string(),
                    expected,
                    actual: width,
                });
            }
        }
        if let Some(max) = self.max_feature() {
            if max >= width {
                return Err(PipelineError::FeatureWidth {
                    target: target.to_string(),
                    expected: max + 1,
                    actual: width,
                });
            }
        }

        Ok(window
            .rows()
            .iter()
            .map(|row| {
                self.base_score + self.trees.iter().map(|t| t.evaluate(row)).sum::<f64>()
            })
            .collect())
    }
}

impl Tree {
    fn evaluate(&self, row: &[f64]) -> f64 {
        let mut idx = 0;
        loop {
            match &self.nodes[idx] {
                TreeNode::Leaf { leaf } => return *leaf,
                TreeNode::Split {
                    split_feature,
                    threshold,
                    left,
                    right,
                    missing_left,
                } => {
                    let x = row[*split_feature];
                    idx = if x.is_nan() {
                        if *missing_left { *left } else { *right }
                    } else if x < *threshold {
                        *left
                    } else {
                        *right
                    };
                }
            }
        }
    }
}

// ============================================================================
// Linear model
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearModel {
    #[serde(default)]
    pub bias: f64,
    pub weights: Vec<f64>,
}

impl LinearModel {
    fn validate(&self) -> Result<(), String> {
        if self.weights.is_empty() {
            return Err("linear model has no weights".to_string());
        }
        if !self.bias.is_finite() || self.weights.iter().any(|w| !w.is_finite()) {
            return Err("linear model coefficients must be finite".to_string());
        }
        Ok(())
    }

    fn predict(&self, target: &str, window: &FeatureMatrix) -> Result<Vec<f64>, PipelineError> {
        if self.weights.len() != window.width() {
            return Err(PipelineError::FeatureWidth {
                target: target.to_string(),
                expected: self.weights.len(),
                actual: window.width(),
            });
        }
        Ok(window
            .rows()
            .iter()
            .map(|row| {
                self.bias
                    + row
                        .iter()
                        .zip(&self.weights)
                        .map(|(x, w)| x * w)
                        .sum::<f64>()
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn window(rows: Vec<Vec<f64>>) -> FeatureMatrix {
        let width = rows[0].len();
        FeatureMatrix::new((0..width).map(|i| format!("f{i}")).collect(), rows).unwrap()
    }

    const STUMP: &str = r#"{
        "booster": "gbtree",
        "base_score": 0.5,
        "trees": [
            {"nodes": [
                {"split_feature": 1, "threshold": 0.5, "left": 1, "right": 2},
                {"leaf": -0.25},
                {"leaf": 0.25}
            ]},
            {"nodes": [{"leaf": 0.1}]}
        ]
    }"#;

    #[test]
    fn test_gbtree_routes_on_threshold() {
        let model = ModelArtifact::from_json(STUMP.as_bytes()).unwrap();
        assert_eq!(model.kind(), "gbtree");
        let w = window(vec![vec![0.0, 0.2], vec![0.0, 0.9], vec![0.0, f64::NAN]]);
        let out = model.predict("T", &w).unwrap();
        assert!((out[0] - 0.35).abs() < 1e-12);
        assert!((out[1] - 0.85).abs() < 1e-12);
        // NaN follows the default (left) branch
        assert!((out[2] - 0.35).abs() < 1e-12);
    }

    #[test]
    fn test_gbtree_feature_out_of_range() {
        let model = ModelArtifact::from_json(STUMP.as_bytes()).unwrap();
        let w = window(vec![vec![0.0]]);
        assert!(matches!(
            model.predict("T", &w),
            Err(PipelineError::FeatureWidth { expected: 2, actual: 1, .. })
        ));
    }

    #[test]
    fn test_gbtree_rejects_cyclic_children() {
        let json = r#"{"booster": "gbtree", "trees": [{"nodes": [
            {"split_feature": 0, "threshold": 0.5, "left": 0, "right": 1},
            {"leaf": 1.0}
        ]}]}"#;
        assert!(ModelArtifact::from_json(json.as_bytes()).is_err());
    }

    #[test]
    fn test_gblinear_predicts_dot_product() {
        let json = r#"{"booster": "gblinear", "bias": 1.0, "weights": [2.0, -1.0]}"#;
        let model = ModelArtifact::from_json(json.as_bytes()).unwrap();
        let out = model.predict("T", &window(vec![vec![1.0, 3.0]])).unwrap();
        assert_eq!(out, vec![0.0]);
    }

    #[test]
    fn test_gblinear_width_mismatch() {
        let json = r#"{"booster": "gblinear", "weights": [1.0, 1.0, 1.0]}"#;
        let model = ModelArtifact::from_json(json.as_bytes()).unwrap();
        assert!(matches!(
            model.predict("T", &window(vec![vec![1.0]])),
            Err(PipelineError::FeatureWidth { .. })
        ));
    }

    #[test]
    fn test_unknown_booster_rejected() {
        let json = r#"{"booster": "dart", "weights": []}"#;
        assert!(ModelArtifact::from_json(json.as_bytes()).is_err());
    }
}
