//! Delta Engine
//!
//! Signed differences between the current process parameters and the
//! inverse pipeline's recommendation: `delta = actual - recommended`.
//!
//! Only keys of the recommendation are reported. A recommended key with no
//! original value is a [`PipelineError::KeyMismatch`], never a silent skip.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::PipelineError;

/// Conversion of a loosely-typed value to a finite `f64`.
pub trait ToFinite {
    fn to_finite(&self, key: &str) -> Result<f64, PipelineError>;
}

impl ToFinite for f64 {
    fn to_finite(&self, key: &str) -> Result<f64, PipelineError> {
        if self.is_finite() {
            Ok(*self)
        } else {
            Err(PipelineError::conversion(key, self))
        }
    }
}

impl ToFinite for str {
    fn to_finite(&self, key: &str) -> Result<f64, PipelineError> {
        match self.trim().parse::<f64>() {
            Ok(v) if v.is_finite() => Ok(v),
            _ => Err(PipelineError::conversion(key, self)),
        }
    }
}

impl ToFinite for String {
    fn to_finite(&self, key: &str) -> Result<f64, PipelineError> {
        self.as_str().to_finite(key)
    }
}

impl ToFinite for serde_json::Value {
    fn to_finite(&self, key: &str) -> Result<f64, PipelineError> {
        match self {
            serde_json::Value::Number(n) => n
                .as_f64()
                .ok_or_else(|| PipelineError::conversion(key, n))?
                .to_finite(key),
            serde_json::Value::String(s) => s.to_finite(key),
            other => Err(PipelineError::conversion(key, other)),
        }
    }
}

impl<T: ToFinite + ?Sized> ToFinite for &T {
    fn to_finite(&self, key: &str) -> Result<f64, PipelineError> {
        (**self).to_finite(key)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DeltaEntry {
    pub actual: f64,
    pub recommended: f64,
    pub delta: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeltaResult {
    entries: BTreeMap<String, DeltaEntry>,
}

impl DeltaResult {
    pub fn get(&self, key: &str) -> Option<&DeltaEntry> {
        self.entries.get(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &DeltaEntry)> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// `key -> delta` view used in cycle reports.
    pub fn differences(&self) -> BTreeMap<String, f64> {
        self.entries
            .iter()
            .map(|(k, e)| (k.clone(), e.delta))
            .collect()
    }
}

/// Compute `original[k] - recommended[k]` for every key of `recommended`.
pub fn diff<A, B>(
    original: &BTreeMap<String, A>,
    recommended: &BTreeMap<String, B>,
) -> Result<DeltaResult, PipelineError>
where
    A: ToFinite,
    B: ToFinite,
{
    let mut entries = BTreeMap::new();
    for (key, rec) in recommended {
        let actual = original
            .get(key)
            .ok_or_else(|| PipelineError::KeyMismatch(key.clone()))?
            .to_finite(key)?;
        let recommended = rec.to_finite(key)?;
        entries.insert(
            key.clone(),
            DeltaEntry {
                actual,
                recommended,
                delta: actual - recommended,
            },
        );
    }
    Ok(DeltaResult { entries })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn map<V: Clone>(pairs: &[(&str, V)]) -> BTreeMap<String, V> {
        pairs.iter().map(|(k, v)| ((*k).to_string(), v.clone())).collect()
    }

    #[test]
    fn test_only_recommended_keys_reported() {
        let original = map(&[("a", 1.0), ("b", 2.0)]);
        let recommended = map(&[("a", 1.0)]);
        let result = diff(&original, &recommended).unwrap();
        assert_eq!(result.len(), 1);
        assert_eq!(result.get("a").unwrap().delta, 0.0);
        assert!(result.get("b").is_none());
    }

    #[test]
    fn test_missing_original_key_is_key_mismatch() {
        let original: BTreeMap<String, f64> = BTreeMap::new();
        let recommended = map(&[("a", 5.0)]);
        match diff(&original, &recommended) {
            Err(PipelineError::KeyMismatch(key)) => assert_eq!(key, "a"),
            other => panic!("expected KeyMismatch, got {other:?}"),
        }
    }

    #[test]
    fn test_delta_sign_is_actual_minus_recommended() {
        let original = map(&[("BAR_TEMP_VAL0", 955.0)]);
        let recommended = map(&[("BAR_TEMP_VAL0", 950.0)]);
        let result = diff(&original, &recommended).unwrap();
        assert_eq!(result.differences()["BAR_TEMP_VAL0"], 5.0);
    }

    #[test]
    fn test_string_values_are_converted() {
        let original = map(&[("pctAL", "99.5".to_string())]);
        let recommended = map(&[("pctAL", " 99.25 ")]);
        let result = diff(&original, &recommended).unwrap();
        assert_eq!(result.get("pctAL").unwrap().delta, 0.25);
    }

    #[test]
    fn test_non_numeric_is_type_conversion() {
        let original = map(&[("a", "abc")]);
        let recommended = map(&[("a", 1.0)]);
        assert!(matches!(
            diff(&original, &recommended),
            Err(PipelineError::TypeConversion { .. })
        ));
    }

    #[test]
    fn test_non_finite_is_type_conversion() {
        let original = map(&[("a", 1.0)]);
        let recommended = map(&[("a", f64::NAN)]);
        assert!(matches!(
            diff(&original, &recommended),
            Err(PipelineError::TypeConversion { .. })
        ));
    }

    #[test]
    fn test_json_values() {
        let original = map(&[("a", json!(10)), ("b", json!("4.5"))]);
        let recommended = map(&[("a", json!(7.5)), ("b", json!(4.5))]);
        let result = diff(&original, &recommended).unwrap();
        assert_eq!(result.get("a").unwrap().delta, 2.5);
        assert_eq!(result.get("b").unwrap().delta, 0.0);

        let bad = map(&[("a", json!(null))]);
        assert!(matches!(
            diff(&bad, &recommended),
            Err(PipelineError::TypeConversion { .. })
        ));
    }
}
