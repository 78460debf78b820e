//! Loads the two linear placement models and scores a feature vector.

use std::fs;
use std::path::Path;

use serde::Deserialize;
use thiserror::Error;

/// The five features every model must name, in the fixed order the
/// scorer expects them. The JSON `features` array itself may list them
/// in any order: validation is a set-equality check, not a sequence
/// check.
pub const FEATURE_NAMES: [&str; 5] = [
    "cycles_per_ms",
    "IPC",
    "Cache_Miss_Ratio",
    "MemStall_per_Mem",
    "MemStall_per_Inst",
];

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("failed to read model file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse model JSON: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("model feature list does not match the required set: got {got:?}, need {FEATURE_NAMES:?}")]
    FeatureMismatch { got: Vec<String> },
    #[error("model is missing a weight for feature {0:?}")]
    MissingWeight(String),
}

#[derive(Debug, Deserialize)]
struct ModelJson {
    features: Vec<String>,
    intercept: f64,
    weights: std::collections::HashMap<String, f64>,
}

/// `intercept + sum(weight_i * feature_i)`, clamped to non-negative.
/// Immutable once loaded.
#[derive(Debug, Clone, PartialEq)]
pub struct LinearModel5 {
    intercept: f64,
    weights: [f64; 5],
}

impl LinearModel5 {
    pub fn load(path: &Path) -> Result<Self, ModelError> {
        let text = fs::read_to_string(path).map_err(|source| ModelError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let parsed: ModelJson = serde_json::from_str(&text)?;
        Self::from_json(parsed)
    }

    fn from_json(parsed: ModelJson) -> Result<Self, ModelError> {
        let required: std::collections::HashSet<&str> = FEATURE_NAMES.iter().copied().collect();
        let got: std::collections::HashSet<&str> = parsed.features.iter().map(String::as_str).collect();
        if got != required {
            return Err(ModelError::FeatureMismatch {
                got: parsed.features.clone(),
            });
        }

        let mut weights = [0.0; 5];
        for (i, name) in FEATURE_NAMES.iter().enumerate() {
            weights[i] = *parsed
                .weights
                .get(*name)
                .ok_or_else(|| ModelError::MissingWeight(name.to_string()))?;
        }

        Ok(LinearModel5 {
            intercept: parsed.intercept,
            weights,
        })
    }

    /// Scores `x` (in [`FEATURE_NAMES`] order), clamped to `>= 0`.
    pub fn predict(&self, x: &[f64; 5]) -> f64 {
        let raw = self.intercept
            + self
                .weights
                .iter()
                .zip(x.iter())
                .map(|(w, v)| w * v)
                .sum::<f64>();
        raw.max(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn model_json(features: &[&str], intercept: f64, weights: &[(&str, f64)]) -> ModelJson {
        ModelJson {
            features: features.iter().map(|s| s.to_string()).collect(),
            intercept,
            weights: weights.iter().map(|(k, v)| (k.to_string(), *v)).collect(),
        }
    }

    #[test]
    fn rejects_missing_feature() {
        let json = model_json(
            &["cycles_per_ms", "IPC", "Cache_Miss_Ratio", "MemStall_per_Mem"],
            0.0,
            &[],
        );
        assert!(matches!(
            LinearModel5::from_json(json),
            Err(ModelError::FeatureMismatch { .. })
        ));
    }

    #[test]
    fn order_insensitive_feature_list() {
        let json = model_json(
            &[
                "MemStall_per_Inst",
                "MemStall_per_Mem",
                "Cache_Miss_Ratio",
                "IPC",
                "cycles_per_ms",
            ],
            1.0,
            &[
                ("cycles_per_ms", 1.0),
                ("IPC", 0.0),
                ("Cache_Miss_Ratio", 0.0),
                ("MemStall_per_Mem", 0.0),
                ("MemStall_per_Inst", 0.0),
            ],
        );
        let model = LinearModel5::from_json(json).unwrap();
        assert_eq!(model.predict(&[3_000_000.0, 0.0, 0.0, 0.0, 0.0]), 3_000_001.0);
    }

    #[test]
    fn clamps_negative_scores_to_zero() {
        let json = model_json(
            &FEATURE_NAMES,
            -5.0,
            &FEATURE_NAMES.iter().map(|f| (*f, 0.0)).collect::<Vec<_>>(),
        );
        let model = LinearModel5::from_json(json).unwrap();
        assert_eq!(model.predict(&[0.0; 5]), 0.0);
    }
}
