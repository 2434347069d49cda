//! Classifier collaborator: trait seam plus the linear TF-IDF model.
//!
//! The core treats the statistical model as an opaque collaborator behind the
//! [`Classifier`] trait. The shipped implementation, [`LinearModel`], loads a
//! JSON artifact exported from the trained TF-IDF + logistic-regression
//! pipeline and reproduces its `transform` / `predict_proba` behavior. The
//! loaded model is immutable for the process lifetime and safe to share
//! across concurrent requests.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use thiserror::Error;

/// The vectorizer's token pattern: word-character runs of two or more.
static TOKEN_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\b\w\w+\b").unwrap());

/// Failure inside the transform/predict calls themselves. Propagated to the
/// caller unchanged; never retried.
#[derive(Debug, Error)]
pub enum ClassifierError {
    #[error("probability vector has {got} entries for {expected} classes")]
    OutputDimension { expected: usize, got: usize },
    #[error("feature index {index} out of range for {dimensions} dimensions")]
    FeatureOutOfRange { index: usize, dimensions: usize },
}

/// Failure to load the model artifact. A startup/availability condition, not
/// a per-request error: the host keeps serving and rejects diagnosis requests
/// with a "service not ready" signal until the artifact is present.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("model artifact not found: {0}")]
    NotFound(PathBuf),
    #[error("failed to read model artifact {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse model artifact {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("model artifact is inconsistent: {0}")]
    Inconsistent(String),
}

/// Term-index/weight pairs of one vectorized document, sorted by index.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SparseVector(pub Vec<(usize, f64)>);

/// Boundary to the trained classifier. Implementations must be safe for
/// concurrent read-only use; the core calls them without coordination.
pub trait Classifier: Send + Sync {
    /// Fixed, ordered class label set. One probability per label.
    fn class_labels(&self) -> &[String];

    /// Vectorize an already-normalized complaint.
    fn transform(&self, text: &str) -> Result<SparseVector, ClassifierError>;

    /// Per-class probabilities for a feature vector, in `class_labels` order.
    fn predict_proba(&self, vector: &SparseVector) -> Result<Vec<f64>, ClassifierError>;
}

/// On-disk artifact layout, exported by the training pipeline.
#[derive(Deserialize)]
struct ModelArtifact {
    classes: Vec<String>,
    vocabulary: HashMap<String, usize>,
    idf: Vec<f64>,
    coefficients: Vec<Vec<f64>>,
    intercepts: Vec<f64>,
}

/// TF-IDF vectorizer + multinomial logistic regression.
#[derive(Debug)]
pub struct LinearModel {
    classes: Vec<String>,
    vocabulary: HashMap<String, usize>,
    idf: Vec<f64>,
    coefficients: Vec<Vec<f64>>,
    intercepts: Vec<f64>,
    artifact_hash: Option<String>,
}

impl LinearModel {
    /// Load and validate the artifact at `path`.
    pub fn load(path: &Path) -> Result<Self, ModelError> {
        if !path.exists() {
            return Err(ModelError::NotFound(path.to_path_buf()));
        }
        let bytes = std::fs::read(path).map_err(|source| ModelError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let artifact: ModelArtifact =
            serde_json::from_slice(&bytes).map_err(|source| ModelError::Parse {
                path: path.to_path_buf(),
                source,
            })?;

        let mut hasher = Sha256::new();
        hasher.update(&bytes);
        let hash = format!("sha256:{}", hex::encode(hasher.finalize()));

        let mut model = Self::from_artifact(artifact)?;
        model.artifact_hash = Some(hash);
        Ok(model)
    }

    /// Build a model from in-memory parts. Used by tests and embedders.
    pub fn from_parts(
        classes: Vec<String>,
        vocabulary: HashMap<String, usize>,
        idf: Vec<f64>,
        coefficients: Vec<Vec<f64>>,
        intercepts: Vec<f64>,
    ) -> Result<Self, ModelError> {
        Self::from_artifact(ModelArtifact {
            classes,
            vocabulary,
            idf,
            coefficients,
            intercepts,
        })
    }

    fn from_artifact(artifact: ModelArtifact) -> Result<Self, ModelError> {
        let n_classes = artifact.classes.len();
        let n_features = artifact.idf.len();

        if n_classes == 0 {
            return Err(ModelError::Inconsistent("artifact declares no classes".into()));
        }
        if artifact.coefficients.len() != n_classes {
            return Err(ModelError::Inconsistent(format!(
                "{} coefficient rows for {} classes",
                artifact.coefficients.len(),
                n_classes
            )));
        }
        if artifact.intercepts.len() != n_classes {
            return Err(ModelError::Inconsistent(format!(
                "{} intercepts for {} classes",
                artifact.intercepts.len(),
                n_classes
            )));
        }
        if let Some(row) = artifact
            .coefficients
            .iter()
            .find(|row| row.len() != n_features)
        {
            return Err(ModelError::Inconsistent(format!(
                "coefficient row has {} entries for {} features",
                row.len(),
                n_features
            )));
        }
        if let Some((term, &index)) = artifact
            .vocabulary
            .iter()
            .find(|&(_, &index)| index >= n_features)
        {
            return Err(ModelError::Inconsistent(format!(
                "vocabulary term {term:?} maps to index {index}, but idf has {n_features} entries"
            )));
        }

        Ok(Self {
            classes: artifact.classes,
            vocabulary: artifact.vocabulary,
            idf: artifact.idf,
            coefficients: artifact.coefficients,
            intercepts: artifact.intercepts,
            artifact_hash: None,
        })
    }

    /// SHA-256 of the artifact bytes, when loaded from disk.
    pub fn artifact_hash(&self) -> Option<&str> {
        self.artifact_hash.as_deref()
    }

    pub fn vocabulary_size(&self) -> usize {
        self.vocabulary.len()
    }
}

impl Classifier for LinearModel {
    fn class_labels(&self) -> &[String] {
        &self.classes
    }

    fn transform(&self, text: &str) -> Result<SparseVector, ClassifierError> {
        let mut counts: HashMap<usize, f64> = HashMap::new();
        for token in TOKEN_RE.find_iter(text) {
            if let Some(&index) = self.vocabulary.get(token.as_str()) {
                *counts.entry(index).or_insert(0.0) += 1.0;
            }
        }

        let mut entries: Vec<(usize, f64)> = counts
            .into_iter()
            .map(|(index, tf)| (index, tf * self.idf[index]))
            .collect();
        entries.sort_unstable_by_key(|&(index, _)| index);

        // L2 normalization, matching the trained vectorizer.
        let norm = entries.iter().map(|&(_, w)| w * w).sum::<f64>().sqrt();
        if norm > 0.0 {
            for (_, weight) in &mut entries {
                *weight /= norm;
            }
        }

        Ok(SparseVector(entries))
    }

    fn predict_proba(&self, vector: &SparseVector) -> Result<Vec<f64>, ClassifierError> {
        let n_features = self.idf.len();
        let mut decision = self.intercepts.clone();
        for &(index, weight) in &vector.0 {
            if index >= n_features {
                return Err(ClassifierError::FeatureOutOfRange {
                    index,
                    dimensions: n_features,
                });
            }
            for (class, row) in self.coefficients.iter().enumerate() {
                decision[class] += row[index] * weight;
            }
        }
        Ok(softmax(&decision))
    }
}

fn softmax(logits: &[f64]) -> Vec<f64> {
    let max = logits.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let exp: Vec<f64> = logits.iter().map(|&z| (z - max).exp()).collect();
    let total: f64 = exp.iter().sum();
    if total == 0.0 || !total.is_finite() {
        // Fall back to a uniform distribution.
        return vec![1.0 / logits.len() as f64; logits.len()];
    }
    exp.iter().map(|&e| e / total).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn toy_model() -> LinearModel {
        let vocabulary = HashMap::from([
            ("engine".to_string(), 0),
            ("misfire".to_string(), 1),
            ("brake".to_string(), 2),
        ]);
        LinearModel::from_parts(
            vec![
                "Engine Misfire".to_string(),
                "Brake Wear".to_string(),
                "UNKNOWN OR OTHER".to_string(),
            ],
            vocabulary,
            vec![1.0, 1.2, 1.5],
            vec![
                vec![4.0, 6.0, -2.0],
                vec![-2.0, -2.0, 6.0],
                vec![0.0, 0.0, 0.0],
            ],
            vec![0.0, 0.0, 0.5],
        )
        .unwrap()
    }

    #[test]
    fn transform_counts_and_normalizes() {
        let model = toy_model();
        let vector = model.transform("engine misfire engine").unwrap();
        assert_eq!(vector.0.len(), 2);
        assert_eq!(vector.0[0].0, 0);
        assert_eq!(vector.0[1].0, 1);
        let norm: f64 = vector.0.iter().map(|&(_, w)| w * w).sum();
        assert!((norm - 1.0).abs() < 1e-9);
        // "engine" appears twice and has the higher combined weight.
        assert!(vector.0[0].1 > vector.0[1].1);
    }

    #[test]
    fn transform_ignores_unknown_and_short_tokens() {
        let model = toy_model();
        let vector = model.transform("a kaleidoscope of wonders").unwrap();
        assert!(vector.0.is_empty());
    }

    #[test]
    fn predict_proba_is_a_distribution() {
        let model = toy_model();
        let vector = model.transform("engine misfire").unwrap();
        let probabilities = model.predict_proba(&vector).unwrap();
        assert_eq!(probabilities.len(), 3);
        let total: f64 = probabilities.iter().sum();
        assert!((total - 1.0).abs() < 1e-9);
        assert!(probabilities[0] > probabilities[1]);
        assert!(probabilities[0] > probabilities[2]);
    }

    #[test]
    fn empty_vector_falls_back_to_intercepts() {
        let model = toy_model();
        let probabilities = model.predict_proba(&SparseVector::default()).unwrap();
        // The catch-all intercept dominates when no token is recognized.
        assert!(probabilities[2] > probabilities[0]);
    }

    #[test]
    fn rejects_inconsistent_artifacts() {
        let err = LinearModel::from_parts(
            vec!["A".to_string(), "B".to_string()],
            HashMap::new(),
            vec![1.0],
            vec![vec![1.0]],
            vec![0.0],
        )
        .unwrap_err();
        assert!(matches!(err, ModelError::Inconsistent(_)));
    }

    #[test]
    fn rejects_out_of_range_vocabulary() {
        let err = LinearModel::from_parts(
            vec!["A".to_string()],
            HashMap::from([("term".to_string(), 5)]),
            vec![1.0],
            vec![vec![1.0]],
            vec![0.0],
        )
        .unwrap_err();
        assert!(matches!(err, ModelError::Inconsistent(_)));
    }

    #[test]
    fn load_reports_missing_artifact() {
        let err = LinearModel::load(Path::new("/nonexistent/model.json")).unwrap_err();
        assert!(matches!(err, ModelError::NotFound(_)));
    }

    #[test]
    fn load_hashes_artifact_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.json");
        let artifact = serde_json::json!({
            "classes": ["Engine Misfire", "UNKNOWN OR OTHER"],
            "vocabulary": {"engine": 0},
            "idf": [1.0],
            "coefficients": [[2.0], [-2.0]],
            "intercepts": [0.0, 0.0],
        });
        std::fs::write(&path, serde_json::to_vec(&artifact).unwrap()).unwrap();

        let model = LinearModel::load(&path).unwrap();
        assert_eq!(model.class_labels().len(), 2);
        let hash = model.artifact_hash().unwrap();
        assert!(hash.starts_with("sha256:"));

        let again = LinearModel::load(&path).unwrap();
        assert_eq!(again.artifact_hash().unwrap(), hash);
    }
}
