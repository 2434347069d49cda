//! Prediction orchestration: validation, normalization, ranking.
//!
//! This is the only fallible step of the per-request pipeline. The normalizer
//! and the suppression engine are total over their inputs; everything that
//! can go wrong — bad input, collaborator failure — surfaces here as a
//! distinct [`PredictError`] variant so callers can pattern-match instead of
//! catching a broad failure.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::{Classifier, ClassifierError};
use crate::normalize::normalize;

/// One ranked classification: a fault label and its probability.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub label: String,
    pub confidence: f64,
}

impl Prediction {
    pub fn new(label: impl Into<String>, confidence: f64) -> Self {
        Self {
            label: label.into(),
            confidence,
        }
    }
}

/// Input rejected before the classifier is invoked.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ValidationError {
    #[error("complaint text is empty")]
    Empty,
    #[error("complaint text is empty after cleaning")]
    EmptyAfterCleaning,
}

#[derive(Debug, Error)]
pub enum PredictError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("classifier failure: {0}")]
    Classifier(#[from] ClassifierError),
}

/// Rank every class for a raw complaint.
///
/// Normalizes the text, obtains the per-class probability vector from the
/// collaborator, zips it with the collaborator's fixed label set and sorts
/// descending by confidence. The sort is stable, so equal confidences keep
/// the collaborator's label enumeration order.
///
/// Returns the full ranked list — truncation and suppression belong to the
/// suppression engine, so the trust policy can change without touching this
/// classifier-facing code.
pub fn predict(text: &str, classifier: &dyn Classifier) -> Result<Vec<Prediction>, PredictError> {
    if text.trim().is_empty() {
        return Err(ValidationError::Empty.into());
    }

    let cleaned = normalize(text);
    if cleaned.is_empty() {
        return Err(ValidationError::EmptyAfterCleaning.into());
    }

    let vector = classifier.transform(&cleaned)?;
    let probabilities = classifier.predict_proba(&vector)?;

    let labels = classifier.class_labels();
    if probabilities.len() != labels.len() {
        return Err(ClassifierError::OutputDimension {
            expected: labels.len(),
            got: probabilities.len(),
        }
        .into());
    }

    let mut predictions: Vec<Prediction> = labels
        .iter()
        .zip(probabilities)
        .map(|(label, confidence)| Prediction {
            label: label.clone(),
            confidence,
        })
        .collect();

    predictions.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    Ok(predictions)
}
