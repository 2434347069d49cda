//! Faultline — automotive fault diagnosis from free-text complaints.
//!
//! A complaint flows through three stages per request:
//! 1. [`normalize`](normalize::normalize) reproduces the exact text
//!    preprocessing the classifier was trained on;
//! 2. [`predict`](predict::predict) validates the input, vectorizes it
//!    through the loaded model and ranks every fault class by probability;
//! 3. [`suppress`](suppress::suppress) applies the confidence trust policy
//!    to the catch-all "UNKNOWN OR OTHER" label and bounds the result to the
//!    top three issues.
//!
//! Every stage is pure with respect to request data; the only shared state
//! is the model, loaded once at startup and read-only afterwards.
//!
//! Uses structured logging via [`tracing`]. Set the `RUST_LOG` environment
//! variable to control log verbosity (e.g., `RUST_LOG=faultline=debug`).

pub mod model;
pub mod normalize;
pub mod predict;
pub mod server;
pub mod suppress;
pub mod transcribe;

use crate::model::Classifier;
use crate::predict::{predict, PredictError};
use crate::suppress::{suppress, SuppressionOutcome};

/// Run the full per-request pipeline: validate, normalize, classify,
/// suppress. Shared by the HTTP handler and the local CLI.
pub fn diagnose(
    text: &str,
    classifier: &dyn Classifier,
    unknown_threshold: f64,
    proximity_threshold: f64,
) -> Result<SuppressionOutcome, PredictError> {
    let ranked = predict(text, classifier)?;
    let outcome = suppress(&ranked, unknown_threshold, proximity_threshold);

    tracing::debug!(
        candidates = ranked.len(),
        surfaced = outcome.predictions.len(),
        unknown_suppressed = outcome.unknown_suppressed,
        top = outcome.predictions.first().map(|p| p.label.as_str()),
        "diagnosis complete"
    );

    Ok(outcome)
}
