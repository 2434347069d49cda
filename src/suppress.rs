//! Confidence-aware suppression of the catch-all label.
//!
//! The classifier's class set includes a reserved "UNKNOWN OR OTHER" label
//! for complaints it cannot attribute to a specific fault. When that label
//! wins the ranking without a trustworthy margin, surfacing it would bury an
//! actionable runner-up, so it is demoted and the best specific fault is
//! promoted in its place. Everything here is pure: ranked list in, bounded
//! list plus flags out.

use serde::{Deserialize, Serialize};

use crate::predict::Prediction;

/// Reserved catch-all label with special suppression treatment.
pub const UNKNOWN_LABEL: &str = "UNKNOWN OR OTHER";

/// Absolute confidence floor below which the catch-all is never trusted.
pub const DEFAULT_UNKNOWN_THRESHOLD: f64 = 0.5;

/// Margin within which the catch-all is not meaningfully ahead of the
/// runner-up.
pub const DEFAULT_PROXIMITY_THRESHOLD: f64 = 0.15;

/// Maximum number of predictions surfaced to the caller.
pub const MAX_ISSUES: usize = 3;

/// Result of one suppression pass over a ranked prediction list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuppressionOutcome {
    /// At most [`MAX_ISSUES`] predictions, reordered by at most one
    /// promotion swap.
    pub predictions: Vec<Prediction>,
    /// The catch-all label was demoted (or a demotion was attempted).
    pub unknown_suppressed: bool,
    /// Reserved for a second, independent suppression class. The current
    /// policy never sets it; the field stays for interface stability.
    pub other_suppressed: bool,
}

/// Severity bucket for a surfaced prediction, derived from its final
/// confidence alone. Applied by callers, never by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Critical,
    Warning,
}

impl Severity {
    pub fn from_confidence(confidence: f64) -> Self {
        if confidence >= 0.8 {
            Self::Critical
        } else {
            Self::Warning
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Critical => "critical",
            Self::Warning => "warning",
        }
    }
}

/// Apply the trust policy to a ranked prediction list.
///
/// The catch-all is suppressed when it leads the ranking and either its
/// confidence sits below `unknown_threshold` or its lead over the runner-up
/// is at most `proximity_threshold` (a tie or exact margin still triggers).
/// Suppression promotes the highest-ranked specific fault to the front,
/// keeping its original confidence and the relative order of everything
/// else. When no specific fault exists to promote, the catch-all stays in
/// front while the flag still reports the attempt — a known inconsistency
/// kept for compatibility (see DESIGN.md).
///
/// The returned list is always truncated to [`MAX_ISSUES`] entries.
pub fn suppress(
    predictions: &[Prediction],
    unknown_threshold: f64,
    proximity_threshold: f64,
) -> SuppressionOutcome {
    let Some(top) = predictions.first() else {
        return SuppressionOutcome {
            predictions: Vec::new(),
            unknown_suppressed: false,
            other_suppressed: false,
        };
    };

    let mut ranked: Vec<Prediction> = predictions.to_vec();
    let mut unknown_suppressed = false;

    if top.label == UNKNOWN_LABEL {
        let low_confidence = top.confidence < unknown_threshold;
        let insufficient_lead = predictions
            .get(1)
            .is_some_and(|second| top.confidence - second.confidence <= proximity_threshold);

        if low_confidence || insufficient_lead {
            unknown_suppressed = true;

            // Promotion builds a fresh sequence: drop the catch-all head,
            // pull the first specific fault to the front, keep the rest in
            // order with confidences untouched.
            let promoted_at = ranked
                .iter()
                .skip(1)
                .position(|p| p.label != UNKNOWN_LABEL)
                .map(|offset| offset + 1);

            if let Some(index) = promoted_at {
                let mut reordered = Vec::with_capacity(ranked.len() - 1);
                reordered.push(ranked[index].clone());
                reordered.extend(
                    ranked
                        .iter()
                        .enumerate()
                        .filter(|&(i, _)| i != 0 && i != index)
                        .map(|(_, p)| p.clone()),
                );
                ranked = reordered;
            }
        }
    }

    ranked.truncate(MAX_ISSUES);
    SuppressionOutcome {
        predictions: ranked,
        unknown_suppressed,
        other_suppressed: false,
    }
}
