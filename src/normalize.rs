//! Complaint text normalization.
//!
//! The classifier was trained on normalized text, so the exact same transform
//! must run in front of every prediction path: the live service, the local
//! CLI, and offline evaluation. Any drift here silently invalidates the
//! model's probabilities.
//!
//! The steps run in a fixed order; each operates on the output of the
//! previous one. Marker removal happens before lowercasing because the
//! marker patterns match uppercase letter groups case-insensitively.

use regex::Regex;
use std::sync::LazyLock;

/// `TL*` marker injected at the front of source complaint records.
static LEAD_MARKER_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)\bTL\*\s*").unwrap());

/// Annotation codes of the form `*TR`, `*JB`, `*SMD`, chained as `*DT*JB`,
/// with an optional trailing separator (`*TR*`). These are injected into
/// source records and carry no semantic content.
static MARKER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\s*(?:\*[A-Z]{1,4})+\*?\s*").unwrap());

/// Numeric dates: 1-2 digits, a separator, 1-2 digits, the same separator,
/// then a 2- or 4-digit year. Written as two alternatives because the regex
/// crate has no backreferences.
static DATE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?:\d{1,2}/\d{1,2}/(?:\d{4}|\d{2})|\d{1,2}-\d{1,2}-(?:\d{4}|\d{2}))\b").unwrap()
});

/// Identifier-like runs of 10+ characters (VINs, part numbers, campaign
/// numbers). Matches are only removed when they contain a digit, so ordinary
/// long words survive.
static IDENTIFIER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b[A-Za-z0-9][A-Za-z0-9.\-]{9,}\b").unwrap());

static WHITESPACE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

/// Normalize a raw complaint into the canonical form the classifier was
/// trained on. Pure and deterministic; never fails. An input that reduces to
/// nothing comes back as the empty string, which the prediction step rejects.
pub fn normalize(text: &str) -> String {
    let cleaned = LEAD_MARKER_RE.replace_all(text, " ");
    let cleaned = MARKER_RE.replace_all(&cleaned, " ");
    let cleaned = cleaned.to_lowercase();
    let cleaned = DATE_RE.replace_all(&cleaned, " ");
    let cleaned = IDENTIFIER_RE.replace_all(&cleaned, |caps: &regex::Captures<'_>| {
        let token = &caps[0];
        if token.bytes().any(|b| b.is_ascii_digit()) {
            " ".to_string()
        } else {
            token.to_string()
        }
    });
    WHITESPACE_RE.replace_all(&cleaned, " ").trim().to_string()
}
