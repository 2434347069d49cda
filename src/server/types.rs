//! Request/response types and configuration for the diagnosis server.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;

use crate::suppress::{Severity, DEFAULT_PROXIMITY_THRESHOLD, DEFAULT_UNKNOWN_THRESHOLD};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Server configuration. Built once at startup and treated as immutable; the
/// components that need a value receive it from here rather than reading any
/// process-wide settings.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to (defaults to 127.0.0.1:8000; use 0.0.0.0 to expose
    /// externally)
    pub bind_addr: SocketAddr,
    /// Rate limit in requests per minute per IP (0 = no limit)
    pub rate_limit_rpm: u32,
    /// Path for JSONL access log
    pub access_log_path: String,
    /// Maximum access log file size in bytes before rotation (0 = no limit)
    pub max_access_log_bytes: u64,
    /// Path to the exported model artifact
    pub model_path: PathBuf,
    /// Confidence floor for trusting a top-ranked catch-all prediction
    pub unknown_threshold: f64,
    /// Margin for the catch-all's lead over the runner-up
    pub proximity_threshold: f64,
    /// Threshold reserved for the second suppression class. Configured for
    /// interface stability; the current policy never consults it.
    pub other_threshold: f64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8000"
                .parse()
                .expect("valid default bind address"),
            rate_limit_rpm: 60,
            access_log_path: "faultline-access.jsonl".to_string(),
            max_access_log_bytes: 50 * 1024 * 1024, // 50 MB
            model_path: PathBuf::from("artifacts/model.json"),
            unknown_threshold: DEFAULT_UNKNOWN_THRESHOLD,
            proximity_threshold: DEFAULT_PROXIMITY_THRESHOLD,
            other_threshold: DEFAULT_UNKNOWN_THRESHOLD,
        }
    }
}

/// Longest complaint accepted by the API, in characters.
pub const MAX_COMPLAINT_CHARS: usize = 500;

// ---------------------------------------------------------------------------
// Request / Response types
// ---------------------------------------------------------------------------

/// Request for complaint diagnosis.
#[derive(Debug, Deserialize)]
pub struct DiagnoseRequest {
    /// Natural-language description of the automotive complaint
    pub complaint: String,
}

/// A single diagnosed issue surfaced to the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiagnosedIssue {
    pub name: String,
    pub confidence: f64,
    pub severity: Severity,
}

/// Which suppression rules fired while building the response.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SuppressionInfo {
    pub unknown_suppressed: bool,
    pub other_suppressed: bool,
}

/// Response for the diagnose endpoint.
#[derive(Debug, Serialize, Deserialize)]
pub struct DiagnoseResponse {
    /// Top issues after suppression, highest confidence first
    pub issues: Vec<DiagnosedIssue>,
    /// When the diagnosis was generated
    pub timestamp: DateTime<Utc>,
    pub suppression_applied: SuppressionInfo,
}

/// Response for the transcription endpoint.
#[derive(Debug, Serialize, Deserialize)]
pub struct TranscriptionResponse {
    pub text: String,
}

/// Uniform error body for non-2xx responses.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub model_loaded: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_hash: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub class_count: Option<usize>,
    pub uptime_seconds: u64,
}

/// Stats response.
#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub uptime_seconds: u64,
    pub requests: RequestStats,
    pub severities: SeverityStats,
    pub suppression: SuppressionStats,
    pub endpoints: EndpointStats,
}

#[derive(Debug, Serialize)]
pub struct RequestStats {
    pub total: u64,
    pub errors: u64,
}

#[derive(Debug, Serialize)]
pub struct SeverityStats {
    pub critical: u64,
    pub warning: u64,
}

#[derive(Debug, Serialize)]
pub struct SuppressionStats {
    pub unknown: u64,
    pub other: u64,
}

#[derive(Debug, Serialize)]
pub struct EndpointStats {
    pub diagnose: u64,
    pub transcribe: u64,
    pub stats: u64,
}
