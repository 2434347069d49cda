//! HTTP endpoint handler functions.

use std::net::SocketAddr;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Instant;

use axum::extract::{ConnectInfo, Multipart, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::Utc;

use crate::model::Classifier;
use crate::predict::PredictError;
use crate::suppress::Severity;
use crate::transcribe::Transcriber;

use super::logging::RecordEvent;
use super::types::*;
use super::ServerState;

/// Maximum request body size in bytes (1 MB).
pub const MAX_BODY_BYTES: usize = 1024 * 1024;

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
        .into_response()
}

pub async fn health_handler(State(state): State<Arc<ServerState>>) -> impl IntoResponse {
    let response = HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        model_loaded: state.classifier.is_some(),
        model_hash: state.model_hash.clone(),
        class_count: state
            .classifier
            .as_ref()
            .map(|classifier| classifier.class_labels().len()),
        uptime_seconds: state.start_time.elapsed().as_secs(),
    };
    Json(response)
}

pub async fn diagnose_handler(
    State(state): State<Arc<ServerState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Json(request): Json<DiagnoseRequest>,
) -> Response {
    let start = Instant::now();
    state.usage.ep_diagnose.fetch_add(1, Ordering::Relaxed);

    if let Some(limiter) =
        super::middleware::get_rate_limiter(&state.config, &state.rate_limiters, addr.ip()).await
    {
        if limiter.check().is_err() {
            state.usage.record_error();
            return error_response(
                StatusCode::TOO_MANY_REQUESTS,
                format!(
                    "Rate limit exceeded. Maximum {} requests per minute.",
                    state.config.rate_limit_rpm
                ),
            );
        }
    }

    let complaint = request.complaint.trim();
    if complaint.is_empty() {
        state.usage.record_error();
        return error_response(StatusCode::UNPROCESSABLE_ENTITY, "complaint cannot be empty");
    }
    if complaint.chars().count() > MAX_COMPLAINT_CHARS {
        state.usage.record_error();
        return error_response(
            StatusCode::UNPROCESSABLE_ENTITY,
            format!("complaint exceeds {MAX_COMPLAINT_CHARS} characters"),
        );
    }

    let Some(classifier) = state.classifier.as_ref() else {
        state.usage.record_error();
        return error_response(StatusCode::SERVICE_UNAVAILABLE, "model not loaded");
    };

    let outcome = match crate::diagnose(
        complaint,
        classifier.as_ref(),
        state.config.unknown_threshold,
        state.config.proximity_threshold,
    ) {
        Ok(outcome) => outcome,
        Err(PredictError::Validation(e)) => {
            state.usage.record_error();
            return error_response(StatusCode::UNPROCESSABLE_ENTITY, e.to_string());
        }
        Err(PredictError::Classifier(e)) => {
            state.usage.record_error();
            return error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("classification failed: {e}"),
            );
        }
    };

    let issues: Vec<DiagnosedIssue> = outcome
        .predictions
        .iter()
        .map(|prediction| DiagnosedIssue {
            name: prediction.label.clone(),
            confidence: prediction.confidence,
            severity: Severity::from_confidence(prediction.confidence),
        })
        .collect();

    let processing_time_ms = start.elapsed().as_millis() as u64;
    state.usage.record(&RecordEvent {
        endpoint: "diagnose",
        top_issue: issues.first().map(|issue| issue.name.as_str()),
        confidence: issues.first().map(|issue| issue.confidence),
        severity: issues.first().map(|issue| issue.severity),
        unknown_suppressed: outcome.unknown_suppressed,
        other_suppressed: outcome.other_suppressed,
        processing_time_ms,
    });

    Json(DiagnoseResponse {
        issues,
        timestamp: Utc::now(),
        suppression_applied: SuppressionInfo {
            unknown_suppressed: outcome.unknown_suppressed,
            other_suppressed: outcome.other_suppressed,
        },
    })
    .into_response()
}

pub async fn transcribe_handler(
    State(state): State<Arc<ServerState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    mut multipart: Multipart,
) -> Response {
    let start = Instant::now();
    state.usage.ep_transcribe.fetch_add(1, Ordering::Relaxed);

    if let Some(limiter) =
        super::middleware::get_rate_limiter(&state.config, &state.rate_limiters, addr.ip()).await
    {
        if limiter.check().is_err() {
            state.usage.record_error();
            return error_response(
                StatusCode::TOO_MANY_REQUESTS,
                format!(
                    "Rate limit exceeded. Maximum {} requests per minute.",
                    state.config.rate_limit_rpm
                ),
            );
        }
    }

    let Some(transcriber) = state.transcriber.as_ref() else {
        state.usage.record_error();
        return error_response(
            StatusCode::SERVICE_UNAVAILABLE,
            "transcription backend not loaded",
        );
    };

    // Accept the first `file` field regardless of its content type.
    let mut audio = None;
    loop {
        match multipart.next_field().await {
            Ok(Some(field)) => {
                if field.name() == Some("file") {
                    match field.bytes().await {
                        Ok(bytes) => {
                            audio = Some(bytes);
                            break;
                        }
                        Err(e) => {
                            state.usage.record_error();
                            return error_response(
                                StatusCode::UNPROCESSABLE_ENTITY,
                                format!("failed to read audio field: {e}"),
                            );
                        }
                    }
                }
            }
            Ok(None) => break,
            Err(e) => {
                state.usage.record_error();
                return error_response(
                    StatusCode::UNPROCESSABLE_ENTITY,
                    format!("invalid multipart body: {e}"),
                );
            }
        }
    }

    let Some(audio) = audio else {
        state.usage.record_error();
        return error_response(StatusCode::UNPROCESSABLE_ENTITY, "missing `file` field");
    };

    match transcriber.transcribe(&audio) {
        Ok(text) => {
            let processing_time_ms = start.elapsed().as_millis() as u64;
            state.usage.record(&RecordEvent {
                endpoint: "transcribe",
                top_issue: None,
                confidence: None,
                severity: None,
                unknown_suppressed: false,
                other_suppressed: false,
                processing_time_ms,
            });
            Json(TranscriptionResponse { text }).into_response()
        }
        Err(e) => {
            state.usage.record_error();
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("transcription failed: {e}"),
            )
        }
    }
}

pub async fn stats_handler(State(state): State<Arc<ServerState>>) -> impl IntoResponse {
    state.usage.ep_stats.fetch_add(1, Ordering::Relaxed);

    let response = StatsResponse {
        uptime_seconds: state.start_time.elapsed().as_secs(),
        requests: RequestStats {
            total: state.usage.total_requests.load(Ordering::Relaxed),
            errors: state.usage.total_errors.load(Ordering::Relaxed),
        },
        severities: SeverityStats {
            critical: state.usage.critical.load(Ordering::Relaxed),
            warning: state.usage.warning.load(Ordering::Relaxed),
        },
        suppression: SuppressionStats {
            unknown: state.usage.unknown_suppressed.load(Ordering::Relaxed),
            other: state.usage.other_suppressed.load(Ordering::Relaxed),
        },
        endpoints: EndpointStats {
            diagnose: state.usage.ep_diagnose.load(Ordering::Relaxed),
            transcribe: state.usage.ep_transcribe.load(Ordering::Relaxed),
            stats: state.usage.ep_stats.load(Ordering::Relaxed),
        },
    };
    Json(response)
}
