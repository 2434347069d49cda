//! Speech-to-text collaborator seam.
//!
//! Transcription is an external capability: the service accepts audio,
//! hands it to whichever backend the host wired in at startup, and feeds the
//! resulting text into the same diagnosis pipeline as typed complaints. No
//! engine is bundled; without one the transcription endpoint reports the
//! service as not ready.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TranscribeError {
    #[error("audio payload is empty")]
    EmptyAudio,
    #[error("transcription backend failure: {0}")]
    Backend(String),
}

/// Boundary to a speech-to-text engine. Implementations must be safe for
/// concurrent use; the server shares one instance across requests.
pub trait Transcriber: Send + Sync {
    /// Transcribe an audio payload (WAV expected) to plain text.
    fn transcribe(&self, audio: &[u8]) -> Result<String, TranscribeError>;
}
