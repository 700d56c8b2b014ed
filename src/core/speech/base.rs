//! Shared speech types: error taxonomy, session configuration, and results.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::retry::RetryConfig;
use crate::core::speech::sonic::{
    DEFAULT_BITS_PER_SAMPLE, DEFAULT_INPUT_SAMPLE_RATE, DEFAULT_OUTPUT_SAMPLE_RATE,
};

// ============================================================================
// Error Types
// ============================================================================

/// Errors that can occur during speech synthesis or transcription.
#[derive(Error, Debug)]
pub enum SpeechError {
    /// Invalid or missing configuration (region, credentials, voice, text).
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Audio parameters the protocol cannot express.
    #[error("Invalid audio configuration: {0}")]
    InvalidAudioConfig(String),

    /// Failure writing an event to the duplex stream.
    #[error("Protocol write error: {0}")]
    ProtocolWrite(String),

    /// Failure reading or decoding an event from the duplex stream.
    #[error("Protocol read error: {0}")]
    ProtocolRead(String),

    /// Transport-level failure (connection, service error).
    #[error("Transport error: {0}")]
    Transport(String),

    /// Operation exceeded its deadline (milliseconds).
    #[error("Operation timed out after {0}ms")]
    Timeout(u64),

    /// The configured region does not serve the model, or access is denied.
    #[error("Region or access error: {0}")]
    RegionOrAccess(String),
}

impl SpeechError {
    /// Whether a retry wrapper may re-run the failed operation.
    ///
    /// Only transient transport failures qualify: throttling, HTTP 429/5xx,
    /// connection resets, and service-side timeouts. Timeouts raised by our
    /// own deadline wrapper are deliberate teardowns and are not retried.
    pub fn is_retryable(&self) -> bool {
        match self {
            SpeechError::Transport(msg) => {
                let msg = msg.to_lowercase();
                msg.contains("throttl")
                    || msg.contains("429")
                    || msg.contains("timeout")
                    || msg.contains("timed out")
                    || msg.contains("connection reset")
                    || msg.contains("connection closed")
                    || msg.contains("http 5")
                    || msg.contains("service unavailable")
                    || msg.contains("internal server error")
            }
            _ => false,
        }
    }
}

/// Result type for speech operations.
pub type SpeechResult<T> = Result<T, SpeechError>;

// ============================================================================
// Credentials
// ============================================================================

/// Explicit AWS credentials. When absent, the ambient provider chain
/// (environment, profile, instance metadata) is used instead.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AwsCredentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    /// Session token for temporary credentials.
    pub session_token: Option<String>,
}

// ============================================================================
// Session Configuration
// ============================================================================

/// Endpointing sensitivity for turn detection on audio input.
///
/// Higher sensitivity ends the user's turn on shorter pauses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EndpointingSensitivity {
    Low,
    Medium,
    High,
}

impl EndpointingSensitivity {
    pub fn as_str(&self) -> &'static str {
        match self {
            EndpointingSensitivity::Low => "LOW",
            EndpointingSensitivity::Medium => "MEDIUM",
            EndpointingSensitivity::High => "HIGH",
        }
    }
}

/// How output audio blocks are accumulated across a response.
///
/// A model response may contain several audio content blocks (for example a
/// re-generation after a barge-in). The policy selects which blocks survive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AudioCapturePolicy {
    /// Keep only the first complete audio block, drop later ones.
    #[default]
    KeepFirst,
    /// Concatenate every audio block.
    KeepAll,
    /// Keep only the most recent block, discarding earlier ones.
    KeepLast,
}

/// Configuration for a speech client session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpeechConfig {
    /// AWS region hosting the model. Default: "us-east-1"
    pub region: String,

    /// Explicit credentials; falls back to the default provider chain.
    pub credentials: Option<AwsCredentials>,

    /// Voice identifier for synthesis output.
    pub voice_id: String,

    /// System prompt steering the model; a built-in default is used per
    /// operation when unset.
    pub system_prompt: Option<String>,

    /// Input audio sample rate (Hz). Default: 16000
    pub input_sample_rate_hz: u32,

    /// Output audio sample rate (Hz). Default: 24000
    pub output_sample_rate_hz: u32,

    /// Bits per PCM sample. Default: 16
    pub bits_per_sample: u16,

    /// Channel count. Default: 1 (mono)
    pub channel_count: u16,

    /// Endpointing sensitivity; per-operation defaults apply when unset.
    pub endpointing: Option<EndpointingSensitivity>,

    /// Which output audio blocks to keep.
    pub audio_capture: AudioCapturePolicy,

    /// Retry behavior for transient transport failures.
    pub retry: RetryConfig,

    /// Overall deadline for one operation (milliseconds), including retries.
    pub timeout_ms: Option<u64>,
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            region: "us-east-1".to_string(),
            credentials: None,
            voice_id: "matthew".to_string(),
            system_prompt: None,
            input_sample_rate_hz: DEFAULT_INPUT_SAMPLE_RATE,
            output_sample_rate_hz: DEFAULT_OUTPUT_SAMPLE_RATE,
            bits_per_sample: DEFAULT_BITS_PER_SAMPLE,
            channel_count: 1,
            endpointing: None,
            audio_capture: AudioCapturePolicy::default(),
            retry: RetryConfig::default(),
            timeout_ms: None,
        }
    }
}

impl SpeechConfig {
    /// Validate the configuration before opening a session.
    pub fn validate(&self) -> SpeechResult<()> {
        if self.region.trim().is_empty() {
            return Err(SpeechError::Configuration(
                "region must not be empty; set a region such as \"us-east-1\"".to_string(),
            ));
        }
        if self.voice_id.trim().is_empty() {
            return Err(SpeechError::Configuration(
                "voice_id must not be empty; use a supported voice such as \"matthew\""
                    .to_string(),
            ));
        }
        if self.input_sample_rate_hz == 0 || self.output_sample_rate_hz == 0 {
            return Err(SpeechError::InvalidAudioConfig(
                "sample rates must be greater than zero".to_string(),
            ));
        }
        if self.bits_per_sample == 0 || self.bits_per_sample % 8 != 0 {
            return Err(SpeechError::InvalidAudioConfig(format!(
                "bits_per_sample must be a positive multiple of 8, got {}",
                self.bits_per_sample
            )));
        }
        if self.channel_count == 0 {
            return Err(SpeechError::InvalidAudioConfig(
                "channel_count must be at least 1".to_string(),
            ));
        }
        if let Some(creds) = &self.credentials {
            if creds.access_key_id.is_empty() || creds.secret_access_key.is_empty() {
                return Err(SpeechError::Configuration(
                    "explicit credentials require both access_key_id and secret_access_key"
                        .to_string(),
                ));
            }
        }
        Ok(())
    }
}

// ============================================================================
// Results
// ============================================================================

/// Result of a transcription operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transcription {
    /// Concatenated text produced by the model for the supplied audio.
    pub text: String,
    /// Duration of the input audio in seconds, 0.0 when not derivable.
    pub duration_seconds: f64,
}
