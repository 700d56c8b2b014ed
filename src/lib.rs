//! Bidirectional streaming speech client for Amazon Nova Sonic.
//!
//! This crate drives the Nova Sonic speech-to-speech model over the Bedrock
//! Runtime bidirectional event stream to perform both text-to-speech
//! synthesis and speech-to-text transcription. One duplex connection is
//! opened per call; an input event producer and an output event consumer
//! run cooperatively over it and the assembled result (a WAV container or
//! a transcript) is returned to the caller.

pub mod core;

// Re-export commonly used items for convenience
pub use crate::core::audio;
pub use crate::core::retry::{RetryConfig, with_retry, with_timeout};
pub use crate::core::speech::{
    AudioCapturePolicy, AwsCredentials, EndpointingSensitivity, SonicSpeechClient, SonicVoice,
    SpeechConfig, SpeechError, SpeechResult, Transcription, create_speech_client,
    get_supported_speech_providers,
};
