//! Speech providers: shared types plus the provider factory.

mod base;
pub mod sonic;

pub use base::{
    AudioCapturePolicy, AwsCredentials, EndpointingSensitivity, SpeechConfig, SpeechError,
    SpeechResult, Transcription,
};
pub use sonic::{SonicSpeechClient, SonicVoice};

/// Create a speech client for the named provider.
///
/// Provider matching is case-insensitive. Nova Sonic is currently the only
/// provider; the factory exists so callers select providers by configuration
/// string rather than concrete type.
pub fn create_speech_client(provider: &str, config: SpeechConfig) -> SpeechResult<SonicSpeechClient> {
    match provider.to_lowercase().as_str() {
        "nova-sonic" | "nova_sonic" | "sonic" | "bedrock-sonic" => SonicSpeechClient::new(config),
        other => Err(SpeechError::Configuration(format!(
            "unsupported speech provider \"{other}\"; supported providers: {}",
            get_supported_speech_providers().join(", ")
        ))),
    }
}

/// List of supported speech provider names.
pub fn get_supported_speech_providers() -> Vec<&'static str> {
    vec!["nova-sonic"]
}
