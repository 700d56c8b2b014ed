pub mod audio;
pub mod retry;
pub mod speech;

// Re-export commonly used types for convenience
pub use retry::RetryConfig;
pub use speech::{
    SonicSpeechClient, SpeechConfig, SpeechError, SpeechResult, Transcription,
    create_speech_client,
};
