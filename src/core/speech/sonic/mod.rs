//! Nova Sonic speech provider.
//!
//! Drives Amazon's Nova Sonic speech-to-speech model over a single
//! bidirectional Bedrock stream to provide one-shot synthesis
//! (text in, WAV out) and transcription (PCM in, text out).

mod client;
mod config;
mod events;
mod session;
mod transport;


pub use client::SonicSpeechClient;
pub use config::{
    DEFAULT_BITS_PER_SAMPLE, DEFAULT_INPUT_SAMPLE_RATE, DEFAULT_OUTPUT_SAMPLE_RATE,
    NOVA_SONIC_MODEL_ID, SUPPORTED_REGIONS, SonicVoice,
};
pub use events::{InboundEvent, OutboundEvent, SessionIds};
pub use session::{CompletionBarrier, ExchangeKind, OutputEventConsumer};
pub use transport::{
    BedrockConnector, ChannelSink, ChannelSource, DuplexConnector, FrameSink, FrameSource,
};
