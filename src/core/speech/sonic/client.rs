//! High-level speech client over the Nova Sonic duplex protocol.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tracing::info;

use crate::core::audio::{self, wav};
use crate::core::retry::{with_retry, with_timeout};
use crate::core::speech::sonic::session::{
    CompletionBarrier, ExchangeKind, OutputEventConsumer, run_consumer, run_producer,
};
use crate::core::speech::sonic::transport::{BedrockConnector, DuplexConnector};
use crate::core::speech::{SpeechConfig, SpeechError, SpeechResult, Transcription};
use crate::core::speech::sonic::events::SessionIds;

/// Speech synthesis and transcription client.
///
/// Each operation opens a fresh bidirectional stream, runs one exchange,
/// and closes it. The client itself is cheap to clone and share.
#[derive(Clone)]
pub struct SonicSpeechClient {
    config: SpeechConfig,
    connector: Arc<dyn DuplexConnector>,
}

impl std::fmt::Debug for SonicSpeechClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SonicSpeechClient")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl SonicSpeechClient {
    /// Create a client backed by the Bedrock runtime.
    pub fn new(config: SpeechConfig) -> SpeechResult<Self> {
        config.validate()?;
        let connector = Arc::new(BedrockConnector::new(config.clone()));
        Ok(Self { config, connector })
    }

    /// Create a client with a custom transport. Used by tests to script
    /// exchanges without a network.
    pub fn with_connector(
        config: SpeechConfig,
        connector: Arc<dyn DuplexConnector>,
    ) -> SpeechResult<Self> {
        config.validate()?;
        Ok(Self { config, connector })
    }

    pub fn config(&self) -> &SpeechConfig {
        &self.config
    }

    /// Synthesize `text` into a WAV container (PCM at the configured output
    /// sample rate). An empty model response yields a valid empty container.
    pub async fn synthesize(&self, text: &str) -> SpeechResult<Vec<u8>> {
        if text.trim().is_empty() {
            return Err(SpeechError::Configuration(
                "synthesis text must not be empty".to_string(),
            ));
        }

        let (pcm, _) = self
            .run_with_resilience(|| ExchangeKind::Synthesis {
                text: text.to_string(),
            })
            .await?;

        info!(
            text_len = text.len(),
            audio_bytes = pcm.len(),
            "synthesis complete"
        );
        Ok(wav::create_wav(
            &pcm,
            self.config.output_sample_rate_hz,
            self.config.channel_count,
        ))
    }

    /// Transcribe raw PCM audio at the configured input sample rate.
    pub async fn transcribe(&self, pcm: Bytes) -> SpeechResult<Transcription> {
        if pcm.is_empty() {
            return Err(SpeechError::Configuration(
                "transcription audio must not be empty".to_string(),
            ));
        }

        let duration_seconds = audio::pcm_duration_seconds(
            pcm.len(),
            self.config.input_sample_rate_hz,
            self.config.bits_per_sample,
            self.config.channel_count,
        );

        let audio_in = pcm.clone();
        let (_, text) = self
            .run_with_resilience(move || ExchangeKind::Transcription {
                audio: audio_in.clone(),
            })
            .await?;

        info!(
            audio_bytes = pcm.len(),
            text_len = text.len(),
            "transcription complete"
        );
        Ok(Transcription {
            text,
            duration_seconds,
        })
    }

    /// Apply the retry and deadline wrappers around one exchange. The
    /// deadline, when set, covers all retry attempts.
    async fn run_with_resilience<K>(&self, make_kind: K) -> SpeechResult<(Vec<u8>, String)>
    where
        K: Fn() -> ExchangeKind,
    {
        let attempt = || self.run_exchange(make_kind());
        match self.config.timeout_ms {
            Some(ms) => {
                with_timeout(
                    Duration::from_millis(ms),
                    with_retry(&self.config.retry, attempt),
                )
                .await
            }
            None => with_retry(&self.config.retry, attempt).await,
        }
    }

    /// Run one full exchange over a fresh stream: producer and consumer run
    /// cooperatively, joined by the completion barrier.
    async fn run_exchange(&self, kind: ExchangeKind) -> SpeechResult<(Vec<u8>, String)> {
        let (mut sink, mut source) = self.connector.connect().await?;

        let ids = match kind {
            ExchangeKind::Synthesis { .. } => SessionIds::for_synthesis(),
            ExchangeKind::Transcription { .. } => SessionIds::for_transcription(),
        };
        let barrier = CompletionBarrier::new();
        let mut consumer = OutputEventConsumer::new(self.config.audio_capture);

        let (produced, consumed) = tokio::join!(
            run_producer(sink.as_mut(), &self.config, &ids, &kind, &barrier),
            run_consumer(source.as_mut(), &mut consumer, &barrier),
        );
        produced?;
        consumed?;

        Ok((consumer.audio, consumer.text))
    }
}
