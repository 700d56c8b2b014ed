//! Session orchestration: the event producer, the output consumer, and the
//! completion barrier coordinating them.
//!
//! One exchange runs a producer and a consumer concurrently over the two
//! halves of a duplex stream. The producer writes the full outbound event
//! sequence but must not close the prompt until the model has finished
//! responding, so it parks on the [`CompletionBarrier`] which the consumer
//! signals once the response is complete.

use std::sync::atomic::{AtomicBool, Ordering};

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use bytes::Bytes;
use tokio::sync::Notify;
use tracing::{debug, warn};

use crate::core::audio;
use crate::core::speech::sonic::config::{
    AUDIO_CHUNK_BYTES, DEFAULT_SYNTHESIS_PROMPT, DEFAULT_TRANSCRIPTION_PROMPT,
    SILENCE_FILLER_MS, SonicVoice,
};
use crate::core::speech::sonic::events::{
    AudioInputConfiguration, AudioOutputConfiguration, AudioPayload, ContentRef,
    ContentStartPayload, ContentType, Empty, InboundEvent, InferenceConfiguration,
    OutboundEvent, PromptRef, PromptStartPayload, Role, SessionIds, SessionStartPayload,
    TextConfiguration, TextPayload,
};
use crate::core::speech::sonic::transport::{FrameSink, FrameSource};
use crate::core::speech::{
    AudioCapturePolicy, EndpointingSensitivity, SpeechConfig, SpeechResult,
};

// ============================================================================
// Completion Barrier
// ============================================================================

/// One-shot barrier signalled when the model's response is complete.
///
/// Signalling is idempotent; waiters that arrive after the signal return
/// immediately.
#[derive(Debug, Default)]
pub struct CompletionBarrier {
    done: AtomicBool,
    notify: Notify,
}

impl CompletionBarrier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn signal(&self) {
        self.done.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    pub fn is_signalled(&self) -> bool {
        self.done.load(Ordering::SeqCst)
    }

    pub async fn wait(&self) {
        // Register before re-checking so a signal between the check and the
        // await is not lost.
        loop {
            if self.done.load(Ordering::SeqCst) {
                return;
            }
            let notified = self.notify.notified();
            if self.done.load(Ordering::SeqCst) {
                return;
            }
            notified.await;
        }
    }
}

// ============================================================================
// Producer
// ============================================================================

/// What the exchange asks of the model.
pub enum ExchangeKind {
    /// Text in, audio out.
    Synthesis { text: String },
    /// Audio in, text out.
    Transcription { audio: Bytes },
}

impl ExchangeKind {
    fn default_system_prompt(&self) -> &'static str {
        match self {
            ExchangeKind::Synthesis { .. } => DEFAULT_SYNTHESIS_PROMPT,
            ExchangeKind::Transcription { .. } => DEFAULT_TRANSCRIPTION_PROMPT,
        }
    }

    fn default_endpointing(&self) -> EndpointingSensitivity {
        match self {
            // Synthesis only sends a short silence filler, so end the turn
            // as eagerly as possible.
            ExchangeKind::Synthesis { .. } => EndpointingSensitivity::High,
            ExchangeKind::Transcription { .. } => EndpointingSensitivity::Medium,
        }
    }
}

/// Write the complete outbound event sequence for one exchange.
///
/// Order: sessionStart, promptStart, system TEXT block, user block (TEXT for
/// synthesis, chunked AUDIO for transcription), synthesis-only silence
/// filler block, then — after the barrier — promptEnd and sessionEnd.
pub async fn run_producer(
    sink: &mut dyn FrameSink,
    config: &SpeechConfig,
    ids: &SessionIds,
    kind: &ExchangeKind,
    barrier: &CompletionBarrier,
) -> SpeechResult<()> {
    let send = |event: OutboundEvent| event.encode();

    sink.send(send(OutboundEvent::SessionStart(SessionStartPayload {
        inference_configuration: InferenceConfiguration::default(),
    }))?)
    .await?;

    let voice = SonicVoice::from_str_or_default(&config.voice_id);
    sink.send(send(OutboundEvent::PromptStart(PromptStartPayload {
        prompt_name: ids.prompt_name.clone(),
        text_output_configuration: TextConfiguration::default(),
        audio_output_configuration: AudioOutputConfiguration::new(
            config.output_sample_rate_hz,
            config.bits_per_sample,
            config.channel_count,
            voice.as_str().to_string(),
        ),
    }))?)
    .await?;

    // System instruction block.
    let system_prompt = config
        .system_prompt
        .clone()
        .unwrap_or_else(|| kind.default_system_prompt().to_string());
    send_text_block(
        sink,
        &ids.prompt_name,
        &ids.system_content,
        Role::System,
        false,
        &system_prompt,
    )
    .await?;

    let endpointing = config.endpointing.unwrap_or_else(|| kind.default_endpointing());
    let audio_input_config = || {
        AudioInputConfiguration::new(
            config.input_sample_rate_hz,
            config.bits_per_sample,
            config.channel_count,
            Some(endpointing.as_str()),
        )
    };

    match kind {
        ExchangeKind::Synthesis { text } => {
            send_text_block(
                sink,
                &ids.prompt_name,
                &ids.user_content,
                Role::User,
                true,
                text,
            )
            .await?;

            // The model does not start responding until it has seen audio
            // input, so append a short silence block.
            if let Some(filler_content) = &ids.filler_content {
                let silence = audio::silence_frame(
                    config.input_sample_rate_hz,
                    SILENCE_FILLER_MS,
                    config.bits_per_sample,
                )?;
                send_audio_block(
                    sink,
                    &ids.prompt_name,
                    filler_content,
                    audio_input_config(),
                    &silence,
                )
                .await?;
            }
        }
        ExchangeKind::Transcription { audio } => {
            send_audio_block(
                sink,
                &ids.prompt_name,
                &ids.user_content,
                audio_input_config(),
                audio,
            )
            .await?;
        }
    }

    debug!(prompt_name = %ids.prompt_name, "input sent, waiting for response completion");
    barrier.wait().await;

    sink.send(send(OutboundEvent::PromptEnd(PromptRef {
        prompt_name: ids.prompt_name.clone(),
    }))?)
    .await?;
    sink.send(send(OutboundEvent::SessionEnd(Empty::default()))?)
        .await?;
    Ok(())
}

async fn send_text_block(
    sink: &mut dyn FrameSink,
    prompt_name: &str,
    content_name: &str,
    role: Role,
    interactive: bool,
    text: &str,
) -> SpeechResult<()> {
    sink.send(
        OutboundEvent::ContentStart(ContentStartPayload {
            prompt_name: prompt_name.to_string(),
            content_name: content_name.to_string(),
            content_type: ContentType::Text,
            interactive,
            role,
            text_input_configuration: Some(TextConfiguration::default()),
            audio_input_configuration: None,
        })
        .encode()?,
    )
    .await?;
    sink.send(
        OutboundEvent::TextInput(TextPayload {
            prompt_name: prompt_name.to_string(),
            content_name: content_name.to_string(),
            content: text.to_string(),
        })
        .encode()?,
    )
    .await?;
    sink.send(
        OutboundEvent::ContentEnd(ContentRef {
            prompt_name: prompt_name.to_string(),
            content_name: content_name.to_string(),
        })
        .encode()?,
    )
    .await
}

async fn send_audio_block(
    sink: &mut dyn FrameSink,
    prompt_name: &str,
    content_name: &str,
    audio_config: AudioInputConfiguration,
    pcm: &[u8],
) -> SpeechResult<()> {
    sink.send(
        OutboundEvent::ContentStart(ContentStartPayload {
            prompt_name: prompt_name.to_string(),
            content_name: content_name.to_string(),
            content_type: ContentType::Audio,
            interactive: true,
            role: Role::User,
            text_input_configuration: None,
            audio_input_configuration: Some(audio_config),
        })
        .encode()?,
    )
    .await?;
    for chunk in pcm.chunks(AUDIO_CHUNK_BYTES) {
        sink.send(
            OutboundEvent::AudioInput(AudioPayload::from_pcm(prompt_name, content_name, chunk))
                .encode()?,
        )
        .await?;
    }
    sink.send(
        OutboundEvent::ContentEnd(ContentRef {
            prompt_name: prompt_name.to_string(),
            content_name: content_name.to_string(),
        })
        .encode()?,
    )
    .await
}

// ============================================================================
// Consumer
// ============================================================================

/// Accumulates model output across inbound events.
pub struct OutputEventConsumer {
    policy: AudioCapturePolicy,
    pub audio: Vec<u8>,
    pub text: String,
    current_role: Option<String>,
    block_audio_seen: bool,
    first_block_closed: bool,
    pending_block_reset: bool,
    events_seen: u64,
    audio_chunks: u64,
}

impl OutputEventConsumer {
    pub fn new(policy: AudioCapturePolicy) -> Self {
        Self {
            policy,
            audio: Vec::new(),
            text: String::new(),
            current_role: None,
            block_audio_seen: false,
            first_block_closed: false,
            pending_block_reset: false,
            events_seen: 0,
            audio_chunks: 0,
        }
    }

    /// Apply one inbound event, signalling `barrier` when the response is
    /// complete.
    ///
    /// Completion is permissive: a contentEnd closing a block that carried
    /// audio counts as completion even if completionEnd never arrives. Text
    /// output is always accumulated regardless of the audio policy.
    pub fn handle(&mut self, event: InboundEvent, barrier: &CompletionBarrier) {
        self.events_seen += 1;
        match event {
            InboundEvent::ContentStart(start) => {
                self.current_role = start.role.clone();
                if let Some(stage) = start.generation_stage() {
                    debug!(stage = %stage, "content block started");
                }
                self.pending_block_reset = true;
            }
            InboundEvent::TextOutput(text) => {
                // Verbatim, in arrival order; fragment boundaries belong to
                // the model, which may split anywhere within a word.
                self.text.push_str(&text.content);
            }
            InboundEvent::AudioOutput(output) => {
                let pcm = match BASE64.decode(&output.content) {
                    Ok(pcm) => pcm,
                    Err(e) => {
                        warn!(error = %e, "dropping undecodable audio chunk");
                        return;
                    }
                };
                self.audio_chunks += 1;
                match self.policy {
                    AudioCapturePolicy::KeepFirst => {
                        if !self.first_block_closed {
                            self.audio.extend_from_slice(&pcm);
                        }
                    }
                    AudioCapturePolicy::KeepAll => {
                        self.audio.extend_from_slice(&pcm);
                    }
                    AudioCapturePolicy::KeepLast => {
                        if self.pending_block_reset {
                            self.audio.clear();
                            self.pending_block_reset = false;
                        }
                        self.audio.extend_from_slice(&pcm);
                    }
                }
                self.block_audio_seen = true;
            }
            InboundEvent::ContentEnd(end) => {
                if self.block_audio_seen {
                    self.first_block_closed = true;
                    self.block_audio_seen = false;
                    debug!(
                        role = self.current_role.as_deref().unwrap_or("unknown"),
                        stop_reason = end.stop_reason.as_deref().unwrap_or("none"),
                        audio_bytes = self.audio.len(),
                        "audio content block complete"
                    );
                    barrier.signal();
                }
            }
            InboundEvent::CompletionStart => {
                debug!("completion started");
            }
            InboundEvent::CompletionEnd => {
                barrier.signal();
            }
            InboundEvent::Unknown { event_type, .. } => {
                warn!(event_type = %event_type, "ignoring unrecognized event");
            }
        }
    }
}

/// Drain the read half of the stream into `consumer`.
///
/// A structurally malformed frame fails the call with `ProtocolRead`; the
/// state machine cannot recover mid-session, only the outer retry wrapper
/// may start over. Unknown but well-formed event types are handled (and
/// ignored) by the consumer. The barrier is signalled on every exit path
/// so the producer can never deadlock waiting on a stream that has
/// already closed.
pub async fn run_consumer(
    source: &mut dyn FrameSource,
    consumer: &mut OutputEventConsumer,
    barrier: &CompletionBarrier,
) -> SpeechResult<()> {
    let result = loop {
        match source.next_frame().await {
            Ok(Some(frame)) => match InboundEvent::decode(&frame) {
                Ok(event) => consumer.handle(event, barrier),
                Err(e) => break Err(e),
            },
            Ok(None) => break Ok(()),
            Err(e) => break Err(e),
        }
    };
    barrier.signal();
    debug!(
        events = consumer.events_seen,
        audio_chunks = consumer.audio_chunks,
        audio_bytes = consumer.audio.len(),
        text_len = consumer.text.len(),
        "stream drained"
    );
    result
}
