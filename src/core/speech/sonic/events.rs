//! Wire protocol events for the Nova Sonic bidirectional stream.
//!
//! Every frame is a JSON object with a single `event` key whose sole child
//! names the event type in camelCase:
//!
//! ```json
//! {"event": {"textInput": {"promptName": "...", "contentName": "...", "content": "..."}}}
//! ```
//!
//! Outbound events are typed structs serialized through [`OutboundEvent`].
//! Inbound events are decoded permissively: unknown event types become
//! [`InboundEvent::Unknown`] rather than errors, so new server-side events
//! do not break existing clients.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::core::speech::{SpeechError, SpeechResult};

// ============================================================================
// Shared Payload Types
// ============================================================================

/// Role of a content block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// Media type of a content block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ContentType {
    Text,
    Audio,
}

/// Model inference parameters sent with sessionStart.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InferenceConfiguration {
    pub max_tokens: u32,
    pub top_p: f32,
    pub temperature: f32,
}

impl Default for InferenceConfiguration {
    fn default() -> Self {
        Self {
            max_tokens: 1024,
            top_p: 0.9,
            temperature: 0.7,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStartPayload {
    pub inference_configuration: InferenceConfiguration,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TextConfiguration {
    pub media_type: &'static str,
}

impl Default for TextConfiguration {
    fn default() -> Self {
        Self {
            media_type: "text/plain",
        }
    }
}

/// Output audio format requested from the model.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioOutputConfiguration {
    pub media_type: &'static str,
    pub sample_rate_hertz: u32,
    pub sample_size_bits: u16,
    pub channel_count: u16,
    pub voice_id: String,
    pub encoding: &'static str,
    pub audio_type: &'static str,
}

impl AudioOutputConfiguration {
    pub fn new(sample_rate_hertz: u32, sample_size_bits: u16, channel_count: u16, voice_id: String) -> Self {
        Self {
            media_type: "audio/lpcm",
            sample_rate_hertz,
            sample_size_bits,
            channel_count,
            voice_id,
            encoding: "base64",
            audio_type: "SPEECH",
        }
    }
}

/// Input audio format declared on an AUDIO contentStart.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioInputConfiguration {
    pub media_type: &'static str,
    pub sample_rate_hertz: u32,
    pub sample_size_bits: u16,
    pub channel_count: u16,
    pub audio_type: &'static str,
    pub encoding: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpointing_sensitivity: Option<&'static str>,
}

impl AudioInputConfiguration {
    pub fn new(
        sample_rate_hertz: u32,
        sample_size_bits: u16,
        channel_count: u16,
        endpointing_sensitivity: Option<&'static str>,
    ) -> Self {
        Self {
            media_type: "audio/lpcm",
            sample_rate_hertz,
            sample_size_bits,
            channel_count,
            audio_type: "SPEECH",
            encoding: "base64",
            endpointing_sensitivity,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptStartPayload {
    pub prompt_name: String,
    pub text_output_configuration: TextConfiguration,
    pub audio_output_configuration: AudioOutputConfiguration,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentStartPayload {
    pub prompt_name: String,
    pub content_name: String,
    #[serde(rename = "type")]
    pub content_type: ContentType,
    pub interactive: bool,
    pub role: Role,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text_input_configuration: Option<TextConfiguration>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio_input_configuration: Option<AudioInputConfiguration>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TextPayload {
    pub prompt_name: String,
    pub content_name: String,
    pub content: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioPayload {
    pub prompt_name: String,
    pub content_name: String,
    pub content: String,
}

impl AudioPayload {
    /// Build an audioInput payload from raw PCM, base64-encoding it.
    pub fn from_pcm(prompt_name: &str, content_name: &str, pcm: &[u8]) -> Self {
        Self {
            prompt_name: prompt_name.to_string(),
            content_name: content_name.to_string(),
            content: BASE64.encode(pcm),
        }
    }
}

/// References a content block within a prompt (contentEnd).
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentRef {
    pub prompt_name: String,
    pub content_name: String,
}

/// References a prompt (promptEnd).
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptRef {
    pub prompt_name: String,
}

/// Empty payload for events that carry no fields (sessionEnd).
#[derive(Debug, Clone, Default, Serialize)]
pub struct Empty {}

// ============================================================================
// Outbound Events
// ============================================================================

/// Client-to-server protocol events, in the order a session uses them.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum OutboundEvent {
    SessionStart(SessionStartPayload),
    PromptStart(PromptStartPayload),
    ContentStart(ContentStartPayload),
    TextInput(TextPayload),
    AudioInput(AudioPayload),
    ContentEnd(ContentRef),
    PromptEnd(PromptRef),
    SessionEnd(Empty),
}

#[derive(Serialize)]
struct Frame<'a> {
    event: &'a OutboundEvent,
}

impl OutboundEvent {
    /// Serialize to the single-key frame format sent on the wire.
    pub fn encode(&self) -> SpeechResult<Bytes> {
        let frame = Frame { event: self };
        let json = serde_json::to_vec(&frame)
            .map_err(|e| SpeechError::ProtocolWrite(format!("failed to encode event: {e}")))?;
        Ok(Bytes::from(json))
    }
}

// ============================================================================
// Inbound Events
// ============================================================================

/// contentStart payload received from the model.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InboundContentStart {
    #[serde(default)]
    pub role: Option<String>,
    #[serde(rename = "type", default)]
    pub content_type: Option<String>,
    #[serde(default)]
    pub content_name: Option<String>,
    /// Extra model metadata, e.g. `{"generationStage": "SPECULATIVE"}`
    /// serialized as a JSON string.
    #[serde(default)]
    pub additional_model_fields: Option<String>,
}

impl InboundContentStart {
    /// Extract the generation stage (SPECULATIVE / FINAL) when present.
    pub fn generation_stage(&self) -> Option<String> {
        let raw = self.additional_model_fields.as_deref()?;
        let fields: Value = serde_json::from_str(raw).ok()?;
        fields
            .get("generationStage")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InboundTextOutput {
    #[serde(default)]
    pub role: Option<String>,
    pub content: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InboundAudioOutput {
    /// Base64-encoded PCM.
    pub content: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InboundContentEnd {
    #[serde(default)]
    pub stop_reason: Option<String>,
    #[serde(rename = "type", default)]
    pub content_type: Option<String>,
}

/// Server-to-client protocol events.
#[derive(Debug, Clone)]
pub enum InboundEvent {
    ContentStart(InboundContentStart),
    TextOutput(InboundTextOutput),
    AudioOutput(InboundAudioOutput),
    ContentEnd(InboundContentEnd),
    CompletionStart,
    CompletionEnd,
    /// Event type this client does not understand; logged and skipped.
    Unknown { event_type: String, raw: Value },
}

impl InboundEvent {
    /// Decode one frame. Unknown event types succeed as [`InboundEvent::Unknown`];
    /// only structurally malformed frames error.
    pub fn decode(frame: &[u8]) -> SpeechResult<InboundEvent> {
        let value: Value = serde_json::from_slice(frame)
            .map_err(|e| SpeechError::ProtocolRead(format!("malformed event frame: {e}")))?;

        let event = value
            .get("event")
            .and_then(|v| v.as_object())
            .ok_or_else(|| {
                SpeechError::ProtocolRead("frame has no \"event\" object".to_string())
            })?;

        let (event_type, payload) = event.iter().next().ok_or_else(|| {
            SpeechError::ProtocolRead("\"event\" object is empty".to_string())
        })?;

        let decode_err = |e: serde_json::Error| {
            SpeechError::ProtocolRead(format!("malformed {event_type} payload: {e}"))
        };

        let event = match event_type.as_str() {
            "contentStart" => {
                InboundEvent::ContentStart(serde_json::from_value(payload.clone()).map_err(decode_err)?)
            }
            "textOutput" => {
                InboundEvent::TextOutput(serde_json::from_value(payload.clone()).map_err(decode_err)?)
            }
            "audioOutput" => {
                InboundEvent::AudioOutput(serde_json::from_value(payload.clone()).map_err(decode_err)?)
            }
            "contentEnd" => {
                InboundEvent::ContentEnd(serde_json::from_value(payload.clone()).map_err(decode_err)?)
            }
            "completionStart" => InboundEvent::CompletionStart,
            "completionEnd" => InboundEvent::CompletionEnd,
            other => InboundEvent::Unknown {
                event_type: other.to_string(),
                raw: payload.clone(),
            },
        };
        Ok(event)
    }
}

// ============================================================================
// Session Identifiers
// ============================================================================

/// Unique names for the prompt and content blocks of one exchange.
#[derive(Debug, Clone)]
pub struct SessionIds {
    pub prompt_name: String,
    pub system_content: String,
    pub user_content: String,
    /// Present only for synthesis, which appends a silence filler block.
    pub filler_content: Option<String>,
}

impl SessionIds {
    pub fn for_synthesis() -> Self {
        Self {
            prompt_name: Uuid::new_v4().to_string(),
            system_content: Uuid::new_v4().to_string(),
            user_content: Uuid::new_v4().to_string(),
            filler_content: Some(Uuid::new_v4().to_string()),
        }
    }

    pub fn for_transcription() -> Self {
        Self {
            prompt_name: Uuid::new_v4().to_string(),
            system_content: Uuid::new_v4().to_string(),
            user_content: Uuid::new_v4().to_string(),
            filler_content: None,
        }
    }
}
