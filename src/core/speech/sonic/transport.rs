//! Duplex transport over the Bedrock bidirectional event stream.
//!
//! The session layer speaks [`FrameSink`] / [`FrameSource`] in whole JSON
//! frames; this module adapts those traits onto the AWS SDK's event-stream
//! body. Tests substitute channel-backed implementations through the
//! [`DuplexConnector`] seam without touching the SDK.

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_credential_types::Credentials;
use aws_sdk_bedrockruntime::primitives::Blob;
use aws_sdk_bedrockruntime::types::{
    BidirectionalInputPayloadPart, InvokeModelWithBidirectionalStreamInput,
    InvokeModelWithBidirectionalStreamOutput,
};
use bytes::Bytes;
use tokio::sync::mpsc;
use tracing::{debug, error, info};

use crate::core::speech::sonic::config::{NOVA_SONIC_MODEL_ID, SUPPORTED_REGIONS};
use crate::core::speech::{SpeechConfig, SpeechError, SpeechResult};

/// Bound on in-flight frames in either direction.
pub const FRAME_CHANNEL_CAPACITY: usize = 32;

// ============================================================================
// Transport Traits
// ============================================================================

/// Write half of a duplex frame stream.
#[async_trait]
pub trait FrameSink: Send {
    async fn send(&mut self, frame: Bytes) -> SpeechResult<()>;
}

/// Read half of a duplex frame stream. `Ok(None)` means the stream closed.
#[async_trait]
pub trait FrameSource: Send {
    async fn next_frame(&mut self) -> SpeechResult<Option<Bytes>>;
}

/// Opens a fresh duplex stream per exchange.
#[async_trait]
pub trait DuplexConnector: Send + Sync {
    async fn connect(&self) -> SpeechResult<(Box<dyn FrameSink>, Box<dyn FrameSource>)>;
}

// ============================================================================
// Channel-Backed Halves
// ============================================================================

/// [`FrameSink`] over an mpsc channel. Used by the Bedrock connector to feed
/// the SDK's input stream, and by test connectors directly.
pub struct ChannelSink {
    tx: mpsc::Sender<Bytes>,
}

impl ChannelSink {
    pub fn new(tx: mpsc::Sender<Bytes>) -> Self {
        Self { tx }
    }
}

#[async_trait]
impl FrameSink for ChannelSink {
    async fn send(&mut self, frame: Bytes) -> SpeechResult<()> {
        self.tx
            .send(frame)
            .await
            .map_err(|_| SpeechError::ProtocolWrite("stream closed while sending event".to_string()))
    }
}

/// [`FrameSource`] over an mpsc channel carrying decoded-or-failed frames.
pub struct ChannelSource {
    rx: mpsc::Receiver<SpeechResult<Bytes>>,
}

impl ChannelSource {
    pub fn new(rx: mpsc::Receiver<SpeechResult<Bytes>>) -> Self {
        Self { rx }
    }
}

#[async_trait]
impl FrameSource for ChannelSource {
    async fn next_frame(&mut self) -> SpeechResult<Option<Bytes>> {
        match self.rx.recv().await {
            Some(Ok(frame)) => Ok(Some(frame)),
            Some(Err(err)) => Err(err),
            None => Ok(None),
        }
    }
}

// ============================================================================
// Bedrock Connector
// ============================================================================

/// Production connector: one `InvokeModelWithBidirectionalStream` call per
/// exchange against the Nova Sonic model.
pub struct BedrockConnector {
    config: SpeechConfig,
}

impl BedrockConnector {
    pub fn new(config: SpeechConfig) -> Self {
        Self { config }
    }

    async fn build_client(&self) -> aws_sdk_bedrockruntime::Client {
        let region = aws_config::Region::new(self.config.region.clone());
        let sdk_config = match &self.config.credentials {
            Some(creds) => {
                let credentials = Credentials::new(
                    creds.access_key_id.clone(),
                    creds.secret_access_key.clone(),
                    creds.session_token.clone(),
                    None,
                    "nova-sonic-client",
                );
                aws_config::defaults(BehaviorVersion::latest())
                    .region(region)
                    .credentials_provider(credentials)
                    .load()
                    .await
            }
            None => {
                aws_config::defaults(BehaviorVersion::latest())
                    .region(region)
                    .load()
                    .await
            }
        };
        aws_sdk_bedrockruntime::Client::new(&sdk_config)
    }

    /// Map a connect failure, calling out unsupported regions explicitly.
    fn classify_connect_error(&self, message: String) -> SpeechError {
        let lowered = message.to_lowercase();
        let access_denied = lowered.contains("accessdenied")
            || lowered.contains("access denied")
            || lowered.contains("unrecognizedclient")
            || lowered.contains("validationexception")
            || lowered.contains("resourcenotfound")
            || lowered.contains("could not be found");
        if access_denied || !SUPPORTED_REGIONS.contains(&self.config.region.as_str()) {
            SpeechError::RegionOrAccess(format!(
                "failed to open stream in region \"{}\" (model is served in {}): {message}",
                self.config.region,
                SUPPORTED_REGIONS.join(", "),
            ))
        } else {
            SpeechError::Transport(message)
        }
    }
}

#[async_trait]
impl DuplexConnector for BedrockConnector {
    async fn connect(&self) -> SpeechResult<(Box<dyn FrameSink>, Box<dyn FrameSource>)> {
        let client = self.build_client().await;

        let (frame_tx, mut frame_rx) = mpsc::channel::<Bytes>(FRAME_CHANNEL_CAPACITY);
        let input_stream = async_stream::stream! {
            while let Some(frame) = frame_rx.recv().await {
                yield Ok(InvokeModelWithBidirectionalStreamInput::Chunk(
                    BidirectionalInputPayloadPart::builder()
                        .bytes(Blob::new(frame.to_vec()))
                        .build(),
                ));
            }
        };

        info!(
            model_id = NOVA_SONIC_MODEL_ID,
            region = %self.config.region,
            "opening bidirectional stream"
        );

        let output = client
            .invoke_model_with_bidirectional_stream()
            .model_id(NOVA_SONIC_MODEL_ID)
            .body(input_stream.into())
            .send()
            .await
            .map_err(|e| self.classify_connect_error(format!("{e}")))?;

        // Pump the SDK receiver into a plain channel so callers hold no SDK
        // types. The task ends when the service closes the stream or the
        // reader drops its half.
        let (out_tx, out_rx) = mpsc::channel::<SpeechResult<Bytes>>(FRAME_CHANNEL_CAPACITY);
        let mut body = output.body;
        tokio::spawn(async move {
            loop {
                match body.recv().await {
                    Ok(Some(InvokeModelWithBidirectionalStreamOutput::Chunk(part))) => {
                        let Some(blob) = part.bytes else {
                            debug!("skipping chunk with empty payload");
                            continue;
                        };
                        if out_tx.send(Ok(Bytes::from(blob.into_inner()))).await.is_err() {
                            break;
                        }
                    }
                    Ok(Some(other)) => {
                        debug!(?other, "ignoring non-chunk stream message");
                    }
                    Ok(None) => break,
                    Err(e) => {
                        error!(error = %e, "bidirectional stream read failed");
                        let _ = out_tx
                            .send(Err(SpeechError::Transport(format!("stream read failed: {e}"))))
                            .await;
                        break;
                    }
                }
            }
        });

        Ok((
            Box::new(ChannelSink::new(frame_tx)),
            Box::new(ChannelSource::new(out_rx)),
        ))
    }
}
