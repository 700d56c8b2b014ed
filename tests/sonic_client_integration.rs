//! End-to-end exchanges through the speech client over a scripted transport.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use bytes::Bytes;
use serde_json::{Value, json};
use tokio::sync::mpsc;

use nova_sonic_client::core::speech::sonic::{
    ChannelSink, ChannelSource, DuplexConnector, FrameSink, FrameSource,
};
use nova_sonic_client::{
    RetryConfig, SonicSpeechClient, SpeechConfig, SpeechError, SpeechResult,
    create_speech_client,
};

/// Connector that plays back a scripted model response.
///
/// Outbound frames are parsed; once the final input content block closes
/// (the out-of-band signal a real model uses to start responding), the
/// scripted inbound frames are delivered, and after sessionEnd the inbound
/// stream closes.
struct ScriptedConnector {
    /// Number of outbound contentEnd frames that mark the input complete.
    input_blocks: usize,
    response: Vec<Value>,
    connects: AtomicU32,
    outbound_frames: Arc<std::sync::Mutex<Vec<Value>>>,
}

impl ScriptedConnector {
    fn new(input_blocks: usize, response: Vec<Value>) -> Self {
        Self {
            input_blocks,
            response,
            connects: AtomicU32::new(0),
            outbound_frames: Arc::new(std::sync::Mutex::new(Vec::new())),
        }
    }
}

fn frame_type(frame: &Value) -> String {
    frame["event"]
        .as_object()
        .and_then(|o| o.keys().next())
        .cloned()
        .unwrap_or_default()
}

#[async_trait]
impl DuplexConnector for ScriptedConnector {
    async fn connect(&self) -> SpeechResult<(Box<dyn FrameSink>, Box<dyn FrameSource>)> {
        self.connects.fetch_add(1, Ordering::SeqCst);

        let (out_tx, mut out_rx) = mpsc::channel::<Bytes>(32);
        let (in_tx, in_rx) = mpsc::channel::<SpeechResult<Bytes>>(32);

        let input_blocks = self.input_blocks;
        let response = self.response.clone();
        let recorded = self.outbound_frames.clone();
        tokio::spawn(async move {
            let mut content_ends = 0usize;
            while let Some(frame) = out_rx.recv().await {
                let value: Value = match serde_json::from_slice(&frame) {
                    Ok(v) => v,
                    Err(_) => continue,
                };
                let kind = frame_type(&value);
                recorded.lock().unwrap().push(value);

                if kind == "contentEnd" {
                    content_ends += 1;
                    if content_ends == input_blocks {
                        for event in &response {
                            let bytes = Bytes::from(serde_json::to_vec(event).unwrap());
                            if in_tx.send(Ok(bytes)).await.is_err() {
                                return;
                            }
                        }
                    }
                } else if kind == "sessionEnd" {
                    break;
                }
            }
            // Dropping in_tx closes the inbound stream.
        });

        Ok((
            Box::new(ChannelSink::new(out_tx)),
            Box::new(ChannelSource::new(in_rx)),
        ))
    }
}

fn audio_response(chunks: &[&[u8]]) -> Vec<Value> {
    let mut events = vec![
        json!({"event": {"completionStart": {}}}),
        json!({"event": {"contentStart": {"role": "ASSISTANT", "type": "AUDIO"}}}),
    ];
    for chunk in chunks {
        events.push(json!({"event": {"audioOutput": {"content": BASE64.encode(chunk)}}}));
    }
    events.push(json!({"event": {"contentEnd": {"stopReason": "END_TURN", "type": "AUDIO"}}}));
    events.push(json!({"event": {"completionEnd": {}}}));
    events
}

fn no_retry_config() -> SpeechConfig {
    SpeechConfig {
        retry: RetryConfig::disabled(),
        ..Default::default()
    }
}

#[tokio::test]
async fn test_synthesize_returns_wav() {
    // Synthesis sends three input blocks: system, user text, silence filler.
    let connector = Arc::new(ScriptedConnector::new(
        3,
        audio_response(&[&[1u8; 100], &[2u8; 100]]),
    ));
    let client = SonicSpeechClient::with_connector(no_retry_config(), connector.clone()).unwrap();

    let wav = client.synthesize("hello world").await.unwrap();
    assert_eq!(wav.len(), 44 + 200);
    assert_eq!(&wav[0..4], b"RIFF");
    assert_eq!(&wav[8..12], b"WAVE");
    // 24kHz output sample rate in the fmt chunk.
    assert_eq!(
        u32::from_le_bytes([wav[24], wav[25], wav[26], wav[27]]),
        24_000
    );
    assert_eq!(&wav[44..144], &[1u8; 100]);

    // The client sent the full protocol sequence and closed the session.
    let sent = connector.outbound_frames.lock().unwrap();
    let types: Vec<String> = sent.iter().map(frame_type).collect();
    assert_eq!(types.first().map(String::as_str), Some("sessionStart"));
    assert!(types.contains(&"promptEnd".to_string()));
}

#[tokio::test]
async fn test_synthesize_empty_response_yields_empty_container() {
    let response = vec![
        json!({"event": {"completionStart": {}}}),
        json!({"event": {"completionEnd": {}}}),
    ];
    let connector = Arc::new(ScriptedConnector::new(3, response));
    let client = SonicSpeechClient::with_connector(no_retry_config(), connector).unwrap();

    let wav = client.synthesize("hello").await.unwrap();
    assert_eq!(wav.len(), 44);
}

#[tokio::test]
async fn test_synthesize_rejects_empty_text() {
    let connector = Arc::new(ScriptedConnector::new(3, vec![]));
    let client = SonicSpeechClient::with_connector(no_retry_config(), connector.clone()).unwrap();

    let err = client.synthesize("   ").await.unwrap_err();
    assert!(matches!(err, SpeechError::Configuration(_)));
    assert_eq!(connector.connects.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_transcribe_returns_text_and_duration() {
    let response = vec![
        json!({"event": {"completionStart": {}}}),
        json!({"event": {"contentStart": {"role": "ASSISTANT", "type": "TEXT"}}}),
        json!({"event": {"textOutput": {"role": "ASSISTANT", "content": "hello "}}}),
        json!({"event": {"textOutput": {"role": "ASSISTANT", "content": "there"}}}),
        json!({"event": {"contentEnd": {"stopReason": "END_TURN", "type": "TEXT"}}}),
        json!({"event": {"completionEnd": {}}}),
    ];
    // Transcription sends two input blocks: system text, user audio.
    let connector = Arc::new(ScriptedConnector::new(2, response));
    let client = SonicSpeechClient::with_connector(no_retry_config(), connector).unwrap();

    // One second of 16kHz/16-bit mono audio.
    let transcription = client.transcribe(Bytes::from(vec![0u8; 32_000])).await.unwrap();
    assert_eq!(transcription.text, "hello there");
    assert!((transcription.duration_seconds - 1.0).abs() < 1e-9);
}

#[tokio::test]
async fn test_transcribe_rejects_empty_audio() {
    let connector = Arc::new(ScriptedConnector::new(2, vec![]));
    let client = SonicSpeechClient::with_connector(no_retry_config(), connector).unwrap();
    assert!(matches!(
        client.transcribe(Bytes::new()).await,
        Err(SpeechError::Configuration(_))
    ));
}

/// Connector that fails with a retryable error before succeeding.
struct FlakyConnector {
    failures: AtomicU32,
    inner: ScriptedConnector,
}

#[async_trait]
impl DuplexConnector for FlakyConnector {
    async fn connect(&self) -> SpeechResult<(Box<dyn FrameSink>, Box<dyn FrameSource>)> {
        if self.failures.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
            (n > 0).then(|| n - 1)
        })
        .is_ok()
        {
            return Err(SpeechError::Transport(
                "ThrottlingException: rate exceeded".to_string(),
            ));
        }
        self.inner.connect().await
    }
}

#[tokio::test]
async fn test_retry_recovers_from_transient_failures() {
    let connector = Arc::new(FlakyConnector {
        failures: AtomicU32::new(2),
        inner: ScriptedConnector::new(3, audio_response(&[&[7u8; 10]])),
    });
    let config = SpeechConfig {
        retry: RetryConfig {
            enabled: true,
            max_attempts: 3,
            initial_delay_ms: 1,
            max_delay_ms: 10,
            backoff_multiplier: 2.0,
            jitter: false,
        },
        ..Default::default()
    };
    let client = SonicSpeechClient::with_connector(config, connector.clone()).unwrap();

    let wav = client.synthesize("retry me").await.unwrap();
    assert_eq!(wav.len(), 44 + 10);
    assert_eq!(connector.inner.connects.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_retry_budget_exhaustion_propagates_error() {
    let connector = Arc::new(FlakyConnector {
        failures: AtomicU32::new(10),
        inner: ScriptedConnector::new(3, vec![]),
    });
    let config = SpeechConfig {
        retry: RetryConfig {
            enabled: true,
            max_attempts: 2,
            initial_delay_ms: 1,
            max_delay_ms: 10,
            backoff_multiplier: 2.0,
            jitter: false,
        },
        ..Default::default()
    };
    let client = SonicSpeechClient::with_connector(config, connector).unwrap();
    assert!(matches!(
        client.synthesize("fail").await,
        Err(SpeechError::Transport(_))
    ));
}

/// Connector whose model never responds.
struct SilentConnector;

#[async_trait]
impl DuplexConnector for SilentConnector {
    async fn connect(&self) -> SpeechResult<(Box<dyn FrameSink>, Box<dyn FrameSource>)> {
        let (out_tx, mut out_rx) = mpsc::channel::<Bytes>(32);
        let (in_tx, in_rx) = mpsc::channel::<SpeechResult<Bytes>>(32);
        // Accept input but never respond; the inbound side stays open.
        tokio::spawn(async move {
            let _hold = in_tx;
            while out_rx.recv().await.is_some() {}
        });
        Ok((
            Box::new(ChannelSink::new(out_tx)),
            Box::new(ChannelSource::new(in_rx)),
        ))
    }
}

#[tokio::test]
async fn test_deadline_tears_down_stalled_exchange() {
    let config = SpeechConfig {
        retry: RetryConfig::disabled(),
        timeout_ms: Some(100),
        ..Default::default()
    };
    let client = SonicSpeechClient::with_connector(config, Arc::new(SilentConnector)).unwrap();
    assert!(matches!(
        client.synthesize("never answered").await,
        Err(SpeechError::Timeout(100))
    ));
}

#[tokio::test]
async fn test_factory_builds_working_client() {
    let client = create_speech_client("nova-sonic", SpeechConfig::default()).unwrap();
    assert_eq!(client.config().region, "us-east-1");

    assert!(create_speech_client("whisper", SpeechConfig::default()).is_err());
}
