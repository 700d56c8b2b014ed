//! Constants and voice mapping for the Nova Sonic speech model.

// ============================================================================
// Model Constants
// ============================================================================

/// Bedrock model identifier for Nova Sonic.
pub const NOVA_SONIC_MODEL_ID: &str = "amazon.nova-sonic-v1:0";

/// Regions where the model is currently served.
pub const SUPPORTED_REGIONS: &[&str] = &["us-east-1", "us-west-2", "ap-northeast-1", "eu-north-1"];

/// Default input (microphone) sample rate in Hz.
pub const DEFAULT_INPUT_SAMPLE_RATE: u32 = 16_000;

/// Default output (speaker) sample rate in Hz.
pub const DEFAULT_OUTPUT_SAMPLE_RATE: u32 = 24_000;

/// Default PCM sample width.
pub const DEFAULT_BITS_PER_SAMPLE: u16 = 16;

/// Duration of the silence filler appended after synthesis text input.
/// The model requires audio on the stream before it starts responding.
pub const SILENCE_FILLER_MS: u32 = 100;

/// Maximum bytes of PCM per audioInput event. At 16kHz/16-bit mono this is
/// 100ms of audio.
pub const AUDIO_CHUNK_BYTES: usize = 3_200;

/// System prompt used for synthesis when the caller provides none.
pub const DEFAULT_SYNTHESIS_PROMPT: &str =
    "You are a text-to-speech system. Repeat the user's text back exactly, \
     word for word, with natural prosody. Do not add, remove, or rephrase \
     anything.";

/// System prompt used for transcription when the caller provides none.
pub const DEFAULT_TRANSCRIPTION_PROMPT: &str =
    "You are a transcription system. Write out exactly what the user says, \
     word for word. Do not respond to the content, answer questions, or add \
     commentary.";

// ============================================================================
// Voices
// ============================================================================

/// Voices available on Nova Sonic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SonicVoice {
    /// American English, male.
    #[default]
    Matthew,
    /// American English, female.
    Tiffany,
    /// British English, female.
    Amy,
    /// Spanish, female.
    Lupe,
    /// Spanish, male.
    Carlos,
}

impl SonicVoice {
    /// The native voice identifier sent on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            SonicVoice::Matthew => "matthew",
            SonicVoice::Tiffany => "tiffany",
            SonicVoice::Amy => "amy",
            SonicVoice::Lupe => "lupe",
            SonicVoice::Carlos => "carlos",
        }
    }

    /// Map a voice name to a [`SonicVoice`], defaulting to Matthew.
    ///
    /// Accepts native identifiers case-insensitively, plus the abstract
    /// voice names used by other speech providers so callers can switch
    /// providers without changing configuration.
    pub fn from_str_or_default(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "matthew" | "alloy" | "echo" | "verse" => SonicVoice::Matthew,
            "tiffany" | "shimmer" | "coral" => SonicVoice::Tiffany,
            "amy" | "sage" | "fable" => SonicVoice::Amy,
            "lupe" | "ballad" => SonicVoice::Lupe,
            "carlos" | "ash" | "onyx" => SonicVoice::Carlos,
            _ => SonicVoice::default(),
        }
    }

    /// All available voices.
    pub fn all() -> Vec<SonicVoice> {
        vec![
            SonicVoice::Matthew,
            SonicVoice::Tiffany,
            SonicVoice::Amy,
            SonicVoice::Lupe,
            SonicVoice::Carlos,
        ]
    }
}

impl std::fmt::Display for SonicVoice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_voice_native_names() {
        for voice in SonicVoice::all() {
            assert_eq!(SonicVoice::from_str_or_default(voice.as_str()), voice);
        }
    }

    #[test]
    fn test_voice_case_insensitive() {
        assert_eq!(SonicVoice::from_str_or_default("MATTHEW"), SonicVoice::Matthew);
        assert_eq!(SonicVoice::from_str_or_default("Tiffany"), SonicVoice::Tiffany);
    }

    #[test]
    fn test_voice_abstract_aliases() {
        assert_eq!(SonicVoice::from_str_or_default("alloy"), SonicVoice::Matthew);
        assert_eq!(SonicVoice::from_str_or_default("shimmer"), SonicVoice::Tiffany);
        assert_eq!(SonicVoice::from_str_or_default("sage"), SonicVoice::Amy);
        assert_eq!(SonicVoice::from_str_or_default("ballad"), SonicVoice::Lupe);
        assert_eq!(SonicVoice::from_str_or_default("ash"), SonicVoice::Carlos);
    }

    #[test]
    fn test_voice_unknown_defaults_to_matthew() {
        assert_eq!(SonicVoice::from_str_or_default("nonexistent"), SonicVoice::Matthew);
        assert_eq!(SonicVoice::from_str_or_default(""), SonicVoice::Matthew);
    }

    #[test]
    fn test_chunk_matches_filler() {
        // One silence filler at default rates fits in exactly one chunk.
        let samples = (DEFAULT_INPUT_SAMPLE_RATE * SILENCE_FILLER_MS / 1000) as usize;
        assert_eq!(samples * (DEFAULT_BITS_PER_SAMPLE as usize / 8), AUDIO_CHUNK_BYTES);
    }
}
