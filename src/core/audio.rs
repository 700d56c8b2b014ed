//! Audio framing utilities.
//!
//! Pure functions shared by the synthesis and transcription paths:
//! silence-frame generation (used to trigger end-of-turn detection on the
//! provider side) and WAV container construction from raw PCM samples.

use crate::core::speech::{SpeechError, SpeechResult};

/// Generate a mono frame of PCM silence.
///
/// The frame length is `round(sample_rate_hz * duration_ms / 1000)` samples
/// at `bits_per_sample / 8` bytes per sample. The canonical configuration
/// (16 kHz, 100 ms, 16-bit) yields exactly 3200 bytes.
///
/// # Errors
///
/// Returns [`SpeechError::InvalidAudioConfig`] when `bits_per_sample` is not
/// a multiple of 8 or any argument is zero.
pub fn silence_frame(
    sample_rate_hz: u32,
    duration_ms: u32,
    bits_per_sample: u16,
) -> SpeechResult<Vec<u8>> {
    if sample_rate_hz == 0 || duration_ms == 0 || bits_per_sample == 0 {
        return Err(SpeechError::InvalidAudioConfig(format!(
            "sample rate, duration and sample size must all be positive \
             (got {sample_rate_hz} Hz, {duration_ms} ms, {bits_per_sample} bits)"
        )));
    }
    if bits_per_sample % 8 != 0 {
        return Err(SpeechError::InvalidAudioConfig(format!(
            "bits per sample must be a multiple of 8, got {bits_per_sample}"
        )));
    }

    // Integer rounding of sample_rate * duration / 1000.
    let samples = (u64::from(sample_rate_hz) * u64::from(duration_ms) + 500) / 1000;
    let bytes = samples * u64::from(bits_per_sample / 8);
    Ok(vec![0u8; bytes as usize])
}

/// Best-effort duration of a raw PCM buffer in seconds.
///
/// Returns 0.0 when the audio parameters are degenerate (zero rate or
/// zero-width samples), so callers can report "unknown" without failing.
pub fn pcm_duration_seconds(
    byte_len: usize,
    sample_rate_hz: u32,
    bits_per_sample: u16,
    channel_count: u16,
) -> f64 {
    let frame_bytes = u64::from(bits_per_sample / 8) * u64::from(channel_count);
    if sample_rate_hz == 0 || frame_bytes == 0 {
        return 0.0;
    }
    byte_len as f64 / (frame_bytes as f64 * f64::from(sample_rate_hz))
}

/// WAV (RIFF) container construction for 16-bit PCM audio.
pub mod wav {
    /// Build the 44-byte RIFF/WAVE header for a PCM payload.
    ///
    /// Header fields: total size `36 + data_size`, fmt chunk of 16 bytes
    /// (audio format 1 = PCM), byte rate `sample_rate * channels * bits / 8`,
    /// block align `channels * bits / 8`, and a data chunk of `data_size`.
    pub fn create_header(
        data_size: u32,
        sample_rate: u32,
        channels: u16,
        bits_per_sample: u16,
    ) -> [u8; 44] {
        let byte_rate = sample_rate * u32::from(channels) * u32::from(bits_per_sample) / 8;
        let block_align = channels * bits_per_sample / 8;
        let riff_size = 36 + data_size;

        let mut header = [0u8; 44];
        header[0..4].copy_from_slice(b"RIFF");
        header[4..8].copy_from_slice(&riff_size.to_le_bytes());
        header[8..12].copy_from_slice(b"WAVE");

        header[12..16].copy_from_slice(b"fmt ");
        header[16..20].copy_from_slice(&16u32.to_le_bytes());
        header[20..22].copy_from_slice(&1u16.to_le_bytes());
        header[22..24].copy_from_slice(&channels.to_le_bytes());
        header[24..28].copy_from_slice(&sample_rate.to_le_bytes());
        header[28..32].copy_from_slice(&byte_rate.to_le_bytes());
        header[32..34].copy_from_slice(&block_align.to_le_bytes());
        header[34..36].copy_from_slice(&bits_per_sample.to_le_bytes());

        header[36..40].copy_from_slice(b"data");
        header[40..44].copy_from_slice(&data_size.to_le_bytes());
        header
    }

    /// Wrap raw 16-bit PCM samples into a complete WAV container.
    ///
    /// Never fails: empty input yields a header-only 44-byte container,
    /// which downstream code treats as "no audio produced" rather than as
    /// an error.
    pub fn create_wav(pcm_data: &[u8], sample_rate: u32, channels: u16) -> Vec<u8> {
        let header = create_header(pcm_data.len() as u32, sample_rate, channels, 16);
        let mut out = Vec::with_capacity(44 + pcm_data.len());
        out.extend_from_slice(&header);
        out.extend_from_slice(pcm_data);
        out
    }
}
