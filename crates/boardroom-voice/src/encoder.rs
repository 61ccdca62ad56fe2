//! In-memory WAV encoding for utterance upload.
//!
//! One encoder lives for exactly one utterance: samples are appended as the
//! segmenter collects them and `finish` produces the complete file for the
//! wire. 16-bit mono PCM, little-endian.

/// Incremental 16-bit mono PCM WAV writer.
#[derive(Debug)]
pub struct WavEncoder {
    sample_rate: u32,
    data: Vec<u8>,
}

impl WavEncoder {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            data: Vec::new(),
        }
    }

    /// Append f32 samples (-1.0..1.0), quantized to i16.
    pub fn push(&mut self, samples: &[f32]) {
        self.data.reserve(samples.len() * 2);
        for &s in samples {
            let clamped = s.clamp(-1.0, 1.0);
            let quantized = (clamped * 32767.0).round() as i16;
            self.data.extend_from_slice(&quantized.to_le_bytes());
        }
    }

    /// Number of samples written so far.
    pub fn sample_count(&self) -> usize {
        self.data.len() / 2
    }

    /// Build the RIFF/WAVE file: 44-byte header followed by the PCM payload.
    pub fn finish(self) -> Vec<u8> {
        let data_len = self.data.len() as u32;
        let mut buf = Vec::with_capacity(44 + self.data.len());
        // RIFF header
        buf.extend_from_slice(b"RIFF");
        buf.extend_from_slice(&(36 + data_len).to_le_bytes());
        buf.extend_from_slice(b"WAVE");
        // fmt subchunk
        buf.extend_from_slice(b"fmt ");
        buf.extend_from_slice(&16u32.to_le_bytes()); // subchunk1 size
        buf.extend_from_slice(&1u16.to_le_bytes()); // PCM
        buf.extend_from_slice(&1u16.to_le_bytes()); // mono
        buf.extend_from_slice(&self.sample_rate.to_le_bytes());
        buf.extend_from_slice(&(self.sample_rate * 2).to_le_bytes()); // byte rate
        buf.extend_from_slice(&2u16.to_le_bytes()); // block align
        buf.extend_from_slice(&16u16.to_le_bytes()); // bits per sample
        // data subchunk
        buf.extend_from_slice(b"data");
        buf.extend_from_slice(&data_len.to_le_bytes());
        buf.extend_from_slice(&self.data);
        buf
    }
}
