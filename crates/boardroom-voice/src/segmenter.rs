//! Utterance segmentation over per-frame loudness.
//!
//! Two thresholds govern the `Idle → Speaking → Idle` cycle: a higher onset
//! threshold opens an utterance, and once speaking, loudness below the lower
//! silence threshold for a continuous hold period closes it. Silence is
//! accounted in frame time (sample count over sample rate), not wall clock,
//! so the decision is deterministic for a given frame sequence.
//!
//! Only one onset is honored per turn: after an utterance has been opened the
//! detector stays disarmed until `rearm`, which is how a turn avoids
//! re-triggering on trailing speech.

use crate::capture::AudioFrame;
use crate::encoder::WavEncoder;
use crate::energy;
use std::time::Duration;
use tracing::{debug, info};

/// Segmentation thresholds and timing.
#[derive(Debug, Clone)]
pub struct SegmenterConfig {
    /// RMS above this opens an utterance (default 0.02).
    pub onset_threshold: f32,

    /// RMS below this counts as silence while speaking (default 0.01).
    pub silence_threshold: f32,

    /// Continuous silence required to close the utterance (default 1500ms).
    pub silence_hold: Duration,
}

impl Default for SegmenterConfig {
    fn default() -> Self {
        Self {
            onset_threshold: 0.02,
            silence_threshold: 0.01,
            silence_hold: Duration::from_millis(1500),
        }
    }
}

/// Speech state: `Idle` between utterances, `Speaking` while one is open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpeechState {
    Idle,
    Speaking,
}

/// One finalized utterance, encoded and ready for upload.
#[derive(Debug, Clone)]
pub struct EncodedUtterance {
    /// Complete WAV file bytes.
    pub wav_bytes: Vec<u8>,
    /// Recorded span, including any trailing silence before the close.
    pub duration: Duration,
}

/// Emitted by `push_frame`: at most one per frame.
#[derive(Debug)]
pub enum SegmentEvent {
    /// First frame over the onset threshold; recording has started.
    SpeechStarted,
    /// Silence hold elapsed; the utterance is closed and encoded.
    UtteranceReady(EncodedUtterance),
}

/// Converts a loudness stream into discrete utterances.
///
/// The open utterance (its encoder and buffered samples) is owned here
/// exclusively until finalized; finalization hands the encoded bytes to the
/// caller and returns to `Idle`.
pub struct UtteranceSegmenter {
    config: SegmenterConfig,
    state: SpeechState,
    armed: bool,
    encoder: Option<WavEncoder>,
    recorded: Duration,
    silence_run: Duration,
}

impl UtteranceSegmenter {
    pub fn new(config: SegmenterConfig) -> Self {
        Self {
            config,
            state: SpeechState::Idle,
            armed: true,
            encoder: None,
            recorded: Duration::ZERO,
            silence_run: Duration::ZERO,
        }
    }

    pub fn state(&self) -> SpeechState {
        self.state
    }

    pub fn is_armed(&self) -> bool {
        self.armed
    }

    pub fn has_open_utterance(&self) -> bool {
        self.encoder.is_some()
    }

    /// Feed one captured frame; returns at most one segmentation event.
    pub fn push_frame(&mut self, frame: &AudioFrame) -> Option<SegmentEvent> {
        let loudness = energy::rms(&frame.samples);
        match self.state {
            SpeechState::Idle => {
                if self.armed && loudness > self.config.onset_threshold {
                    self.armed = false;
                    self.state = SpeechState::Speaking;
                    let mut encoder = WavEncoder::new(frame.sample_rate);
                    encoder.push(&frame.samples);
                    self.encoder = Some(encoder);
                    self.recorded = frame.duration();
                    self.silence_run = Duration::ZERO;
                    info!(loudness, "speech onset detected");
                    Some(SegmentEvent::SpeechStarted)
                } else {
                    None
                }
            }
            SpeechState::Speaking => {
                if let Some(encoder) = self.encoder.as_mut() {
                    encoder.push(&frame.samples);
                }
                self.recorded += frame.duration();

                if loudness < self.config.silence_threshold {
                    self.silence_run += frame.duration();
                    if self.silence_run >= self.config.silence_hold {
                        debug!(silence_ms = self.silence_run.as_millis() as u64, "silence hold reached");
                        return self.finalize().map(SegmentEvent::UtteranceReady);
                    }
                } else {
                    self.silence_run = Duration::ZERO;
                }
                None
            }
        }
    }

    /// Close the open utterance immediately, regardless of the silence hold.
    /// Returns `None` when no utterance is open.
    pub fn force_finish(&mut self) -> Option<EncodedUtterance> {
        self.finalize()
    }

    /// Drop any open utterance and accept a new onset (new turn, or the user
    /// discarded the last take).
    pub fn rearm(&mut self) {
        self.encoder = None;
        self.state = SpeechState::Idle;
        self.armed = true;
        self.recorded = Duration::ZERO;
        self.silence_run = Duration::ZERO;
    }

    /// Drop any open utterance without re-arming (pipeline teardown).
    pub fn discard(&mut self) {
        self.encoder = None;
        self.state = SpeechState::Idle;
        self.armed = false;
        self.recorded = Duration::ZERO;
        self.silence_run = Duration::ZERO;
    }

    fn finalize(&mut self) -> Option<EncodedUtterance> {
        let encoder = self.encoder.take()?;
        self.state = SpeechState::Idle;
        let duration = self.recorded;
        self.recorded = Duration::ZERO;
        self.silence_run = Duration::ZERO;
        info!(duration_ms = duration.as_millis() as u64, "utterance finalized");
        Some(EncodedUtterance {
            wav_bytes: encoder.finish(),
            duration,
        })
    }
}
