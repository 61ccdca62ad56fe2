//! # Boardroom Voice - Microphone Front End
//!
//! Live audio capture, energy-based voice activity detection, and utterance
//! segmentation for the boardroom pitch-practice client.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────┐
//! │  ┌──────────────┐   ┌──────────────┐   ┌───────────────┐  │
//! │  │  Microphone  │ → │  RMS energy  │ → │   Utterance   │  │
//! │  │    (cpal)    │   │   detector   │   │   segmenter   │  │
//! │  └──────────────┘   └──────────────┘   └───────┬───────┘  │
//! │                                                 ↓          │
//! │                                        ┌───────────────┐  │
//! │                                        │  WAV encoder  │  │
//! │                                        │  (per turn)   │  │
//! │                                        └───────────────┘  │
//! └────────────────────────────────────────────────────────────┘
//! ```
//!
//! The capture stream lives on a dedicated thread; frames cross into the
//! session event loop over a channel, and segmentation decisions are made in
//! frame time so they replay deterministically.

pub mod capture;
pub mod encoder;
pub mod energy;
pub mod error;
pub mod segmenter;

pub use capture::{AudioFrame, CaptureConfig, CaptureHandle, CpalMicrophone, Microphone};
pub use encoder::WavEncoder;
pub use energy::rms;
pub use error::{AudioError, AudioResult};
pub use segmenter::{
    EncodedUtterance, SegmentEvent, SegmenterConfig, SpeechState, UtteranceSegmenter,
};
