//! Session configuration loaded from the environment.
//!
//! | Env | Default | Description |
//! |-----|---------|-------------|
//! | BOARDROOM_BACKEND_WS_URL | ws://localhost:8000/ws | WebSocket endpoint of the backend. |
//! | BOARDROOM_SAMPLE_RATE | 16000 | Capture sample rate in Hz. |
//! | BOARDROOM_FRAME_SIZE | 480 | Samples per captured frame (30ms at 16kHz). |
//! | BOARDROOM_ONSET_THRESHOLD | 0.02 | RMS level that opens an utterance. |
//! | BOARDROOM_SILENCE_THRESHOLD | 0.01 | RMS level counted as silence mid-utterance. |
//! | BOARDROOM_SILENCE_HOLD_MS | 1500 | Continuous silence that closes an utterance. |
//! | BOARDROOM_PITCH_DURATION_SECS | 120 | Strict-mode session countdown. |
//! | BOARDROOM_RESPONSE_TIMEOUT_SECS | 30 | Per-turn response deadline. |
//! | BOARDROOM_RECONNECT_BASE_DELAY_MS | 3000 | First reconnect delay; grows per attempt. |
//! | BOARDROOM_RECONNECT_MAX_DELAY_MS | 30000 | Reconnect delay cap. |
//! | BOARDROOM_RECONNECT_MAX_ATTEMPTS | 10 | Attempts before the session is given up. |

use boardroom_voice::{CaptureConfig, SegmenterConfig};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;

/// Tunables for one controller instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    pub backend_ws_url: String,
    pub sample_rate: u32,
    pub frame_size: usize,
    pub onset_threshold: f32,
    pub silence_threshold: f32,
    pub silence_hold_ms: u64,
    pub pitch_duration_secs: u64,
    pub response_timeout_secs: u64,
    pub reconnect_base_delay_ms: u64,
    pub reconnect_max_delay_ms: u64,
    pub reconnect_max_attempts: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            backend_ws_url: "ws://localhost:8000/ws".to_string(),
            sample_rate: 16000,
            frame_size: 480,
            onset_threshold: 0.02,
            silence_threshold: 0.01,
            silence_hold_ms: 1500,
            pitch_duration_secs: 120,
            response_timeout_secs: 30,
            reconnect_base_delay_ms: 3000,
            reconnect_max_delay_ms: 30000,
            reconnect_max_attempts: 10,
        }
    }
}

fn env_parse<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}

impl SessionConfig {
    /// Read overrides from the environment on top of the defaults.
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            backend_ws_url: std::env::var("BOARDROOM_BACKEND_WS_URL")
                .unwrap_or(d.backend_ws_url),
            sample_rate: env_parse("BOARDROOM_SAMPLE_RATE", d.sample_rate),
            frame_size: env_parse("BOARDROOM_FRAME_SIZE", d.frame_size),
            onset_threshold: env_parse("BOARDROOM_ONSET_THRESHOLD", d.onset_threshold),
            silence_threshold: env_parse("BOARDROOM_SILENCE_THRESHOLD", d.silence_threshold),
            silence_hold_ms: env_parse("BOARDROOM_SILENCE_HOLD_MS", d.silence_hold_ms),
            pitch_duration_secs: env_parse("BOARDROOM_PITCH_DURATION_SECS", d.pitch_duration_secs),
            response_timeout_secs: env_parse(
                "BOARDROOM_RESPONSE_TIMEOUT_SECS",
                d.response_timeout_secs,
            ),
            reconnect_base_delay_ms: env_parse(
                "BOARDROOM_RECONNECT_BASE_DELAY_MS",
                d.reconnect_base_delay_ms,
            ),
            reconnect_max_delay_ms: env_parse(
                "BOARDROOM_RECONNECT_MAX_DELAY_MS",
                d.reconnect_max_delay_ms,
            ),
            reconnect_max_attempts: env_parse(
                "BOARDROOM_RECONNECT_MAX_ATTEMPTS",
                d.reconnect_max_attempts,
            ),
        }
    }

    pub fn capture(&self) -> CaptureConfig {
        CaptureConfig {
            sample_rate: self.sample_rate,
            channels: 1,
            frame_size: self.frame_size,
        }
    }

    pub fn segmenter(&self) -> SegmenterConfig {
        SegmenterConfig {
            onset_threshold: self.onset_threshold,
            silence_threshold: self.silence_threshold,
            silence_hold: Duration::from_millis(self.silence_hold_ms),
        }
    }

    pub fn pitch_duration(&self) -> Duration {
        Duration::from_secs(self.pitch_duration_secs)
    }

    pub fn response_timeout(&self) -> Duration {
        Duration::from_secs(self.response_timeout_secs)
    }

    /// Delay before reconnect attempt `attempt` (1-based): the base delay
    /// grown linearly, capped.
    pub fn reconnect_delay(&self, attempt: u32) -> Duration {
        let ms = self
            .reconnect_base_delay_ms
            .saturating_mul(u64::from(attempt.max(1)))
            .min(self.reconnect_max_delay_ms);
        Duration::from_millis(ms)
    }
}
