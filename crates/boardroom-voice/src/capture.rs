//! Microphone capture using CPAL.
//!
//! The capture stream is owned by a dedicated thread (cpal's `Stream` is
//! `!Send` on some hosts). The thread accumulates callback buffers into
//! fixed-size frames, sends them over an unbounded channel, and parks until
//! `CaptureHandle::stop` (or drop) tells it to release the device.

use crate::error::{AudioError, AudioResult};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::StreamConfig;
use std::thread;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{info, warn};

/// Capture configuration
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    /// Sample rate in Hz (default: 16000)
    pub sample_rate: u32,

    /// Number of channels (default: 1 for mono)
    pub channels: u16,

    /// Frame size in samples (default: 480 for 30ms at 16kHz)
    pub frame_size: usize,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            sample_rate: 16000,
            channels: 1,
            frame_size: 480, // 30ms at 16kHz
        }
    }
}

/// One fixed-size frame of captured samples (f32, -1.0..1.0).
#[derive(Debug, Clone)]
pub struct AudioFrame {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl AudioFrame {
    /// Wall-clock span this frame covers.
    pub fn duration(&self) -> Duration {
        Duration::from_secs_f64(self.samples.len() as f64 / f64::from(self.sample_rate.max(1)))
    }
}

/// Seam between the session controller and the microphone device.
///
/// `CpalMicrophone` is the real implementation; tests substitute a fake that
/// feeds frames from a channel.
pub trait Microphone: Send {
    /// Acquire the device and start delivering frames.
    ///
    /// This is the one call that may block before a session can start; every
    /// failure here is surfaced to the user rather than retried.
    fn open(&mut self, frames: mpsc::UnboundedSender<AudioFrame>) -> AudioResult<CaptureHandle>;
}

/// Owns a running capture until stopped. Stopping is synchronous: the device
/// thread is signalled and joined, so no frame callback outlives the handle.
pub struct CaptureHandle {
    stop_tx: Option<std::sync::mpsc::Sender<()>>,
    thread: Option<thread::JoinHandle<()>>,
}

impl CaptureHandle {
    /// Handle with no underlying device, for frame sources that manage their
    /// own lifetime (fakes in tests).
    pub fn detached() -> Self {
        Self {
            stop_tx: None,
            thread: None,
        }
    }

    /// Stop capturing and release the device. Idempotent.
    pub fn stop(&mut self) {
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.thread.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for CaptureHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Real microphone backed by the default CPAL input device.
pub struct CpalMicrophone {
    config: CaptureConfig,
}

impl CpalMicrophone {
    pub fn new(config: CaptureConfig) -> Self {
        Self { config }
    }

    /// List available input devices.
    pub fn list_input_devices() -> AudioResult<Vec<String>> {
        let host = cpal::default_host();
        let devices = host.input_devices()?;
        Ok(devices.filter_map(|d| d.name().ok()).collect())
    }
}

impl Microphone for CpalMicrophone {
    fn open(&mut self, frames: mpsc::UnboundedSender<AudioFrame>) -> AudioResult<CaptureHandle> {
        let device = cpal::default_host()
            .default_input_device()
            .ok_or_else(|| AudioError::Device("no input device available".to_string()))?;

        info!(
            device = %device.name().unwrap_or_else(|_| "unknown".to_string()),
            sample_rate = self.config.sample_rate,
            "acquiring microphone"
        );

        let stream_config = StreamConfig {
            channels: self.config.channels,
            sample_rate: cpal::SampleRate(self.config.sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        let frame_size = self.config.frame_size;
        let sample_rate = self.config.sample_rate;
        let (ready_tx, ready_rx) = std::sync::mpsc::channel::<AudioResult<()>>();
        let (stop_tx, stop_rx) = std::sync::mpsc::channel::<()>();

        let thread = thread::Builder::new()
            .name("boardroom-capture".to_string())
            .spawn(move || {
                let mut sample_buffer: Vec<f32> = Vec::with_capacity(frame_size);
                let built = device.build_input_stream(
                    &stream_config,
                    move |data: &[f32], _: &cpal::InputCallbackInfo| {
                        for &sample in data {
                            sample_buffer.push(sample);
                            if sample_buffer.len() >= frame_size {
                                let frame = AudioFrame {
                                    samples: std::mem::replace(
                                        &mut sample_buffer,
                                        Vec::with_capacity(frame_size),
                                    ),
                                    sample_rate,
                                };
                                if frames.send(frame).is_err() {
                                    // receiver gone; frames are dropped until stop
                                    return;
                                }
                            }
                        }
                    },
                    move |err| {
                        warn!("audio stream error: {err}");
                    },
                    None,
                );

                let stream = match built {
                    Ok(s) => s,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e.into()));
                        return;
                    }
                };
                if let Err(e) = stream.play() {
                    let _ = ready_tx.send(Err(e.into()));
                    return;
                }
                let _ = ready_tx.send(Ok(()));

                // hold the stream until told to stop
                let _ = stop_rx.recv();
                drop(stream);
            })
            .map_err(|e| AudioError::Device(format!("capture thread spawn failed: {e}")))?;

        match ready_rx.recv() {
            Ok(Ok(())) => {
                info!("microphone capture started");
                Ok(CaptureHandle {
                    stop_tx: Some(stop_tx),
                    thread: Some(thread),
                })
            }
            Ok(Err(e)) => {
                let _ = thread.join();
                Err(e)
            }
            Err(_) => {
                let _ = thread.join();
                Err(AudioError::Device("capture thread exited during setup".to_string()))
            }
        }
    }
}
