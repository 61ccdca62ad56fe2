//! The two session countdowns: pitch duration and response deadline.
//!
//! Each countdown is a spawned task that delivers ticks and its expiry into
//! the controller's event queue. Arming or cancelling bumps a generation
//! counter and aborts the previous task, so an expiry from a stale arming can
//! never be observed: events are checked against the current generation with
//! `claim` before the controller acts on them.

use crate::event::{SessionEvent, TimerEvent, TimerKind};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

#[derive(Debug, Default)]
struct TimerSlot {
    generation: u64,
    task: Option<JoinHandle<()>>,
}

impl TimerSlot {
    /// Invalidate any outstanding countdown and move to the next generation.
    fn bump(&mut self) -> u64 {
        if let Some(task) = self.task.take() {
            task.abort();
        }
        self.generation += 1;
        self.generation
    }
}

impl Drop for TimerSlot {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

/// Owns both countdowns. The response timer is subordinate to the pitch
/// timer: the controller cancels it first whenever the pitch timer fires.
pub struct SessionTimers {
    events: mpsc::UnboundedSender<SessionEvent>,
    pitch: TimerSlot,
    response: TimerSlot,
}

impl SessionTimers {
    pub fn new(events: mpsc::UnboundedSender<SessionEvent>) -> Self {
        Self {
            events,
            pitch: TimerSlot::default(),
            response: TimerSlot::default(),
        }
    }

    /// Arm the pitch countdown. Emits a one-second progress tick for the
    /// presenter, then the expiry.
    pub fn arm_pitch(&mut self, duration: Duration) {
        let generation = self.pitch.bump();
        debug!(secs = duration.as_secs(), generation, "pitch timer armed");
        let events = self.events.clone();
        self.pitch.task = Some(tokio::spawn(async move {
            let second = Duration::from_secs(1);
            let mut remaining = duration;
            while remaining > Duration::ZERO {
                let _ = events.send(SessionEvent::Timer(TimerEvent::Tick {
                    kind: TimerKind::Pitch,
                    remaining,
                    generation,
                }));
                let step = remaining.min(second);
                tokio::time::sleep(step).await;
                remaining = remaining.saturating_sub(step);
            }
            let _ = events.send(SessionEvent::Timer(TimerEvent::Expired {
                kind: TimerKind::Pitch,
                generation,
            }));
        }));
    }

    /// Arm the response deadline for the current turn.
    pub fn arm_response(&mut self, duration: Duration) {
        let generation = self.response.bump();
        debug!(secs = duration.as_secs(), generation, "response timer armed");
        let events = self.events.clone();
        self.response.task = Some(tokio::spawn(async move {
            tokio::time::sleep(duration).await;
            let _ = events.send(SessionEvent::Timer(TimerEvent::Expired {
                kind: TimerKind::Response,
                generation,
            }));
        }));
    }

    pub fn cancel(&mut self, kind: TimerKind) {
        let slot = self.slot_mut(kind);
        if slot.task.is_some() {
            debug!(?kind, "timer cancelled");
        }
        slot.bump();
    }

    pub fn cancel_all(&mut self) {
        self.cancel(TimerKind::Pitch);
        self.cancel(TimerKind::Response);
    }

    pub fn is_running(&self, kind: TimerKind) -> bool {
        self.slot(kind).task.is_some()
    }

    /// Accept a timer event if it belongs to the current arming; stale events
    /// (cancelled or re-armed countdowns) are rejected. An accepted expiry
    /// retires its slot.
    pub fn claim(&mut self, event: &TimerEvent) -> bool {
        let slot = self.slot_mut(event.kind());
        if event.generation() != slot.generation || slot.task.is_none() {
            debug!(kind = ?event.kind(), "stale timer event dropped");
            return false;
        }
        if matches!(event, TimerEvent::Expired { .. }) {
            slot.task = None;
        }
        true
    }

    fn slot(&self, kind: TimerKind) -> &TimerSlot {
        match kind {
            TimerKind::Pitch => &self.pitch,
            TimerKind::Response => &self.response,
        }
    }

    fn slot_mut(&mut self, kind: TimerKind) -> &mut TimerSlot {
        match kind {
            TimerKind::Pitch => &mut self.pitch,
            TimerKind::Response => &mut self.response,
        }
    }
}
