//! Event types delivered into the controller's serialized queue.
//!
//! Audio frames, UI commands, network activity, and timer expiries all arrive
//! as `SessionEvent`s through one channel, so state transitions can never
//! interleave.

use crate::protocol::{ServerMessage, StartupDetails};
use boardroom_voice::AudioFrame;
use std::time::Duration;

/// Anything the controller reacts to.
#[derive(Debug)]
pub enum SessionEvent {
    /// One frame of captured microphone audio.
    Frame(AudioFrame),
    /// A request from the front end.
    Ui(UiCommand),
    /// Connection activity from the protocol client.
    Net(NetEvent),
    /// A countdown fired or ticked.
    Timer(TimerEvent),
}

/// Commands the presentation layer may issue.
#[derive(Debug, Clone)]
pub enum UiCommand {
    /// Credentials are available; dial the backend.
    Connect,
    /// Commit startup details and begin practicing.
    StartSession { details: StartupDetails },
    /// The user declared the current answer finished.
    FinishSpeaking,
    /// Commit the pending transcript.
    Confirm,
    /// Discard the pending transcript and try the answer again.
    Reset,
    /// End the session and request the report.
    EndSession,
    /// Bail out without a report.
    Abort,
    /// Re-request stored session history.
    FetchHistory,
}

/// Connection lifecycle and inbound traffic.
#[derive(Debug)]
pub enum NetEvent {
    Opened,
    Closed { error: Option<String> },
    /// Credential refresh failed; reconnection stops until re-authentication.
    AuthFailed(String),
    Inbound(ServerMessage),
}

/// The two session countdowns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerKind {
    /// Bounds the whole pitch (strict mode only).
    Pitch,
    /// Bounds how long the user may take to answer one turn.
    Response,
}

/// Timer activity, tagged with the arming generation so that events from a
/// cancelled or re-armed countdown can be recognized as stale and dropped.
#[derive(Debug, Clone, Copy)]
pub enum TimerEvent {
    Tick {
        kind: TimerKind,
        remaining: Duration,
        generation: u64,
    },
    Expired {
        kind: TimerKind,
        generation: u64,
    },
}

impl TimerEvent {
    pub fn kind(&self) -> TimerKind {
        match self {
            TimerEvent::Tick { kind, .. } | TimerEvent::Expired { kind, .. } => *kind,
        }
    }

    pub fn generation(&self) -> u64 {
        match self {
            TimerEvent::Tick { generation, .. } | TimerEvent::Expired { generation, .. } => {
                *generation
            }
        }
    }
}
