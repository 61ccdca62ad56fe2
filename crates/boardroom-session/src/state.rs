//! Session and connection state definitions.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Top-level phase of one practice attempt.
///
/// `ReportComplete` and `Aborted` are terminal for the session object; the
/// controller itself stays alive and can start a fresh session from `Ready`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Idle,
    Connecting,
    Ready,
    Listening,
    AwaitingConfirmation,
    Processing,
    GeneratingReport,
    ReportComplete,
    SessionEnded,
    Disconnected,
    Aborted,
}

impl SessionState {
    /// States in which a conversation is actively underway.
    pub fn in_conversation(self) -> bool {
        matches!(
            self,
            SessionState::Listening | SessionState::AwaitingConfirmation | SessionState::Processing
        )
    }

    /// Terminal states: the session object is logically destroyed here.
    pub fn is_terminal(self) -> bool {
        matches!(self, SessionState::ReportComplete | SessionState::Aborted)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Idle => "idle",
            SessionState::Connecting => "connecting",
            SessionState::Ready => "ready",
            SessionState::Listening => "listening",
            SessionState::AwaitingConfirmation => "awaiting_confirmation",
            SessionState::Processing => "processing",
            SessionState::GeneratingReport => "generating_report",
            SessionState::ReportComplete => "report_complete",
            SessionState::SessionEnded => "session_ended",
            SessionState::Disconnected => "disconnected",
            SessionState::Aborted => "aborted",
        };
        f.write_str(name)
    }
}

/// Practice variant: strict runs against the pitch countdown, drill is pure
/// turn-by-turn Q&A.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    #[default]
    Strict,
    Drill,
}

/// Why the session is being closed out; travels in `end_session`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndReason {
    TimerExpired,
    UserEnded,
    InvestorTerminated,
}

impl fmt::Display for EndReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EndReason::TimerExpired => "timer_expired",
            EndReason::UserEnded => "user_ended",
            EndReason::InvestorTerminated => "investor_terminated",
        };
        f.write_str(name)
    }
}

/// State of the link to the backend, with the reconnect attempt counter held
/// by the controller (reset to zero on every successful open).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Closed,
    Connecting,
    Open,
}

impl ConnectionState {
    pub fn is_open(self) -> bool {
        matches!(self, ConnectionState::Open)
    }
}
