//! Wire protocol between the client and the boardroom backend.
//!
//! Control messages are JSON objects tagged by a `type` field; utterance audio
//! travels as raw binary WebSocket frames. Unknown inbound message types are
//! ignored, never fatal.

use crate::state::{EndReason, Mode};
use serde::{Deserialize, Serialize};

/// Sent in place of a transcript when the user confirmed an empty response.
pub const SILENT_RESPONSE: &str = "[Silent Response]";

/// Startup details that open a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartupDetails {
    pub name: String,
    /// One-sentence pitch.
    pub pitch: String,
    /// The problem the startup solves.
    pub problem: String,
    pub mode: Mode,
    #[serde(rename = "profileId", skip_serializing_if = "Option::is_none", default)]
    pub profile_id: Option<String>,
}

/// Client → backend control messages.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Opens the session; sent once when practice starts.
    StartupDetails { data: StartupDetails },
    /// Ask for a transcript of the utterance audio that was just uploaded.
    ProcessInterimTranscript,
    /// The user confirmed this turn's transcript.
    SendComposedText { text: String },
    /// Close out the session and request the analysis report.
    EndSession { reason: EndReason },
    /// The response deadline lapsed without a confirmed answer.
    UserTimeout,
    GetHistory,
}

/// Backend → client messages.
///
/// `#[serde(other)]` soaks up message types this client does not know about.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    HistoryData {
        data: serde_json::Value,
    },
    /// A new conversational turn from one of the investor personas.
    Investor {
        investor_name: String,
        text: String,
    },
    /// Transcript of the user's own uploaded utterance.
    UserInterimTranscript {
        text: String,
    },
    /// The structured end-of-session report.
    AnalysisReport {
        data: serde_json::Value,
    },
    /// The investors ended the meeting early.
    SessionTerminated {
        #[serde(default)]
        reason: Option<String>,
        #[serde(default)]
        text: Option<String>,
    },
    Error {
        text: String,
    },
    #[serde(other)]
    Unknown,
}
