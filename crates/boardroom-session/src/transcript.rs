//! Conversation log and the per-turn pending transcript.

use crate::protocol::SILENT_RESPONSE;
use serde::Serialize;
use std::time::Duration;
use tokio::time::Instant;

/// Who produced a conversation entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "role", content = "name")]
pub enum Speaker {
    User,
    Investor(String),
    System,
}

impl std::fmt::Display for Speaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Speaker::User => f.write_str("You"),
            Speaker::Investor(name) => f.write_str(name),
            Speaker::System => f.write_str("System"),
        }
    }
}

/// One turn in the conversation. Immutable once appended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConversationEntry {
    pub speaker: Speaker,
    /// `None` until the transcript for this turn resolves.
    pub text: Option<String>,
    /// Offset from session start.
    pub offset: Duration,
}

/// Append-only, monotonically ordered record of the session.
#[derive(Debug)]
pub struct ConversationLog {
    started_at: Instant,
    entries: Vec<ConversationEntry>,
}

impl ConversationLog {
    pub fn new() -> Self {
        Self {
            started_at: Instant::now(),
            entries: Vec::new(),
        }
    }

    /// Append an entry stamped with the current session offset. Offsets never
    /// go backwards even if the clock is coarse.
    pub fn append(&mut self, speaker: Speaker, text: Option<String>) -> &ConversationEntry {
        let mut offset = self.started_at.elapsed();
        if let Some(last) = self.entries.last() {
            if offset < last.offset {
                offset = last.offset;
            }
        }
        self.entries.push(ConversationEntry {
            speaker,
            text,
            offset,
        });
        self.entries.last().expect("just pushed")
    }

    pub fn entries(&self) -> &[ConversationEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for ConversationLog {
    fn default() -> Self {
        Self::new()
    }
}

/// The editable transcript of the just-finished utterance, alive only while
/// the user can still confirm or reset it.
#[derive(Debug, Clone, Default)]
pub struct PendingTranscript {
    text: Option<String>,
}

impl PendingTranscript {
    /// A transcript with no text yet: either the server has not answered, or
    /// the turn closed without any speech (the empty-utterance marker).
    pub fn empty() -> Self {
        Self { text: None }
    }

    pub fn set_text(&mut self, text: String) {
        self.text = Some(text);
    }

    pub fn text(&self) -> Option<&str> {
        self.text.as_deref()
    }

    /// The text that gets committed on confirm: the trimmed transcript, or the
    /// silent-response sentinel when there is nothing to say.
    pub fn composed(&self) -> String {
        match self.text.as_deref().map(str::trim) {
            Some(t) if !t.is_empty() => t.to_string(),
            _ => SILENT_RESPONSE.to_string(),
        }
    }
}
