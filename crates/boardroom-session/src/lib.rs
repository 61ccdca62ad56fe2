//! # Boardroom Session - Practice Session Orchestration
//!
//! The client-resident controller for a live pitch-practice conversation:
//! a state machine that sequences listening, confirmation, processing and
//! report phases; the two countdowns that bound the pitch and each answer;
//! and the WebSocket protocol client that frames messages, tolerates
//! disconnects, and reconnects with fresh credentials.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    Session Controller                        │
//! │  ┌────────────┐   ┌────────────┐   ┌──────────────────┐    │
//! │  │ Microphone │ → │ Segmenter  │ → │  State machine   │    │
//! │  │  (frames)  │   │  (voice)   │   │ (one event queue)│    │
//! │  └────────────┘   └────────────┘   └────────┬─────────┘    │
//! │  ┌────────────┐   ┌────────────┐            ↓              │
//! │  │   Timers   │ → │ Presenter  │ ← swappable UI adapter    │
//! │  └────────────┘   └────────────┘                           │
//! │                 ┌──────────────────┐                       │
//! │                 │  ProtocolClient  │ ←→ backend (ws)       │
//! │                 └──────────────────┘                       │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! Audio frames, UI commands, timer expiries and inbound network messages are
//! all serialized through a single queue, so state transitions never
//! interleave.

pub mod auth;
pub mod client;
pub mod config;
pub mod controller;
pub mod error;
pub mod event;
pub mod presenter;
pub mod protocol;
pub mod state;
pub mod timers;
pub mod transcript;

pub use auth::{CredentialSource, HttpCredentialSource, StaticCredentials};
pub use client::{ClientCommand, OutboundFrame, ProtocolClient};
pub use config::SessionConfig;
pub use controller::{SessionController, SessionHandle};
pub use error::{SessionError, SessionResult};
pub use event::{NetEvent, SessionEvent, TimerEvent, TimerKind, UiCommand};
pub use presenter::{NullPresenter, Presenter};
pub use protocol::{ClientMessage, ServerMessage, StartupDetails, SILENT_RESPONSE};
pub use state::{ConnectionState, EndReason, Mode, SessionState};
pub use timers::SessionTimers;
pub use transcript::{ConversationEntry, ConversationLog, PendingTranscript, Speaker};
