//! The session controller: one state machine driving the whole practice flow.
//!
//! Owns the microphone pipeline, the utterance segmenter, both countdowns,
//! and the outbound side of the protocol client. Every input — audio frames,
//! UI commands, network activity, timer expiries — arrives as a
//! `SessionEvent` through one queue and is applied by `process`, so no
//! transition can ever be observed half-done.

use crate::auth::CredentialSource;
use crate::client::{ClientCommand, OutboundFrame, ProtocolClient};
use crate::config::SessionConfig;
use crate::event::{NetEvent, SessionEvent, TimerEvent, TimerKind, UiCommand};
use crate::presenter::Presenter;
use crate::protocol::{ClientMessage, ServerMessage, StartupDetails};
use crate::state::{ConnectionState, EndReason, Mode, SessionState};
use crate::timers::SessionTimers;
use crate::transcript::{ConversationLog, PendingTranscript, Speaker};
use boardroom_voice::{
    CaptureHandle, EncodedUtterance, Microphone, SegmentEvent, UtteranceSegmenter,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Logged when the response deadline lapses without a confirmed answer.
const STALL_NOTE: &str = "Founder showed hesitation and failed to respond in time.";

/// Cloneable front-end handle into the controller's event queue.
#[derive(Clone)]
pub struct SessionHandle {
    events: mpsc::UnboundedSender<SessionEvent>,
}

impl SessionHandle {
    pub fn command(&self, command: UiCommand) {
        let _ = self.events.send(SessionEvent::Ui(command));
    }
}

/// One practice attempt. Created when startup details are committed,
/// destroyed when a terminal state is reached or the connection is lost for
/// good.
struct ActiveSession {
    id: String,
    mode: Mode,
    log: ConversationLog,
    /// Speech onset has been seen this turn.
    has_spoken: bool,
    /// The response deadline lapsed this turn; a reset must not re-arm it.
    response_expired: bool,
    /// `end_session` goes out at most once per session.
    end_sent: bool,
    end_reason: Option<EndReason>,
}

impl ActiveSession {
    fn new(details: &StartupDetails) -> Self {
        let slug: String = details
            .name
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() {
                    c.to_ascii_lowercase()
                } else {
                    '-'
                }
            })
            .collect();
        Self {
            id: format!("{slug}-{}", Uuid::new_v4()),
            mode: details.mode,
            log: ConversationLog::new(),
            has_spoken: false,
            response_expired: false,
            end_sent: false,
            end_reason: None,
        }
    }
}

/// The top-level state machine. Generic over the presentation adapter so
/// front ends (terminal, GUI, test recorder) can be swapped freely.
pub struct SessionController<P: Presenter> {
    config: SessionConfig,
    state: SessionState,
    conn: ConnectionState,
    reconnect_attempts: u32,
    mic: Box<dyn Microphone>,
    capture: Option<CaptureHandle>,
    segmenter: UtteranceSegmenter,
    timers: SessionTimers,
    session: Option<ActiveSession>,
    pending: Option<PendingTranscript>,
    presenter: P,
    outbound: mpsc::UnboundedSender<OutboundFrame>,
    client_commands: mpsc::UnboundedSender<ClientCommand>,
    events_tx: mpsc::UnboundedSender<SessionEvent>,
    events_rx: mpsc::UnboundedReceiver<SessionEvent>,
}

impl<P: Presenter> SessionController<P> {
    /// Build a controller wired to its protocol client. Spawn the client's
    /// `run` alongside the controller's.
    pub fn new(
        config: SessionConfig,
        mic: Box<dyn Microphone>,
        presenter: P,
        credentials: Arc<dyn CredentialSource>,
    ) -> (Self, ProtocolClient) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let client = ProtocolClient::new(
            config.backend_ws_url.clone(),
            credentials,
            command_rx,
            outbound_rx,
            events_tx.clone(),
        );
        let controller = Self::assemble(
            config,
            mic,
            presenter,
            outbound_tx,
            command_tx,
            events_tx,
            events_rx,
        );
        (controller, client)
    }

    fn assemble(
        config: SessionConfig,
        mic: Box<dyn Microphone>,
        presenter: P,
        outbound: mpsc::UnboundedSender<OutboundFrame>,
        client_commands: mpsc::UnboundedSender<ClientCommand>,
        events_tx: mpsc::UnboundedSender<SessionEvent>,
        events_rx: mpsc::UnboundedReceiver<SessionEvent>,
    ) -> Self {
        let segmenter = UtteranceSegmenter::new(config.segmenter());
        let timers = SessionTimers::new(events_tx.clone());
        Self {
            config,
            state: SessionState::Idle,
            conn: ConnectionState::Closed,
            reconnect_attempts: 0,
            mic,
            capture: None,
            segmenter,
            timers,
            session: None,
            pending: None,
            presenter,
            outbound,
            client_commands,
            events_tx,
            events_rx,
        }
    }

    pub fn handle(&self) -> SessionHandle {
        SessionHandle {
            events: self.events_tx.clone(),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn connection(&self) -> ConnectionState {
        self.conn
    }

    /// Mode of the active session, if one exists.
    pub fn mode(&self) -> Option<Mode> {
        self.session.as_ref().map(|s| s.mode)
    }

    /// Drain the event queue until every sender is gone.
    pub async fn run(mut self) {
        while let Some(event) = self.events_rx.recv().await {
            self.process(event);
        }
        self.timers.cancel_all();
        self.teardown_audio();
        debug!("session controller stopped");
    }

    /// Apply one event. All state transitions happen inside this call.
    pub fn process(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::Frame(frame) => self.on_frame(frame),
            SessionEvent::Ui(command) => self.on_command(command),
            SessionEvent::Net(net) => self.on_net(net),
            SessionEvent::Timer(timer) => self.on_timer(timer),
        }
    }

    // ---- audio path ----

    fn on_frame(&mut self, frame: boardroom_voice::AudioFrame) {
        // the segmenter only runs while we are listening for an answer
        if self.state != SessionState::Listening {
            return;
        }
        match self.segmenter.push_frame(&frame) {
            Some(SegmentEvent::SpeechStarted) => {
                if let Some(s) = self.session.as_mut() {
                    s.has_spoken = true;
                }
                self.presenter.status("Recording your response...", false);
            }
            Some(SegmentEvent::UtteranceReady(utterance)) => {
                self.utterance_finalized(Some(utterance));
            }
            None => {}
        }
    }

    /// The turn's recording is closed. With audio in hand it is uploaded and
    /// a transcript requested; without, the turn still gets a confirmable
    /// empty marker rather than a zero-length upload.
    fn utterance_finalized(&mut self, utterance: Option<EncodedUtterance>) {
        match utterance {
            Some(utt) => {
                info!(
                    bytes = utt.wav_bytes.len(),
                    duration_ms = utt.duration.as_millis() as u64,
                    "uploading utterance"
                );
                self.send_audio(utt.wav_bytes);
                self.send_control(ClientMessage::ProcessInterimTranscript);
                self.presenter.status("Processing your speech...", false);
            }
            None => {
                self.presenter
                    .status("No speech was captured for this turn.", false);
            }
        }
        self.pending = Some(PendingTranscript::empty());
        self.enter(SessionState::AwaitingConfirmation);
    }

    // ---- UI commands ----

    fn on_command(&mut self, command: UiCommand) {
        match command {
            UiCommand::Connect => self.connect(),
            UiCommand::StartSession { details } => self.start_session(details),
            UiCommand::FinishSpeaking => {
                if self.state == SessionState::Listening {
                    let utterance = self.segmenter.force_finish();
                    self.utterance_finalized(utterance);
                }
            }
            UiCommand::Confirm => self.confirm(),
            UiCommand::Reset => self.reset(),
            UiCommand::EndSession => {
                if self.state.in_conversation() {
                    self.begin_report(EndReason::UserEnded);
                }
            }
            UiCommand::Abort => self.abort(),
            UiCommand::FetchHistory => {
                if self.conn.is_open() {
                    self.send_control(ClientMessage::GetHistory);
                }
            }
        }
    }

    fn connect(&mut self) {
        if !matches!(
            self.state,
            SessionState::Idle | SessionState::Disconnected | SessionState::Aborted
        ) {
            return;
        }
        self.reconnect_attempts = 0;
        self.conn = ConnectionState::Connecting;
        self.enter(SessionState::Connecting);
        self.presenter.status("Connecting to the boardroom...", false);
        let _ = self.client_commands.send(ClientCommand::Connect {
            delay: Duration::ZERO,
        });
    }

    fn start_session(&mut self, details: StartupDetails) {
        if !matches!(
            self.state,
            SessionState::Ready | SessionState::ReportComplete
        ) {
            return;
        }
        if !self.conn.is_open() {
            self.presenter
                .status("Not connected to the boardroom yet.", true);
            return;
        }

        // acquiring the device is the one blocking step; failure returns the
        // controller to Ready with no retry
        let (frame_tx, mut frame_rx) = mpsc::unbounded_channel();
        let handle = match self.mic.open(frame_tx) {
            Ok(handle) => handle,
            Err(e) => {
                warn!("microphone acquisition failed: {e}");
                self.presenter
                    .status(&format!("Error accessing microphone: {e}"), true);
                self.enter(SessionState::Ready);
                return;
            }
        };
        let events = self.events_tx.clone();
        tokio::spawn(async move {
            while let Some(frame) = frame_rx.recv().await {
                if events.send(SessionEvent::Frame(frame)).is_err() {
                    break;
                }
            }
        });
        self.capture = Some(handle);

        let session = ActiveSession::new(&details);
        let mode = session.mode;
        info!(
            session_id = %session.id,
            mode = ?mode,
            started_at = %chrono::Utc::now(),
            name = %details.name,
            "session started"
        );
        self.session = Some(session);
        self.pending = None;
        self.send_control(ClientMessage::StartupDetails { data: details });

        match mode {
            Mode::Strict => {
                self.timers.arm_pitch(self.config.pitch_duration());
                self.enter(SessionState::Listening);
                self.presenter.status(
                    "Microphone active. Your pitch session has started!",
                    false,
                );
            }
            Mode::Drill => {
                self.enter(SessionState::Processing);
                self.presenter
                    .status("Drill mode activated. Waiting for the first question...", false);
            }
        }
    }

    fn confirm(&mut self) {
        // guard against duplicate UI triggers: outside the confirmation
        // window this is a no-op, not an error
        if self.state != SessionState::AwaitingConfirmation {
            return;
        }
        let Some(pending) = self.pending.take() else {
            return;
        };
        self.timers.cancel(TimerKind::Response);
        let text = pending.composed();
        if let Some(s) = self.session.as_mut() {
            let entry = s.log.append(Speaker::User, Some(text.clone()));
            self.presenter.entry_added(entry);
        }
        self.presenter.active_investor(None);
        self.presenter.live_transcript("");
        self.send_control(ClientMessage::SendComposedText { text });
        self.enter(SessionState::Processing);
        self.presenter
            .status("The investors are deliberating...", false);
    }

    fn reset(&mut self) {
        if self.state != SessionState::AwaitingConfirmation {
            return;
        }
        self.pending = None;
        self.enter(SessionState::Listening);
        self.presenter
            .status("Your last response was cleared. Please try again.", false);
    }

    fn abort(&mut self) {
        if self.session.is_none() && !self.state.in_conversation() {
            return;
        }
        info!("session aborted by the user");
        self.timers.cancel_all();
        self.teardown_audio();
        self.pending = None;
        self.session = None;
        self.enter(SessionState::Aborted);
        // no report round trip: straight back to Ready when still connected
        if self.conn.is_open() {
            self.enter(SessionState::Ready);
            self.presenter
                .status("Session aborted. Ready when you are.", false);
        }
    }

    // ---- timers ----

    fn on_timer(&mut self, event: TimerEvent) {
        if !self.timers.claim(&event) {
            return;
        }
        match event {
            TimerEvent::Tick {
                kind: TimerKind::Pitch,
                remaining,
                ..
            } => self.presenter.countdown(remaining),
            TimerEvent::Tick { .. } => {}
            TimerEvent::Expired {
                kind: TimerKind::Pitch,
                ..
            } => {
                info!("pitch countdown expired");
                // the response timer is subordinate to the pitch timer
                self.timers.cancel(TimerKind::Response);
                if self.state.in_conversation() {
                    self.begin_report(EndReason::TimerExpired);
                }
            }
            TimerEvent::Expired {
                kind: TimerKind::Response,
                ..
            } => self.on_response_timeout(),
        }
    }

    fn on_response_timeout(&mut self) {
        if !matches!(
            self.state,
            SessionState::Listening | SessionState::AwaitingConfirmation
        ) {
            return;
        }
        let spoke = self.session.as_ref().is_some_and(|s| s.has_spoken);
        if let Some(s) = self.session.as_mut() {
            s.response_expired = true;
            let entry = s.log.append(Speaker::System, Some(STALL_NOTE.to_string()));
            self.presenter.entry_added(entry);
        }
        self.send_control(ClientMessage::UserTimeout);
        let message = if spoke {
            "You took too long to respond. Review your answer and confirm, or reset to try again."
        } else {
            "You took too long to respond. Confirm to pass, or reset to try again."
        };
        self.presenter.status(message, true);
        // the turn is forced closed; an open recording is flushed, otherwise
        // the user gets the empty marker to confirm
        if self.state == SessionState::Listening {
            let utterance = self.segmenter.force_finish();
            self.utterance_finalized(utterance);
        }
    }

    // ---- network ----

    fn on_net(&mut self, event: NetEvent) {
        match event {
            NetEvent::Opened => {
                self.conn = ConnectionState::Open;
                self.reconnect_attempts = 0;
                if self.session.take().is_some() {
                    self.presenter.status(
                        "Reconnected. The interrupted session could not be resumed.",
                        true,
                    );
                }
                self.send_control(ClientMessage::GetHistory);
                self.enter(SessionState::Ready);
                self.presenter
                    .status("Connected. Describe your startup to begin.", false);
            }
            NetEvent::Closed { error } => self.on_closed(error),
            NetEvent::AuthFailed(message) => {
                warn!("credential refresh failed: {message}");
                self.conn = ConnectionState::Closed;
                self.timers.cancel_all();
                self.teardown_audio();
                self.pending = None;
                self.session = None;
                if self.state == SessionState::Connecting {
                    self.enter(SessionState::Idle);
                } else if self.state != SessionState::Idle {
                    self.enter(SessionState::Disconnected);
                }
                // no automatic retry: a person has to sign in again
                self.presenter.status(
                    &format!("Authentication failed: {message}. Please sign in again."),
                    true,
                );
            }
            NetEvent::Inbound(message) => self.on_message(message),
        }
    }

    fn on_closed(&mut self, error: Option<String>) {
        self.conn = ConnectionState::Closed;
        if matches!(
            self.state,
            SessionState::Idle | SessionState::ReportComplete | SessionState::Aborted
        ) {
            // terminal or never-connected: nothing worth reconnecting for
            return;
        }
        let had_session = self.session.is_some();
        if self.state != SessionState::Disconnected {
            self.enter(SessionState::Disconnected);
        }
        let detail = error.unwrap_or_else(|| "connection closed".to_string());
        self.presenter
            .status(&format!("Disconnected from the boardroom: {detail}"), true);

        if !had_session {
            // without a session reconnection is abandoned; the front end owns
            // the decision to dial again
            return;
        }
        if self.reconnect_attempts >= self.config.reconnect_max_attempts {
            warn!(
                attempts = self.reconnect_attempts,
                "giving up on reconnection"
            );
            self.presenter.status(
                "Could not restore the connection. The session was lost.",
                true,
            );
            self.session = None;
            return;
        }
        self.reconnect_attempts += 1;
        let delay = self.config.reconnect_delay(self.reconnect_attempts);
        info!(
            attempt = self.reconnect_attempts,
            delay_ms = delay.as_millis() as u64,
            "scheduling reconnect"
        );
        self.conn = ConnectionState::Connecting;
        let _ = self.client_commands.send(ClientCommand::Connect { delay });
    }

    fn on_message(&mut self, message: ServerMessage) {
        match message {
            ServerMessage::HistoryData { data } => self.presenter.history(&data),
            ServerMessage::Investor {
                investor_name,
                text,
            } => self.on_investor_turn(investor_name, text),
            ServerMessage::UserInterimTranscript { text } => {
                if self.state == SessionState::AwaitingConfirmation {
                    if let Some(p) = self.pending.as_mut() {
                        p.set_text(text.clone());
                    }
                    self.presenter.live_transcript(&text);
                } else {
                    debug!("interim transcript outside the confirmation window ignored");
                }
            }
            ServerMessage::AnalysisReport { data } => {
                if self.state != SessionState::GeneratingReport {
                    debug!("report delivery outside generating_report dropped as stale");
                    return;
                }
                self.presenter.active_investor(None);
                self.presenter.report_ready(&data);
                self.session = None;
                self.enter(SessionState::ReportComplete);
                self.presenter.status("Report ready.", false);
            }
            ServerMessage::SessionTerminated { reason, text } => {
                self.on_terminated(reason, text);
            }
            ServerMessage::Error { text } => {
                self.presenter.status(&text, true);
                if self.state == SessionState::Processing {
                    // the reply failed server-side; give the turn back
                    if let Some(s) = self.session.as_mut() {
                        s.response_expired = false;
                    }
                    self.enter(SessionState::Listening);
                }
            }
            ServerMessage::Unknown => {}
        }
    }

    fn on_investor_turn(&mut self, name: String, text: String) {
        if !self.state.in_conversation() {
            debug!("investor turn outside a conversation ignored");
            return;
        }
        if let Some(s) = self.session.as_mut() {
            s.response_expired = false;
            let entry = s.log.append(Speaker::Investor(name.clone()), Some(text));
            self.presenter.entry_added(entry);
        }
        self.presenter.active_investor(Some(&name));
        // a new investor turn supersedes an unconfirmed transcript
        self.pending = None;
        self.enter(SessionState::Listening);
        self.presenter.status("Listening for your response...", false);
    }

    fn on_terminated(&mut self, reason: Option<String>, text: Option<String>) {
        let shown = reason
            .or(text)
            .unwrap_or_else(|| "The investors have ended the meeting.".to_string());
        if !self.state.in_conversation() && self.state != SessionState::GeneratingReport {
            debug!("session_terminated outside a session ignored");
            return;
        }
        if let Some(s) = self.session.as_mut() {
            let entry = s
                .log
                .append(Speaker::System, Some(format!("Session ended by investor: {shown}")));
            self.presenter.entry_added(entry);
        }
        self.presenter
            .status(&format!("Session ended by the investors: {shown}"), true);
        self.enter(SessionState::SessionEnded);
        // the report round trip is still owed; the termination is its reason
        self.begin_report(EndReason::InvestorTerminated);
    }

    // ---- report & teardown ----

    fn begin_report(&mut self, reason: EndReason) {
        if self.state == SessionState::GeneratingReport {
            return;
        }
        if let Some(s) = self.session.as_mut() {
            s.end_reason = Some(reason);
        }
        // entry side effects stop capture before the request goes out
        self.enter(SessionState::GeneratingReport);
        self.presenter
            .status("Ending session... generating your report...", false);
        let already_sent = self.session.as_ref().is_none_or(|s| s.end_sent);
        if !already_sent {
            self.send_control(ClientMessage::EndSession { reason });
            if let Some(s) = self.session.as_mut() {
                s.end_sent = true;
            }
        }
    }

    /// Central transition point; entry side effects live here.
    fn enter(&mut self, next: SessionState) {
        debug!(from = %self.state, to = %next, "state transition");
        self.state = next;
        match next {
            SessionState::Listening => {
                // fresh turn: clear the live transcript, re-arm the segmenter
                self.presenter.live_transcript("");
                self.segmenter.rearm();
                let response_expired = self
                    .session
                    .as_ref()
                    .is_some_and(|s| s.response_expired);
                if let Some(s) = self.session.as_mut() {
                    s.has_spoken = false;
                }
                if !response_expired {
                    self.timers.arm_response(self.config.response_timeout());
                }
            }
            SessionState::GeneratingReport => {
                // capture stops unconditionally, even mid-recording: nothing
                // may be queued after end-of-session is requested
                self.teardown_audio();
                self.timers.cancel_all();
                self.pending = None;
            }
            SessionState::Disconnected | SessionState::SessionEnded | SessionState::Aborted => {
                self.timers.cancel_all();
                self.teardown_audio();
                self.pending = None;
            }
            _ => {}
        }
        self.presenter.state_changed(next);
    }

    /// Stop the device and drop any in-flight utterance. Synchronous: once
    /// this returns no capture callback can fire again.
    fn teardown_audio(&mut self) {
        if let Some(mut handle) = self.capture.take() {
            handle.stop();
        }
        self.segmenter.discard();
    }

    fn send_control(&mut self, message: ClientMessage) {
        if !self.conn.is_open() {
            warn!(?message, "control message dropped: connection not open");
            return;
        }
        let _ = self.outbound.send(OutboundFrame::Control(message));
    }

    fn send_audio(&mut self, bytes: Vec<u8>) {
        if !self.conn.is_open() {
            warn!("utterance audio dropped: connection not open");
            return;
        }
        let _ = self.outbound.send(OutboundFrame::Audio(bytes));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::SILENT_RESPONSE;
    use boardroom_voice::{AudioError, AudioFrame, AudioResult};
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct Recording {
        states: Vec<SessionState>,
        statuses: Vec<(String, bool)>,
        entries: Vec<String>,
        transcripts: Vec<String>,
        countdowns: Vec<Duration>,
        reports: Vec<serde_json::Value>,
    }

    #[derive(Clone)]
    struct RecordingPresenter(Arc<Mutex<Recording>>);

    impl Presenter for RecordingPresenter {
        fn state_changed(&mut self, state: SessionState) {
            self.0.lock().unwrap().states.push(state);
        }
        fn status(&mut self, message: &str, is_error: bool) {
            self.0
                .lock()
                .unwrap()
                .statuses
                .push((message.to_string(), is_error));
        }
        fn entry_added(&mut self, entry: &crate::transcript::ConversationEntry) {
            let text = entry.text.clone().unwrap_or_default();
            self.0
                .lock()
                .unwrap()
                .entries
                .push(format!("{}: {}", entry.speaker, text));
        }
        fn live_transcript(&mut self, text: &str) {
            self.0.lock().unwrap().transcripts.push(text.to_string());
        }
        fn countdown(&mut self, remaining: Duration) {
            self.0.lock().unwrap().countdowns.push(remaining);
        }
        fn active_investor(&mut self, _name: Option<&str>) {}
        fn report_ready(&mut self, report: &serde_json::Value) {
            self.0.lock().unwrap().reports.push(report.clone());
        }
        fn history(&mut self, _data: &serde_json::Value) {}
    }

    struct FakeMicrophone;
    impl Microphone for FakeMicrophone {
        fn open(
            &mut self,
            _frames: mpsc::UnboundedSender<AudioFrame>,
        ) -> AudioResult<CaptureHandle> {
            Ok(CaptureHandle::detached())
        }
    }

    struct DeniedMicrophone;
    impl Microphone for DeniedMicrophone {
        fn open(
            &mut self,
            _frames: mpsc::UnboundedSender<AudioFrame>,
        ) -> AudioResult<CaptureHandle> {
            Err(AudioError::Device("permission denied".to_string()))
        }
    }

    struct Harness {
        controller: SessionController<RecordingPresenter>,
        outbound: mpsc::UnboundedReceiver<OutboundFrame>,
        commands: mpsc::UnboundedReceiver<ClientCommand>,
        record: Arc<Mutex<Recording>>,
    }

    impl Harness {
        fn new() -> Self {
            Self::with_mic(Box::new(FakeMicrophone))
        }

        fn with_mic(mic: Box<dyn Microphone>) -> Self {
            let record = Arc::new(Mutex::new(Recording::default()));
            let (events_tx, events_rx) = mpsc::unbounded_channel();
            let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
            let (command_tx, command_rx) = mpsc::unbounded_channel();
            let controller = SessionController::assemble(
                SessionConfig::default(),
                mic,
                RecordingPresenter(record.clone()),
                outbound_tx,
                command_tx,
                events_tx,
                events_rx,
            );
            Self {
                controller,
                outbound: outbound_rx,
                commands: command_rx,
                record,
            }
        }

        /// Let spawned timer tasks run under the paused clock, then apply
        /// everything queued.
        async fn settle(&mut self) {
            for _ in 0..8 {
                tokio::task::yield_now().await;
            }
            while let Ok(event) = self.controller.events_rx.try_recv() {
                self.controller.process(event);
            }
        }

        fn open(&mut self) {
            self.controller.process(SessionEvent::Ui(UiCommand::Connect));
            self.controller.process(SessionEvent::Net(NetEvent::Opened));
        }

        fn details(mode: Mode) -> StartupDetails {
            StartupDetails {
                name: "Golden Kitty Ventures".to_string(),
                pitch: "Stripe for cat treats".to_string(),
                problem: "Restocking is manual".to_string(),
                mode,
                profile_id: None,
            }
        }

        fn start(&mut self, mode: Mode) {
            self.controller
                .process(SessionEvent::Ui(UiCommand::StartSession {
                    details: Self::details(mode),
                }));
        }

        fn frame(&mut self, level: f32) {
            self.controller.process(SessionEvent::Frame(AudioFrame {
                samples: vec![level; 480],
                sample_rate: 16000,
            }));
        }

        fn inbound(&mut self, message: ServerMessage) {
            self.controller
                .process(SessionEvent::Net(NetEvent::Inbound(message)));
        }

        fn drain_outbound(&mut self) -> (Vec<ClientMessage>, usize) {
            let mut control = Vec::new();
            let mut audio = 0;
            while let Ok(frame) = self.outbound.try_recv() {
                match frame {
                    OutboundFrame::Control(msg) => control.push(msg),
                    OutboundFrame::Audio(_) => audio += 1,
                }
            }
            (control, audio)
        }

        fn drain_commands(&mut self) -> Vec<ClientCommand> {
            let mut commands = Vec::new();
            while let Ok(command) = self.commands.try_recv() {
                commands.push(command);
            }
            commands
        }

        fn end_session_count(&self, control: &[ClientMessage], reason: EndReason) -> usize {
            control
                .iter()
                .filter(|m| matches!(m, ClientMessage::EndSession { reason: r } if *r == reason))
                .count()
        }

        fn states(&self) -> Vec<SessionState> {
            self.record.lock().unwrap().states.clone()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn connect_then_open_reaches_ready() {
        let mut h = Harness::new();
        h.open();
        assert_eq!(h.controller.state(), SessionState::Ready);
        let (control, _) = h.drain_outbound();
        assert!(control.contains(&ClientMessage::GetHistory));
        let commands = h.drain_commands();
        assert!(matches!(
            commands.as_slice(),
            [ClientCommand::Connect { delay }] if delay.is_zero()
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn microphone_failure_surfaces_and_stays_ready() {
        let mut h = Harness::with_mic(Box::new(DeniedMicrophone));
        h.open();
        h.start(Mode::Strict);
        assert_eq!(h.controller.state(), SessionState::Ready);
        assert!(h.controller.mode().is_none());
        let (control, audio) = h.drain_outbound();
        assert_eq!(audio, 0);
        assert!(!control
            .iter()
            .any(|m| matches!(m, ClientMessage::StartupDetails { .. })));
        let record = h.record.lock().unwrap();
        assert!(record
            .statuses
            .iter()
            .any(|(m, e)| *e && m.contains("microphone")));
    }

    #[tokio::test(start_paused = true)]
    async fn strict_start_enters_listening_with_both_timers() {
        let mut h = Harness::new();
        h.open();
        h.start(Mode::Strict);
        assert_eq!(h.controller.state(), SessionState::Listening);
        assert_eq!(h.controller.mode(), Some(Mode::Strict));
        assert!(h.controller.timers.is_running(TimerKind::Pitch));
        assert!(h.controller.timers.is_running(TimerKind::Response));
        let (control, _) = h.drain_outbound();
        assert!(control
            .iter()
            .any(|m| matches!(m, ClientMessage::StartupDetails { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn drill_start_waits_for_the_first_question() {
        let mut h = Harness::new();
        h.open();
        h.start(Mode::Drill);
        assert_eq!(h.controller.state(), SessionState::Processing);
        assert!(!h.controller.timers.is_running(TimerKind::Pitch));
        assert!(!h.controller.timers.is_running(TimerKind::Response));
    }

    // Scenario A: strict mode, pitch duration elapsed with no prior end.
    #[tokio::test(start_paused = true)]
    async fn pitch_expiry_sends_exactly_one_end_session() {
        let mut h = Harness::new();
        h.open();
        h.start(Mode::Strict);

        tokio::time::sleep(Duration::from_secs(121)).await;
        h.settle().await;

        assert_eq!(h.controller.state(), SessionState::GeneratingReport);
        let (control, _) = h.drain_outbound();
        assert_eq!(h.end_session_count(&control, EndReason::TimerExpired), 1);
        assert!(!h.controller.timers.is_running(TimerKind::Pitch));
        assert!(!h.controller.timers.is_running(TimerKind::Response));

        // no further timer callbacks are observable
        tokio::time::sleep(Duration::from_secs(300)).await;
        h.settle().await;
        let (control, _) = h.drain_outbound();
        assert_eq!(h.end_session_count(&control, EndReason::TimerExpired), 0);

        h.inbound(ServerMessage::AnalysisReport {
            data: serde_json::json!({"default_alive_dead": "Default Dead"}),
        });
        assert_eq!(h.controller.state(), SessionState::ReportComplete);
        assert!(h.controller.mode().is_none());
        assert_eq!(h.record.lock().unwrap().reports.len(), 1);
    }

    // Scenario B: onset, 2s of speech, 1.5s of silence -> one upload.
    #[tokio::test(start_paused = true)]
    async fn utterance_is_uploaded_once_and_awaits_confirmation() {
        let mut h = Harness::new();
        h.open();
        h.start(Mode::Strict);
        h.drain_outbound();

        h.frame(0.1);
        for _ in 0..66 {
            h.frame(0.05);
        }
        for _ in 0..50 {
            h.frame(0.0);
        }

        assert_eq!(h.controller.state(), SessionState::AwaitingConfirmation);
        let (control, audio) = h.drain_outbound();
        assert_eq!(audio, 1);
        assert!(control.contains(&ClientMessage::ProcessInterimTranscript));

        // trailing frames do not produce a second upload
        for _ in 0..50 {
            h.frame(0.1);
        }
        let (_, audio) = h.drain_outbound();
        assert_eq!(audio, 0);

        h.inbound(ServerMessage::UserInterimTranscript {
            text: "We sell cat treats.".to_string(),
        });
        h.controller.process(SessionEvent::Ui(UiCommand::Confirm));
        assert_eq!(h.controller.state(), SessionState::Processing);
        assert!(!h.controller.timers.is_running(TimerKind::Response));
        let (control, _) = h.drain_outbound();
        assert!(control.contains(&ClientMessage::SendComposedText {
            text: "We sell cat treats.".to_string()
        }));
    }

    // Scenario C: response deadline with no speech at all.
    #[tokio::test(start_paused = true)]
    async fn response_timeout_synthesizes_a_confirmable_empty_turn() {
        let mut h = Harness::new();
        h.open();
        h.start(Mode::Strict);
        h.drain_outbound();

        tokio::time::sleep(Duration::from_secs(31)).await;
        h.settle().await;

        assert_eq!(h.controller.state(), SessionState::AwaitingConfirmation);
        let (control, audio) = h.drain_outbound();
        assert_eq!(audio, 0, "no zero-length recording upload");
        assert!(control.contains(&ClientMessage::UserTimeout));
        assert!(h
            .record
            .lock()
            .unwrap()
            .entries
            .iter()
            .any(|e| e.starts_with("System:")));

        h.controller.process(SessionEvent::Ui(UiCommand::Confirm));
        let (control, _) = h.drain_outbound();
        assert!(control.contains(&ClientMessage::SendComposedText {
            text: SILENT_RESPONSE.to_string()
        }));
    }

    // Scenario D: the investors hang up while we await their reply.
    #[tokio::test(start_paused = true)]
    async fn termination_while_processing_requests_the_report() {
        let mut h = Harness::new();
        h.open();
        h.start(Mode::Drill);
        h.drain_outbound();

        h.inbound(ServerMessage::SessionTerminated {
            reason: Some("This is a waste of time.".to_string()),
            text: None,
        });

        let states = h.states();
        let ended = states
            .iter()
            .position(|s| *s == SessionState::SessionEnded)
            .expect("SessionEnded visited");
        assert_eq!(states.get(ended + 1), Some(&SessionState::GeneratingReport));
        let (control, _) = h.drain_outbound();
        assert_eq!(
            h.end_session_count(&control, EndReason::InvestorTerminated),
            1
        );
    }

    #[tokio::test(start_paused = true)]
    async fn confirm_and_reset_outside_confirmation_are_noops() {
        let mut h = Harness::new();
        h.open();
        h.start(Mode::Strict);
        h.drain_outbound();

        h.controller.process(SessionEvent::Ui(UiCommand::Confirm));
        h.controller.process(SessionEvent::Ui(UiCommand::Reset));
        assert_eq!(h.controller.state(), SessionState::Listening);
        let (control, audio) = h.drain_outbound();
        assert!(control.is_empty());
        assert_eq!(audio, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn reset_discards_pending_and_rearms_the_segmenter() {
        let mut h = Harness::new();
        h.open();
        h.start(Mode::Strict);
        h.frame(0.1);
        h.controller
            .process(SessionEvent::Ui(UiCommand::FinishSpeaking));
        assert_eq!(h.controller.state(), SessionState::AwaitingConfirmation);

        h.controller.process(SessionEvent::Ui(UiCommand::Reset));
        assert_eq!(h.controller.state(), SessionState::Listening);
        assert!(h.controller.pending.is_none());
        // a fresh onset opens a new utterance
        h.frame(0.1);
        assert!(h.controller.segmenter.has_open_utterance());
    }

    #[tokio::test(start_paused = true)]
    async fn reset_after_timeout_does_not_rearm_the_response_timer() {
        let mut h = Harness::new();
        h.open();
        h.start(Mode::Strict);
        tokio::time::sleep(Duration::from_secs(31)).await;
        h.settle().await;
        assert_eq!(h.controller.state(), SessionState::AwaitingConfirmation);

        h.controller.process(SessionEvent::Ui(UiCommand::Reset));
        assert_eq!(h.controller.state(), SessionState::Listening);
        assert!(!h.controller.timers.is_running(TimerKind::Response));

        // the next investor turn starts a fresh deadline
        h.inbound(ServerMessage::Investor {
            investor_name: "Maria Santos".to_string(),
            text: "Talk margins.".to_string(),
        });
        assert!(h.controller.timers.is_running(TimerKind::Response));
    }

    #[tokio::test(start_paused = true)]
    async fn investor_turn_supersedes_an_unconfirmed_transcript() {
        let mut h = Harness::new();
        h.open();
        h.start(Mode::Strict);
        h.frame(0.1);
        h.controller
            .process(SessionEvent::Ui(UiCommand::FinishSpeaking));
        h.inbound(ServerMessage::UserInterimTranscript {
            text: "half an answer".to_string(),
        });

        h.inbound(ServerMessage::Investor {
            investor_name: "Ben Carter".to_string(),
            text: "Let me stop you there.".to_string(),
        });
        assert_eq!(h.controller.state(), SessionState::Listening);
        assert!(h.controller.pending.is_none());

        // the stale confirm is now a no-op
        h.drain_outbound();
        h.controller.process(SessionEvent::Ui(UiCommand::Confirm));
        let (control, _) = h.drain_outbound();
        assert!(control.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn finish_speaking_flushes_an_open_recording_immediately() {
        let mut h = Harness::new();
        h.open();
        h.start(Mode::Strict);
        h.drain_outbound();

        h.frame(0.1);
        h.frame(0.05);
        h.controller
            .process(SessionEvent::Ui(UiCommand::FinishSpeaking));
        assert_eq!(h.controller.state(), SessionState::AwaitingConfirmation);
        let (control, audio) = h.drain_outbound();
        assert_eq!(audio, 1);
        assert!(control.contains(&ClientMessage::ProcessInterimTranscript));
    }

    #[tokio::test(start_paused = true)]
    async fn disconnect_with_a_session_schedules_reconnects_with_growing_delay() {
        let mut h = Harness::new();
        h.open();
        h.start(Mode::Strict);
        h.drain_commands();

        h.controller.process(SessionEvent::Net(NetEvent::Closed {
            error: Some("reset by peer".to_string()),
        }));
        assert_eq!(h.controller.state(), SessionState::Disconnected);
        assert!(h.controller.capture.is_none());
        assert!(!h.controller.timers.is_running(TimerKind::Pitch));
        assert!(!h.controller.timers.is_running(TimerKind::Response));
        let commands = h.drain_commands();
        assert!(matches!(
            commands.as_slice(),
            [ClientCommand::Connect { delay }] if *delay == Duration::from_secs(3)
        ));

        // the retry fails too; the next delay grows
        h.controller
            .process(SessionEvent::Net(NetEvent::Closed { error: None }));
        let commands = h.drain_commands();
        assert!(matches!(
            commands.as_slice(),
            [ClientCommand::Connect { delay }] if *delay == Duration::from_secs(6)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn no_reconnect_after_report_complete_or_abort() {
        let mut h = Harness::new();
        h.open();
        h.start(Mode::Strict);
        h.controller.process(SessionEvent::Ui(UiCommand::EndSession));
        h.inbound(ServerMessage::AnalysisReport {
            data: serde_json::json!({}),
        });
        assert_eq!(h.controller.state(), SessionState::ReportComplete);
        h.drain_commands();

        h.controller
            .process(SessionEvent::Net(NetEvent::Closed { error: None }));
        assert!(h.drain_commands().is_empty());
        assert_eq!(h.controller.state(), SessionState::ReportComplete);

        // same for an aborted session
        let mut h = Harness::new();
        h.open();
        h.start(Mode::Strict);
        h.controller.process(SessionEvent::Ui(UiCommand::Abort));
        h.drain_commands();
        // drop the link while sitting in Ready after the abort
        h.controller
            .process(SessionEvent::Net(NetEvent::Closed { error: None }));
        assert!(h.drain_commands().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn abort_resets_locally_without_a_network_round_trip() {
        let mut h = Harness::new();
        h.open();
        h.start(Mode::Strict);
        h.frame(0.1);
        h.drain_outbound();

        h.controller.process(SessionEvent::Ui(UiCommand::Abort));
        let states = h.states();
        assert!(states.contains(&SessionState::Aborted));
        assert_eq!(states.last(), Some(&SessionState::Ready));
        assert!(h.controller.mode().is_none());
        assert!(h.controller.capture.is_none());
        let (control, audio) = h.drain_outbound();
        assert_eq!(audio, 0);
        assert!(!control
            .iter()
            .any(|m| matches!(m, ClientMessage::EndSession { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn server_error_while_processing_returns_to_listening() {
        let mut h = Harness::new();
        h.open();
        h.start(Mode::Drill);
        h.inbound(ServerMessage::Error {
            text: "model overloaded".to_string(),
        });
        assert_eq!(h.controller.state(), SessionState::Listening);
        let record = h.record.lock().unwrap();
        assert!(record.statuses.iter().any(|(m, e)| *e && m.contains("overloaded")));
    }

    #[tokio::test(start_paused = true)]
    async fn auth_failure_stops_reconnection_until_reauth() {
        let mut h = Harness::new();
        h.open();
        h.start(Mode::Strict);
        h.controller
            .process(SessionEvent::Net(NetEvent::Closed { error: None }));
        assert_eq!(h.drain_commands().len(), 1);

        h.controller.process(SessionEvent::Net(NetEvent::AuthFailed(
            "token expired".to_string(),
        )));
        assert_eq!(h.controller.state(), SessionState::Disconnected);
        assert!(h.controller.mode().is_none());

        // nothing further is dialed on a subsequent close
        h.controller
            .process(SessionEvent::Net(NetEvent::Closed { error: None }));
        assert!(h.drain_commands().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn stale_report_deliveries_are_dropped() {
        let mut h = Harness::new();
        h.open();
        h.start(Mode::Strict);
        h.inbound(ServerMessage::AnalysisReport {
            data: serde_json::json!({"stale": true}),
        });
        assert_eq!(h.controller.state(), SessionState::Listening);
        assert!(h.record.lock().unwrap().reports.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn termination_during_report_generation_does_not_resend_end_session() {
        let mut h = Harness::new();
        h.open();
        h.start(Mode::Strict);
        h.controller.process(SessionEvent::Ui(UiCommand::EndSession));
        assert_eq!(h.controller.state(), SessionState::GeneratingReport);

        h.inbound(ServerMessage::SessionTerminated {
            reason: Some("Done here.".to_string()),
            text: None,
        });
        assert_eq!(h.controller.state(), SessionState::GeneratingReport);
        let (control, _) = h.drain_outbound();
        assert_eq!(h.end_session_count(&control, EndReason::UserEnded), 1);
        assert_eq!(
            h.end_session_count(&control, EndReason::InvestorTerminated),
            0
        );

        // the report still lands normally
        h.inbound(ServerMessage::AnalysisReport {
            data: serde_json::json!({}),
        });
        assert_eq!(h.controller.state(), SessionState::ReportComplete);
    }

    #[tokio::test(start_paused = true)]
    async fn a_new_session_can_start_after_the_report() {
        let mut h = Harness::new();
        h.open();
        h.start(Mode::Strict);
        h.controller.process(SessionEvent::Ui(UiCommand::EndSession));
        h.inbound(ServerMessage::AnalysisReport {
            data: serde_json::json!({}),
        });
        assert_eq!(h.controller.state(), SessionState::ReportComplete);

        h.start(Mode::Drill);
        assert_eq!(h.controller.state(), SessionState::Processing);
        assert_eq!(h.controller.mode(), Some(Mode::Drill));
    }

    #[tokio::test(start_paused = true)]
    async fn frames_outside_listening_are_ignored() {
        let mut h = Harness::new();
        h.open();
        h.start(Mode::Drill);
        // still waiting for the first question
        h.frame(0.9);
        assert!(!h.controller.segmenter.has_open_utterance());
        let (_, audio) = h.drain_outbound();
        assert_eq!(audio, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn pitch_ticks_reach_the_presenter() {
        let mut h = Harness::new();
        h.open();
        h.start(Mode::Strict);
        tokio::time::sleep(Duration::from_secs(3)).await;
        h.settle().await;
        let countdowns = h.record.lock().unwrap().countdowns.clone();
        assert!(countdowns.contains(&Duration::from_secs(120)));
        assert!(countdowns.len() >= 3);
    }
}
