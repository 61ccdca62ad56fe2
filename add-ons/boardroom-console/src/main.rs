//! Boardroom Console
//!
//! A line-based front end for practice sessions: prints the session through a
//! `Presenter` and turns stdin lines into controller commands. Mostly useful
//! for exercising the session logic end to end without a GUI.

use anyhow::Result;
use boardroom_session::{
    CredentialSource, HttpCredentialSource, Mode, Presenter, SessionConfig, SessionController,
    SessionHandle, SessionState, StartupDetails, StaticCredentials, UiCommand,
};
use boardroom_voice::CpalMicrophone;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Prints everything the controller surfaces.
struct ConsolePresenter;

impl Presenter for ConsolePresenter {
    fn state_changed(&mut self, state: SessionState) {
        println!("-- [{state}]");
    }

    fn status(&mut self, message: &str, is_error: bool) {
        if is_error {
            println!("!! {message}");
        } else {
            println!("-- {message}");
        }
    }

    fn entry_added(&mut self, entry: &boardroom_session::ConversationEntry) {
        let text = entry.text.as_deref().unwrap_or("...");
        println!("[{:>4}s] {}: {}", entry.offset.as_secs(), entry.speaker, text);
    }

    fn live_transcript(&mut self, text: &str) {
        if !text.is_empty() {
            println!(">> {text}");
        }
    }

    fn countdown(&mut self, remaining: Duration) {
        if remaining.as_secs() % 15 == 0 || remaining.as_secs() <= 10 {
            println!("-- {}s left", remaining.as_secs());
        }
    }

    fn active_investor(&mut self, name: Option<&str>) {
        if let Some(name) = name {
            println!("-- {name} is speaking");
        }
    }

    fn report_ready(&mut self, report: &serde_json::Value) {
        println!("==== PITCH ANALYSIS ====");
        println!(
            "{}",
            serde_json::to_string_pretty(report).unwrap_or_else(|_| report.to_string())
        );
    }

    fn history(&mut self, data: &serde_json::Value) {
        let count = data.as_array().map(Vec::len).unwrap_or(0);
        println!("-- {count} past session(s) on record");
    }
}

fn credentials_from_env() -> Arc<dyn CredentialSource> {
    match std::env::var("BOARDROOM_TOKEN_URL") {
        Ok(url) => {
            let refresh = std::env::var("BOARDROOM_REFRESH_TOKEN").unwrap_or_default();
            Arc::new(HttpCredentialSource::new(url, refresh))
        }
        Err(_) => {
            let token = std::env::var("BOARDROOM_AUTH_TOKEN").unwrap_or_default();
            Arc::new(StaticCredentials::new(token))
        }
    }
}

fn print_help() {
    println!("commands:");
    println!("  start <name> | <one-line pitch> | <problem> [--drill]");
    println!("  done     finish speaking");
    println!("  ok       confirm the transcript");
    println!("  redo     discard the transcript and retry");
    println!("  end      end the session and get the report");
    println!("  abort    drop the session without a report");
    println!("  history  fetch past sessions");
    println!("  quit");
}

fn handle_line(line: &str, handle: &SessionHandle) -> bool {
    let line = line.trim();
    match line {
        "" => {}
        "done" => handle.command(UiCommand::FinishSpeaking),
        "ok" => handle.command(UiCommand::Confirm),
        "redo" => handle.command(UiCommand::Reset),
        "end" => handle.command(UiCommand::EndSession),
        "abort" => handle.command(UiCommand::Abort),
        "history" => handle.command(UiCommand::FetchHistory),
        "help" => print_help(),
        "quit" | "exit" => return false,
        _ => {
            if let Some(rest) = line.strip_prefix("start ") {
                let mode = if rest.ends_with("--drill") {
                    Mode::Drill
                } else {
                    Mode::Strict
                };
                let rest = rest.trim_end_matches("--drill").trim();
                let parts: Vec<&str> = rest.split('|').map(str::trim).collect();
                if parts.len() != 3 || parts.iter().any(|p| p.is_empty()) {
                    println!("!! usage: start <name> | <pitch> | <problem> [--drill]");
                    return true;
                }
                handle.command(UiCommand::StartSession {
                    details: StartupDetails {
                        name: parts[0].to_string(),
                        pitch: parts[1].to_string(),
                        problem: parts[2].to_string(),
                        mode,
                        profile_id: None,
                    },
                });
            } else {
                println!("!! unknown command (try 'help')");
            }
        }
    }
    true
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (before any env::var calls)
    if let Err(e) = dotenvy::dotenv() {
        eprintln!("[boardroom-console] .env not loaded: {e} (using system environment)");
    }

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = SessionConfig::from_env();
    let mic = Box::new(CpalMicrophone::new(config.capture()));
    let credentials = credentials_from_env();

    let (controller, client) = SessionController::new(config, mic, ConsolePresenter, credentials);
    let handle = controller.handle();

    tokio::spawn(client.run());
    let controller_task = tokio::spawn(controller.run());

    handle.command(UiCommand::Connect);
    print_help();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                match line? {
                    Some(line) => {
                        if !handle_line(&line, &handle) {
                            break;
                        }
                    }
                    None => break,
                }
            }
            _ = tokio::signal::ctrl_c() => {
                println!();
                break;
            }
        }
    }

    drop(handle);
    controller_task.abort();
    Ok(())
}
