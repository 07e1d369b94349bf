//! Operator surfaces: a status logger and an optional stdin console.

use log::{debug, info, warn};
use std::io::BufRead;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_graceful_shutdown::SubsystemHandle;

use navcast_core::{SentenceFamily, SessionStatus};

use crate::session::{SessionError, SessionHandle};

#[derive(Error, Debug)]
pub enum ConsoleError {
    #[error(transparent)]
    Session(#[from] SessionError),
}

/// A line typed on the console.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsoleCommand {
    Start,
    Stop,
    Toggle,
    Status,
    Help,
    Quit,
}

impl ConsoleCommand {
    pub fn parse(line: &str) -> Option<Self> {
        match line.trim().to_ascii_lowercase().as_str() {
            "start" => Some(ConsoleCommand::Start),
            "stop" => Some(ConsoleCommand::Stop),
            "toggle" | "t" => Some(ConsoleCommand::Toggle),
            "status" | "s" => Some(ConsoleCommand::Status),
            "help" | "h" | "?" => Some(ConsoleCommand::Help),
            "quit" | "exit" | "q" => Some(ConsoleCommand::Quit),
            _ => None,
        }
    }
}

const HELP: &str = "Commands: start, stop, toggle (t), status (s), quit (q)";

/// Multi-line status summary.
pub fn describe(status: &SessionStatus) -> String {
    let mut out = format!(
        "{}, {}",
        if status.is_sending { "Sending" } else { "Not sending" },
        status.connection_status
    );
    let last = &status.last_sent;
    if let (Some(time), Some(lat), Some(lon)) = (last.time, last.latitude, last.longitude) {
        out.push_str(&format!(
            "\n  last position {:.6},{:.6} at {}",
            lat,
            lon,
            time.format("%H:%M:%S")
        ));
    }
    if let Some(heading) = last.heading {
        out.push_str(&format!("\n  last heading {:.1}°", heading));
    }
    for family in SentenceFamily::ALL {
        if let Some(line) = last.sentence(family) {
            out.push_str(&format!("\n  {}", line.trim_end()));
        }
    }
    for error in status.errors.iter() {
        out.push_str(&format!("\n  {}", error));
    }
    out
}

/// Log status changes until shutdown.
pub async fn report_status(
    subsys: SubsystemHandle,
    handle: SessionHandle,
    show_errors: bool,
) -> Result<(), ConsoleError> {
    let mut rx = handle.subscribe();
    let mut previous = rx.borrow_and_update().clone();

    loop {
        tokio::select! {
            _ = subsys.on_shutdown_requested() => {
                debug!("Status reporter shutdown");
                return Ok(());
            },
            changed = rx.changed() => {
                if changed.is_err() {
                    return Ok(());
                }
                let status = rx.borrow_and_update().clone();

                if status.connection_status != previous.connection_status
                    || status.is_sending != previous.is_sending
                {
                    info!(
                        "{}, {}",
                        if status.is_sending { "Sending" } else { "Not sending" },
                        status.connection_status
                    );
                }
                if status.last_sent.time != previous.last_sent.time {
                    if let (Some(lat), Some(lon)) =
                        (status.last_sent.latitude, status.last_sent.longitude)
                    {
                        debug!("Sent position {:.6},{:.6}", lat, lon);
                    }
                }
                if show_errors && status.errors != previous.errors {
                    for error in status.errors.iter() {
                        warn!("{}", error);
                    }
                }
                previous = status;
            },
        }
    }
}

/// Read commands from stdin until shutdown or `quit`.
///
/// Stdin is read on a plain thread so a blocked read never holds up
/// runtime shutdown.
pub async fn run(subsys: SubsystemHandle, handle: SessionHandle) -> Result<(), ConsoleError> {
    let (tx, mut lines) = mpsc::channel::<String>(8);
    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            if tx.blocking_send(line).is_err() {
                break;
            }
        }
    });

    info!("{}", HELP);
    loop {
        let line = tokio::select! {
            _ = subsys.on_shutdown_requested() => return Ok(()),
            line = lines.recv() => match line {
                Some(line) => line,
                None => {
                    debug!("Console input closed");
                    return Ok(());
                }
            },
        };
        if line.trim().is_empty() {
            continue;
        }

        match ConsoleCommand::parse(&line) {
            Some(ConsoleCommand::Start) => handle.start().await?,
            Some(ConsoleCommand::Stop) => handle.stop().await?,
            Some(ConsoleCommand::Toggle) => handle.toggle().await?,
            Some(ConsoleCommand::Status) => info!("{}", describe(&handle.status())),
            Some(ConsoleCommand::Help) => info!("{}", HELP),
            Some(ConsoleCommand::Quit) => {
                subsys.request_shutdown();
                return Ok(());
            }
            None => warn!("Unknown command '{}'. {}", line.trim(), HELP),
        }
    }
}
