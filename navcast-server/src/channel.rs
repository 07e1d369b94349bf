//! Datagram channel: one outbound connection and its state machine.
//!
//! Each channel runs as its own tokio task. It opens the transport, drives
//! [`ConnectionStateMachine`] and reports every state change and every write
//! completion back to its owner as a [`ChannelEvent`], tagged with the
//! channel's generation so the owner can tell a live channel from one it has
//! already abandoned.
//!
//! Channels are never reused. Reconnecting means cancelling the old one and
//! opening a fresh one.
//!
//! ```text
//!   owner ── write(line, tag) ──▶ queue ──▶ ChannelTask ──▶ DatagramLink
//!     ▲                                         │
//!     └──────────── ChannelEvent ◀──────────────┘
//! ```

use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use navcast_core::{ChannelError, ChannelState, ConnectionStateMachine, Endpoint};

use crate::transport::{DatagramLink, DatagramTransport};

/// Notification from a channel to its owner.
#[derive(Debug, Clone)]
pub enum ChannelEvent<T> {
    /// The channel entered `state`
    State { generation: u64, state: ChannelState },
    /// A write finished, successfully or not
    Written {
        generation: u64,
        line: String,
        tag: T,
        result: Result<usize, ChannelError>,
    },
}

impl<T> ChannelEvent<T> {
    pub fn generation(&self) -> u64 {
        match self {
            ChannelEvent::State { generation, .. } | ChannelEvent::Written { generation, .. } => {
                *generation
            }
        }
    }
}

struct Outgoing<T> {
    line: String,
    tag: T,
}

/// Handle to a running channel task.
///
/// `T` is an opaque tag handed back with the write completion.
pub struct DatagramChannel<T> {
    generation: u64,
    endpoint: Endpoint,
    write_tx: mpsc::UnboundedSender<Outgoing<T>>,
    events: mpsc::UnboundedSender<ChannelEvent<T>>,
    cancel: CancellationToken,
}

impl<T: Send + 'static> DatagramChannel<T> {
    /// Spawn a channel task and start opening `endpoint`.
    pub fn open(
        generation: u64,
        endpoint: Endpoint,
        transport: Arc<dyn DatagramTransport>,
        events: mpsc::UnboundedSender<ChannelEvent<T>>,
    ) -> Self {
        let (write_tx, write_rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();

        let task = ChannelTask {
            generation,
            endpoint: endpoint.clone(),
            transport,
            events: events.clone(),
            write_rx,
            cancel: cancel.clone(),
            machine: ConnectionStateMachine::new(),
            started: Instant::now(),
        };
        tokio::spawn(task.run());

        DatagramChannel {
            generation,
            endpoint,
            write_tx,
            events,
            cancel,
        }
    }

    /// Queue one wire-ready line.
    ///
    /// Lines written while the channel is still connecting go out once it is
    /// ready. The completion always arrives as a [`ChannelEvent::Written`].
    pub fn write(&self, line: String, tag: T) {
        if let Err(mpsc::error::SendError(out)) = self.write_tx.send(Outgoing { line, tag }) {
            let _ = self.events.send(ChannelEvent::Written {
                generation: self.generation,
                line: out.line,
                tag: out.tag,
                result: Err(ChannelError::Send("Channel is closed".to_string())),
            });
        }
    }
}

impl<T> DatagramChannel<T> {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Move the channel to `Cancelled`. Writes already on the wire finish.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }
}

impl<T> Drop for DatagramChannel<T> {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

struct ChannelTask<T> {
    generation: u64,
    endpoint: Endpoint,
    transport: Arc<dyn DatagramTransport>,
    events: mpsc::UnboundedSender<ChannelEvent<T>>,
    write_rx: mpsc::UnboundedReceiver<Outgoing<T>>,
    cancel: CancellationToken,
    machine: ConnectionStateMachine,
    started: Instant,
}

impl<T: Send + 'static> ChannelTask<T> {
    async fn run(mut self) {
        let now = self.now_ms();
        if self.machine.open(now) {
            self.emit_state();
        }
        log::debug!("{}: opening channel #{}", self.endpoint, self.generation);

        let transport = self.transport.clone();
        let opened = tokio::select! {
            _ = self.cancel.cancelled() => None,
            r = transport.open(&self.endpoint) => Some(r),
        };

        match opened {
            None => return self.cancelled(),
            Some(Ok(link)) => {
                let now = self.now_ms();
                if self.machine.ready(now) {
                    log::info!("{}: channel #{} ready", self.endpoint, self.generation);
                    self.emit_state();
                }
                if self.send_loop(link.as_ref()).await {
                    return self.cancelled();
                }
            }
            Some(Err(e)) => {
                log::warn!("{}: channel #{} open failed: {}", self.endpoint, self.generation, e);
                self.apply_error(e);
            }
        }

        // Waiting or failed: the owner decides what happens next
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => return self.cancelled(),
                out = self.write_rx.recv() => match out {
                    Some(out) => self.reject(out),
                    None => return self.cancelled(),
                },
            }
        }
    }

    /// Write queued lines while ready. Returns true when cancelled.
    async fn send_loop(&mut self, link: &dyn DatagramLink) -> bool {
        loop {
            let out = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return true,
                out = self.write_rx.recv() => match out {
                    Some(out) => out,
                    None => return true,
                },
            };

            let result = link.send(out.line.as_bytes()).await;
            log::trace!("{}: sent {:?} -> {:?}", self.endpoint, out.line.trim_end(), result);

            let state_error = match &result {
                Err(e @ (ChannelError::Waiting(_) | ChannelError::Fatal(_))) => Some(e.clone()),
                _ => None,
            };
            let _ = self.events.send(ChannelEvent::Written {
                generation: self.generation,
                line: out.line,
                tag: out.tag,
                result: result.map_err(|e| ChannelError::Send(e.detail().to_string())),
            });

            if let Some(e) = state_error {
                log::warn!("{}: channel #{} {}", self.endpoint, self.generation, e);
                self.apply_error(e);
            }
            if !self.machine.state().can_send() {
                return false;
            }
        }
    }

    fn reject(&self, out: Outgoing<T>) {
        let _ = self.events.send(ChannelEvent::Written {
            generation: self.generation,
            line: out.line,
            tag: out.tag,
            result: Err(ChannelError::Send(format!(
                "Channel is not ready ({})",
                self.machine.state()
            ))),
        });
    }

    fn apply_error(&mut self, error: ChannelError) {
        let now = self.now_ms();
        if self.machine.error(error, now) {
            self.emit_state();
        }
    }

    fn cancelled(mut self) {
        let now = self.now_ms();
        if self.machine.cancel(now) {
            log::debug!("{}: channel #{} cancelled", self.endpoint, self.generation);
            self.emit_state();
        }
    }

    fn emit_state(&self) {
        let _ = self.events.send(ChannelEvent::State {
            generation: self.generation,
            state: self.machine.state().clone(),
        });
    }

    fn now_ms(&self) -> u64 {
        self.started.elapsed().as_millis() as u64
    }
}
