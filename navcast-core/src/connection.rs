//! Connection state machine for the outbound datagram channel.
//!
//! This module provides platform-independent channel state management. The
//! transitions are pure; the I/O layer drives them and forwards every change
//! to the session.
//!
//! ```text
//!            open            ready
//!   Idle ──────────▶ Connecting ──────▶ Ready
//!                        │  ╲             │
//!            recoverable │   ╲ fatal      │ recoverable / fatal
//!                        ▼    ╲           ▼
//!                     Waiting ──▶ Failed ◀┘
//!
//!   any state ── cancel ──▶ Cancelled (terminal)
//! ```
//!
//! # Usage
//!
//! ```rust
//! use navcast_core::connection::{ChannelState, ConnectionStateMachine};
//!
//! let mut conn = ConnectionStateMachine::new();
//! assert!(conn.open(0));
//! assert!(conn.ready(10));
//! assert!(conn.state().can_send());
//! conn.cancel(20);
//! assert_eq!(conn.state(), &ChannelState::Cancelled);
//! ```

use serde::{Serialize, Serializer};

use crate::error::ChannelError;

/// Fixed delay before a replacement channel is opened (milliseconds).
///
/// There is no backoff growth and no limit on the number of attempts.
pub const RECONNECT_DELAY_MS: u64 = 5000;

// =============================================================================
// Channel State
// =============================================================================

/// Lifecycle state of one datagram channel instance.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ChannelState {
    /// Created, open not yet requested
    #[default]
    Idle,
    /// Resolving and binding
    Connecting,
    /// Socket connected, writes go out
    Ready,
    /// Recoverable network problem
    Waiting(ChannelError),
    /// Non-recoverable problem
    Failed(ChannelError),
    /// Closed by its owner; terminal
    Cancelled,
}

impl ChannelState {
    /// Check if writes can be dispatched
    pub fn can_send(&self) -> bool {
        matches!(self, ChannelState::Ready)
    }

    /// Check if writes should be held until the channel settles
    pub fn is_pending(&self) -> bool {
        matches!(self, ChannelState::Idle | ChannelState::Connecting)
    }

    /// Check if the owner should replace this channel
    pub fn wants_reconnect(&self) -> bool {
        matches!(self, ChannelState::Waiting(_) | ChannelState::Failed(_))
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ChannelState::Cancelled)
    }

    pub fn error(&self) -> Option<&ChannelError> {
        match self {
            ChannelState::Waiting(e) | ChannelState::Failed(e) => Some(e),
            _ => None,
        }
    }

    /// Status shown to observers for this state
    pub fn connection_status(&self) -> ConnectionStatus {
        match self {
            ChannelState::Ready => ConnectionStatus::Connected,
            ChannelState::Failed(_) => ConnectionStatus::Failed,
            ChannelState::Waiting(_) | ChannelState::Cancelled => ConnectionStatus::Disconnected,
            ChannelState::Idle | ChannelState::Connecting => ConnectionStatus::Connecting,
        }
    }
}

impl std::fmt::Display for ChannelState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChannelState::Idle => write!(f, "Idle"),
            ChannelState::Connecting => write!(f, "Connecting"),
            ChannelState::Ready => write!(f, "Ready"),
            ChannelState::Waiting(e) => write!(f, "Waiting ({})", e.detail()),
            ChannelState::Failed(e) => write!(f, "Failed ({})", e.detail()),
            ChannelState::Cancelled => write!(f, "Cancelled"),
        }
    }
}

// =============================================================================
// Connection Status
// =============================================================================

/// Connectivity as presented to observers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionStatus {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Failed,
}

impl ConnectionStatus {
    pub fn label(&self) -> &'static str {
        match self {
            ConnectionStatus::Disconnected => "Disconnected",
            ConnectionStatus::Connecting => "Connecting...",
            ConnectionStatus::Connected => "Connected",
            ConnectionStatus::Failed => "Failed",
        }
    }
}

impl std::fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

impl Serialize for ConnectionStatus {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.label())
    }
}

// =============================================================================
// State Machine
// =============================================================================

/// Enforces the legal channel transitions.
///
/// Every transition method returns `true` when the state changed. Illegal
/// transitions are ignored and return `false`.
#[derive(Debug, Clone, Default)]
pub struct ConnectionStateMachine {
    state: ChannelState,
    /// Timestamp of last state change (milliseconds)
    last_state_change_ms: u64,
}

impl ConnectionStateMachine {
    /// Create a new state machine in `Idle`.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &ChannelState {
        &self.state
    }

    /// Calculate time since last state change.
    pub fn time_in_state_ms(&self, current_time_ms: u64) -> u64 {
        current_time_ms.saturating_sub(self.last_state_change_ms)
    }

    // -------------------------------------------------------------------------
    // State Transitions
    // -------------------------------------------------------------------------

    /// Idle → Connecting.
    pub fn open(&mut self, current_time_ms: u64) -> bool {
        match self.state {
            ChannelState::Idle => self.set_state(ChannelState::Connecting, current_time_ms),
            _ => false,
        }
    }

    /// Connecting → Ready.
    pub fn ready(&mut self, current_time_ms: u64) -> bool {
        match self.state {
            ChannelState::Connecting => self.set_state(ChannelState::Ready, current_time_ms),
            _ => false,
        }
    }

    /// Connecting/Ready → Waiting for recoverable errors,
    /// Connecting/Ready/Waiting → Failed for everything else.
    pub fn error(&mut self, error: ChannelError, current_time_ms: u64) -> bool {
        let active = matches!(self.state, ChannelState::Connecting | ChannelState::Ready);
        if error.is_recoverable() {
            if active {
                return self.set_state(ChannelState::Waiting(error), current_time_ms);
            }
            false
        } else if active || matches!(self.state, ChannelState::Waiting(_)) {
            self.set_state(ChannelState::Failed(error), current_time_ms)
        } else {
            false
        }
    }

    /// Any state → Cancelled.
    pub fn cancel(&mut self, current_time_ms: u64) -> bool {
        self.set_state(ChannelState::Cancelled, current_time_ms)
    }

    fn set_state(&mut self, new_state: ChannelState, current_time_ms: u64) -> bool {
        if self.state == new_state {
            return false;
        }
        self.state = new_state;
        self.last_state_change_ms = current_time_ms;
        true
    }
}

// =============================================================================
// Tests
// =============================================================================
