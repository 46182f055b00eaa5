//! Session state machine

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of a diagnostic session
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionState {
    /// No session
    #[default]
    Idle,
    /// Pairing with the adapter
    Linking,
    /// Sending the adapter initialisation sequence
    ProtocolInit,
    /// Identifying the ECU
    EcuSync,
    /// Connected; telemetry may run
    Ready,
    /// A handshake step failed
    Error,
}

impl SessionState {
    /// Next state along the handshake chain
    pub fn next(self) -> Option<SessionState> {
        match self {
            SessionState::Idle => Some(SessionState::Linking),
            SessionState::Linking => Some(SessionState::ProtocolInit),
            SessionState::ProtocolInit => Some(SessionState::EcuSync),
            SessionState::EcuSync => Some(SessionState::Ready),
            SessionState::Ready | SessionState::Error => None,
        }
    }

    /// Whether `self -> to` is a legal edge.
    ///
    /// Legal edges: one step forward along the chain, any active state to
    /// `Error`, and any non-idle state back to `Idle`.
    pub fn can_transition_to(self, to: SessionState) -> bool {
        match (self, to) {
            (from, SessionState::Idle) => from != SessionState::Idle,
            (SessionState::Error, _) => false,
            (SessionState::Idle, SessionState::Error) => false,
            (_, SessionState::Error) => true,
            (from, to) => from.next() == Some(to),
        }
    }

    /// Whether the handshake is in progress
    pub fn is_connecting(self) -> bool {
        matches!(
            self,
            SessionState::Linking | SessionState::ProtocolInit | SessionState::EcuSync
        )
    }

    /// Upper-case wire name
    pub fn as_str(self) -> &'static str {
        match self {
            SessionState::Idle => "IDLE",
            SessionState::Linking => "LINKING",
            SessionState::ProtocolInit => "PROTOCOL_INIT",
            SessionState::EcuSync => "ECU_SYNC",
            SessionState::Ready => "READY",
            SessionState::Error => "ERROR",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
