//! Error types for the peer coordinator and its collaborators
//!
//! Every failure is classified by [`Severity`]. Fatal errors end the event
//! loop and are expected to end the process; recoverable ones are logged
//! where they happen and never escape the call site.

use shared::{Direction, Peer};
use std::io;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Fatal,
    Recoverable,
}

/// Failure of a single outbound call.
#[derive(Debug, Error)]
pub enum RpcError {
    #[error("name {0} is not registered")]
    Unresolved(String),

    #[error("connection failed: {0}")]
    Io(#[from] io::Error),

    #[error("malformed frame: {0}")]
    Codec(#[from] bincode::Error),

    #[error("frame of {0} bytes exceeds limit")]
    FrameTooLarge(usize),

    #[error("remote rejected call: {0}")]
    Rejected(String),
}

#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error("directory unavailable: {0}")]
    Io(#[from] io::Error),

    #[error("malformed record for {name}: {record}")]
    MalformedRecord { name: String, record: String },
}

#[derive(Debug, Error)]
pub enum PeerError {
    #[error("failed to register {name} in directory: {source}")]
    Registration {
        name: String,
        #[source]
        source: DirectoryError,
    },

    #[error("directory lookup failed: {0}")]
    Lookup(#[source] DirectoryError),

    #[error("{method} to {peer} failed: {source}")]
    Rpc {
        method: &'static str,
        peer: Peer,
        #[source]
        source: RpcError,
    },

    #[error("nobody on the {0}; ball cannot be handed off")]
    NoNeighbor(Direction),

    #[error("door notification channel is closed")]
    DoorChannelClosed,

    #[error("a master must not be given an inbound ball channel")]
    MasterWithBalls,

    #[error("endpoint failed: {0}")]
    Endpoint(#[source] io::Error),

    #[error("malformed peer name {0}")]
    MalformedName(String),

    #[error("no player id left after {0}")]
    IdsExhausted(u32),

    #[error("coordinator loop is not running")]
    NotRunning,
}

impl PeerError {
    pub fn rpc(method: &'static str, peer: Peer, source: RpcError) -> Self {
        PeerError::Rpc {
            method,
            peer,
            source,
        }
    }

    /// Classifies the error. Forget calls are the only best-effort RPCs.
    pub fn severity(&self) -> Severity {
        match self {
            PeerError::Rpc { method, .. } if *method == "Forget" => Severity::Recoverable,
            PeerError::Lookup(_) | PeerError::MalformedName(_) => Severity::Recoverable,
            _ => Severity::Fatal,
        }
    }

    pub fn is_fatal(&self) -> bool {
        self.severity() == Severity::Fatal
    }
}
