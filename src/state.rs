use std::sync::atomic::{AtomicU8, Ordering};
use num_enum::{IntoPrimitive, TryFromPrimitive};
use thiserror::Error;
use tracing::debug;

/// The health of a stream. Everything except `Active` is terminal: once a session leaves
///  `Active`, sending, receiving and flushing stop.
#[repr(u8)]
#[derive(Debug, Copy, Clone, Eq, PartialEq, TryFromPrimitive, IntoPrimitive)]
pub enum StreamState {
    Active = 0,
    /// the stream was closed gracefully
    Eof = 1,
    /// the peer aborted the stream
    RemoteEof = 2,
    /// the peer went silent for too long, or the stream was aborted locally
    Corrupt = 3,
    /// received data violated the wire format
    MalformedMessage = 4,
}

impl StreamState {
    pub fn is_terminal(&self) -> bool {
        *self != StreamState::Active
    }

    /// the error reported to callers for a terminal state
    pub fn as_error(&self) -> Option<RudpError> {
        match self {
            StreamState::Active => None,
            StreamState::Eof => Some(RudpError::Eof),
            StreamState::RemoteEof => Some(RudpError::RemoteEof),
            StreamState::Corrupt => Some(RudpError::Corrupt),
            StreamState::MalformedMessage => Some(RudpError::MalformedMessage),
        }
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Error)]
pub enum RudpError {
    #[error("EOF")]
    Eof,
    #[error("remote EOF")]
    RemoteEof,
    #[error("corrupt stream")]
    Corrupt,
    #[error("received malformed message")]
    MalformedMessage,

    /// The message was declined; the session is unaffected
    #[error("message of {len} bytes exceeds the maximum message size of {max} bytes")]
    MessageTooLarge { len: usize, max: usize },

    /// The receive buffer is too small for the next message, which remains queued
    #[error("message of {needed} bytes does not fit into a receive buffer of {available} bytes")]
    BufferTooSmall { needed: usize, available: usize },
}

impl RudpError {
    /// true for errors that mean the session is dead
    pub fn is_terminal(&self) -> bool {
        match self {
            RudpError::Eof | RudpError::RemoteEof | RudpError::Corrupt | RudpError::MalformedMessage => true,
            RudpError::MessageTooLarge { .. } | RudpError::BufferTooSmall { .. } => false,
        }
    }
}

/// The sticky stream state. This is the only part of a session that may be touched from other
///  threads (e.g. to flag a local EOF), so it is shared through an `Arc`.
///
/// NB: Stores are last-write-wins, i.e. a later terminal state replaces an earlier one
#[derive(Debug, Default)]
pub struct StreamStatus {
    state: AtomicU8,
}

impl StreamStatus {
    pub fn load(&self) -> StreamState {
        // only values written by store() can be in here
        StreamState::try_from_primitive(self.state.load(Ordering::Acquire))
            .unwrap_or(StreamState::Corrupt)
    }

    pub fn store(&self, state: StreamState) {
        let previous = self.state.swap(state.into(), Ordering::AcqRel);
        if previous != u8::from(state) {
            debug!("stream state {:?} -> {:?}", StreamState::try_from_primitive(previous), state);
        }
    }

    pub fn is_active(&self) -> bool {
        !self.load().is_terminal()
    }

    /// `Err` with the terminal state's error if the stream is no longer active
    pub fn check_active(&self) -> Result<(), RudpError> {
        match self.load().as_error() {
            None => Ok(()),
            Some(e) => Err(e),
        }
    }
}
