//! Error types for RTDE session, command channel, and script operations.

use std::time::Duration;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, RtdeError>;

#[derive(Error, Debug)]
pub enum RtdeError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("controller version error: {0}")]
    Version(String),

    #[error("timed out after {elapsed:?} waiting for {what}")]
    Timeout { what: String, elapsed: Duration },

    #[error("validation error: {0}")]
    Validation(String),

    #[error("controller error: {0}")]
    Controller(String),
}

impl RtdeError {
    pub fn transport<S: Into<String>>(msg: S) -> Self {
        RtdeError::Transport(msg.into())
    }

    pub fn protocol<S: Into<String>>(msg: S) -> Self {
        RtdeError::Protocol(msg.into())
    }

    pub fn version<S: Into<String>>(msg: S) -> Self {
        RtdeError::Version(msg.into())
    }

    pub fn timeout<S: Into<String>>(what: S, elapsed: Duration) -> Self {
        RtdeError::Timeout {
            what: what.into(),
            elapsed,
        }
    }

    pub fn validation<S: Into<String>>(msg: S) -> Self {
        RtdeError::Validation(msg.into())
    }

    pub fn controller<S: Into<String>>(msg: S) -> Self {
        RtdeError::Controller(msg.into())
    }
}
