//! Error types for the AIR780E engine

use crate::frame::ModemError;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// No terminating status line arrived before the deadline.
    #[error("Timeout after {elapsed:?} waiting for {command}")]
    Timeout { command: String, elapsed: Duration },

    /// Transport-level I/O failure. The session must be reopened.
    #[error("Device error: {0}")]
    Device(std::io::Error),

    #[error("Device closed")]
    DeviceClosed,

    #[error("Serial port error: {0}")]
    Serial(#[from] tokio_serial::Error),

    /// The modem answered ERROR / +CME ERROR / +CMS ERROR.
    #[error("Modem rejected {command}: {code}")]
    ModemRejected { command: String, code: ModemError },

    #[error("Encoding error: {0}")]
    Encoding(String),

    #[error("Character {ch:?} is not representable in {alphabet}")]
    UnsupportedCharacter { ch: char, alphabet: &'static str },

    #[error("Protocol violation: {0}")]
    ProtocolViolation(String),

    #[error("Encoding mode mismatch: session negotiated {negotiated}, caller assumed {expected}")]
    ModeMismatch { expected: String, negotiated: String },

    #[error("Session busy: could not acquire device within {0:?}")]
    Busy(Duration),

    /// Filesystem I/O (config, message log, control socket)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Config error: {0}")]
    Config(String),
}

impl Error {
    /// Errors after which the transport is unusable.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::Device(_) | Error::DeviceClosed | Error::Serial(_))
    }

    /// Errors a caller may reasonably retry. The engine itself never does.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Timeout { .. } | Error::Busy(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
