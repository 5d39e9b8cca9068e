//! Frames: the correlated result of one AT command

use crate::error::{Error, Result};
use std::fmt;

/// Error result code reported by the modem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModemError {
    /// Plain `ERROR`, no code.
    Error,
    /// `+CME ERROR: <code>` (equipment error)
    Cme(String),
    /// `+CMS ERROR: <code>` (message service error)
    Cms(String),
}

impl ModemError {
    /// The raw code, if the modem reported one.
    pub fn code(&self) -> Option<&str> {
        match self {
            ModemError::Error => None,
            ModemError::Cme(code) | ModemError::Cms(code) => Some(code),
        }
    }
}

impl fmt::Display for ModemError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModemError::Error => write!(f, "ERROR"),
            ModemError::Cme(code) => write!(f, "+CME ERROR: {}", code),
            ModemError::Cms(code) => write!(f, "+CMS ERROR: {}", code),
        }
    }
}

/// How a frame was terminated
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameStatus {
    Ok,
    Error(ModemError),
    Timeout,
}

impl FrameStatus {
    /// Parse a final result code line. Returns `None` for anything else.
    pub fn parse(line: &str) -> Option<FrameStatus> {
        let line = line.trim();
        if line == "OK" {
            return Some(FrameStatus::Ok);
        }
        if line == "ERROR" {
            return Some(FrameStatus::Error(ModemError::Error));
        }
        if let Some(code) = line.strip_prefix("+CME ERROR:") {
            return Some(FrameStatus::Error(ModemError::Cme(code.trim().to_string())));
        }
        if let Some(code) = line.strip_prefix("+CMS ERROR:") {
            return Some(FrameStatus::Error(ModemError::Cms(code.trim().to_string())));
        }
        None
    }
}

/// Body lines of one command plus its terminal status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub command: Option<String>,
    pub body: Vec<String>,
    pub status: FrameStatus,
}

impl Frame {
    pub fn new(command: Option<String>) -> Self {
        Self {
            command,
            body: Vec::new(),
            status: FrameStatus::Timeout,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == FrameStatus::Ok
    }

    /// Map an error status to `Error::ModemRejected`.
    pub fn into_result(self) -> Result<Frame> {
        match &self.status {
            FrameStatus::Ok => Ok(self),
            FrameStatus::Error(code) => Err(Error::ModemRejected {
                command: self.command.clone().unwrap_or_default(),
                code: code.clone(),
            }),
            FrameStatus::Timeout => Err(Error::ProtocolViolation(format!(
                "frame for {} was never terminated",
                self.command.as_deref().unwrap_or("<none>")
            ))),
        }
    }

    /// First body line starting with `prefix`, with the prefix removed and trimmed.
    pub fn field(&self, prefix: &str) -> Option<&str> {
        self.body
            .iter()
            .find_map(|line| line.strip_prefix(prefix))
            .map(str::trim)
    }
}
