//! Command/response correlation
//!
//! A `Session` owns the transport and the line framer. It writes one AT command,
//! reads lines until a final result code closes the frame, and routes every line
//! nobody asked for to the notification queue.

use crate::codec::EncodingMode;
use crate::dispatcher::Notification;
use crate::error::{Error, Result};
use crate::frame::{Frame, FrameStatus};
use crate::framer::{Line, LineFramer};
use crate::transport::{ModemStream, Transport};
use std::collections::VecDeque;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

const CTRL_Z: u8 = 0x1A;
const ESC: u8 = 0x1B;

/// The in-flight request. At most one exists per session.
#[derive(Debug)]
pub struct PendingCommand {
    pub command: String,
    pub created: Instant,
    pub deadline: Instant,
    /// Text the modem may echo back before answering
    echo: Option<String>,
    frame: Option<Frame>,
}

impl PendingCommand {
    fn new(command: &str, timeout: Duration) -> Self {
        let created = Instant::now();
        Self {
            command: command.to_string(),
            created,
            deadline: created + timeout,
            echo: Some(command.to_string()),
            frame: Some(Frame::new(Some(command.to_string()))),
        }
    }

    /// Take the accumulated frame. Returns `None` on the second call.
    fn complete(&mut self, status: FrameStatus) -> Option<Frame> {
        let mut frame = self.frame.take()?;
        frame.status = status;
        Some(frame)
    }

    fn push_body(&mut self, line: String) {
        if let Some(frame) = self.frame.as_mut() {
            frame.body.push(line);
        }
    }

    fn is_echo(&mut self, line: &str) -> bool {
        match self.echo.take() {
            Some(echo) => line.trim().eq_ignore_ascii_case(echo.trim()),
            None => false,
        }
    }
}

/// What a pending command's line loop stopped on.
enum Progress {
    Done(Frame),
    Prompt,
}

pub struct Session<S> {
    transport: Transport<S>,
    framer: LineFramer,
    pending: Option<PendingCommand>,
    /// Command that timed out and may still produce a late status line
    stale: Option<String>,
    deferred: VecDeque<Notification>,
    mode: Option<EncodingMode>,
}

impl<S: ModemStream> Session<S> {
    pub fn new(transport: Transport<S>) -> Self {
        Self {
            transport,
            framer: LineFramer::new(EncodingMode::Pdu.line_charset()),
            pending: None,
            stale: None,
            deferred: VecDeque::new(),
            mode: None,
        }
    }

    pub fn label(&self) -> &str {
        self.transport.label()
    }

    /// Send `command` and collect its frame.
    ///
    /// `ERROR`, `+CME ERROR` and `+CMS ERROR` are returned as a frame with an
    /// error status; only a missing status line or a device failure is an `Err`.
    pub async fn execute(&mut self, command: &str, timeout: Duration) -> Result<Frame> {
        self.begin(command, timeout).await?;

        match self.advance(false).await? {
            Progress::Done(frame) => Ok(frame),
            Progress::Prompt => Err(Error::ProtocolViolation(format!(
                "unexpected input prompt for {}",
                command
            ))),
        }
    }

    /// Send a command that asks for input (`AT+CMGS`), then the payload and Ctrl-Z.
    ///
    /// If the prompt never comes, ESC is sent so the modem leaves input mode.
    pub async fn execute_with_payload(
        &mut self,
        command: &str,
        payload: &[u8],
        timeout: Duration,
    ) -> Result<Frame> {
        self.begin(command, timeout).await?;

        match self.advance(true).await {
            Ok(Progress::Done(frame)) => return Ok(frame),
            Ok(Progress::Prompt) => {}
            Err(e @ Error::Timeout { .. }) => {
                warn!("No input prompt for {}, aborting input mode", command);
                self.transport.write(&[ESC]).await?;
                return Err(e);
            }
            Err(e) => return Err(e),
        }

        let mut bytes = Vec::with_capacity(payload.len() + 1);
        bytes.extend_from_slice(payload);
        bytes.push(CTRL_Z);
        if let Err(e) = self.transport.write(&bytes).await {
            self.pending = None;
            return Err(e);
        }
        let echo = self.framer.charset().decode_line(payload);
        if let Some(pending) = self.pending.as_mut() {
            pending.echo = Some(echo);
        }

        match self.advance(false).await? {
            Progress::Done(frame) => Ok(frame),
            Progress::Prompt => Err(Error::ProtocolViolation(format!(
                "second input prompt for {}",
                command
            ))),
        }
    }

    /// Read unsolicited lines for up to `window` while no command is in flight.
    ///
    /// Returns as soon as at least one notification is available, oldest first.
    pub async fn poll_notifications(&mut self, window: Duration) -> Result<Vec<Notification>> {
        let deadline = Instant::now() + window;
        loop {
            self.route_buffered();
            if !self.deferred.is_empty() {
                return Ok(self.deferred.drain(..).collect());
            }
            match self.transport.read_chunk(deadline).await? {
                Some(chunk) => self.framer.push(&chunk),
                None => return Ok(Vec::new()),
            }
        }
    }

    /// Notifications that arrived while commands were running.
    pub fn take_deferred(&mut self) -> Vec<Notification> {
        self.deferred.drain(..).collect()
    }

    pub fn mode(&self) -> Option<EncodingMode> {
        self.mode
    }

    /// Record the mode negotiated with the modem.
    pub fn set_mode(&mut self, mode: EncodingMode) {
        info!("Session {} negotiated {}", self.label(), mode);
        self.framer.set_charset(mode.line_charset());
        self.mode = Some(mode);
    }

    /// Fail unless the negotiated mode is exactly `expected`.
    pub fn require_mode(&self, expected: EncodingMode) -> Result<()> {
        match self.mode {
            Some(mode) if mode == expected => Ok(()),
            Some(mode) => Err(Error::ModeMismatch {
                expected: expected.to_string(),
                negotiated: mode.to_string(),
            }),
            None => Err(Error::ModeMismatch {
                expected: expected.to_string(),
                negotiated: "none".to_string(),
            }),
        }
    }

    /// The command that last timed out, if its status has not shown up yet.
    pub fn stale_command(&self) -> Option<&str> {
        self.stale.as_deref()
    }

    pub async fn close(&mut self) {
        self.pending = None;
        self.transport.close().await;
    }

    // ------------------------------------------------------------------------

    async fn begin(&mut self, command: &str, timeout: Duration) -> Result<()> {
        if let Some(abandoned) = self.pending.take() {
            // a cancelled caller left its command in flight
            warn!("Command {} was abandoned mid-flight", abandoned.command);
            self.stale = Some(abandoned.command);
        }
        self.settle().await?;

        let mut bytes = Vec::with_capacity(command.len() + 1);
        bytes.extend_from_slice(command.as_bytes());
        bytes.push(b'\r');
        self.transport.write(&bytes).await?;
        self.pending = Some(PendingCommand::new(command, timeout));
        Ok(())
    }

    /// Drain bytes already waiting before a new command is written.
    async fn settle(&mut self) -> Result<()> {
        while let Some(chunk) = self.transport.read_chunk(Instant::now()).await? {
            self.framer.push(&chunk);
        }
        self.route_buffered();
        Ok(())
    }

    fn route_buffered(&mut self) {
        while let Some(line) = self.framer.next_line(false) {
            if let Line::Text(text) = line {
                self.route_unowned(text);
            }
        }
    }

    /// A line with no command in flight: late status, stale body, or notification.
    fn route_unowned(&mut self, text: String) {
        if let Some(status) = FrameStatus::parse(&text) {
            match self.stale.take() {
                Some(command) => info!("Late status {:?} for timed-out {}", status, command),
                None => warn!(
                    "{}",
                    Error::ProtocolViolation(format!("status {:?} with no command in flight", text))
                ),
            }
            return;
        }

        let notification = Notification::parse(&text);
        if notification.is_unknown() {
            if let Some(command) = &self.stale {
                debug!("Dropping late line {:?} for timed-out {}", text, command);
                return;
            }
        }
        debug!("Unsolicited {:?}", text);
        self.deferred.push_back(notification);
    }

    /// Run the pending command's line loop until its frame closes, or a prompt
    /// shows up when `want_prompt` is set.
    async fn advance(&mut self, want_prompt: bool) -> Result<Progress> {
        loop {
            while let Some(line) = self.framer.next_line(want_prompt) {
                if let Some(progress) = self.on_line(line) {
                    return Ok(progress);
                }
            }

            let deadline = match &self.pending {
                Some(pending) => pending.deadline,
                None => {
                    return Err(Error::ProtocolViolation(
                        "no command in flight".to_string(),
                    ))
                }
            };

            match self.transport.read_chunk(deadline).await {
                Ok(Some(chunk)) => self.framer.push(&chunk),
                Ok(None) => return Err(self.expire()),
                Err(e) => {
                    self.pending = None;
                    return Err(e);
                }
            }
        }
    }

    fn on_line(&mut self, line: Line) -> Option<Progress> {
        let pending = self.pending.as_mut()?;
        let text = match line {
            Line::Blank => return None,
            Line::Prompt => return Some(Progress::Prompt),
            Line::Text(text) => text,
        };

        if pending.is_echo(&text) {
            return None;
        }

        if let Some(status) = FrameStatus::parse(&text) {
            let command = pending.command.clone();
            let elapsed = pending.created.elapsed();
            let frame = pending.complete(status)?;
            self.pending = None;
            debug!(?elapsed, "{} -> {:?}", command, frame.status);
            return Some(Progress::Done(frame));
        }

        // +CMTI has no solicited form: it cannot belong to any frame
        let notification = Notification::parse(&text);
        if !notification.is_unknown() {
            debug!(
                "Notification {:?} interleaved with {}, deferring",
                text, pending.command
            );
            self.deferred.push_back(notification);
            return None;
        }

        pending.push_body(text);
        None
    }

    fn expire(&mut self) -> Error {
        match self.pending.take() {
            Some(pending) => {
                let elapsed = pending.created.elapsed();
                warn!("Timeout after {:?} waiting for {}", elapsed, pending.command);
                self.stale = Some(pending.command.clone());
                Error::Timeout {
                    command: pending.command,
                    elapsed,
                }
            }
            None => Error::ProtocolViolation("no command in flight".to_string()),
        }
    }
}
