//! SMS operations on top of the arbiter
//!
//! Every operation takes the session lock for its own commands only: the lock
//! is never held between operations.

use crate::arbiter::Arbiter;
use crate::codec::pdu::{build_submits, Address};
use crate::codec::EncodingMode;
use crate::commands::{self, CommandClass};
use crate::config::Config;
use crate::dispatcher::Notification;
use crate::error::{Error, Result};
use crate::frame::Frame;
use crate::session::Session;
use crate::sms::{self, SmsMessage};
use crate::transport::{ModemStream, Transport};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

static CMGS_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\+CMGS:\s*(\d+)").unwrap());
static CPMS_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"^\+CPMS:\s*"([^"]*)"\s*,\s*(\d+)\s*,\s*(\d+)"#).unwrap());

/// Message references the modem assigned, one per part.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendReport {
    pub references: Vec<u32>,
}

/// Usage of the first storage reported by `AT+CPMS?`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageStatus {
    pub storage: String,
    pub used: u32,
    pub total: u32,
}

pub struct SmsClient<S> {
    arbiter: Arbiter<S>,
    config: Arc<Config>,
    /// Concatenation reference for the next multipart send
    next_reference: Arc<AtomicU8>,
    /// Storage last selected with `AT+CPMS`
    selected_storage: Arc<tokio::sync::Mutex<Option<String>>>,
}

impl<S> Clone for SmsClient<S> {
    fn clone(&self) -> Self {
        Self {
            arbiter: self.arbiter.clone(),
            config: Arc::clone(&self.config),
            next_reference: Arc::clone(&self.next_reference),
            selected_storage: Arc::clone(&self.selected_storage),
        }
    }
}

impl SmsClient<tokio_serial::SerialStream> {
    /// Open the configured serial port.
    pub fn open(config: Config, port: &str) -> Result<Self> {
        let transport = Transport::open(port, config.baud_rate)?;
        Ok(Self::new(transport, config))
    }
}

impl<S: ModemStream> SmsClient<S> {
    pub fn new(transport: Transport<S>, config: Config) -> Self {
        let arbiter = Arbiter::new(Session::new(transport), config.acquire_timeout());
        Self {
            arbiter,
            config: Arc::new(config),
            next_reference: Arc::new(AtomicU8::new(0)),
            selected_storage: Arc::new(tokio::sync::Mutex::new(None)),
        }
    }

    pub fn arbiter(&self) -> &Arbiter<S> {
        &self.arbiter
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Bring the modem to a known state and negotiate the configured mode.
    pub async fn initialize(&self) -> Result<()> {
        let config = Arc::clone(&self.config);
        let mode = config.encoding;

        let mut sequence = vec![
            commands::ATTENTION.to_string(),
            commands::REPORT_ERRORS.to_string(),
            commands::message_format(mode),
        ];
        if let EncodingMode::Text { charset } = mode {
            sequence.push(commands::character_set(charset));
            sequence.push(commands::text_mode_parameters(
                charset,
                config.validity_period,
            ));
        }
        sequence.push(commands::preferred_storage(&config.storage));
        sequence.push(commands::NEW_MESSAGE_INDICATION.to_string());

        let timeout = CommandClass::Quick.timeout(&config);
        let extra = config.extra_init_commands.clone();
        let storage = config.storage.clone();

        self.arbiter
            .with_exclusive_access(move |session| {
                Box::pin(async move {
                    for command in &sequence {
                        session.execute(command, timeout).await?.into_result()?;
                    }
                    session.set_mode(mode);

                    // vendor extras are best effort
                    for command in &extra {
                        let frame = session.execute(command, timeout).await?;
                        if !frame.is_ok() {
                            warn!("Init command {} answered {:?}", command, frame.status);
                        }
                    }
                    Ok(())
                })
            })
            .await?;

        *self.selected_storage.lock().await = Some(storage);
        info!("Modem initialised in {} mode", mode);
        Ok(())
    }

    /// Send `message` to `phone`. Never retried: a rejection surfaces its code.
    pub async fn send(&self, phone: &str, message: &str) -> Result<SendReport> {
        let mode = self.config.encoding;
        let timeout = CommandClass::Send.timeout(&self.config);

        let requests: Vec<(String, Vec<u8>)> = match mode {
            EncodingMode::Pdu => {
                let destination = Address::parse(phone)?;
                let reference = self.next_reference.fetch_add(1, Ordering::Relaxed);
                build_submits(&destination, message, self.config.validity_period, reference)?
                    .into_iter()
                    .map(|pdu| (commands::send_pdu(pdu.tpdu_len), pdu.hex.into_bytes()))
                    .collect()
            }
            EncodingMode::Text { charset } => {
                let payload = charset.encode(message)?;
                vec![(commands::send_text(phone, charset)?, payload)]
            }
        };

        let parts = requests.len();
        let references = self
            .arbiter
            .with_exclusive_access(move |session| {
                Box::pin(async move {
                    session.require_mode(mode)?;
                    let mut references = Vec::with_capacity(requests.len());
                    for (command, payload) in &requests {
                        let frame = session
                            .execute_with_payload(command, payload, timeout)
                            .await?
                            .into_result()?;
                        references.push(message_reference(&frame)?);
                    }
                    Ok(references)
                })
            })
            .await?;

        info!(parts, ?references, "Sent message to {}", phone);
        Ok(SendReport { references })
    }

    /// Read one stored message. An empty slot yields `None`.
    pub async fn read_message(&self, storage: &str, index: u32) -> Result<Option<SmsMessage>> {
        self.select_storage(storage).await?;

        let timeout = CommandClass::Read.timeout(&self.config);
        let frame = self
            .run_stored(commands::read(index), timeout)
            .await?
            .into_result()?;
        sms::parse_read(&frame.body, storage, index)
    }

    pub async fn delete_message(&self, storage: &str, index: u32) -> Result<()> {
        self.select_storage(storage).await?;
        let timeout = CommandClass::Quick.timeout(&self.config);
        self.run(commands::delete(index), timeout)
            .await?
            .into_result()?;
        debug!("Deleted {}:{}", storage, index);
        Ok(())
    }

    /// Every received message in `storage`.
    pub async fn list_messages(&self, storage: &str) -> Result<Vec<SmsMessage>> {
        self.select_storage(storage).await?;
        let timeout = CommandClass::Read.timeout(&self.config);
        let frame = self
            .run_stored(commands::LIST_ALL.to_string(), timeout)
            .await?
            .into_result()?;
        Ok(sms::parse_list(&frame.body, storage))
    }

    /// Storage usage, or `None` if the modem does not answer the query.
    pub async fn storage_status(&self) -> Result<Option<StorageStatus>> {
        let timeout = CommandClass::Quick.timeout(&self.config);
        let frame = self
            .run(commands::STORAGE_STATUS.to_string(), timeout)
            .await?;
        if !frame.is_ok() {
            return Ok(None);
        }
        Ok(frame.body.iter().find_map(|line| {
            let caps = CPMS_RE.captures(line)?;
            Some(StorageStatus {
                storage: caps[1].to_string(),
                used: caps[2].parse().ok()?,
                total: caps[3].parse().ok()?,
            })
        }))
    }

    /// Manufacturer string reported by `AT+CGMI`.
    pub async fn manufacturer(&self) -> Result<String> {
        let timeout = CommandClass::Quick.timeout(&self.config);
        let frame = self
            .run(commands::MANUFACTURER.to_string(), timeout)
            .await?
            .into_result()?;
        frame
            .body
            .iter()
            .map(|line| line.trim())
            .find(|line| !line.is_empty())
            .map(|line| line.trim_start_matches("+CGMI:").trim().to_string())
            .ok_or_else(|| Error::ProtocolViolation("empty AT+CGMI reply".to_string()))
    }

    /// Run an arbitrary command and return its frame as-is.
    pub async fn raw(&self, command: &str, timeout: Duration) -> Result<Frame> {
        self.run(command.to_string(), timeout).await
    }

    /// Hold the session for at most `window` waiting for notifications.
    pub async fn poll_notifications(&self, window: Duration) -> Result<Vec<Notification>> {
        self.arbiter
            .with_exclusive_access(move |session| {
                Box::pin(async move { session.poll_notifications(window).await })
            })
            .await
    }

    pub async fn close(&self) {
        self.arbiter.close().await;
    }

    // ------------------------------------------------------------------------

    async fn run(&self, command: String, timeout: Duration) -> Result<Frame> {
        self.arbiter
            .with_exclusive_access(move |session| {
                Box::pin(async move { session.execute(&command, timeout).await })
            })
            .await
    }

    /// Run a stored-message query in PDU format. In text mode the modem is
    /// switched to `AT+CMGF=0` for the query and back afterwards.
    async fn run_stored(&self, command: String, timeout: Duration) -> Result<Frame> {
        let mode = self.config.encoding;
        let quick = CommandClass::Quick.timeout(&self.config);
        self.arbiter
            .with_exclusive_access(move |session| {
                Box::pin(async move {
                    if mode == EncodingMode::Pdu {
                        return session.execute(&command, timeout).await;
                    }
                    // header and hex lines are ASCII, which every text charset decodes as-is
                    session
                        .execute(&commands::message_format(EncodingMode::Pdu), quick)
                        .await?
                        .into_result()?;
                    let frame = session.execute(&command, timeout).await;
                    let restored = session
                        .execute(&commands::message_format(mode), quick)
                        .await
                        .and_then(Frame::into_result);
                    let frame = frame?;
                    restored?;
                    Ok(frame)
                })
            })
            .await
    }

    async fn select_storage(&self, storage: &str) -> Result<()> {
        let mut selected = self.selected_storage.lock().await;
        if selected.as_deref() == Some(storage) {
            return Ok(());
        }
        let timeout = CommandClass::Quick.timeout(&self.config);
        self.run(commands::preferred_storage(storage), timeout)
            .await?
            .into_result()?;
        *selected = Some(storage.to_string());
        Ok(())
    }
}

/// `+CMGS: <mr>` from a send frame.
fn message_reference(frame: &Frame) -> Result<u32> {
    frame
        .body
        .iter()
        .find_map(|line| CMGS_RE.captures(line))
        .and_then(|caps| caps[1].parse().ok())
        .ok_or_else(|| {
            Error::ProtocolViolation(format!(
                "no +CMGS reference in reply to {}",
                frame.command.as_deref().unwrap_or("AT+CMGS")
            ))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::FrameStatus;

    #[test]
    fn test_message_reference() {
        let mut frame = Frame::new(Some("AT+CMGS=24".to_string()));
        frame.body.push("+CMGS: 17".to_string());
        frame.status = FrameStatus::Ok;
        assert_eq!(message_reference(&frame).unwrap(), 17);

        frame.body.clear();
        assert!(matches!(
            message_reference(&frame),
            Err(Error::ProtocolViolation(_))
        ));
    }
}
