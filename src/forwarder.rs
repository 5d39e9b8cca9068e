//! Where decoded messages go
//!
//! The stock forwarder appends one JSON object per line and flushes after each
//! record, so a crash loses at most the message being written.

use crate::codec::PartInfo;
use crate::dispatcher::BoxFuture;
use crate::error::{Error, Result};
use crate::sms::SmsMessage;
use chrono::{DateTime, FixedOffset, Local};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

/// Receives every decoded message before it is deleted from the modem.
pub trait MessageForwarder: Send {
    fn forward<'a>(&'a mut self, message: &'a SmsMessage) -> BoxFuture<'a, Result<()>>;
}

/// One line of the message log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForwardRecord {
    /// Epoch milliseconds when the message was forwarded
    pub received_at: i64,
    pub received_at_local: String,
    pub sender: String,
    pub sent_at: DateTime<FixedOffset>,
    pub body: String,
    pub encoding: String,
    pub storage: String,
    pub index: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub part: Option<PartInfo>,
}

impl ForwardRecord {
    pub fn new(message: &SmsMessage, now: DateTime<Local>) -> Self {
        Self {
            received_at: now.timestamp_millis(),
            received_at_local: now.format("%Y-%m-%d %H:%M:%S").to_string(),
            sender: message.sender.clone(),
            sent_at: message.timestamp,
            body: message.body.clone(),
            encoding: message.encoding.clone(),
            storage: message.storage.clone(),
            index: message.index,
            part: message.part,
        }
    }
}

pub struct JsonlForwarder {
    path: PathBuf,
}

impl JsonlForwarder {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn append(&self, record: &ForwardRecord) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let mut line = serde_json::to_string(record)?;
        line.push('\n');

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        file.sync_data().await?;
        Ok(())
    }
}

impl MessageForwarder for JsonlForwarder {
    fn forward<'a>(&'a mut self, message: &'a SmsMessage) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let record = ForwardRecord::new(message, Local::now());
            self.append(&record).await?;
            info!(
                sender = %message.sender,
                storage = %message.storage,
                index = message.index,
                "Forwarded message to {}",
                self.path.display()
            );
            Ok(())
        })
    }
}

/// The newest `count` records whose body or sender matches `pattern`, oldest first.
pub fn recent(path: &Path, pattern: Option<&str>, count: usize) -> Result<Vec<ForwardRecord>> {
    let regex = pattern
        .map(Regex::new)
        .transpose()
        .map_err(|e| Error::Parse(format!("invalid pattern: {}", e)))?;

    if !path.exists() {
        return Ok(Vec::new());
    }
    let content = std::fs::read_to_string(path)?;

    let mut matches: Vec<ForwardRecord> = content
        .lines()
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| match serde_json::from_str::<ForwardRecord>(line) {
            Ok(record) => Some(record),
            Err(e) => {
                debug!("Skipping malformed record: {}", e);
                None
            }
        })
        .filter(|record| match &regex {
            Some(re) => re.is_match(&record.body) || re.is_match(&record.sender),
            None => true,
        })
        .collect();

    let skip = matches.len().saturating_sub(count);
    Ok(matches.split_off(skip))
}
