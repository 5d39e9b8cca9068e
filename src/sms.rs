//! Stored SMS messages and the PDU-mode `+CMGR` / `+CMGL` response formats
//!
//! Stored messages are always fetched in PDU mode. A text-mode body is sent
//! verbatim, so a line reading `OK` inside it would close the frame early.

use crate::codec::pdu::{tpdu_kind, TpduKind};
use crate::codec::{DeliverPdu, PartInfo};
use crate::error::{Error, Result};
use chrono::{DateTime, FixedOffset};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

static CMGR_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\+CMGR:\s*(\d+)\s*,[^,]*,\s*(\d+)").unwrap());
static CMGL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\+CMGL:\s*(\d+)\s*,\s*(\d+)\s*,[^,]*,\s*(\d+)").unwrap());

/// A received message as read from modem storage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SmsMessage {
    pub sender: String,
    /// Service-centre timestamp, in the sender network's offset
    pub timestamp: DateTime<FixedOffset>,
    pub body: String,
    /// `gsm7`, `ucs2` or `8bit`
    pub encoding: String,
    pub storage: String,
    pub index: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub part: Option<PartInfo>,
}

impl SmsMessage {
    fn from_pdu(pdu: DeliverPdu, storage: &str, index: u32) -> Self {
        Self {
            sender: pdu.sender.to_string(),
            timestamp: pdu.timestamp,
            body: pdu.text,
            encoding: pdu.alphabet.to_string(),
            storage: storage.to_string(),
            index,
            part: pdu.part,
        }
    }
}

/// Parse the body of an `AT+CMGR` frame. An empty body means the slot is empty.
pub fn parse_read(body: &[String], storage: &str, index: u32) -> Result<Option<SmsMessage>> {
    let Some(header) = body.first() else {
        return Ok(None);
    };
    if !CMGR_RE.is_match(header) {
        return Err(Error::Parse(format!("unexpected CMGR header {:?}", header)));
    }
    let pdu = body
        .get(1)
        .ok_or_else(|| Error::Parse(format!("CMGR {} has no PDU line", index)))?;
    decode_stored_pdu(pdu, storage, index)
}

/// Parse the body of an `AT+CMGL` frame.
///
/// Entries that are not received messages, or that fail to decode, are logged
/// and skipped.
pub fn parse_list(body: &[String], storage: &str) -> Vec<SmsMessage> {
    // group each header with the lines up to the next header
    let mut entries: Vec<(&String, Vec<&String>)> = Vec::new();
    for line in body {
        if CMGL_RE.is_match(line) {
            entries.push((line, Vec::new()));
        } else if let Some((_, lines)) = entries.last_mut() {
            lines.push(line);
        } else {
            debug!("Ignoring CMGL line before first entry: {:?}", line);
        }
    }

    let mut messages = Vec::new();
    for (header, lines) in entries {
        let Some(index) = CMGL_RE
            .captures(header)
            .and_then(|caps| caps[1].parse::<u32>().ok())
        else {
            continue;
        };
        let result = match lines.first() {
            Some(pdu) => decode_stored_pdu(pdu, storage, index),
            None => Err(Error::Parse(format!("CMGL {} has no PDU line", index))),
        };
        match result {
            Ok(Some(message)) => messages.push(message),
            Ok(None) => debug!("Skipping stored entry {}:{}", storage, index),
            Err(e) => warn!("Could not decode stored message {}:{}: {}", storage, index, e),
        }
    }
    messages
}

/// Decode a stored PDU; messages that are not SMS-DELIVER yield `None`.
fn decode_stored_pdu(hex_line: &str, storage: &str, index: u32) -> Result<Option<SmsMessage>> {
    let bytes = hex::decode(hex_line.trim())
        .map_err(|e| Error::Encoding(format!("invalid PDU hex at {}: {}", index, e)))?;
    match tpdu_kind(&bytes)? {
        TpduKind::Deliver => {
            let pdu = DeliverPdu::decode(&bytes)?;
            Ok(Some(SmsMessage::from_pdu(pdu, storage, index)))
        }
        kind => {
            debug!("Stored entry {}:{} is {:?}, not a received message", storage, index, kind);
            Ok(None)
        }
    }
}
