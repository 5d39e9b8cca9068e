//! Text and PDU conversion between SMS content and the wire

pub mod charset;
pub mod gsm7;
pub mod pdu;

pub use charset::Charset;
pub use pdu::{Address, Alphabet, DeliverPdu, EncodedPdu, PartInfo, ValidityPeriod};

use serde::{Deserialize, Serialize};
use std::fmt;

/// Message format negotiated with `AT+CMGF` (and `AT+CSCS` in text mode).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum EncodingMode {
    Text { charset: Charset },
    #[default]
    Pdu,
}

impl EncodingMode {
    /// Argument for `AT+CMGF=`.
    pub fn cmgf(&self) -> u8 {
        match self {
            EncodingMode::Pdu => 0,
            EncodingMode::Text { .. } => 1,
        }
    }

    /// Charset used to decode protocol lines. PDU mode lines are hex, so IRA.
    pub fn line_charset(&self) -> Charset {
        match self {
            EncodingMode::Text { charset } => *charset,
            EncodingMode::Pdu => Charset::Ira,
        }
    }
}

impl fmt::Display for EncodingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EncodingMode::Text { charset } => write!(f, "text/{}", charset),
            EncodingMode::Pdu => write!(f, "pdu"),
        }
    }
}
