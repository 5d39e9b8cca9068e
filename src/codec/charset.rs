//! Text-mode character sets (AT+CSCS)

use super::gsm7;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Ctrl-Z ends and ESC aborts `AT+CMGS` input.
const INPUT_TERMINATORS: [u8; 2] = [0x1A, 0x1B];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Charset {
    /// International Reference Alphabet (7-bit ASCII)
    Ira,
    /// GSM default alphabet, one byte per septet
    Gsm,
    /// UTF-16BE, written as uppercase hex
    Ucs2,
    Gbk,
}

impl Charset {
    /// Name used in `AT+CSCS="..."`.
    pub fn at_name(&self) -> &'static str {
        match self {
            Charset::Ira => "IRA",
            Charset::Gsm => "GSM",
            Charset::Ucs2 => "UCS2",
            Charset::Gbk => "GBK",
        }
    }

    /// Encode outbound text. Fails if any character is not representable, or
    /// encodes to a byte that would end the modem's input early.
    pub fn encode(&self, text: &str) -> Result<Vec<u8>> {
        let bytes = self.encode_bytes(text)?;
        if !bytes.iter().any(|b| INPUT_TERMINATORS.contains(b)) {
            return Ok(bytes);
        }
        let ch = text
            .chars()
            .find(|c| {
                let mut buf = [0u8; 4];
                self.encode_bytes(c.encode_utf8(&mut buf))
                    .map(|b| b.iter().any(|b| INPUT_TERMINATORS.contains(b)))
                    .unwrap_or(false)
            })
            .unwrap_or('\u{FFFD}');
        Err(Error::UnsupportedCharacter {
            ch,
            alphabet: self.at_name(),
        })
    }

    fn encode_bytes(&self, text: &str) -> Result<Vec<u8>> {
        match self {
            Charset::Ira => {
                if let Some(ch) = text.chars().find(|c| !c.is_ascii()) {
                    return Err(Error::UnsupportedCharacter {
                        ch,
                        alphabet: "IRA",
                    });
                }
                Ok(text.as_bytes().to_vec())
            }
            Charset::Gsm => gsm7::to_septets(text),
            Charset::Ucs2 => Ok(encode_ucs2_hex(text).into_bytes()),
            Charset::Gbk => {
                let (bytes, _, had_errors) = encoding_rs::GBK.encode(text);
                if had_errors {
                    let ch = text
                        .chars()
                        .find(|c| {
                            let mut buf = [0u8; 4];
                            encoding_rs::GBK.encode(c.encode_utf8(&mut buf)).2
                        })
                        .unwrap_or('\u{FFFD}');
                    return Err(Error::UnsupportedCharacter {
                        ch,
                        alphabet: "GBK",
                    });
                }
                Ok(bytes.into_owned())
            }
        }
    }

    /// Strict decode of an inbound text-mode payload.
    pub fn decode(&self, bytes: &[u8]) -> Result<String> {
        match self {
            Charset::Ira => {
                if bytes.iter().any(|b| !b.is_ascii()) {
                    return Err(Error::Encoding("non-ASCII byte in IRA text".to_string()));
                }
                Ok(String::from_utf8_lossy(bytes).into_owned())
            }
            Charset::Gsm => gsm7::from_septets(bytes),
            Charset::Ucs2 => {
                let hex = std::str::from_utf8(bytes)
                    .map_err(|_| Error::Encoding("UCS2 payload is not hex".to_string()))?;
                decode_ucs2_hex(hex)
            }
            Charset::Gbk => {
                let (text, had_errors) = encoding_rs::GBK.decode_without_bom_handling(bytes);
                if had_errors {
                    return Err(Error::Encoding("malformed GBK sequence".to_string()));
                }
                Ok(text.into_owned())
            }
        }
    }

    /// Decode a protocol line. Never fails; malformed input is replaced.
    pub fn decode_line(&self, bytes: &[u8]) -> String {
        match self {
            Charset::Gbk => encoding_rs::GBK
                .decode_without_bom_handling(bytes)
                .0
                .into_owned(),
            Charset::Gsm => {
                gsm7::from_septets(bytes).unwrap_or_else(|_| String::from_utf8_lossy(bytes).into_owned())
            }
            Charset::Ira | Charset::Ucs2 => String::from_utf8_lossy(bytes).into_owned(),
        }
    }
}

impl fmt::Display for Charset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.at_name())
    }
}

impl FromStr for Charset {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().trim_matches('"').to_ascii_uppercase().as_str() {
            "IRA" | "ASCII" => Ok(Charset::Ira),
            "GSM" => Ok(Charset::Gsm),
            "UCS2" | "UCS-2" => Ok(Charset::Ucs2),
            "GBK" => Ok(Charset::Gbk),
            other => Err(Error::Parse(format!("unknown charset: {}", other))),
        }
    }
}

/// UTF-16BE code units as uppercase hex.
pub fn encode_ucs2_hex(text: &str) -> String {
    let mut out = String::with_capacity(text.len() * 4);
    for unit in text.encode_utf16() {
        out.push_str(&format!("{:04X}", unit));
    }
    out
}

pub fn decode_ucs2_hex(hex: &str) -> Result<String> {
    let bytes = hex::decode(hex.trim())
        .map_err(|e| Error::Encoding(format!("invalid UCS2 hex: {}", e)))?;
    decode_ucs2(&bytes)
}

/// UTF-16BE bytes to text. Unpaired surrogates are rejected.
pub fn decode_ucs2(bytes: &[u8]) -> Result<String> {
    if bytes.len() % 2 != 0 {
        return Err(Error::Encoding(format!(
            "UCS2 payload has odd length {}",
            bytes.len()
        )));
    }
    let units: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
        .collect();
    String::from_utf16(&units).map_err(|e| Error::Encoding(format!("invalid UTF-16: {}", e)))
}
