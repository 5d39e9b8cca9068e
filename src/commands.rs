//! AT command vocabulary
//!
//! Builders return the command text without the trailing `\r`; the session adds it.

use crate::codec::{Charset, EncodingMode, ValidityPeriod};
use crate::config::Config;
use crate::error::Result;
use std::time::Duration;

pub const ATTENTION: &str = "AT";
pub const MANUFACTURER: &str = "AT+CGMI";
/// Numeric `+CME ERROR` / `+CMS ERROR` codes.
pub const REPORT_ERRORS: &str = "AT+CMEE=1";
/// Store incoming messages and announce them with `+CMTI`.
pub const NEW_MESSAGE_INDICATION: &str = "AT+CNMI=2,1,0,0,0";
pub const STORAGE_STATUS: &str = "AT+CPMS?";
/// Every stored message, in PDU format.
pub const LIST_ALL: &str = "AT+CMGL=4";

/// How long a command may take before the session gives up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandClass {
    Quick,
    Read,
    Send,
}

impl CommandClass {
    pub fn timeout(&self, config: &Config) -> Duration {
        match self {
            CommandClass::Quick => config.command_timeout(),
            CommandClass::Read => config.read_timeout(),
            CommandClass::Send => config.send_timeout(),
        }
    }
}

pub fn message_format(mode: EncodingMode) -> String {
    format!("AT+CMGF={}", mode.cmgf())
}

pub fn character_set(charset: Charset) -> String {
    format!("AT+CSCS=\"{}\"", charset.at_name())
}

/// Text-mode parameters: SMS-SUBMIT with relative validity, PID 0, and the DCS
/// matching `charset` (8 = UCS-2).
pub fn text_mode_parameters(charset: Charset, validity: ValidityPeriod) -> String {
    let dcs = match charset {
        Charset::Ucs2 => 8,
        _ => 0,
    };
    format!("AT+CSMP=17,{},0,{}", validity.0, dcs)
}

/// Select `storage` for reading, writing and receiving.
pub fn preferred_storage(storage: &str) -> String {
    format!("AT+CPMS=\"{0}\",\"{0}\",\"{0}\"", storage)
}

/// Text-mode send. With UCS2 the destination is hex-encoded too.
pub fn send_text(phone: &str, charset: Charset) -> Result<String> {
    let address = match charset {
        Charset::Ucs2 => crate::codec::charset::encode_ucs2_hex(phone),
        other => String::from_utf8_lossy(&other.encode(phone)?).into_owned(),
    };
    Ok(format!("AT+CMGS=\"{}\"", address))
}

/// PDU-mode send; the argument is the TPDU length in octets.
pub fn send_pdu(tpdu_len: usize) -> String {
    format!("AT+CMGS={}", tpdu_len)
}

pub fn read(index: u32) -> String {
    format!("AT+CMGR={}", index)
}

pub fn delete(index: u32) -> String {
    format!("AT+CMGD={}", index)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_commands() {
        assert_eq!(message_format(EncodingMode::Pdu), "AT+CMGF=0");
        assert_eq!(
            message_format(EncodingMode::Text {
                charset: Charset::Ira
            }),
            "AT+CMGF=1"
        );
        assert_eq!(character_set(Charset::Ucs2), "AT+CSCS=\"UCS2\"");
        assert_eq!(
            text_mode_parameters(Charset::Ucs2, ValidityPeriod::default()),
            "AT+CSMP=17,167,0,8"
        );
        assert_eq!(
            text_mode_parameters(Charset::Gsm, ValidityPeriod::default()),
            "AT+CSMP=17,167,0,0"
        );
    }

    #[test]
    fn test_message_commands() {
        assert_eq!(preferred_storage("ME"), "AT+CPMS=\"ME\",\"ME\",\"ME\"");
        assert_eq!(send_pdu(24), "AT+CMGS=24");
        assert_eq!(read(3), "AT+CMGR=3");
        assert_eq!(delete(3), "AT+CMGD=3");
    }

    #[test]
    fn test_send_text_address() {
        assert_eq!(
            send_text("+8610086", Charset::Ira).unwrap(),
            "AT+CMGS=\"+8610086\""
        );
        assert_eq!(
            send_text("10086", Charset::Ucs2).unwrap(),
            "AT+CMGS=\"00310030003000380036\""
        );
    }

    #[test]
    fn test_timeouts_by_class() {
        let config = Config::default();
        assert_eq!(CommandClass::Quick.timeout(&config), Duration::from_secs(5));
        assert_eq!(CommandClass::Read.timeout(&config), Duration::from_secs(10));
        assert_eq!(CommandClass::Send.timeout(&config), Duration::from_secs(60));
    }
}
