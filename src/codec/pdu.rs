//! GSM 03.40 PDU encoding (SMS-SUBMIT) and decoding (SMS-DELIVER)

use super::charset::decode_ucs2;
use super::gsm7;
use crate::error::{Error, Result};
use chrono::{DateTime, FixedOffset, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Single-part limits
pub const MAX_SEPTETS: usize = 160;
pub const MAX_UCS2_UNITS: usize = 70;
/// Per-part limits once an 8-bit-reference concatenation header is present
pub const CONCAT_SEPTETS: usize = 153;
pub const CONCAT_UCS2_UNITS: usize = 67;

const MTI_DELIVER: u8 = 0x00;
const MTI_SUBMIT: u8 = 0x01;
const MTI_STATUS_REPORT: u8 = 0x02;

const FO_SUBMIT: u8 = 0x01;
const FO_VPF_RELATIVE: u8 = 0x10;
const FO_SRR: u8 = 0x20;
const FO_UDHI: u8 = 0x40;

const IEI_CONCAT_8: u8 = 0x00;
const IEI_CONCAT_16: u8 = 0x08;

// ============================================================================
// Addresses
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeOfNumber {
    Unknown,
    International,
    National,
    Alphanumeric,
    Other(u8),
}

impl TypeOfNumber {
    fn bits(&self) -> u8 {
        match self {
            TypeOfNumber::Unknown => 0,
            TypeOfNumber::International => 1,
            TypeOfNumber::National => 2,
            TypeOfNumber::Alphanumeric => 5,
            TypeOfNumber::Other(bits) => *bits & 0x07,
        }
    }

    fn from_bits(bits: u8) -> Self {
        match bits & 0x07 {
            0 => TypeOfNumber::Unknown,
            1 => TypeOfNumber::International,
            2 => TypeOfNumber::National,
            5 => TypeOfNumber::Alphanumeric,
            other => TypeOfNumber::Other(other),
        }
    }
}

/// An originating or destination address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Address {
    /// Digits (or text, for alphanumeric senders) without a leading `+`
    pub value: String,
    pub ton: TypeOfNumber,
    /// Numbering plan identification, 1 = ISDN/E.164
    pub npi: u8,
}

impl Address {
    /// Parse a user-supplied phone number. A leading `+` selects international format.
    pub fn parse(number: &str) -> Result<Self> {
        let number: String = number
            .trim()
            .chars()
            .filter(|c| !matches!(c, ' ' | '-' | '(' | ')'))
            .collect();
        let (ton, digits) = match number.strip_prefix('+') {
            Some(rest) => (TypeOfNumber::International, rest),
            None => (TypeOfNumber::Unknown, number.as_str()),
        };
        if digits.is_empty() {
            return Err(Error::Encoding("empty phone number".to_string()));
        }
        if digits.len() > 20 {
            return Err(Error::Encoding(format!(
                "phone number too long: {} digits",
                digits.len()
            )));
        }
        if let Some(c) = digits.chars().find(|c| semi_octet_value(*c).is_none()) {
            return Err(Error::Encoding(format!(
                "invalid character {:?} in phone number",
                c
            )));
        }
        Ok(Self {
            value: digits.to_string(),
            ton,
            npi: 1,
        })
    }

    /// Type-of-address octet: 0x91 international, 0x81 unknown, 0xA1 national, 0xD0 alphanumeric.
    pub fn toa(&self) -> u8 {
        let npi = if self.ton == TypeOfNumber::Alphanumeric {
            0
        } else {
            self.npi & 0x0F
        };
        0x80 | (self.ton.bits() << 4) | npi
    }

    pub fn from_toa(value: String, toa: u8) -> Self {
        Self {
            value,
            ton: TypeOfNumber::from_bits(toa >> 4),
            npi: toa & 0x0F,
        }
    }

    /// TP-DA / TP-OA encoding: digit count, type of address, semi-octets.
    pub fn encode(&self) -> Result<Vec<u8>> {
        if self.ton == TypeOfNumber::Alphanumeric {
            let septets = gsm7::to_septets(&self.value)?;
            let packed = gsm7::pack(&septets, 0);
            let semi_octets = (septets.len() * 7 + 3) / 4;
            let mut out = vec![semi_octets as u8, self.toa()];
            out.extend_from_slice(&packed);
            return Ok(out);
        }
        let mut out = vec![self.value.len() as u8, self.toa()];
        out.extend(encode_semi_octets(&self.value)?);
        Ok(out)
    }

    /// Decode a TP-OA field, returning the address and bytes consumed.
    pub fn decode(bytes: &[u8]) -> Result<(Self, usize)> {
        let mut reader = Reader::new(bytes);
        let digits = reader.u8()? as usize;
        let toa = reader.u8()?;
        let octets = (digits + 1) / 2;
        let raw = reader.take(octets)?;
        let value = if TypeOfNumber::from_bits(toa >> 4) == TypeOfNumber::Alphanumeric {
            let septets = gsm7::unpack(raw, octets * 8 / 7, 0);
            gsm7::from_septets(&septets)?.trim_end_matches('@').to_string()
        } else {
            decode_semi_octets(raw, digits)?
        };
        Ok((Self::from_toa(value, toa), reader.pos))
    }

    /// Decode the service-centre field, whose length octet counts octets, not digits.
    pub fn decode_smsc(bytes: &[u8]) -> Result<(Option<Self>, usize)> {
        let mut reader = Reader::new(bytes);
        let len = reader.u8()? as usize;
        if len == 0 {
            return Ok((None, 1));
        }
        let toa = reader.u8()?;
        let raw = reader.take(len - 1)?;
        let value = decode_semi_octets(raw, (len - 1) * 2)?;
        Ok((Some(Self::from_toa(value, toa)), reader.pos))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.ton == TypeOfNumber::International {
            write!(f, "+{}", self.value)
        } else {
            f.write_str(&self.value)
        }
    }
}

fn semi_octet_value(c: char) -> Option<u8> {
    match c {
        '0'..='9' => Some(c as u8 - b'0'),
        '*' => Some(0x0A),
        '#' => Some(0x0B),
        'a' | 'A' => Some(0x0C),
        'b' | 'B' => Some(0x0D),
        'c' | 'C' => Some(0x0E),
        _ => None,
    }
}

fn semi_octet_char(nibble: u8) -> Option<char> {
    match nibble {
        0..=9 => Some((b'0' + nibble) as char),
        0x0A => Some('*'),
        0x0B => Some('#'),
        0x0C => Some('a'),
        0x0D => Some('b'),
        0x0E => Some('c'),
        _ => None,
    }
}

/// Swap digit pairs into semi-octets, padding an odd count with `F`.
pub fn encode_semi_octets(digits: &str) -> Result<Vec<u8>> {
    let nibbles = digits
        .chars()
        .map(|c| {
            semi_octet_value(c)
                .ok_or_else(|| Error::Encoding(format!("invalid semi-octet digit {:?}", c)))
        })
        .collect::<Result<Vec<u8>>>()?;
    Ok(nibbles
        .chunks(2)
        .map(|pair| {
            let low = pair[0];
            let high = pair.get(1).copied().unwrap_or(0x0F);
            (high << 4) | low
        })
        .collect())
}

/// Inverse of [`encode_semi_octets`]. Stops at `max_digits` or an `F` filler.
pub fn decode_semi_octets(bytes: &[u8], max_digits: usize) -> Result<String> {
    let mut out = String::with_capacity(max_digits);
    'outer: for byte in bytes {
        for nibble in [byte & 0x0F, byte >> 4] {
            if out.len() >= max_digits || nibble == 0x0F {
                break 'outer;
            }
            let c = semi_octet_char(nibble)
                .ok_or_else(|| Error::Encoding(format!("invalid semi-octet 0x{:X}", nibble)))?;
            out.push(c);
        }
    }
    Ok(out)
}

// ============================================================================
// Data coding, validity, timestamps
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Alphabet {
    Gsm7,
    EightBit,
    Ucs2,
}

impl Alphabet {
    /// DCS for a class-less message in this alphabet.
    pub fn dcs(&self) -> u8 {
        match self {
            Alphabet::Gsm7 => 0x00,
            Alphabet::EightBit => 0x04,
            Alphabet::Ucs2 => 0x08,
        }
    }

    /// Interpret a DCS octet (general data coding and message-class groups).
    pub fn from_dcs(dcs: u8) -> Result<Self> {
        match dcs & 0xF0 {
            0x00..=0x70 => {
                if dcs & 0x20 != 0 {
                    return Err(Error::Encoding(format!(
                        "compressed user data (DCS 0x{:02X}) is not supported",
                        dcs
                    )));
                }
                match (dcs >> 2) & 0x03 {
                    0 => Ok(Alphabet::Gsm7),
                    1 => Ok(Alphabet::EightBit),
                    2 => Ok(Alphabet::Ucs2),
                    _ => Err(Error::Encoding(format!("reserved alphabet in DCS 0x{:02X}", dcs))),
                }
            }
            // message waiting indication groups
            0xC0 | 0xD0 => Ok(Alphabet::Gsm7),
            0xE0 => Ok(Alphabet::Ucs2),
            0xF0 => {
                if dcs & 0x04 != 0 {
                    Ok(Alphabet::EightBit)
                } else {
                    Ok(Alphabet::Gsm7)
                }
            }
            _ => Err(Error::Encoding(format!("reserved DCS group 0x{:02X}", dcs))),
        }
    }
}

impl fmt::Display for Alphabet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Alphabet::Gsm7 => write!(f, "gsm7"),
            Alphabet::EightBit => write!(f, "8bit"),
            Alphabet::Ucs2 => write!(f, "ucs2"),
        }
    }
}

/// Relative validity period (TP-VP, relative format).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ValidityPeriod(pub u8);

impl Default for ValidityPeriod {
    /// 24 hours.
    fn default() -> Self {
        ValidityPeriod(0xA7)
    }
}

impl ValidityPeriod {
    /// Smallest encodable period that is at least `duration`, saturating at 63 weeks.
    pub fn from_duration(duration: Duration) -> Self {
        let minutes = (duration.as_secs() + 59) / 60;
        let value = if minutes <= 12 * 60 {
            ((minutes + 4) / 5).saturating_sub(1)
        } else if minutes <= 24 * 60 {
            143 + (minutes - 12 * 60 + 29) / 30
        } else {
            let days = (minutes + 1439) / 1440;
            if days <= 30 {
                166 + days
            } else {
                192 + ((days + 6) / 7).max(5)
            }
        };
        ValidityPeriod(value.min(255) as u8)
    }

    pub fn duration(&self) -> Duration {
        let v = self.0 as u64;
        let minutes = match v {
            0..=143 => (v + 1) * 5,
            144..=167 => 12 * 60 + (v - 143) * 30,
            168..=196 => (v - 166) * 1440,
            _ => (v - 192) * 7 * 1440,
        };
        Duration::from_secs(minutes * 60)
    }
}

fn swap_bcd(byte: u8) -> Result<u32> {
    let tens = byte & 0x0F;
    let units = byte >> 4;
    if tens > 9 || units > 9 {
        return Err(Error::Encoding(format!("invalid BCD octet 0x{:02X}", byte)));
    }
    Ok((tens * 10 + units) as u32)
}

/// Service-centre timestamp: 7 swapped-BCD octets, zone in quarter hours with sign in bit 3.
pub fn decode_timestamp(bytes: &[u8]) -> Result<DateTime<FixedOffset>> {
    if bytes.len() < 7 {
        return Err(Error::Encoding("timestamp truncated".to_string()));
    }
    let year = 2000 + swap_bcd(bytes[0])? as i32;
    let month = swap_bcd(bytes[1])?;
    let day = swap_bcd(bytes[2])?;
    let hour = swap_bcd(bytes[3])?;
    let minute = swap_bcd(bytes[4])?;
    let second = swap_bcd(bytes[5])?;

    let zone = bytes[6];
    let quarters = swap_bcd(zone & 0xF7)? as i32;
    let sign = if zone & 0x08 != 0 { -1 } else { 1 };
    let offset = FixedOffset::east_opt(sign * quarters * 15 * 60)
        .ok_or_else(|| Error::Encoding(format!("invalid time zone {} quarters", quarters)))?;

    NaiveDate::from_ymd_opt(year, month, day)
        .and_then(|date| date.and_hms_opt(hour, minute, second))
        .and_then(|naive| naive.and_local_timezone(offset).single())
        .ok_or_else(|| {
            Error::Encoding(format!(
                "invalid timestamp {:04}-{:02}-{:02} {:02}:{:02}:{:02}",
                year, month, day, hour, minute, second
            ))
        })
}

// ============================================================================
// User data header
// ============================================================================

/// Position of one part within a concatenated message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartInfo {
    pub reference: u16,
    pub total: u8,
    pub sequence: u8,
}

impl PartInfo {
    /// UDH including its length octet, 8-bit reference form.
    fn header(&self) -> Vec<u8> {
        vec![
            0x05,
            IEI_CONCAT_8,
            0x03,
            self.reference as u8,
            self.total,
            self.sequence,
        ]
    }
}

/// Walk the information elements of a UDH (without its length octet).
fn parse_udh(udh: &[u8]) -> Option<PartInfo> {
    let mut pos = 0;
    while pos + 2 <= udh.len() {
        let iei = udh[pos];
        let len = udh[pos + 1] as usize;
        let data = udh.get(pos + 2..pos + 2 + len)?;
        match (iei, len) {
            (IEI_CONCAT_8, 3) => {
                return Some(PartInfo {
                    reference: data[0] as u16,
                    total: data[1],
                    sequence: data[2],
                })
            }
            (IEI_CONCAT_16, 4) => {
                return Some(PartInfo {
                    reference: u16::from_be_bytes([data[0], data[1]]),
                    total: data[2],
                    sequence: data[3],
                })
            }
            _ => {}
        }
        pos += 2 + len;
    }
    None
}

// ============================================================================
// SMS-SUBMIT
// ============================================================================

/// One encoded SMS-SUBMIT ready for `AT+CMGS=<tpdu_len>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedPdu {
    /// SMSC field plus TPDU, uppercase hex
    pub hex: String,
    /// TPDU length in octets (excludes the SMSC field)
    pub tpdu_len: usize,
}

#[derive(Debug, Clone)]
pub struct SubmitPdu {
    pub destination: Address,
    pub alphabet: Alphabet,
    pub text: String,
    pub validity: ValidityPeriod,
    pub status_report: bool,
    pub part: Option<PartInfo>,
}

impl SubmitPdu {
    pub fn encode(&self) -> Result<EncodedPdu> {
        let header = self.part.map(|p| p.header()).unwrap_or_default();

        let mut first_octet = FO_SUBMIT | FO_VPF_RELATIVE;
        if self.status_report {
            first_octet |= FO_SRR;
        }
        if !header.is_empty() {
            first_octet |= FO_UDHI;
        }

        // SMSC length 0: use the one stored in the modem
        let mut pdu = vec![0x00, first_octet, 0x00];
        pdu.extend(self.destination.encode()?);
        pdu.push(0x00); // PID
        pdu.push(self.alphabet.dcs());
        pdu.push(self.validity.0);

        match self.alphabet {
            Alphabet::Gsm7 => {
                let septets = gsm7::to_septets(&self.text)?;
                let header_bits = header.len() * 8;
                let fill_bits = ((7 - header_bits % 7) % 7) as u8;
                let header_septets = (header_bits + fill_bits as usize) / 7;
                let udl = header_septets + septets.len();
                if udl > MAX_SEPTETS {
                    return Err(Error::Encoding(format!(
                        "user data of {} septets exceeds one PDU",
                        udl
                    )));
                }
                pdu.push(udl as u8);
                pdu.extend_from_slice(&header);
                pdu.extend(gsm7::pack(&septets, fill_bits));
            }
            Alphabet::Ucs2 => {
                let body: Vec<u8> = self
                    .text
                    .encode_utf16()
                    .flat_map(|unit| unit.to_be_bytes())
                    .collect();
                let udl = header.len() + body.len();
                if udl > 140 {
                    return Err(Error::Encoding(format!(
                        "user data of {} octets exceeds one PDU",
                        udl
                    )));
                }
                pdu.push(udl as u8);
                pdu.extend_from_slice(&header);
                pdu.extend(body);
            }
            Alphabet::EightBit => {
                return Err(Error::Encoding(
                    "8-bit submit is not supported for text messages".to_string(),
                ))
            }
        }

        Ok(EncodedPdu {
            tpdu_len: pdu.len() - 1,
            hex: hex::encode_upper(&pdu),
        })
    }
}

/// GSM-7 when every character is representable, UCS-2 otherwise.
pub fn choose_alphabet(text: &str) -> Alphabet {
    if gsm7::is_representable(text) {
        Alphabet::Gsm7
    } else {
        Alphabet::Ucs2
    }
}

/// Split `text` into per-part chunks. Never splits an escape pair or surrogate pair.
pub fn split_text(text: &str, alphabet: Alphabet) -> Result<Vec<String>> {
    let (single, per_part) = match alphabet {
        Alphabet::Gsm7 => (MAX_SEPTETS, CONCAT_SEPTETS),
        Alphabet::Ucs2 => (MAX_UCS2_UNITS, CONCAT_UCS2_UNITS),
        Alphabet::EightBit => (140, 134),
    };
    let cost = |c: char| match alphabet {
        Alphabet::Gsm7 => gsm7::char_septets(c).unwrap_or(1),
        Alphabet::Ucs2 => c.len_utf16(),
        Alphabet::EightBit => c.len_utf8(),
    };

    let total: usize = text.chars().map(cost).sum();
    if total <= single {
        return Ok(vec![text.to_string()]);
    }

    let mut parts = Vec::new();
    let mut current = String::new();
    let mut used = 0;
    for c in text.chars() {
        let n = cost(c);
        if used + n > per_part {
            parts.push(std::mem::take(&mut current));
            used = 0;
        }
        current.push(c);
        used += n;
    }
    if !current.is_empty() {
        parts.push(current);
    }
    if parts.len() > 255 {
        return Err(Error::Encoding(format!(
            "message needs {} parts, at most 255 allowed",
            parts.len()
        )));
    }
    Ok(parts)
}

/// Build every SMS-SUBMIT needed for `text`. `reference` ties the parts together.
pub fn build_submits(
    destination: &Address,
    text: &str,
    validity: ValidityPeriod,
    reference: u8,
) -> Result<Vec<EncodedPdu>> {
    let alphabet = choose_alphabet(text);
    let chunks = split_text(text, alphabet)?;
    let total = chunks.len();

    chunks
        .into_iter()
        .enumerate()
        .map(|(i, chunk)| {
            let part = (total > 1).then(|| PartInfo {
                reference: reference as u16,
                total: total as u8,
                sequence: (i + 1) as u8,
            });
            SubmitPdu {
                destination: destination.clone(),
                alphabet,
                text: chunk,
                validity,
                status_report: false,
                part,
            }
            .encode()
        })
        .collect()
}

// ============================================================================
// SMS-DELIVER
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TpduKind {
    Deliver,
    Submit,
    StatusReport,
    Reserved,
}

/// Classify a PDU (with SMSC field) by its message type indicator.
pub fn tpdu_kind(bytes: &[u8]) -> Result<TpduKind> {
    let (_, consumed) = Address::decode_smsc(bytes)?;
    let first = *bytes
        .get(consumed)
        .ok_or_else(|| Error::Encoding("PDU has no first octet".to_string()))?;
    Ok(match first & 0x03 {
        MTI_DELIVER => TpduKind::Deliver,
        MTI_SUBMIT => TpduKind::Submit,
        MTI_STATUS_REPORT => TpduKind::StatusReport,
        _ => TpduKind::Reserved,
    })
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeliverPdu {
    pub smsc: Option<Address>,
    pub sender: Address,
    pub pid: u8,
    pub alphabet: Alphabet,
    pub timestamp: DateTime<FixedOffset>,
    pub part: Option<PartInfo>,
    pub text: String,
}

impl DeliverPdu {
    pub fn decode_hex(hex: &str) -> Result<Self> {
        let bytes = hex::decode(hex.trim())
            .map_err(|e| Error::Encoding(format!("invalid PDU hex: {}", e)))?;
        Self::decode(&bytes)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let (smsc, consumed) = Address::decode_smsc(bytes)?;
        let mut reader = Reader::new(&bytes[consumed..]);

        let first = reader.u8()?;
        if first & 0x03 != MTI_DELIVER {
            return Err(Error::Encoding(format!(
                "not an SMS-DELIVER (first octet 0x{:02X})",
                first
            )));
        }
        let udhi = first & FO_UDHI != 0;

        let (sender, used) = Address::decode(reader.rest())?;
        reader.skip(used)?;
        let pid = reader.u8()?;
        let alphabet = Alphabet::from_dcs(reader.u8()?)?;
        let timestamp = decode_timestamp(reader.take(7)?)?;
        let udl = reader.u8()? as usize;
        let ud = reader.rest();

        let (part, text) = decode_user_data(ud, udl, udhi, alphabet)?;
        Ok(Self {
            smsc,
            sender,
            pid,
            alphabet,
            timestamp,
            part,
            text,
        })
    }
}

fn decode_user_data(
    ud: &[u8],
    udl: usize,
    udhi: bool,
    alphabet: Alphabet,
) -> Result<(Option<PartInfo>, String)> {
    let (header_len, part) = if udhi {
        let udhl = *ud
            .first()
            .ok_or_else(|| Error::Encoding("UDHI set but user data empty".to_string()))?
            as usize;
        let udh = ud
            .get(1..1 + udhl)
            .ok_or_else(|| Error::Encoding("user data header truncated".to_string()))?;
        (udhl + 1, parse_udh(udh))
    } else {
        (0, None)
    };

    let text = match alphabet {
        Alphabet::Gsm7 => {
            let header_bits = header_len * 8;
            let header_septets = (header_bits + 6) / 7;
            let fill_bits = (header_septets * 7 - header_bits) as u8;
            let count = udl.saturating_sub(header_septets);
            let needed = (header_bits + fill_bits as usize + count * 7 + 7) / 8;
            if ud.len() < needed {
                return Err(Error::Encoding("GSM-7 user data truncated".to_string()));
            }
            let septets = gsm7::unpack(&ud[header_len..], count, fill_bits);
            gsm7::from_septets(&septets)?
        }
        Alphabet::Ucs2 => {
            let body = ud
                .get(header_len..udl)
                .ok_or_else(|| Error::Encoding("UCS-2 user data truncated".to_string()))?;
            decode_ucs2(body)?
        }
        Alphabet::EightBit => {
            let body = ud
                .get(header_len..udl)
                .ok_or_else(|| Error::Encoding("8-bit user data truncated".to_string()))?;
            match std::str::from_utf8(body) {
                Ok(text) => text.to_string(),
                Err(_) => hex::encode_upper(body),
            }
        }
    };
    Ok((part, text))
}

/// Bounds-checked cursor over PDU octets.
struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    fn u8(&mut self) -> Result<u8> {
        let byte = *self
            .bytes
            .get(self.pos)
            .ok_or_else(|| Error::Encoding("PDU truncated".to_string()))?;
        self.pos += 1;
        Ok(byte)
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        let slice = self
            .bytes
            .get(self.pos..self.pos + n)
            .ok_or_else(|| Error::Encoding("PDU truncated".to_string()))?;
        self.pos += n;
        Ok(slice)
    }

    fn skip(&mut self, n: usize) -> Result<()> {
        self.take(n).map(|_| ())
    }

    fn rest(&self) -> &'a [u8] {
        &self.bytes[self.pos.min(self.bytes.len())..]
    }
}
