//! GSM 03.38 default alphabet and 7-bit packing
//!
//! Text is first mapped to septets (one per default-alphabet character, two for
//! characters in the extension table), then packed 8 septets into 7 octets.

use crate::error::{Error, Result};
use once_cell::sync::Lazy;
use std::collections::HashMap;

/// Escape to the extension table.
pub const ESCAPE: u8 = 0x1B;

const ALPHABET_NAME: &str = "GSM 7-bit default alphabet";

/// Default alphabet indexed by septet value. 0x1B is the escape and never maps to a character.
const DEFAULT_ALPHABET: [char; 128] = [
    '@', '£', '$', '¥', 'è', 'é', 'ù', 'ì', 'ò', 'Ç', '\n', 'Ø', 'ø', '\r', 'Å', 'å', //
    'Δ', '_', 'Φ', 'Γ', 'Λ', 'Ω', 'Π', 'Ψ', 'Σ', 'Θ', 'Ξ', '\u{1B}', 'Æ', 'æ', 'ß', 'É', //
    ' ', '!', '"', '#', '¤', '%', '&', '\'', '(', ')', '*', '+', ',', '-', '.', '/', //
    '0', '1', '2', '3', '4', '5', '6', '7', '8', '9', ':', ';', '<', '=', '>', '?', //
    '¡', 'A', 'B', 'C', 'D', 'E', 'F', 'G', 'H', 'I', 'J', 'K', 'L', 'M', 'N', 'O', //
    'P', 'Q', 'R', 'S', 'T', 'U', 'V', 'W', 'X', 'Y', 'Z', 'Ä', 'Ö', 'Ñ', 'Ü', '§', //
    '¿', 'a', 'b', 'c', 'd', 'e', 'f', 'g', 'h', 'i', 'j', 'k', 'l', 'm', 'n', 'o', //
    'p', 'q', 'r', 's', 't', 'u', 'v', 'w', 'x', 'y', 'z', 'ä', 'ö', 'ñ', 'ü', 'à', //
];

/// Extension table: (septet after ESCAPE, character)
const EXTENSION_TABLE: [(u8, char); 10] = [
    (0x0A, '\u{0C}'),
    (0x14, '^'),
    (0x28, '{'),
    (0x29, '}'),
    (0x2F, '\\'),
    (0x3C, '['),
    (0x3D, '~'),
    (0x3E, ']'),
    (0x40, '|'),
    (0x65, '€'),
];

static DEFAULT_LOOKUP: Lazy<HashMap<char, u8>> = Lazy::new(|| {
    DEFAULT_ALPHABET
        .iter()
        .enumerate()
        .filter(|(code, _)| *code as u8 != ESCAPE)
        .map(|(code, ch)| (*ch, code as u8))
        .collect()
});

static EXTENSION_LOOKUP: Lazy<HashMap<char, u8>> =
    Lazy::new(|| EXTENSION_TABLE.iter().map(|(code, ch)| (*ch, *code)).collect());

/// Septets needed for `c`, or `None` if it is outside both tables.
pub fn char_septets(c: char) -> Option<usize> {
    if DEFAULT_LOOKUP.contains_key(&c) {
        Some(1)
    } else if EXTENSION_LOOKUP.contains_key(&c) {
        Some(2)
    } else {
        None
    }
}

pub fn is_representable(text: &str) -> bool {
    text.chars().all(|c| char_septets(c).is_some())
}

/// Map text to unpacked septets.
pub fn to_septets(text: &str) -> Result<Vec<u8>> {
    let mut septets = Vec::with_capacity(text.len());
    for c in text.chars() {
        if let Some(code) = DEFAULT_LOOKUP.get(&c) {
            septets.push(*code);
        } else if let Some(code) = EXTENSION_LOOKUP.get(&c) {
            septets.push(ESCAPE);
            septets.push(*code);
        } else {
            return Err(Error::UnsupportedCharacter {
                ch: c,
                alphabet: ALPHABET_NAME,
            });
        }
    }
    Ok(septets)
}

/// Map unpacked septets back to text.
///
/// An escape followed by a code with no extension entry decodes as the
/// default-alphabet character for that code (GSM 03.38 fallback).
pub fn from_septets(septets: &[u8]) -> Result<String> {
    let mut text = String::with_capacity(septets.len());
    let mut iter = septets.iter();
    while let Some(&septet) = iter.next() {
        if septet > 0x7F {
            return Err(Error::Encoding(format!(
                "value 0x{:02X} is not a septet",
                septet
            )));
        }
        if septet == ESCAPE {
            let next = *iter
                .next()
                .ok_or_else(|| Error::Encoding("dangling GSM escape".to_string()))?;
            let ext = EXTENSION_TABLE
                .iter()
                .find(|(code, _)| *code == next)
                .map(|(_, ch)| *ch);
            match ext {
                Some(ch) => text.push(ch),
                None if next != ESCAPE && next <= 0x7F => text.push(DEFAULT_ALPHABET[next as usize]),
                None => {
                    return Err(Error::Encoding(format!(
                        "invalid GSM extension code 0x{:02X}",
                        next
                    )))
                }
            }
        } else {
            text.push(DEFAULT_ALPHABET[septet as usize]);
        }
    }
    Ok(text)
}

/// Pack septets into octets, starting after `fill_bits` zero bits.
pub fn pack(septets: &[u8], fill_bits: u8) -> Vec<u8> {
    let total_bits = fill_bits as usize + septets.len() * 7;
    let mut packed = vec![0u8; (total_bits + 7) / 8];
    let mut bit = fill_bits as usize;

    for &septet in septets {
        let value = ((septet & 0x7F) as u16) << (bit % 8);
        let byte = bit / 8;
        packed[byte] |= (value & 0xFF) as u8;
        if value > 0xFF {
            packed[byte + 1] |= (value >> 8) as u8;
        }
        bit += 7;
    }

    packed
}

/// Unpack `count` septets from octets, skipping `fill_bits` leading bits.
pub fn unpack(packed: &[u8], count: usize, fill_bits: u8) -> Vec<u8> {
    let mut septets = Vec::with_capacity(count);
    let mut bit = fill_bits as usize;

    for _ in 0..count {
        let byte = bit / 8;
        let shift = bit % 8;
        if byte >= packed.len() {
            break;
        }
        let mut value = (packed[byte] as u16) >> shift;
        if shift > 1 && byte + 1 < packed.len() {
            value |= (packed[byte + 1] as u16) << (8 - shift);
        }
        septets.push((value & 0x7F) as u8);
        bit += 7;
    }

    septets
}
