//! Text encodings accepted by the text read/write shapes.
//!
//! Conversion happens at the operation boundary: text is encoded before a
//! write is submitted and decoded after a read resolves. The serializer only
//! ever moves bytes.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

const UTF8_BOM: &[u8] = &[0xEF, 0xBB, 0xBF];
const UTF16LE_BOM: &[u8] = &[0xFF, 0xFE];
const UTF16BE_BOM: &[u8] = &[0xFE, 0xFF];

/// A text encoding scheme.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Encoding {
    #[default]
    Utf8,
    Utf16Le,
    Utf16Be,
    Ascii,
}

impl Encoding {
    /// Canonical name, as accepted by [`FromStr`].
    pub fn name(&self) -> &'static str {
        match self {
            Self::Utf8 => "utf-8",
            Self::Utf16Le => "utf-16le",
            Self::Utf16Be => "utf-16be",
            Self::Ascii => "ascii",
        }
    }

    /// Encode text into bytes. No byte-order mark is emitted.
    pub fn encode(&self, text: &str) -> Result<Vec<u8>, TypeError> {
        match self {
            Self::Utf8 => Ok(text.as_bytes().to_vec()),
            Self::Utf16Le => Ok(text.encode_utf16().flat_map(u16::to_le_bytes).collect()),
            Self::Utf16Be => Ok(text.encode_utf16().flat_map(u16::to_be_bytes).collect()),
            Self::Ascii => match text.char_indices().find(|(_, c)| !c.is_ascii()) {
                Some((pos, c)) => Err(TypeError::Codec(format!(
                    "character {c:?} at byte {pos} is not ASCII"
                ))),
                None => Ok(text.as_bytes().to_vec()),
            },
        }
    }

    /// Decode bytes into text, stripping a leading byte-order mark that
    /// matches this encoding.
    pub fn decode(&self, bytes: &[u8]) -> Result<String, TypeError> {
        match self {
            Self::Utf8 => {
                let body = bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes);
                String::from_utf8(body.to_vec()).map_err(|e| TypeError::Codec(e.to_string()))
            }
            Self::Utf16Le => decode_utf16(
                bytes.strip_prefix(UTF16LE_BOM).unwrap_or(bytes),
                u16::from_le_bytes,
            ),
            Self::Utf16Be => decode_utf16(
                bytes.strip_prefix(UTF16BE_BOM).unwrap_or(bytes),
                u16::from_be_bytes,
            ),
            Self::Ascii => match bytes.iter().position(|b| !b.is_ascii()) {
                Some(pos) => Err(TypeError::Codec(format!(
                    "byte {:#04x} at offset {pos} is not ASCII",
                    bytes[pos]
                ))),
                None => Ok(bytes.iter().map(|&b| b as char).collect()),
            },
        }
    }
}

fn decode_utf16(bytes: &[u8], unit: fn([u8; 2]) -> u16) -> Result<String, TypeError> {
    if bytes.len() % 2 != 0 {
        return Err(TypeError::Codec(format!(
            "odd byte length {} for UTF-16",
            bytes.len()
        )));
    }
    let units: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|pair| unit([pair[0], pair[1]]))
        .collect();
    String::from_utf16(&units).map_err(|e| TypeError::Codec(e.to_string()))
}

impl fmt::Display for Encoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Encoding {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .chars()
            .filter(|c| *c != '-' && *c != '_')
            .map(|c| c.to_ascii_lowercase())
            .collect();
        match normalized.as_str() {
            "utf8" => Ok(Self::Utf8),
            "utf16" | "utf16le" | "unicode" => Ok(Self::Utf16Le),
            "utf16be" | "bigendianunicode" => Ok(Self::Utf16Be),
            "ascii" | "usascii" => Ok(Self::Ascii),
            _ => Err(TypeError::UnknownEncoding(s.to_string())),
        }
    }
}

impl TryFrom<String> for Encoding {
    type Error = TypeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Encoding> for String {
    fn from(encoding: Encoding) -> Self {
        encoding.name().to_string()
    }
}
