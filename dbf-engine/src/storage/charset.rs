//! Text transcoding for column names and character fields
//!
//! The engine never interprets text bytes itself; it hands them to a
//! [`TextCodec`]. [`Charset`] wraps any encoding known by its WHATWG label
//! ("utf-8", "latin1", "gbk", "big5", "shift_jis", ...).

use encoding_rs::{EncoderResult, Encoding, UTF_8, WINDOWS_1252};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Converts between stored bytes and Rust strings
pub trait TextCodec: Send + Sync {
    /// Decode stored bytes into text
    fn decode(&self, raw: &[u8]) -> String;

    /// Encode text into the bytes to store
    fn encode(&self, text: &str) -> Vec<u8>;
}

/// Built-in codec over an `encoding_rs` encoding
///
/// Malformed input decodes to U+FFFD. Characters the encoding cannot
/// represent are stored as `?`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Charset(&'static Encoding);

impl Charset {
    /// UTF-8, the default
    pub fn utf8() -> Self {
        Charset(UTF_8)
    }

    /// Western single-byte text; "latin1" and "iso-8859-1" resolve here
    pub fn latin1() -> Self {
        Charset(WINDOWS_1252)
    }

    /// Look up an encoding by label, ignoring case and surrounding spaces
    pub fn for_label(label: &str) -> Option<Self> {
        Encoding::for_label(label.trim().as_bytes()).map(Charset)
    }

    /// Canonical name of the encoding
    pub fn name(&self) -> &'static str {
        self.0.name()
    }
}

impl Default for Charset {
    fn default() -> Self {
        Charset::utf8()
    }
}

impl fmt::Display for Charset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl TextCodec for Charset {
    fn decode(&self, raw: &[u8]) -> String {
        self.0.decode_without_bom_handling(raw).0.into_owned()
    }

    fn encode(&self, text: &str) -> Vec<u8> {
        let mut encoder = self.0.new_encoder();
        let mut out = Vec::with_capacity(text.len());
        let mut rest = text;
        loop {
            let (result, read) = encoder.encode_from_utf8_to_vec_without_replacement(rest, &mut out, true);
            rest = &rest[read..];
            match result {
                EncoderResult::InputEmpty => return out,
                EncoderResult::OutputFull => out.reserve(rest.len().max(8) * 2),
                EncoderResult::Unmappable(_) => out.push(b'?'),
            }
        }
    }
}

impl FromStr for Charset {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Charset::for_label(s).ok_or_else(|| format!("unsupported charset: {}", s))
    }
}

impl TryFrom<String> for Charset {
    type Error = String;

    fn try_from(label: String) -> Result<Self, Self::Error> {
        label.parse()
    }
}

impl From<Charset> for String {
    fn from(charset: Charset) -> Self {
        charset.name().to_string()
    }
}
