//! Text encoding detection and per-row decoding.
//!
//! Detection is advisory: it looks at a byte sample (the first MiB of the
//! file) and picks UTF-8 when the sample is valid UTF-8, the legacy GBK
//! codepage otherwise. An explicit [`EncodingChoice::Fixed`] always wins.

use std::borrow::Cow;
use std::fmt;
use std::str::FromStr;

use serde::Deserialize;

pub const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Upper bound on the number of bytes inspected by detection.
pub const SAMPLE_LIMIT: usize = 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    Utf8,
    /// Legacy multi-byte codepage (GBK / CP936).
    Gbk,
    /// Single-byte Latin text, decoded as windows-1252.
    Ascii,
}

impl Encoding {
    pub fn label(self) -> &'static str {
        match self {
            Encoding::Utf8 => "UTF-8",
            Encoding::Gbk => "GBK",
            Encoding::Ascii => "ASCII",
        }
    }

    fn codec(self) -> &'static encoding_rs::Encoding {
        match self {
            Encoding::Utf8 => encoding_rs::UTF_8,
            Encoding::Gbk => encoding_rs::GBK,
            Encoding::Ascii => encoding_rs::WINDOWS_1252,
        }
    }
}

impl fmt::Display for Encoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Encoding selection supplied by the user (CLI, config, `:enc`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(try_from = "String")]
pub enum EncodingChoice {
    #[default]
    Auto,
    Fixed(Encoding),
}

impl EncodingChoice {
    /// Apply the choice to a byte sample.
    pub fn resolve(self, sample: &[u8], sample_is_prefix: bool) -> Encoding {
        match self {
            EncodingChoice::Fixed(enc) => enc,
            EncodingChoice::Auto if sample_is_prefix => detect_encoding_prefix(sample),
            EncodingChoice::Auto => detect_encoding(sample),
        }
    }
}

impl FromStr for EncodingChoice {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" | "" => Ok(EncodingChoice::Auto),
            "utf8" | "utf-8" => Ok(EncodingChoice::Fixed(Encoding::Utf8)),
            "gbk" | "cp936" | "gb2312" => Ok(EncodingChoice::Fixed(Encoding::Gbk)),
            "ascii" | "latin1" | "latin-1" => Ok(EncodingChoice::Fixed(Encoding::Ascii)),
            other => Err(format!(
                "unknown encoding '{other}' (expected auto, utf8, gbk or ascii)"
            )),
        }
    }
}

impl TryFrom<String> for EncodingChoice {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl fmt::Display for EncodingChoice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EncodingChoice::Auto => f.write_str("auto"),
            EncodingChoice::Fixed(enc) => enc.fmt(f),
        }
    }
}

/// Classify a complete byte sample.
///
/// BOM → UTF-8; valid UTF-8 → UTF-8; anything else → GBK. An empty sample is
/// UTF-8. A multi-byte sequence cut off by the end of the sample fails.
pub fn detect_encoding(sample: &[u8]) -> Encoding {
    detect(sample, false)
}

/// Like [`detect_encoding`], but the sample is a prefix of a longer file, so a
/// sequence truncated by the sample boundary is not held against it.
pub fn detect_encoding_prefix(sample: &[u8]) -> Encoding {
    detect(sample, true)
}

fn detect(sample: &[u8], is_prefix: bool) -> Encoding {
    if sample.starts_with(UTF8_BOM) {
        return Encoding::Utf8;
    }
    if is_valid_utf8(sample, is_prefix) {
        Encoding::Utf8
    } else {
        Encoding::Gbk
    }
}

fn is_valid_utf8(data: &[u8], allow_truncated_tail: bool) -> bool {
    match std::str::from_utf8(data) {
        Ok(_) => true,
        // `error_len() == None` means the input ended mid-sequence.
        Err(e) => allow_truncated_tail && e.error_len().is_none(),
    }
}

/// Decoded text plus whether any bytes had to be replaced.
pub struct Decoded<'a> {
    pub text: Cow<'a, str>,
    pub lossy: bool,
}

/// Decode one row's bytes. Never fails: malformed sequences become U+FFFD
/// and `lossy` is set.
pub fn decode(bytes: &[u8], encoding: Encoding) -> Decoded<'_> {
    let (text, lossy) = encoding.codec().decode_without_bom_handling(bytes);
    Decoded { text, lossy }
}

/// Strip a leading UTF-8 byte-order mark, if any.
pub fn strip_bom(bytes: &[u8]) -> &[u8] {
    bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes)
}
