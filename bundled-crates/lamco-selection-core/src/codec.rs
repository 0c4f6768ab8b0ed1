//! Format conversion between envelopes and wire encodings.
//!
//! UTF-8 formats pass through. `STRING` is ISO-8859-1. `COMPOUND_TEXT` and
//! `TEXT` use a subset of ISO-2022 compound text: ASCII and the Latin-1 right
//! half are written raw and anything else goes into a UTF-8 extended
//! segment, which every modern reader accepts.

use bytes::Bytes;

use crate::envelope::Envelope;
use crate::formats::Format;
use crate::register::RegisterType;
use crate::transfer::DEFAULT_MAX_SIZE;
use crate::{SelectionError, SelectionResult};

const ESC: u8 = 0x1B;
const CSI: u8 = 0x9B;

/// `ESC % G`: enter UTF-8 segment
const UTF8_SEGMENT_START: &[u8] = b"\x1B%G";
/// `ESC % @`: return to ISO-2022
const UTF8_SEGMENT_END: &[u8] = b"\x1B%@";

// =============================================================================
// Format Converter
// =============================================================================

/// Converts envelopes to and from wire formats
#[derive(Debug, Clone)]
pub struct FormatConverter {
    /// Maximum data size for conversion (default: 16MB)
    pub max_size: usize,
}

impl Default for FormatConverter {
    fn default() -> Self {
        Self::new()
    }
}

impl FormatConverter {
    /// Create a converter with default settings
    pub fn new() -> Self {
        Self {
            max_size: DEFAULT_MAX_SIZE,
        }
    }

    /// Create a converter with a custom max size
    pub fn with_max_size(max_size: usize) -> Self {
        Self { max_size }
    }

    fn check_size(&self, len: usize) -> SelectionResult<()> {
        if len > self.max_size {
            return Err(SelectionError::DataSizeExceeded {
                actual: len,
                max: self.max_size,
            });
        }
        Ok(())
    }

    /// Encode a stored envelope for a text target
    pub fn encode(&self, format: Format, envelope: &Envelope) -> SelectionResult<Vec<u8>> {
        self.check_size(envelope.len())?;
        let bytes = match format {
            Format::VimEnc => envelope.to_wire(),
            Format::VimText => envelope.to_legacy_wire(),
            Format::PlainUtf8 | Format::Utf8String | Format::Plain => envelope.payload.to_vec(),
            Format::CompoundText | Format::Text | Format::String => {
                let text = String::from_utf8_lossy(&envelope.payload);
                self.encode_legacy_text(format, &text)?
            }
            other => return Err(SelectionError::UnsupportedFormat(other.name().to_string())),
        };
        Ok(bytes)
    }

    /// Decode bytes received for a text target
    ///
    /// An envelope tagged with an encoding other than UTF-8 yields
    /// [`SelectionError::EncodingMismatch`]; the caller should re-request a
    /// plain UTF-8 target.
    pub fn decode(&self, format: Format, data: &[u8]) -> SelectionResult<Envelope> {
        self.check_size(data.len())?;
        match format {
            Format::VimEnc => {
                let envelope = Envelope::from_wire(data)?;
                if !envelope.is_utf8() {
                    return Err(SelectionError::EncodingMismatch(envelope.encoding));
                }
                Ok(envelope)
            }
            Format::VimText => Envelope::from_legacy_wire(data),
            Format::PlainUtf8 | Format::Utf8String | Format::Plain => {
                Ok(Envelope::utf8(RegisterType::Auto, Bytes::copy_from_slice(data)))
            }
            Format::CompoundText | Format::Text | Format::String => {
                let text = self.decode_legacy_text(format, data)?;
                Ok(Envelope::utf8(RegisterType::Auto, text))
            }
            other => Err(SelectionError::UnsupportedFormat(other.name().to_string())),
        }
    }

    /// Convert UTF-8 text to a legacy 8-bit representation
    pub fn encode_legacy_text(&self, format: Format, text: &str) -> SelectionResult<Vec<u8>> {
        self.check_size(text.len())?;
        match format {
            Format::String => Ok(latin1_encode(text)),
            Format::CompoundText | Format::Text => Ok(compound_text_encode(text)),
            other => Err(SelectionError::UnsupportedFormat(other.name().to_string())),
        }
    }

    /// Convert a legacy 8-bit representation to UTF-8 text
    pub fn decode_legacy_text(&self, format: Format, data: &[u8]) -> SelectionResult<String> {
        self.check_size(data.len())?;
        match format {
            Format::String => Ok(latin1_decode(data)),
            Format::CompoundText | Format::Text => compound_text_decode(data),
            other => Err(SelectionError::UnsupportedFormat(other.name().to_string())),
        }
    }
}

// =============================================================================
// ISO-8859-1
// =============================================================================

/// Encode as ISO-8859-1; characters above U+00FF become '?'
pub fn latin1_encode(text: &str) -> Vec<u8> {
    text.chars()
        .map(|c| u8::try_from(u32::from(c)).unwrap_or(b'?'))
        .collect()
}

/// Decode ISO-8859-1
pub fn latin1_decode(data: &[u8]) -> String {
    data.iter().map(|&b| char::from(b)).collect()
}

// =============================================================================
// Compound Text
// =============================================================================

fn is_latin1_graphic(c: char) -> bool {
    let c = u32::from(c);
    c < 0x80 || (0xA0..=0xFF).contains(&c)
}

/// Encode as compound text
pub fn compound_text_encode(text: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(text.len());
    let mut in_utf8 = false;
    let mut buf = [0u8; 4];

    for c in text.chars() {
        if is_latin1_graphic(c) {
            if in_utf8 {
                out.extend_from_slice(UTF8_SEGMENT_END);
                in_utf8 = false;
            }
            out.push(u32::from(c) as u8);
        } else {
            if !in_utf8 {
                out.extend_from_slice(UTF8_SEGMENT_START);
                in_utf8 = true;
            }
            out.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
        }
    }
    if in_utf8 {
        out.extend_from_slice(UTF8_SEGMENT_END);
    }
    out
}

/// Decode compound text
///
/// Understands the default designations (ASCII in GL, Latin-1 in GR),
/// their explicit forms `ESC ( B` and `ESC - A`, UTF-8 segments and
/// direction sequences. Other character sets are rejected.
pub fn compound_text_decode(data: &[u8]) -> SelectionResult<String> {
    let mut out: Vec<u8> = Vec::with_capacity(data.len());
    let mut in_utf8 = false;
    let mut i = 0;

    while i < data.len() {
        let byte = data[i];

        if byte == ESC {
            let seq = data.get(i + 1..i + 3).unwrap_or(&[]);
            match seq {
                b"%G" => in_utf8 = true,
                b"%@" => in_utf8 = false,
                b"(B" | b"-A" if !in_utf8 => {}
                _ => {
                    return Err(SelectionError::Decode(format!(
                        "unsupported compound text designation at byte {i}"
                    )))
                }
            }
            i += 3;
            continue;
        }

        if in_utf8 {
            out.push(byte);
            i += 1;
            continue;
        }

        match byte {
            CSI => {
                // Direction: CSI 1 ], CSI 2 ], CSI ]
                let len = match data.get(i + 1) {
                    Some(b'1') | Some(b'2') if data.get(i + 2) == Some(&b']') => 3,
                    Some(b']') => 2,
                    _ => {
                        return Err(SelectionError::Decode(format!(
                            "malformed control sequence at byte {i}"
                        )))
                    }
                };
                i += len;
                continue;
            }
            0x00..=0x7F => out.push(byte),
            0xA0..=0xFF => {
                let mut buf = [0u8; 4];
                out.extend_from_slice(char::from(byte).encode_utf8(&mut buf).as_bytes());
            }
            _ => {
                return Err(SelectionError::Decode(format!(
                    "unexpected C1 control 0x{byte:02X} at byte {i}"
                )))
            }
        }
        i += 1;
    }

    String::from_utf8(out).map_err(|_| SelectionError::Decode("invalid UTF-8 segment in compound text".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_latin1() {
        assert_eq!(latin1_encode("café"), b"caf\xE9");
        assert_eq!(latin1_encode("a€b"), b"a?b");
        assert_eq!(latin1_decode(b"caf\xE9"), "café");
    }

    #[test]
    fn test_compound_text_ascii_and_latin1_are_raw() {
        assert_eq!(compound_text_encode("plain"), b"plain");
        assert_eq!(compound_text_encode("né"), b"n\xE9");
    }

    #[test]
    fn test_compound_text_utf8_segment() {
        let encoded = compound_text_encode("a€b");
        assert_eq!(encoded, b"a\x1B%G\xE2\x82\xAC\x1B%@b");
        assert_eq!(compound_text_decode(&encoded).unwrap(), "a€b");
    }

    #[test]
    fn test_compound_text_mixed_round_trip() {
        let text = "Grüße, 日本語 and ±1\nnext";
        assert_eq!(compound_text_decode(&compound_text_encode(text)).unwrap(), text);
    }

    #[test]
    fn test_compound_text_explicit_designations() {
        assert_eq!(compound_text_decode(b"\x1B(Bab\x1B-A\xE9").unwrap(), "abé");
        assert_eq!(compound_text_decode(b"\x9B1]x\x9B]").unwrap(), "x");
    }

    #[test]
    fn test_compound_text_rejects_other_charsets() {
        // ESC $ ) A designates GB2312
        assert!(compound_text_decode(b"\x1B$)A\xB0\xA1").is_err());
        assert!(compound_text_decode(b"a\x85b").is_err());
    }

    #[test]
    fn test_encode_per_format() {
        let converter = FormatConverter::new();
        let env = Envelope::utf8(RegisterType::Line, "é\n");
        assert_eq!(converter.encode(Format::VimEnc, &env).unwrap(), b"\x01utf-8\0\xC3\xA9\n");
        assert_eq!(converter.encode(Format::VimText, &env).unwrap(), b"\x01\xC3\xA9\n");
        assert_eq!(converter.encode(Format::Utf8String, &env).unwrap(), "é\n".as_bytes());
        assert_eq!(converter.encode(Format::String, &env).unwrap(), b"\xE9\n");
        assert_eq!(converter.encode(Format::CompoundText, &env).unwrap(), b"\xE9\n");
        assert!(converter.encode(Format::Targets, &env).is_err());
    }

    #[test]
    fn test_decode_encoding_mismatch() {
        let converter = FormatConverter::new();
        match converter.decode(Format::VimEnc, b"\x00latin1\0abc") {
            Err(SelectionError::EncodingMismatch(enc)) => assert_eq!(enc, "latin1"),
            other => panic!("expected EncodingMismatch, got {other:?}"),
        }
    }

    #[test]
    fn test_decode_legacy_to_utf8() {
        let converter = FormatConverter::new();
        let env = converter.decode(Format::String, b"na\xEFve").unwrap();
        assert_eq!(&env.payload[..], "naïve".as_bytes());
        assert_eq!(env.register_type, RegisterType::Auto);
    }

    #[test]
    fn test_size_limit() {
        let converter = FormatConverter::with_max_size(4);
        let env = Envelope::utf8(RegisterType::Char, "too long");
        assert!(matches!(
            converter.encode(Format::Utf8String, &env),
            Err(SelectionError::DataSizeExceeded { actual: 8, max: 4 })
        ));
    }
}
