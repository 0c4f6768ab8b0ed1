//! The selection envelope.
//!
//! Text is held as an explicit [`Envelope`] and only packed into the wire
//! form at the protocol boundary:
//!
//! ```text
//! byte 0       register type tag (0 char, 1 line, 2 block, 255 auto)
//! bytes 1..N   NUL-terminated encoding name, "utf-8\0"
//! bytes N+1..  raw text payload
//! ```
//!
//! The legacy rich form (`_VIM_TEXT`) is the tag byte followed by the text.

use bytes::{BufMut, Bytes, BytesMut};

use crate::lines::{join_lines, resolve_register, split_lines};
use crate::register::RegisterType;
use crate::{SelectionError, SelectionResult};

/// Encoding name written into every envelope we produce
pub const UTF8_ENCODING: &str = "utf-8";

/// Register text with its type tag and source encoding
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    /// Copy semantics of the text
    pub register_type: RegisterType,
    /// Encoding the payload was tagged with at capture time
    pub encoding: String,
    /// Raw text bytes
    pub payload: Bytes,
}

impl Envelope {
    /// Envelope holding UTF-8 text
    pub fn utf8(register_type: RegisterType, payload: impl Into<Bytes>) -> Self {
        Self {
            register_type,
            encoding: UTF8_ENCODING.to_string(),
            payload: payload.into(),
        }
    }

    /// Build from host lines, joined for the given register type
    pub fn from_lines<S: AsRef<str>>(lines: &[S], register_type: RegisterType) -> Self {
        Self::utf8(register_type, join_lines(lines, register_type))
    }

    /// Split back into lines with the register type resolved
    pub fn to_lines(&self) -> (Vec<String>, RegisterType) {
        resolve_register(self.register_type, split_lines(&self.payload))
    }

    /// True when the payload carries UTF-8
    pub fn is_utf8(&self) -> bool {
        self.encoding == UTF8_ENCODING
    }

    /// Payload length in bytes
    pub fn len(&self) -> usize {
        self.payload.len()
    }

    /// True when the payload is empty
    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }

    /// Pack into the `_VIMENC_TEXT` wire form
    pub fn to_wire(&self) -> Vec<u8> {
        let mut buf = BytesMut::with_capacity(1 + self.encoding.len() + 1 + self.payload.len());
        buf.put_u8(self.register_type.tag());
        buf.put_slice(self.encoding.as_bytes());
        buf.put_u8(0);
        buf.put_slice(&self.payload);
        buf.to_vec()
    }

    /// Unpack the `_VIMENC_TEXT` wire form
    pub fn from_wire(data: &[u8]) -> SelectionResult<Self> {
        let (&tag, rest) = data
            .split_first()
            .ok_or_else(|| SelectionError::Decode("empty envelope".to_string()))?;
        let nul = rest
            .iter()
            .position(|&b| b == 0)
            .ok_or_else(|| SelectionError::Decode("envelope encoding is not NUL-terminated".to_string()))?;
        let encoding = std::str::from_utf8(&rest[..nul])
            .map_err(|_| SelectionError::Decode("envelope encoding name is not ASCII".to_string()))?;

        Ok(Self {
            register_type: RegisterType::from_tag(tag),
            encoding: encoding.to_string(),
            payload: Bytes::copy_from_slice(&rest[nul + 1..]),
        })
    }

    /// Pack into the legacy `_VIM_TEXT` form (no encoding name)
    pub fn to_legacy_wire(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(1 + self.payload.len());
        buf.push(self.register_type.tag());
        buf.extend_from_slice(&self.payload);
        buf
    }

    /// Unpack the legacy `_VIM_TEXT` form
    pub fn from_legacy_wire(data: &[u8]) -> SelectionResult<Self> {
        let (&tag, rest) = data
            .split_first()
            .ok_or_else(|| SelectionError::Decode("empty legacy envelope".to_string()))?;
        Ok(Self::utf8(RegisterType::from_tag(tag), Bytes::copy_from_slice(rest)))
    }
}
