//! Register type tags.
//!
//! A register type says how pasted text is laid out: character-wise,
//! line-wise or block-wise. It travels as the first byte of every envelope.

use std::fmt;

/// Copy semantics carried alongside selection text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum RegisterType {
    /// Character-wise (`v`)
    Char,
    /// Line-wise (`V`)
    Line,
    /// Block-wise (`^V`)
    Block,
    /// Not specified by the producer
    #[default]
    Auto,
}

/// Code reported for block-wise registers (Ctrl-V)
pub const BLOCK_CODE: &str = "\x16";

impl RegisterType {
    /// Wire tag written as the first envelope byte
    pub fn tag(self) -> u8 {
        match self {
            Self::Char => 0,
            Self::Line => 1,
            Self::Block => 2,
            Self::Auto => 255,
        }
    }

    /// Parse a wire tag; unknown tags read as [`RegisterType::Auto`]
    pub fn from_tag(tag: u8) -> Self {
        match tag {
            0 => Self::Char,
            1 => Self::Line,
            2 => Self::Block,
            _ => Self::Auto,
        }
    }

    /// Parse a host-side register code
    ///
    /// `c`/`v` are character-wise, `l`/`V` line-wise, `b` or anything
    /// starting with Ctrl-V block-wise. Everything else is `Auto`.
    pub fn from_code(code: &str) -> Self {
        match code {
            "c" | "v" => Self::Char,
            "l" | "V" => Self::Line,
            "b" => Self::Block,
            _ if code.starts_with(BLOCK_CODE) => Self::Block,
            _ => Self::Auto,
        }
    }

    /// Host-side code, `None` for `Auto`
    pub fn code(self) -> Option<&'static str> {
        match self {
            Self::Char => Some("v"),
            Self::Line => Some("V"),
            Self::Block => Some(BLOCK_CODE),
            Self::Auto => None,
        }
    }
}

impl fmt::Display for RegisterType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Char => "char",
            Self::Line => "line",
            Self::Block => "block",
            Self::Auto => "auto",
        };
        f.write_str(name)
    }
}
