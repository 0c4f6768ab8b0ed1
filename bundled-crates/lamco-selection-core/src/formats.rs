//! Selection format identifiers and ranking.
//!
//! The set of formats is closed: a handful of text representations plus the
//! protocol housekeeping targets. Transports map them to their own handles
//! (X11 atoms, Wayland mime strings) through a [`FormatRegistry`] built once
//! at startup.

use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;

// =============================================================================
// Wire names
// =============================================================================

/// Envelope with register type and encoding
pub const VIMENC_TEXT: &str = "_VIMENC_TEXT";

/// Legacy envelope: register type byte and text
pub const VIM_TEXT: &str = "_VIM_TEXT";

/// UTF-8 text, mime form
pub const PLAIN_UTF8: &str = "text/plain;charset=utf-8";

/// UTF-8 text, ICCCM form
pub const UTF8_STRING: &str = "UTF8_STRING";

/// Plain text of unspecified charset (treated as UTF-8)
pub const PLAIN: &str = "text/plain";

/// ISO-2022 compound text
pub const COMPOUND_TEXT: &str = "COMPOUND_TEXT";

/// ISO-8859-1 text
pub const STRING: &str = "STRING";

/// Text in the owner's choice of encoding
pub const TEXT: &str = "TEXT";

// =============================================================================
// Format
// =============================================================================

/// A selection target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Format {
    /// `_VIMENC_TEXT`
    VimEnc,
    /// `_VIM_TEXT`
    VimText,
    /// `text/plain;charset=utf-8`
    PlainUtf8,
    /// `UTF8_STRING`
    Utf8String,
    /// `text/plain`
    Plain,
    /// `COMPOUND_TEXT`
    CompoundText,
    /// `STRING`
    String,
    /// `TEXT`
    Text,
    /// Capability query: list of supported targets
    Targets,
    /// Delete the selection after reading
    Delete,
    /// Compound request carrying (target, property) pairs
    Multiple,
    /// Clipboard manager handover
    SaveTargets,
    /// Time ownership was acquired
    Timestamp,
}

impl Format {
    /// Text formats, best to worst
    pub const TEXT_FORMATS: [Format; 8] = [
        Format::VimEnc,
        Format::VimText,
        Format::PlainUtf8,
        Format::Utf8String,
        Format::Plain,
        Format::CompoundText,
        Format::String,
        Format::Text,
    ];

    /// Every target answered to a capability query, in answer order
    pub const ADVERTISED: [Format; 13] = [
        Format::Targets,
        Format::Delete,
        Format::Multiple,
        Format::SaveTargets,
        Format::Timestamp,
        Format::VimEnc,
        Format::VimText,
        Format::PlainUtf8,
        Format::Utf8String,
        Format::Plain,
        Format::CompoundText,
        Format::String,
        Format::Text,
    ];

    /// Wire name
    pub fn name(self) -> &'static str {
        match self {
            Self::VimEnc => VIMENC_TEXT,
            Self::VimText => VIM_TEXT,
            Self::PlainUtf8 => PLAIN_UTF8,
            Self::Utf8String => UTF8_STRING,
            Self::Plain => PLAIN,
            Self::CompoundText => COMPOUND_TEXT,
            Self::String => STRING,
            Self::Text => TEXT,
            Self::Targets => "TARGETS",
            Self::Delete => "DELETE",
            Self::Multiple => "MULTIPLE",
            Self::SaveTargets => "SAVE_TARGETS",
            Self::Timestamp => "TIMESTAMP",
        }
    }

    /// Look up a format by wire name
    ///
    /// The mime charset parameter is matched case-insensitively, so
    /// `text/plain;charset=UTF-8` is recognised too.
    pub fn from_name(name: &str) -> Option<Self> {
        if name.eq_ignore_ascii_case(PLAIN_UTF8) {
            return Some(Self::PlainUtf8);
        }
        Self::ADVERTISED.into_iter().find(|f| f.name() == name)
    }

    /// True for formats that carry text
    pub fn is_text(self) -> bool {
        self.preference().is_some()
    }

    /// Position in the preference list, 0 is best
    pub fn preference(self) -> Option<usize> {
        Self::TEXT_FORMATS.iter().position(|&f| f == self)
    }

    /// True for the UTF-8 passthrough formats
    pub fn is_utf8_text(self) -> bool {
        matches!(self, Self::PlainUtf8 | Self::Utf8String | Self::Plain)
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Pick the best text format present in `candidates`
///
/// The result depends only on the set of candidates, never on their order.
pub fn rank(candidates: &[Format]) -> Option<Format> {
    candidates
        .iter()
        .filter_map(|&f| f.preference().map(|p| (p, f)))
        .min_by_key(|&(p, _)| p)
        .map(|(_, f)| f)
}

// =============================================================================
// Format Registry
// =============================================================================

/// Bidirectional mapping between formats and transport handles
///
/// Built once at startup; immutable afterwards.
#[derive(Debug, Clone)]
pub struct FormatRegistry<Id> {
    to_id: HashMap<Format, Id>,
    to_format: HashMap<Id, Format>,
}

impl<Id: Copy + Eq + Hash> FormatRegistry<Id> {
    /// Resolve every advertised format through `intern`
    ///
    /// `intern` receives all names at once so transports can batch the
    /// round trips.
    pub fn intern_all<E, F>(intern: F) -> Result<Self, E>
    where
        F: FnOnce(&[&'static str]) -> Result<Vec<Id>, E>,
    {
        let names: Vec<&'static str> = Format::ADVERTISED.iter().map(|f| f.name()).collect();
        let ids = intern(&names)?;
        Ok(Self::from_pairs(Format::ADVERTISED.into_iter().zip(ids)))
    }

    /// Build from explicit pairs
    pub fn from_pairs(pairs: impl IntoIterator<Item = (Format, Id)>) -> Self {
        let mut to_id = HashMap::new();
        let mut to_format = HashMap::new();
        for (format, id) in pairs {
            to_id.insert(format, id);
            to_format.insert(id, format);
        }
        Self { to_id, to_format }
    }

    /// Transport handle of a format
    pub fn id(&self, format: Format) -> Option<Id> {
        self.to_id.get(&format).copied()
    }

    /// Format behind a transport handle
    pub fn format(&self, id: Id) -> Option<Format> {
        self.to_format.get(&id).copied()
    }

    /// Map handles to known formats, dropping unknown ones
    pub fn formats(&self, ids: &[Id]) -> Vec<Format> {
        ids.iter().filter_map(|&id| self.format(id)).collect()
    }

    /// Best text format among transport handles
    pub fn rank_ids(&self, ids: &[Id]) -> Option<Format> {
        rank(&self.formats(ids))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rank_prefers_utf8_over_legacy() {
        assert_eq!(rank(&[Format::String, Format::Utf8String]), Some(Format::Utf8String));
        assert_eq!(rank(&[Format::Utf8String, Format::String]), Some(Format::Utf8String));
    }

    #[test]
    fn test_rank_full_order() {
        let mut candidates: Vec<Format> = Format::TEXT_FORMATS.to_vec();
        for expected in Format::TEXT_FORMATS {
            assert_eq!(rank(&candidates), Some(expected));
            candidates.retain(|&f| f != expected);
        }
        assert_eq!(rank(&candidates), None);
    }

    #[test]
    fn test_rank_ignores_housekeeping() {
        assert_eq!(rank(&[Format::Targets, Format::Multiple, Format::Timestamp]), None);
        assert_eq!(rank(&[Format::Targets, Format::Text]), Some(Format::Text));
    }

    #[test]
    fn test_names() {
        for format in Format::ADVERTISED {
            assert_eq!(Format::from_name(format.name()), Some(format));
        }
        assert_eq!(Format::from_name("text/plain;charset=UTF-8"), Some(Format::PlainUtf8));
        assert_eq!(Format::from_name("image/png"), None);
    }

    #[test]
    fn test_registry() {
        let registry: FormatRegistry<u32> =
            FormatRegistry::intern_all::<(), _>(|names| Ok((100..100 + names.len() as u32).collect())).unwrap();
        assert_eq!(registry.id(Format::Targets), Some(100));
        assert_eq!(registry.format(105), Some(Format::VimEnc));
        assert_eq!(registry.rank_ids(&[999, 112, 108]), Some(Format::Utf8String));
        assert_eq!(registry.formats(&[999, 100]), vec![Format::Targets]);
    }
}
