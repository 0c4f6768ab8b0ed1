//! Interned atoms

use lamco_selection_core::{FormatRegistry, SelectionKind};
use x11rb::protocol::xproto::{Atom, ConnectionExt as _};
use x11rb::rust_connection::RustConnection;

use crate::clipboard::Result;

x11rb::atom_manager! {
    pub(crate) Atoms: AtomCookies {
        PRIMARY,
        SECONDARY,
        CLIPBOARD,
        CLIPBOARD_MANAGER,

        // Reply types
        ATOM,
        ATOM_PAIR,
        INCR,
        INTEGER,
        NULL,

        WM_PROTOCOLS,
        WM_DELETE_WINDOW,

        // Self-addressed commands to the event thread
        LAMCO_CONVERT,
        LAMCO_CONTINUE,
        LAMCO_OFFER,
        LAMCO_QUERY,

        // Reply property per selection, so fetches of different
        // selections never share one
        LAMCO_PRIMARY,
        LAMCO_SECONDARY,
        LAMCO_CLIPBOARD,
        LAMCO_TIMESTAMP,
    }
}

impl Atoms {
    pub(crate) fn selection(&self, kind: SelectionKind) -> Atom {
        match kind {
            SelectionKind::Primary => self.PRIMARY,
            SelectionKind::Secondary => self.SECONDARY,
            SelectionKind::Clipboard => self.CLIPBOARD,
        }
    }

    pub(crate) fn kind_of(&self, selection: Atom) -> Option<SelectionKind> {
        SelectionKind::ALL.into_iter().find(|&kind| self.selection(kind) == selection)
    }

    pub(crate) fn reply_property(&self, kind: SelectionKind) -> Atom {
        match kind {
            SelectionKind::Primary => self.LAMCO_PRIMARY,
            SelectionKind::Secondary => self.LAMCO_SECONDARY,
            SelectionKind::Clipboard => self.LAMCO_CLIPBOARD,
        }
    }

    pub(crate) fn kind_of_property(&self, property: Atom) -> Option<SelectionKind> {
        SelectionKind::ALL
            .into_iter()
            .find(|&kind| self.reply_property(kind) == property)
    }
}

/// Intern every advertised format in one batch of requests
pub(crate) fn intern_formats(conn: &RustConnection) -> Result<FormatRegistry<Atom>> {
    FormatRegistry::intern_all(|names: &[&'static str]| -> Result<Vec<Atom>> {
        let cookies = names
            .iter()
            .map(|name| conn.intern_atom(false, name.as_bytes()))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        cookies
            .into_iter()
            .map(|cookie| -> Result<Atom> { Ok(cookie.reply()?.atom) })
            .collect()
    })
}
