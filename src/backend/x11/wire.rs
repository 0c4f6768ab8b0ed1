//! Requests the event side issues while handling selection traffic
//!
//! The event handlers only need a handful of core requests. Routing them
//! through [`SelectionWire`] keeps the handlers independent of the socket.

use x11rb::protocol::xproto::{
    Atom, ConnectionExt as _, EventMask, PropMode, SelectionNotifyEvent, Timestamp, Window,
};
use x11rb::rust_connection::RustConnection;

use crate::clipboard::Result;

/// Longest property read, in 32-bit units
const PROPERTY_LENGTH: u32 = u32::MAX / 4;

/// A property value as read from the server
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct PropertyData {
    pub(crate) type_: Atom,
    pub(crate) format: u8,
    pub(crate) value: Vec<u8>,
}

impl PropertyData {
    /// Values of a 32-bit property, `None` for any other format
    pub(crate) fn value32(&self) -> Option<Vec<u32>> {
        if self.format != 32 {
            return None;
        }
        Some(
            self.value
                .chunks_exact(4)
                .map(|b| u32::from_ne_bytes([b[0], b[1], b[2], b[3]]))
                .collect(),
        )
    }
}

#[cfg_attr(test, mockall::automock)]
pub(crate) trait SelectionWire {
    fn change_property8(&self, window: Window, property: Atom, type_: Atom, data: &[u8]) -> Result<()>;

    fn change_property32(&self, window: Window, property: Atom, type_: Atom, data: &[u32]) -> Result<()>;

    /// Read `property`; `type_` 0 accepts any type
    fn get_property(&self, window: Window, property: Atom, type_: Atom) -> Result<PropertyData>;

    fn delete_property(&self, window: Window, property: Atom) -> Result<()>;

    /// Send `event` to its requestor and flush
    fn send_selection_notify(&self, event: SelectionNotifyEvent) -> Result<()>;

    fn convert_selection(
        &self,
        requestor: Window,
        selection: Atom,
        target: Atom,
        property: Atom,
        time: Timestamp,
    ) -> Result<()>;

    fn selection_owner(&self, selection: Atom) -> Result<Window>;

    fn set_selection_owner(&self, owner: Window, selection: Atom, time: Timestamp) -> Result<()>;

    fn flush(&self) -> Result<()>;
}

impl SelectionWire for RustConnection {
    fn change_property8(&self, window: Window, property: Atom, type_: Atom, data: &[u8]) -> Result<()> {
        x11rb::wrapper::ConnectionExt::change_property8(self, PropMode::REPLACE, window, property, type_, data)?;
        Ok(())
    }

    fn change_property32(&self, window: Window, property: Atom, type_: Atom, data: &[u32]) -> Result<()> {
        x11rb::wrapper::ConnectionExt::change_property32(self, PropMode::REPLACE, window, property, type_, data)?;
        Ok(())
    }

    fn get_property(&self, window: Window, property: Atom, type_: Atom) -> Result<PropertyData> {
        let reply = x11rb::protocol::xproto::ConnectionExt::get_property(
            self,
            false,
            window,
            property,
            type_,
            0,
            PROPERTY_LENGTH,
        )?
        .reply()?;
        Ok(PropertyData {
            type_: reply.type_,
            format: reply.format,
            value: reply.value,
        })
    }

    fn delete_property(&self, window: Window, property: Atom) -> Result<()> {
        x11rb::protocol::xproto::ConnectionExt::delete_property(self, window, property)?;
        Ok(())
    }

    fn send_selection_notify(&self, event: SelectionNotifyEvent) -> Result<()> {
        self.send_event(false, event.requestor, EventMask::NO_EVENT, event)?;
        x11rb::connection::Connection::flush(self)?;
        Ok(())
    }

    fn convert_selection(
        &self,
        requestor: Window,
        selection: Atom,
        target: Atom,
        property: Atom,
        time: Timestamp,
    ) -> Result<()> {
        x11rb::protocol::xproto::ConnectionExt::convert_selection(self, requestor, selection, target, property, time)?;
        Ok(())
    }

    fn selection_owner(&self, selection: Atom) -> Result<Window> {
        Ok(self.get_selection_owner(selection)?.reply()?.owner)
    }

    fn set_selection_owner(&self, owner: Window, selection: Atom, time: Timestamp) -> Result<()> {
        x11rb::protocol::xproto::ConnectionExt::set_selection_owner(self, owner, selection, time)?;
        Ok(())
    }

    fn flush(&self) -> Result<()> {
        x11rb::connection::Connection::flush(self)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value32_only_for_32_bit_properties() {
        let atoms = PropertyData {
            type_: 4,
            format: 32,
            value: [7u32, 9].iter().flat_map(|v| v.to_ne_bytes()).collect(),
        };
        assert_eq!(atoms.value32(), Some(vec![7, 9]));

        let text = PropertyData {
            type_: 31,
            format: 8,
            value: b"text".to_vec(),
        };
        assert_eq!(text.value32(), None);
    }
}
