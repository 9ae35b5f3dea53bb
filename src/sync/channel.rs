//! Outbound side of the message channel to the device

use anyhow::Result;

use crate::ipc::ClientMessage;

/// Fire-and-forget sender towards the device.
///
/// `send` must not wait for a reply. Replies and unsolicited pushes come back
/// separately as [`crate::ipc::ServerMessage`]s.
pub trait MessageChannel: Send {
    fn send(&mut self, message: ClientMessage) -> Result<()>;
}

impl<C: MessageChannel + ?Sized> MessageChannel for Box<C> {
    fn send(&mut self, message: ClientMessage) -> Result<()> {
        (**self).send(message)
    }
}
