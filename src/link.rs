//! Collaborator contracts on the daemon side of the bridge: the message
//! transport and the window-identifier allocator, bundled into the
//! [`GuiLink`] every output sends through.

use std::num::NonZeroU32;

use thiserror::Error;
use tracing::trace;

/// Ordered, reliable, message-framed channel to the GUI daemon. Sends are
/// fire-and-forget; the transport applies its own backpressure invisibly
/// and this crate never observes partial sends.
pub trait Transport {
    fn send(&mut self, msg: &[u8]);
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("window identifier space exhausted")]
pub struct IdExhausted;

/// Allocates window identifiers for the wire protocol. An identifier must
/// not be reused while any in-flight message could still reference it.
pub trait WindowIdAllocator {
    fn allocate(&mut self) -> Result<NonZeroU32, IdExhausted>;
    fn release(&mut self, id: NonZeroU32);
}

/// Monotonic allocator: ids count up from 1 and are never handed out twice,
/// which trivially satisfies the no-reuse-in-flight contract. `release` is
/// bookkeeping only.
#[derive(Debug)]
pub struct SequentialIds {
    next: u32,
}

impl Default for SequentialIds {
    fn default() -> Self {
        Self::new()
    }
}

impl SequentialIds {
    pub fn new() -> Self {
        Self { next: 1 }
    }
}

impl WindowIdAllocator for SequentialIds {
    fn allocate(&mut self) -> Result<NonZeroU32, IdExhausted> {
        let id = NonZeroU32::new(self.next).ok_or(IdExhausted)?;
        self.next = self.next.wrapping_add(1);
        Ok(id)
    }

    fn release(&mut self, _id: NonZeroU32) {}
}

/// Shared front for everything an output emits or requests from the daemon
/// side: message sends, identifier allocation and release.
pub struct GuiLink {
    transport: Box<dyn Transport>,
    ids: Box<dyn WindowIdAllocator>,
}

impl GuiLink {
    pub fn new(transport: Box<dyn Transport>, ids: Box<dyn WindowIdAllocator>) -> Self {
        Self { transport, ids }
    }

    pub fn send(&mut self, msg: &[u8]) {
        trace!(len = msg.len(), "sending message to GUI daemon");
        self.transport.send(msg);
    }

    pub fn allocate_id(&mut self) -> Result<NonZeroU32, IdExhausted> {
        self.ids.allocate()
    }

    pub fn release_id(&mut self, id: NonZeroU32) {
        self.ids.release(id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequential_ids_never_repeat() {
        let mut ids = SequentialIds::new();
        let a = ids.allocate().unwrap();
        let b = ids.allocate().unwrap();
        assert_ne!(a, b);
        ids.release(a);
        let c = ids.allocate().unwrap();
        assert_ne!(a, c);
        assert_ne!(b, c);
    }

    #[test]
    fn exhaustion_is_an_error() {
        let mut ids = SequentialIds { next: 0 };
        assert_eq!(ids.allocate().unwrap_err(), IdExhausted);
    }
}
