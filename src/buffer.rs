//! Shared pixel buffers and the per-output buffer slot.
//!
//! A [`GrantBuffer`] is a block of pixel memory owned by the compositor's
//! buffer-allocation subsystem, described across the isolation boundary as a
//! grant-reference table. The bridge never owns the memory; it only holds a
//! reference-counted lock on the buffer while it is the committed buffer of
//! an output. The lock held through one [`BufferSlot`] is always 0 or 1.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use tracing::debug;

use crate::proto::{
    self, MsgHeader, WindowDumpHdr, HEADER_SIZE, MSG_WINDOW_DUMP, WINDOW_DUMP_BPP,
    WINDOW_DUMP_TYPE_GRANT_REFS,
};
use crate::signal::{ListenerId, Signal};

/// One shared-memory page exposure across the isolation boundary.
pub type GrantRef = u32;

/// A pixel buffer backed by a grant-reference table, shared as
/// `Rc<GrantBuffer>` between its owner and at most one attached output.
pub struct GrantBuffer {
    size_bytes: usize,
    width: u32,
    height: u32,
    grants: Vec<GrantRef>,
    locks: Cell<u32>,
    destroy: Signal<()>,
}

impl GrantBuffer {
    pub fn new(width: u32, height: u32, size_bytes: usize, grants: Vec<GrantRef>) -> Rc<Self> {
        debug_assert_eq!(grants.len(), proto::num_pages(size_bytes));
        Rc::new(Self {
            size_bytes,
            width,
            height,
            grants,
            locks: Cell::new(0),
            destroy: Signal::new(),
        })
    }

    pub fn size_bytes(&self) -> usize {
        self.size_bytes
    }

    pub fn grant_refs(&self) -> &[GrantRef] {
        &self.grants
    }

    pub fn lock_count(&self) -> u32 {
        self.locks.get()
    }

    pub fn lock(&self) {
        self.locks.set(self.locks.get() + 1);
    }

    pub fn unlock(&self) {
        debug_assert!(self.locks.get() > 0, "unlock without matching lock");
        self.locks.set(self.locks.get().saturating_sub(1));
    }

    /// Fired by the buffer's owner when it tears the buffer down. Everyone
    /// still referencing the buffer must drop that reference before their
    /// handler returns.
    pub fn on_destroy(&self) -> &Signal<()> {
        &self.destroy
    }

    /// Owner-side teardown announcement.
    pub fn announce_destroy(&self) {
        self.destroy.emit(&());
    }

    /// Build the WINDOW_DUMP message describing this buffer: the fixed dump
    /// header serialized adjacent to a borrowed view of the grant table.
    /// The pixel data itself never passes through this path.
    pub fn dump_message(&self, window: u32) -> Vec<u8> {
        let payload_len = proto::window_dump_len(self.size_bytes);
        let header = MsgHeader {
            kind: MSG_WINDOW_DUMP,
            window,
            untrusted_len: payload_len as u32,
        };
        let dump = WindowDumpHdr {
            dump_type: WINDOW_DUMP_TYPE_GRANT_REFS,
            bpp: WINDOW_DUMP_BPP,
            width: self.width,
            height: self.height,
        };
        let mut buf = Vec::with_capacity(HEADER_SIZE + payload_len);
        buf.extend_from_slice(bytemuck::bytes_of(&header));
        buf.extend_from_slice(bytemuck::bytes_of(&dump));
        buf.extend_from_slice(bytemuck::cast_slice(&self.grants));
        buf
    }
}

/// The buffer a compositor commit carries. The bridge only understands
/// grant-backed buffers; anything else is rejected at commit-test time.
#[derive(Clone)]
pub enum PendingBuffer {
    Grant(Rc<GrantBuffer>),
    /// A buffer of some other implementation, named for diagnostics.
    Foreign(&'static str),
}

impl PendingBuffer {
    pub fn as_grant(&self) -> Option<&Rc<GrantBuffer>> {
        match self {
            PendingBuffer::Grant(buffer) => Some(buffer),
            PendingBuffer::Foreign(_) => None,
        }
    }
}

struct Attached {
    buffer: Rc<GrantBuffer>,
    listener: ListenerId,
}

/// Holds the currently committed buffer of one output.
///
/// The destroy-notification handler may run at any point relative to
/// `attach`/`detach`, including reentrantly from another component's
/// teardown; after it runs the slot holds no reference.
pub struct BufferSlot {
    attached: Rc<RefCell<Option<Attached>>>,
}

impl Default for BufferSlot {
    fn default() -> Self {
        Self::new()
    }
}

impl BufferSlot {
    pub fn new() -> Self {
        Self {
            attached: Rc::new(RefCell::new(None)),
        }
    }

    pub fn current(&self) -> Option<Rc<GrantBuffer>> {
        self.attached.borrow().as_ref().map(|a| a.buffer.clone())
    }

    pub fn holds(&self, buffer: &Rc<GrantBuffer>) -> bool {
        self.attached
            .borrow()
            .as_ref()
            .is_some_and(|a| Rc::ptr_eq(&a.buffer, buffer))
    }

    /// Release the previous buffer (if any), then co-own `buffer` for as
    /// long as it stays committed.
    pub fn attach(&mut self, buffer: Rc<GrantBuffer>) {
        self.detach();
        buffer.lock();
        let weak = Rc::downgrade(&self.attached);
        let listener = buffer.on_destroy().connect(move |_| {
            // Owner teardown: drop the reference without unlocking, the
            // buffer no longer exists to be unlocked.
            if let Some(slot) = weak.upgrade() {
                let dropped = slot.borrow_mut().take();
                if dropped.is_some() {
                    debug!("buffer destroyed by owner, cleared committed reference");
                }
            }
        });
        *self.attached.borrow_mut() = Some(Attached { buffer, listener });
    }

    /// Unhook and release the attached buffer, if any.
    pub fn detach(&mut self) {
        let attached = self.attached.borrow_mut().take();
        if let Some(attached) = attached {
            attached.buffer.on_destroy().disconnect(attached.listener);
            attached.buffer.unlock();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proto::PAGE_SIZE;

    fn buffer(pages: usize) -> Rc<GrantBuffer> {
        let grants = (0..pages as u32).collect();
        GrantBuffer::new(64, 64, pages * PAGE_SIZE, grants)
    }

    #[test]
    fn attach_replaces_previous_reference() {
        let b = buffer(2);
        let c = buffer(2);
        let mut slot = BufferSlot::new();

        slot.attach(b.clone());
        assert_eq!(b.lock_count(), 1);

        slot.attach(c.clone());
        assert_eq!(b.lock_count(), 0);
        assert_eq!(c.lock_count(), 1);
        assert!(slot.holds(&c));

        // B's destroy firing after detach must not affect C.
        b.announce_destroy();
        assert!(slot.holds(&c));
        assert_eq!(c.lock_count(), 1);
    }

    #[test]
    fn destroy_notification_clears_slot() {
        let b = buffer(1);
        let mut slot = BufferSlot::new();
        slot.attach(b.clone());

        b.announce_destroy();
        assert!(slot.current().is_none());

        // Detach after the notification is a no-op, not a double release.
        slot.detach();
        assert!(slot.current().is_none());
    }

    #[test]
    fn detach_is_idempotent() {
        let b = buffer(1);
        let mut slot = BufferSlot::new();
        slot.attach(b.clone());
        slot.detach();
        slot.detach();
        assert_eq!(b.lock_count(), 0);
    }

    #[test]
    fn dump_message_layout() {
        let b = buffer(3);
        let msg = b.dump_message(5);
        assert_eq!(msg.len(), HEADER_SIZE + 16 + 3 * proto::SIZEOF_GRANT_REF);
        let header: MsgHeader = bytemuck::pod_read_unaligned(&msg[..HEADER_SIZE]);
        assert_eq!(header.kind, MSG_WINDOW_DUMP);
        assert_eq!(header.window, 5);
        assert_eq!(header.untrusted_len as usize, msg.len() - HEADER_SIZE);
        let dump: WindowDumpHdr =
            bytemuck::pod_read_unaligned(&msg[HEADER_SIZE..HEADER_SIZE + 16]);
        assert_eq!(dump.dump_type, WINDOW_DUMP_TYPE_GRANT_REFS);
        assert_eq!(dump.bpp, WINDOW_DUMP_BPP);
        let refs: Vec<GrantRef> = msg[HEADER_SIZE + 16..]
            .chunks_exact(4)
            .map(|b| u32::from_le_bytes(b.try_into().unwrap()))
            .collect();
        assert_eq!(refs, &[0, 1, 2]);
    }
}
