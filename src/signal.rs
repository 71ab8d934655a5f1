//! Typed event source for single-threaded destroy notifications.
//!
//! Handlers register against a `Signal<T>` and receive every later emission
//! until disconnected. Emission snapshots the handler list first, so a
//! handler may connect or disconnect listeners (including itself) while the
//! signal is being delivered; such changes take effect on the next emission.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

type Handler<T> = Rc<dyn Fn(&T)>;

/// Handle for a registered listener, used to disconnect it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListenerId(u64);

pub struct Signal<T> {
    listeners: RefCell<Vec<(ListenerId, Handler<T>)>>,
    next_id: Cell<u64>,
}

impl<T> Default for Signal<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Signal<T> {
    pub fn new() -> Self {
        Self {
            listeners: RefCell::new(Vec::new()),
            next_id: Cell::new(0),
        }
    }

    pub fn connect(&self, handler: impl Fn(&T) + 'static) -> ListenerId {
        let id = ListenerId(self.next_id.get());
        self.next_id.set(id.0 + 1);
        self.listeners.borrow_mut().push((id, Rc::new(handler)));
        id
    }

    /// Disconnecting an already-removed listener is a no-op.
    pub fn disconnect(&self, id: ListenerId) {
        self.listeners.borrow_mut().retain(|(lid, _)| *lid != id);
    }

    pub fn emit(&self, event: &T) {
        let snapshot: Vec<Handler<T>> = self
            .listeners
            .borrow()
            .iter()
            .map(|(_, h)| h.clone())
            .collect();
        for handler in snapshot {
            handler(event);
        }
    }
}
