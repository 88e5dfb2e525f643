//! Per-component state.
//!
//! Components receive a [`Hooks`] handle while they render. State lives in slots owned by the
//! component's fiber and carried over from its alternate on every pass, in call order. A setter only
//! records a pending value; the value becomes committed once a pass that rendered it commits, so an
//! aborted or replaced pass never leaks state.

use alloc::{rc::Rc, vec::Vec};
use core::{
    any::{Any, type_name},
    cell::{Cell, RefCell},
    fmt,
};

/// Type-erased state slot stored on a fiber.
pub(crate) trait HookSlot: Any + fmt::Debug {
    /// Promotes a pending value to committed state.
    fn commit(&self);
}

struct StateSlot<T> {
    committed: RefCell<T>,
    pending: RefCell<Option<T>>,
}

impl<T: Clone> StateSlot<T> {
    fn current(&self) -> T {
        self.pending
            .borrow()
            .as_ref()
            .map_or_else(|| self.committed.borrow().clone(), Clone::clone)
    }
}

impl<T: 'static> HookSlot for StateSlot<T> {
    fn commit(&self) {
        if let Some(value) = self.pending.borrow_mut().take() {
            *self.committed.borrow_mut() = value;
        }
    }
}

impl<T> fmt::Debug for StateSlot<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateSlot")
            .field("type", &type_name::<T>())
            .field("pending", &self.pending.borrow().is_some())
            .finish()
    }
}

/// Shared flag telling the session that some component state changed since the last pass.
#[derive(Default)]
pub struct UpdateQueue {
    dirty: Cell<bool>,
    waker: RefCell<Option<Rc<dyn Fn()>>>,
}

impl UpdateQueue {
    /// Creates a clean queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` when state changed since [`Self::take`] was last called.
    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.dirty.get()
    }

    /// Clears the flag, returning whether it was set.
    pub fn take(&self) -> bool {
        self.dirty.replace(false)
    }

    /// Installs a callback run on every state change, typically one requesting an idle slice.
    pub fn set_waker(&self, waker: impl Fn() + 'static) {
        *self.waker.borrow_mut() = Some(Rc::new(waker));
    }

    pub(crate) fn notify(&self) {
        self.dirty.set(true);
        let waker = self.waker.borrow().clone();
        if let Some(waker) = waker {
            waker();
        }
    }
}

impl fmt::Debug for UpdateQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UpdateQueue")
            .field("dirty", &self.dirty.get())
            .field("has_waker", &self.waker.borrow().is_some())
            .finish()
    }
}

/// Setter returned by [`Hooks::use_state`].
pub struct StateSetter<T> {
    slot: Rc<StateSlot<T>>,
    updates: Rc<UpdateQueue>,
}

impl<T> Clone for StateSetter<T> {
    fn clone(&self) -> Self {
        Self {
            slot: Rc::clone(&self.slot),
            updates: Rc::clone(&self.updates),
        }
    }
}

impl<T> fmt::Debug for StateSetter<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateSetter")
            .field("type", &type_name::<T>())
            .finish()
    }
}

impl<T: Clone + 'static> StateSetter<T> {
    /// Replaces the state for the next render pass.
    pub fn set(&self, value: T) {
        *self.slot.pending.borrow_mut() = Some(value);
        self.updates.notify();
    }

    /// Derives the next state from the latest one, pending changes included.
    pub fn update(&self, f: impl FnOnce(&T) -> T) {
        let next = f(&self.slot.current());
        self.set(next);
    }
}

/// Hook context handed to a component while it renders.
pub struct Hooks {
    previous: Vec<Rc<dyn HookSlot>>,
    current: Vec<Rc<dyn HookSlot>>,
    updates: Rc<UpdateQueue>,
}

impl fmt::Debug for Hooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Hooks")
            .field("previous", &self.previous.len())
            .field("current", &self.current.len())
            .finish()
    }
}

impl Hooks {
    pub(crate) const fn new(previous: Vec<Rc<dyn HookSlot>>, updates: Rc<UpdateQueue>) -> Self {
        Self {
            previous,
            current: Vec::new(),
            updates,
        }
    }

    /// Creates a detached context, for calling a component outside of a session.
    #[must_use]
    pub fn detached() -> Self {
        Self::new(Vec::new(), Rc::new(UpdateQueue::new()))
    }

    /// Returns the state stored at this call position, initializing it on first render.
    ///
    /// # Panics
    ///
    /// Panics if the slot at this position holds another type, which means hooks were called in a
    /// different order than on the previous render.
    pub fn use_state<T: Clone + 'static>(&mut self, init: impl FnOnce() -> T) -> (T, StateSetter<T>) {
        let index = self.current.len();
        let slot = match self.previous.get(index) {
            Some(previous) => {
                let any = Rc::clone(previous) as Rc<dyn Any>;
                any.downcast::<StateSlot<T>>().unwrap_or_else(|_| {
                    panic!(
                        "hook #{index} changed type to `{}`; hooks must be called in the same order on every render",
                        type_name::<T>()
                    )
                })
            }
            None => Rc::new(StateSlot {
                committed: RefCell::new(init()),
                pending: RefCell::new(None),
            }),
        };
        self.current.push(Rc::clone(&slot) as Rc<dyn HookSlot>);
        let value = slot.current();
        (
            value,
            StateSetter {
                slot,
                updates: Rc::clone(&self.updates),
            },
        )
    }

    pub(crate) fn finish(self) -> Vec<Rc<dyn HookSlot>> {
        self.current
    }
}

/// Promotes pending state of every slot.
pub(crate) fn commit_slots(slots: &[Rc<dyn HookSlot>]) {
    for slot in slots {
        slot.commit();
    }
}
