//! Driving sessions from a host's idle callbacks.
//!
//! Hosts expose cooperative yielding as "call me back when idle, with a deadline". The
//! [`IdleScheduler`] trait is that primitive; [`Root`] ties a [`Session`] to one and keeps requesting
//! slices until the scheduled pass, and any state update that arrives meanwhile, is committed.

use alloc::{boxed::Box, collections::VecDeque, rc::Rc};
use core::{
    cell::{Cell, Ref, RefCell, RefMut},
    fmt,
};

use tracing::{debug, error};

use crate::{
    commit::CommitReport,
    describe::Description,
    error::RenderError,
    host::HostRenderer,
    scheduler::{IdleDeadline, Session, WorkStatus},
};

/// Callback invoked with the deadline of a granted idle slice.
pub type IdleCallback = Box<dyn FnOnce(&mut dyn IdleDeadline)>;

/// A host's "run this when idle" primitive.
pub trait IdleScheduler {
    /// Queues `callback` for the next idle period. Must not run it synchronously.
    fn request_idle_slice(&self, callback: IdleCallback);
}

impl<S: IdleScheduler + ?Sized> IdleScheduler for Rc<S> {
    fn request_idle_slice(&self, callback: IdleCallback) {
        (**self).request_idle_slice(callback);
    }
}

/// Idle scheduler whose slices are granted explicitly by the caller.
#[derive(Default)]
pub struct ManualIdleQueue {
    pending: RefCell<VecDeque<IdleCallback>>,
}

impl fmt::Debug for ManualIdleQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManualIdleQueue")
            .field("pending", &self.len())
            .finish()
    }
}

impl ManualIdleQueue {
    /// Creates an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of callbacks waiting for a slice.
    #[must_use]
    pub fn len(&self) -> usize {
        self.pending.borrow().len()
    }

    /// Returns `true` if nothing waits for a slice.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pending.borrow().is_empty()
    }

    /// Grants one slice to the oldest callback. Returns `false` if none was waiting.
    pub fn run_next(&self, deadline: &mut dyn IdleDeadline) -> bool {
        let next = self.pending.borrow_mut().pop_front();
        match next {
            Some(callback) => {
                callback(deadline);
                true
            }
            None => false,
        }
    }

    /// Grants slices built by `deadline` until no callback is waiting. Returns the slice count.
    pub fn run_until_idle<D: IdleDeadline>(&self, mut deadline: impl FnMut() -> D) -> usize {
        let mut slices = 0;
        while self.run_next(&mut deadline()) {
            slices += 1;
        }
        slices
    }
}

impl IdleScheduler for ManualIdleQueue {
    fn request_idle_slice(&self, callback: IdleCallback) {
        self.pending.borrow_mut().push_back(callback);
    }
}

struct RootInner<H: HostRenderer, S> {
    session: RefCell<Session<H>>,
    scheduler: S,
    slice_pending: Cell<bool>,
    last_error: RefCell<Option<RenderError>>,
    last_report: RefCell<Option<CommitReport>>,
}

/// Caller-facing render root: schedules passes and lets the idle scheduler run them.
pub struct Root<H: HostRenderer, S> {
    inner: Rc<RootInner<H, S>>,
}

impl<H: HostRenderer, S> Clone for Root<H, S> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<H: HostRenderer, S> fmt::Debug for Root<H, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Root")
            .field("slice_pending", &self.inner.slice_pending.get())
            .field("has_error", &self.inner.last_error.borrow().is_some())
            .finish_non_exhaustive()
    }
}

impl<H, S> Root<H, S>
where
    H: HostRenderer + 'static,
    S: IdleScheduler + 'static,
{
    /// Wraps `session`. State changes in its components request slices from `scheduler`.
    pub fn new(session: Session<H>, scheduler: S) -> Self {
        let inner = Rc::new(RootInner {
            session: RefCell::new(session),
            scheduler,
            slice_pending: Cell::new(false),
            last_error: RefCell::new(None),
            last_report: RefCell::new(None),
        });
        let weak = Rc::downgrade(&inner);
        inner.session.borrow().updates().set_waker(move || {
            if let Some(inner) = weak.upgrade() {
                request_slice(&inner);
            }
        });
        Self { inner }
    }

    /// Schedules a render of `description` into `host_root`; the work runs in idle slices.
    pub fn render_tree(&self, description: Description, host_root: H::Node) {
        self.inner
            .session
            .borrow_mut()
            .schedule_render(description, host_root);
        request_slice(&self.inner);
    }

    /// Takes the error of the last failed pass.
    pub fn take_error(&self) -> Option<RenderError> {
        self.inner.last_error.borrow_mut().take()
    }

    /// Report of the last committed pass.
    pub fn last_report(&self) -> Option<CommitReport> {
        self.inner.last_report.borrow().clone()
    }

    /// Returns `true` while a slice is requested and not yet granted.
    pub fn is_slice_pending(&self) -> bool {
        self.inner.slice_pending.get()
    }

    /// Borrows the session.
    ///
    /// # Panics
    ///
    /// Panics if called from inside a slice.
    pub fn session(&self) -> Ref<'_, Session<H>> {
        self.inner.session.borrow()
    }

    /// Borrows the session mutably.
    ///
    /// # Panics
    ///
    /// Panics if called from inside a slice.
    pub fn session_mut(&self) -> RefMut<'_, Session<H>> {
        self.inner.session.borrow_mut()
    }

    /// The idle scheduler.
    pub fn scheduler(&self) -> &S {
        &self.inner.scheduler
    }
}

fn request_slice<H, S>(inner: &Rc<RootInner<H, S>>)
where
    H: HostRenderer + 'static,
    S: IdleScheduler + 'static,
{
    if inner.slice_pending.replace(true) {
        return;
    }
    let weak = Rc::downgrade(inner);
    inner.scheduler.request_idle_slice(Box::new(move |deadline: &mut dyn IdleDeadline| {
        if let Some(inner) = weak.upgrade() {
            run_slice(&inner, deadline);
        }
    }));
}

fn run_slice<H, S>(inner: &Rc<RootInner<H, S>>, deadline: &mut dyn IdleDeadline)
where
    H: HostRenderer + 'static,
    S: IdleScheduler + 'static,
{
    inner.slice_pending.set(false);
    let (status, dirty) = {
        let mut session = inner.session.borrow_mut();
        session.schedule_update();
        let status = session.work_loop(deadline);
        (status, session.updates().is_dirty())
    };

    match status {
        Ok(WorkStatus::Suspended) => request_slice(inner),
        Ok(WorkStatus::Committed(report)) => {
            debug!(units = report.units, slices = report.slices, "root committed");
            *inner.last_report.borrow_mut() = Some(report);
            if dirty {
                request_slice(inner);
            }
        }
        Ok(WorkStatus::Idle) => {}
        Err(err) => {
            error!(error = %err, "render pass failed");
            *inner.last_error.borrow_mut() = Some(err);
        }
    }
}
