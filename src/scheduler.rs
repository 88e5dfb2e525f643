//! The cooperative work loop.
//!
//! A [`Session`] owns everything a render pass needs: the host renderer, the fiber arena with the
//! committed tree and the work-in-progress tree, the cursor of the next unit of work and the
//! deletion list. Work advances one fiber at a time inside slices granted by an [`IdleDeadline`];
//! once the last unit is done the pass commits atomically.

use alloc::{rc::Rc, vec::Vec};
use core::{fmt, time::Duration};
use std::time::Instant;

use tracing::{debug, error, trace, warn};

use crate::{
    commit::{CommitReport, commit_tree},
    config::RendererConfig,
    describe::{Description, NodeType},
    error::RenderError,
    fiber::{Fiber, FiberArena, FiberId, MutationTag},
    hooks::{Hooks, UpdateQueue},
    host::HostRenderer,
    reconcile::reconcile_children,
};

/// Remaining time of the slice the host granted to the work loop.
pub trait IdleDeadline {
    /// How much time is left before the host wants control back.
    fn time_remaining(&self) -> Duration;

    /// Called after every unit of work. Budgets that are not time-based count units here.
    fn unit_completed(&mut self) {}
}

/// Wall-clock slice.
#[derive(Debug, Clone, Copy)]
pub struct TimeSlice {
    deadline: Instant,
}

impl TimeSlice {
    /// A slice ending `budget` from now.
    #[must_use]
    pub fn new(budget: Duration) -> Self {
        Self {
            deadline: Instant::now() + budget,
        }
    }

    /// A slice ending at `deadline`.
    #[must_use]
    pub const fn until(deadline: Instant) -> Self {
        Self { deadline }
    }
}

impl IdleDeadline for TimeSlice {
    fn time_remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }
}

/// Slice measured in units of work, for deterministic yielding.
///
/// Reports unlimited time until `units` units completed, then none. A zero yield threshold never
/// yields, whatever the budget.
#[derive(Debug, Clone, Copy)]
pub struct UnitBudget {
    remaining: usize,
}

impl UnitBudget {
    /// Allows `units` units of work.
    #[must_use]
    pub const fn new(units: usize) -> Self {
        Self { remaining: units }
    }
}

impl IdleDeadline for UnitBudget {
    fn time_remaining(&self) -> Duration {
        if self.remaining == 0 {
            Duration::ZERO
        } else {
            Duration::MAX
        }
    }

    fn unit_completed(&mut self) {
        self.remaining = self.remaining.saturating_sub(1);
    }
}

/// Slice that never runs out.
#[derive(Debug, Clone, Copy, Default)]
pub struct Unbounded;

impl IdleDeadline for Unbounded {
    fn time_remaining(&self) -> Duration {
        Duration::MAX
    }
}

/// Outcome of one call to [`Session::work_loop`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkStatus {
    /// Nothing was scheduled.
    Idle,
    /// The slice ran out; call again with a new deadline.
    Suspended,
    /// The pass finished and its effects were applied to the host.
    Committed(CommitReport),
}

/// A render session bound to one host renderer.
pub struct Session<H: HostRenderer> {
    host: H,
    config: RendererConfig,
    arena: FiberArena<H::Node>,
    current_root: Option<FiberId>,
    wip_root: Option<FiberId>,
    next_unit: Option<FiberId>,
    deletions: Vec<FiberId>,
    root_description: Option<(Description, H::Node)>,
    updates: Rc<UpdateQueue>,
    poisoned: bool,
    units: usize,
    slices: usize,
}

impl<H: HostRenderer> fmt::Debug for Session<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("config", &self.config)
            .field("fibers", &self.arena.len())
            .field("current_root", &self.current_root)
            .field("wip_root", &self.wip_root)
            .field("next_unit", &self.next_unit)
            .field("deletions", &self.deletions.len())
            .field("poisoned", &self.poisoned)
            .finish_non_exhaustive()
    }
}

impl<H: HostRenderer> Session<H> {
    /// Creates a session with the default configuration.
    pub fn new(host: H) -> Self {
        Self::with_config(host, RendererConfig::default())
    }

    /// Creates a session with the given configuration.
    pub fn with_config(host: H, config: RendererConfig) -> Self {
        Self {
            host,
            config,
            arena: FiberArena::new(),
            current_root: None,
            wip_root: None,
            next_unit: None,
            deletions: Vec::new(),
            root_description: None,
            updates: Rc::new(UpdateQueue::new()),
            poisoned: false,
            units: 0,
            slices: 0,
        }
    }

    /// Starts a new render pass of `description` into `host_root`.
    ///
    /// A pass that is still in flight is replaced: its work-in-progress tree is discarded and the
    /// committed tree is left as it was.
    ///
    /// If `host_root` is not the node the committed tree was rendered into, the pass is a fresh
    /// mount: nothing is reused, and the committed top-level nodes are removed from the old root
    /// when the pass commits.
    pub fn schedule_render(&mut self, description: Description, host_root: H::Node) {
        if self.poisoned {
            warn!("ignoring render request on a poisoned session");
            return;
        }
        if self.wip_root.is_some() {
            debug!("replacing in-flight render pass");
            self.discard_work();
        }
        let alternate = match self.current_root {
            Some(current) if self.arena[current].host_node.as_ref() != Some(&host_root) => {
                debug!("host root changed, remounting");
                let orphans: Vec<FiberId> = self.arena.children(current).collect();
                for id in orphans {
                    self.arena[id].tag = MutationTag::Deletion;
                    self.deletions.push(id);
                }
                None
            }
            current => current,
        };
        self.root_description = Some((description.clone(), host_root.clone()));
        let root = self
            .arena
            .insert(Fiber::root(description, host_root, alternate));
        self.wip_root = Some(root);
        self.next_unit = Some(root);
        self.units = 0;
        self.slices = 0;
        debug!(root = ?root, "render pass scheduled");
    }

    /// Re-renders the last description if component state changed since the last check.
    ///
    /// Returns `true` when a pass was scheduled.
    pub fn schedule_update(&mut self) -> bool {
        if !self.updates.take() {
            return false;
        }
        let Some((description, host_root)) = self.root_description.clone() else {
            return false;
        };
        debug!("state changed, re-rendering");
        self.schedule_render(description, host_root);
        true
    }

    /// Processes one fiber: expands a component or takes a host fiber's child descriptions, then
    /// reconciles them. Returns the next fiber to process, `None` at the end of the pass.
    ///
    /// # Errors
    ///
    /// Returns [`RenderError::Component`] if the fiber is a component and its function fails.
    ///
    /// # Panics
    ///
    /// Panics if `id` is not a live fiber.
    pub fn perform_unit_of_work(&mut self, id: FiberId) -> Result<Option<FiberId>, RenderError> {
        let component = match &self.arena[id].node_type {
            NodeType::Component(component) => Some(component.clone()),
            _ => None,
        };

        let children = if let Some(component) = component {
            let previous = self.arena[id]
                .alternate
                .map(|alternate| self.arena[alternate].hooks.clone())
                .unwrap_or_default();
            let mut hooks = Hooks::new(previous, Rc::clone(&self.updates));
            let rendered = component
                .render(&self.arena[id].attributes, &mut hooks)
                .map_err(|error| RenderError::component(component.name(), error))?;
            self.arena[id].hooks = hooks.finish();
            alloc::vec![rendered]
        } else {
            core::mem::take(&mut self.arena[id].pending_children)
        };

        trace!(
            fiber = ?id,
            node = self.arena[id].node_type.label(),
            children = children.len(),
            "unit of work"
        );
        reconcile_children(
            &mut self.arena,
            id,
            &children,
            self.config.policy,
            &mut self.deletions,
        );
        Ok(self.arena.next_unit_of_work(id))
    }

    /// Runs units of work until the pass is done or `deadline` runs low, then commits a finished
    /// pass.
    ///
    /// At least one unit runs per call, so every slice makes progress.
    ///
    /// # Errors
    ///
    /// - [`RenderError::Component`] when a component fails; the pass is discarded.
    /// - [`RenderError::Host`] when the host fails during commit; the session becomes poisoned.
    /// - [`RenderError::Poisoned`] on a poisoned session.
    pub fn work_loop(&mut self, deadline: &mut dyn IdleDeadline) -> Result<WorkStatus, RenderError> {
        if self.poisoned {
            return Err(RenderError::Poisoned);
        }
        let Some(wip_root) = self.wip_root else {
            return Ok(WorkStatus::Idle);
        };
        self.slices += 1;

        while let Some(unit) = self.next_unit {
            match self.perform_unit_of_work(unit) {
                Ok(next) => self.next_unit = next,
                Err(err) => {
                    error!(error = %err, "render pass aborted");
                    self.discard_work();
                    return Err(err);
                }
            }
            self.units += 1;
            deadline.unit_completed();
            if self.next_unit.is_some() && deadline.time_remaining() < self.config.yield_threshold {
                trace!(units = self.units, slice = self.slices, "yielding to host");
                return Ok(WorkStatus::Suspended);
            }
        }

        self.commit_root(wip_root).map(WorkStatus::Committed)
    }

    fn commit_root(&mut self, wip_root: FiberId) -> Result<CommitReport, RenderError> {
        let report = match commit_tree(&mut self.host, &mut self.arena, wip_root, &self.deletions) {
            Ok(report) => report,
            Err(err) => {
                error!(error = %err, "host failed during commit, poisoning session");
                self.poisoned = true;
                self.discard_work();
                return Err(RenderError::host(err));
            }
        };

        if let Some(old_root) = self.current_root.replace(wip_root) {
            self.arena.free_subtree(old_root);
        }
        for id in self.arena.preorder(wip_root) {
            self.arena[id].alternate = None;
        }
        self.deletions.clear();
        self.wip_root = None;
        self.next_unit = None;

        let report = CommitReport {
            units: self.units,
            slices: self.slices,
            ..report
        };
        debug!(
            placed = report.placed,
            updated = report.updated,
            deleted = report.deleted.len(),
            units = report.units,
            slices = report.slices,
            "render pass committed"
        );
        Ok(report)
    }

    /// Drops the in-flight pass, if any. The committed tree and the host are untouched.
    pub fn discard_work(&mut self) {
        if let Some(wip_root) = self.wip_root.take() {
            let freed = self.arena.free_subtree(wip_root);
            trace!(freed, "discarded work-in-progress tree");
        }
        for id in self.deletions.drain(..) {
            self.arena[id].tag = MutationTag::None;
        }
        self.next_unit = None;
        self.units = 0;
        self.slices = 0;
    }

    /// Schedules `description` and runs the whole pass at once.
    ///
    /// # Errors
    ///
    /// See [`Self::work_loop`].
    pub fn render_blocking(
        &mut self,
        description: Description,
        host_root: H::Node,
    ) -> Result<CommitReport, RenderError> {
        self.schedule_render(description, host_root);
        self.finish_pass(|| Unbounded)
    }

    /// Schedules `description` and runs it in slices of `slice`, yielding to the executor between
    /// slices.
    ///
    /// # Errors
    ///
    /// See [`Self::work_loop`].
    pub async fn render_async(
        &mut self,
        description: Description,
        host_root: H::Node,
        slice: Duration,
    ) -> Result<CommitReport, RenderError> {
        self.schedule_render(description, host_root);
        loop {
            let mut deadline = TimeSlice::new(slice);
            match self.work_loop(&mut deadline)? {
                WorkStatus::Committed(report) => return Ok(report),
                WorkStatus::Suspended => smol::future::yield_now().await,
                WorkStatus::Idle => return Ok(CommitReport::default()),
            }
        }
    }

    /// Drives the scheduled pass to completion with fresh deadlines from `deadline`.
    ///
    /// # Errors
    ///
    /// See [`Self::work_loop`].
    pub fn finish_pass<D: IdleDeadline>(
        &mut self,
        mut deadline: impl FnMut() -> D,
    ) -> Result<CommitReport, RenderError> {
        loop {
            match self.work_loop(&mut deadline())? {
                WorkStatus::Committed(report) => return Ok(report),
                WorkStatus::Suspended => {}
                WorkStatus::Idle => return Ok(CommitReport::default()),
            }
        }
    }

    /// Removes everything the session rendered from the host and forgets the committed tree.
    ///
    /// # Errors
    ///
    /// Returns [`RenderError::Host`] if the host fails to remove a node; the session is poisoned.
    pub fn unmount(&mut self) -> Result<(), RenderError> {
        self.discard_work();
        self.root_description = None;
        let Some(root) = self.current_root.take() else {
            return Ok(());
        };
        let host_root = self.arena[root].host_node.clone();
        let nodes: Vec<H::Node> = self
            .arena
            .children(root)
            .flat_map(|child| self.arena.top_host_nodes(child))
            .cloned()
            .collect();
        let freed = self.arena.free_subtree(root);

        if let Some(host_root) = host_root {
            for node in &nodes {
                if let Err(err) = self.host.remove_child(&host_root, node) {
                    error!(error = %err, "host failed during unmount, poisoning session");
                    self.poisoned = true;
                    return Err(RenderError::host(err));
                }
            }
        }
        debug!(freed, "unmounted");
        Ok(())
    }

    /// Consumes the session and returns the host renderer.
    pub fn into_host(self) -> H {
        self.host
    }

    /// The host renderer.
    pub const fn host(&self) -> &H {
        &self.host
    }

    /// The host renderer, mutably. Changing nodes the session owns breaks later commits.
    pub const fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }

    /// The fiber arena.
    pub const fn arena(&self) -> &FiberArena<H::Node> {
        &self.arena
    }

    /// Root of the committed tree.
    pub const fn current_root(&self) -> Option<FiberId> {
        self.current_root
    }

    /// Root of the pass in flight.
    pub const fn work_in_progress_root(&self) -> Option<FiberId> {
        self.wip_root
    }

    /// Next fiber the work loop will process.
    pub const fn next_unit_of_work(&self) -> Option<FiberId> {
        self.next_unit
    }

    /// Fibers of the committed tree queued for deletion by the pass in flight.
    pub fn deletions(&self) -> &[FiberId] {
        &self.deletions
    }

    /// The configuration.
    pub const fn config(&self) -> &RendererConfig {
        &self.config
    }

    /// Queue notified whenever component state changes.
    pub const fn updates(&self) -> &Rc<UpdateQueue> {
        &self.updates
    }

    /// Returns `true` once a host failure poisoned the session.
    pub const fn is_poisoned(&self) -> bool {
        self.poisoned
    }
}
