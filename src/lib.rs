#![doc = include_str!("../README.md")]
#![allow(clippy::multiple_crate_versions)]

extern crate alloc;

pub mod commit;
pub mod config;
pub mod describe;
pub mod error;
pub mod fiber;
pub mod hooks;
pub mod host;
pub mod idle;
pub mod logging;
pub mod reconcile;
pub mod scheduler;

#[cfg(test)]
mod tests;

pub mod prelude {
    //! Commonly used types, for glob imports.
    //!
    //! ```rust
    //! use waterui_fiber::prelude::*;
    //!
    //! let mut session = Session::new(MemoryHost::new());
    //! let root = session.host().root();
    //! session
    //!     .render_blocking(element("p").child("hello").build(), root)
    //!     .unwrap();
    //! assert_eq!(session.host().markup(), "<p>hello</p>");
    //! ```
    pub use crate::{
        commit::CommitReport,
        config::RendererConfig,
        describe::{
            AttrValue, Attributes, Component, Description, EventHandler, NodeType, describe,
            element, text,
        },
        error::RenderError,
        hooks::{Hooks, StateSetter},
        host::{HostRenderer, HostType, MemoryHost},
        idle::{IdleScheduler, ManualIdleQueue, Root},
        reconcile::ReconcilePolicy,
        scheduler::{IdleDeadline, Session, TimeSlice, UnitBudget, Unbounded, WorkStatus},
    };
}

pub use commit::CommitReport;
pub use config::RendererConfig;
pub use describe::{Component, Description, describe, element, text};
pub use error::RenderError;
pub use host::HostRenderer;
pub use idle::Root;
pub use scheduler::{Session, WorkStatus};
