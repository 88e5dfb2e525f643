#![allow(clippy::multiple_crate_versions)]

//! Terminal host renderer for `waterui-fiber`.
//!
//! [`TerminalHost`] implements the host-renderer boundary over a retained node tree,
//! [`Renderer`] lays that tree out as styled lines, and [`TuiApp`] ties a render session to a
//! [`Terminal`].

pub use crate::app::{DEFAULT_SLICE, TuiApp, TuiAppBuilder};
pub use crate::host::{NodeKind, TermNode, TerminalHost};
pub use crate::renderer::{RenderFrame, RenderLine, RenderSegment, Renderer};
pub use crate::terminal::Terminal;

mod app;
mod error;
mod host;
mod renderer;
mod terminal;

pub use error::TuiError;
