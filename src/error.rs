//! Errors reported by render passes.

use alloc::{boxed::Box, string::String};

/// Boxed error source carried by [`RenderError`].
pub type BoxError = Box<dyn core::error::Error + Send + Sync>;

/// Why a render pass did not commit.
#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    /// A component function failed. The pass was discarded and the committed tree is untouched.
    #[error("component `{component}` failed to render")]
    Component {
        /// Name of the failing component.
        component: String,
        /// The component's error.
        #[source]
        source: BoxError,
    },
    /// The host renderer rejected an operation during commit. The host tree may be partly
    /// mutated, so the session is poisoned.
    #[error("host renderer failed during commit")]
    Host(#[source] BoxError),
    /// A previous commit failed; the session no longer renders.
    #[error("session is poisoned by an earlier host failure")]
    Poisoned,
}

impl RenderError {
    pub(crate) fn component(component: &str, error: anyhow::Error) -> Self {
        Self::Component {
            component: component.into(),
            source: error.into(),
        }
    }

    pub(crate) fn host(error: impl core::error::Error + Send + Sync + 'static) -> Self {
        Self::Host(Box::new(error))
    }

    /// Returns `true` if the session that produced this error can keep rendering.
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        matches!(self, Self::Component { .. })
    }
}
