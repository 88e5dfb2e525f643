use core::fmt;

use std::io;

use waterui_fiber::RenderError;

/// Errors that can occur while building or running a [`TuiApp`](crate::TuiApp).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TuiError {
    /// A node handle no longer exists in the terminal tree.
    UnknownNode,
    /// `insertBefore` or `removeChild` named a node that is not a child of the parent.
    NotAChild,
    /// No element carries the requested `id` attribute.
    UnknownTarget(String),
    /// Low level terminal I/O failure.
    Io(String),
    /// Rendering pipeline error.
    Render(String),
}

impl fmt::Display for TuiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownNode => write!(f, "node does not exist in the terminal tree"),
            Self::NotAChild => write!(f, "node is not a child of the given parent"),
            Self::UnknownTarget(id) => write!(f, "no element with id `{id}`"),
            Self::Io(message) => write!(f, "terminal I/O error: {message}"),
            Self::Render(message) => write!(f, "rendering error: {message}"),
        }
    }
}

impl std::error::Error for TuiError {}

impl From<io::Error> for TuiError {
    fn from(value: io::Error) -> Self {
        Self::Io(value.to_string())
    }
}

impl From<RenderError> for TuiError {
    fn from(value: RenderError) -> Self {
        let mut message = value.to_string();
        let mut source = std::error::Error::source(&value);
        while let Some(cause) = source {
            message.push_str(": ");
            message.push_str(&cause.to_string());
            source = cause.source();
        }
        Self::Render(message)
    }
}
