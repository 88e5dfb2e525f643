use core::time::Duration;

use tracing::debug;
use waterui_fiber::{
    CommitReport, Description, RendererConfig, Session,
    scheduler::TimeSlice,
};

use crate::{
    error::TuiError,
    host::TerminalHost,
    renderer::{RenderFrame, Renderer},
    terminal::Terminal,
};

/// Default length of one work-loop slice between terminal redraws.
pub const DEFAULT_SLICE: Duration = Duration::from_millis(8);

/// Entry point for rendering fiber trees in the terminal.
#[derive(Debug)]
pub struct TuiApp {
    terminal: Terminal,
    renderer: Renderer,
    session: Session<TerminalHost>,
    slice: Duration,
}

impl TuiApp {
    /// Renders a description and flushes the result to the terminal.
    ///
    /// # Errors
    ///
    /// Returns an error when the render pass fails or when the terminal cannot be written to.
    pub fn render(&mut self, description: Description) -> Result<CommitReport, TuiError> {
        let root = self.session.host().root();
        self.session.schedule_render(description, root);
        let slice = self.slice;
        let report = self.session.finish_pass(|| TimeSlice::new(slice))?;
        self.redraw()?;
        Ok(report)
    }

    /// Re-renders if component state changed, then redraws.
    ///
    /// # Errors
    ///
    /// Returns an error when the render pass fails or when the terminal cannot be written to.
    pub fn refresh(&mut self) -> Result<Option<CommitReport>, TuiError> {
        if !self.session.schedule_update() {
            return Ok(None);
        }
        let slice = self.slice;
        let report = self.session.finish_pass(|| TimeSlice::new(slice))?;
        debug!(units = report.units, slices = report.slices, "refreshed");
        self.redraw()?;
        Ok(Some(report))
    }

    /// Fires `event` on the element whose `id` property is `id`, returning the number of handlers
    /// that ran.
    ///
    /// # Errors
    ///
    /// Returns [`TuiError::UnknownTarget`] if no element has that id.
    pub fn dispatch(&self, id: &str, event: &str) -> Result<usize, TuiError> {
        let host = self.session.host();
        let node = host
            .find_by_id(id)
            .ok_or_else(|| TuiError::UnknownTarget(id.to_owned()))?;
        Ok(host.dispatch(node, event, &()))
    }

    /// Draws the current host tree if it changed since the last draw. Returns the number of
    /// terminal rows rewritten.
    ///
    /// # Errors
    ///
    /// Returns an error when the terminal cannot be written to.
    pub fn redraw(&mut self) -> Result<usize, TuiError> {
        if !self.session.host_mut().take_dirty() {
            return Ok(0);
        }
        let frame = self.render_to_frame();
        let rows = self.terminal.draw(frame)?;
        debug!(rows, "redrawn");
        Ok(rows)
    }

    /// Renders the current host tree to a frame without drawing it.
    #[must_use]
    pub fn render_to_frame(&self) -> RenderFrame {
        self.renderer.render(self.session.host())
    }

    /// Provides immutable access to the render session.
    #[must_use]
    pub const fn session(&self) -> &Session<TerminalHost> {
        &self.session
    }

    /// Provides mutable access to the render session.
    #[must_use]
    pub const fn session_mut(&mut self) -> &mut Session<TerminalHost> {
        &mut self.session
    }

    /// Provides mutable access to the terminal handle.
    #[must_use]
    pub const fn terminal_mut(&mut self) -> &mut Terminal {
        &mut self.terminal
    }

    /// Provides immutable access to the terminal handle.
    #[must_use]
    pub const fn terminal(&self) -> &Terminal {
        &self.terminal
    }
}

/// Builder for [`TuiApp`] instances.
#[derive(Debug)]
pub struct TuiAppBuilder {
    terminal: Option<Terminal>,
    config: RendererConfig,
    slice: Duration,
}

impl Default for TuiAppBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TuiAppBuilder {
    /// Creates a new builder with default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self {
            terminal: None,
            config: RendererConfig::default(),
            slice: DEFAULT_SLICE,
        }
    }

    /// Overrides the terminal handle used by the application.
    #[must_use]
    pub fn with_terminal(mut self, terminal: Terminal) -> Self {
        self.terminal = Some(terminal);
        self
    }

    /// Replaces the renderer configuration.
    #[must_use]
    pub const fn with_config(mut self, config: RendererConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the length of each work-loop slice.
    #[must_use]
    pub const fn with_slice(mut self, slice: Duration) -> Self {
        self.slice = slice;
        self
    }

    /// Consumes the builder and produces a [`TuiApp`].
    ///
    /// # Errors
    ///
    /// Returns an error if the terminal cannot be initialised.
    pub fn build(self) -> Result<TuiApp, TuiError> {
        let terminal = match self.terminal {
            Some(terminal) => terminal,
            None => Terminal::stdout()?,
        };

        Ok(TuiApp {
            terminal,
            renderer: Renderer::new(),
            session: Session::with_config(TerminalHost::new(), self.config),
            slice: self.slice,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use waterui_fiber::{
        Component, element,
        describe::{Attributes, ComponentResult, EventHandler},
    };

    fn buffered_app() -> TuiApp {
        TuiAppBuilder::new()
            .with_terminal(Terminal::buffered())
            .build()
            .expect("building app should succeed")
    }

    fn snapshot(app: &TuiApp) -> String {
        app.terminal().snapshot().expect("buffered terminal")
    }

    #[test]
    fn render_into_buffer() {
        let mut app = buffered_app();
        app.render(element("p").child("Hello TUI").build())
            .expect("rendering should succeed");
        assert!(snapshot(&app).contains("Hello TUI"));
    }

    #[test]
    fn state_changes_redraw_after_refresh() {
        let counter = Component::new("Counter", |_: &Attributes, hooks| {
            let (count, set_count) = hooks.use_state(|| 0_u32);
            let increment = EventHandler::new(move |_| set_count.update(|count| count + 1));
            Ok(element("p")
                .child(format!("count {count} "))
                .child(element("button").attr("id", "inc").on("click", increment).child("+"))
                .build())
        });
        let mut app = buffered_app();
        app.render(counter.describe(Attributes::new()))
            .expect("rendering should succeed");
        assert_eq!(snapshot(&app), "count 0 [ + ]");

        assert_eq!(app.refresh().expect("refresh should succeed"), None);
        assert_eq!(app.redraw().expect("redraw should succeed"), 0);
        assert_eq!(app.dispatch("inc", "click").expect("button exists"), 1);
        let report = app.refresh().expect("refresh should succeed");
        assert!(report.is_some());
        assert_eq!(snapshot(&app), "count 1 [ + ]");
        assert_eq!(
            app.dispatch("missing", "click"),
            Err(TuiError::UnknownTarget("missing".into()))
        );
    }

    #[test]
    fn failing_components_surface_as_render_errors() {
        let broken = Component::new("Broken", |_: &Attributes, _| offline());
        let mut app = buffered_app();
        let error = app
            .render(broken.describe(Attributes::new()))
            .expect_err("render should fail");
        assert!(matches!(error, TuiError::Render(message) if message.contains("Broken")));
    }

    fn offline() -> ComponentResult {
        Err(std::io::Error::other("offline").into())
    }
}
