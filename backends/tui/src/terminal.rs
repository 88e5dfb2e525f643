use std::io::{self, Stdout, Write};

use crossterm::{
    cursor::{Hide, MoveTo, Show},
    execute, queue,
    style::PrintStyledContent,
    terminal::{self, Clear, ClearType, EnterAlternateScreen, LeaveAlternateScreen},
};
use tracing::trace;

use crate::{
    error::TuiError,
    renderer::{RenderFrame, RenderLine},
};

/// The alternate screen in raw mode. Dropping it restores the terminal.
#[derive(Debug)]
struct Screen {
    stdout: Stdout,
}

impl Screen {
    fn enter() -> Result<Self, TuiError> {
        let mut stdout = io::stdout();
        terminal::enable_raw_mode()?;
        if let Err(err) = execute!(stdout, EnterAlternateScreen, Hide, Clear(ClearType::All)) {
            let _ = terminal::disable_raw_mode();
            return Err(err.into());
        }
        Ok(Self { stdout })
    }

    fn write_row(&mut self, row: usize, line: Option<&RenderLine>) -> io::Result<()> {
        queue!(self.stdout, MoveTo(0, u16::try_from(row).unwrap_or(u16::MAX)))?;
        let Some(line) = line else {
            return queue!(self.stdout, Clear(ClearType::CurrentLine));
        };
        for segment in line.segments() {
            queue!(self.stdout, PrintStyledContent(segment.as_styled_content()))?;
        }
        queue!(self.stdout, Clear(ClearType::UntilNewLine))
    }
}

impl Drop for Screen {
    fn drop(&mut self) {
        let _ = execute!(self.stdout, Show, LeaveAlternateScreen);
        let _ = terminal::disable_raw_mode();
    }
}

#[derive(Debug)]
enum Output {
    Screen(Screen),
    Buffer {
        rows: Vec<String>,
        columns: Option<u16>,
    },
}

/// Terminal that keeps the last drawn frame and rewrites only the rows that changed.
///
/// Frames are clipped to the terminal width before diffing. A width change redraws everything.
#[derive(Debug)]
pub struct Terminal {
    output: Output,
    drawn: Vec<RenderLine>,
    drawn_columns: Option<u16>,
}

impl Terminal {
    /// Takes over `stdout`: raw mode, alternate screen, hidden cursor.
    ///
    /// # Errors
    ///
    /// Returns an error if raw mode or the alternate screen cannot be enabled.
    pub fn stdout() -> Result<Self, TuiError> {
        Ok(Self::with_output(Output::Screen(Screen::enter()?)))
    }

    /// An in-memory terminal of unlimited width, for tests.
    #[must_use]
    pub fn buffered() -> Self {
        Self::with_output(Output::Buffer {
            rows: Vec::new(),
            columns: None,
        })
    }

    /// An in-memory terminal that clips rows to `columns`.
    #[must_use]
    pub fn buffered_with_columns(columns: u16) -> Self {
        Self::with_output(Output::Buffer {
            rows: Vec::new(),
            columns: Some(columns),
        })
    }

    const fn with_output(output: Output) -> Self {
        Self {
            output,
            drawn: Vec::new(),
            drawn_columns: None,
        }
    }

    /// Width rows are clipped to, `None` when unlimited.
    #[must_use]
    pub fn columns(&self) -> Option<u16> {
        match &self.output {
            Output::Screen(_) => terminal::size().ok().map(|(columns, _)| columns),
            Output::Buffer { columns, .. } => *columns,
        }
    }

    /// Draws `frame` and returns how many rows were rewritten.
    ///
    /// # Errors
    ///
    /// Returns an error if writing to the terminal fails.
    pub fn draw(&mut self, mut frame: RenderFrame) -> Result<usize, TuiError> {
        let columns = self.columns();
        if columns != self.drawn_columns {
            self.clear()?;
            self.drawn_columns = columns;
        }
        if let Some(columns) = columns {
            frame.clip(usize::from(columns));
        }

        let lines = frame.into_lines();
        let mut written = 0;
        for row in 0..lines.len().max(self.drawn.len()) {
            let line = lines.get(row);
            if line == self.drawn.get(row) {
                continue;
            }
            written += 1;
            match &mut self.output {
                Output::Screen(screen) => screen.write_row(row, line)?,
                Output::Buffer { rows, .. } => {
                    if rows.len() <= row {
                        rows.resize(row + 1, String::new());
                    }
                    rows[row] = line.map(RenderLine::plain_text).unwrap_or_default();
                }
            }
        }
        match &mut self.output {
            Output::Screen(screen) => screen.stdout.flush()?,
            Output::Buffer { rows, .. } => rows.truncate(lines.len()),
        }
        trace!(written, rows = lines.len(), "frame drawn");
        self.drawn = lines;
        Ok(written)
    }

    /// Forgets the drawn frame and blanks the output, so the next draw rewrites every row.
    ///
    /// # Errors
    ///
    /// Returns an error if the screen cannot be cleared.
    pub fn clear(&mut self) -> Result<(), TuiError> {
        self.drawn.clear();
        match &mut self.output {
            Output::Screen(screen) => execute!(screen.stdout, Clear(ClearType::All))?,
            Output::Buffer { rows, .. } => rows.clear(),
        }
        Ok(())
    }

    /// Text of an in-memory terminal, rows joined by newlines. `None` on a real screen.
    #[must_use]
    pub fn snapshot(&self) -> Option<String> {
        match &self.output {
            Output::Buffer { rows, .. } => Some(rows.join("\n")),
            Output::Screen(_) => None,
        }
    }
}
