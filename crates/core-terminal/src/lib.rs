//! Terminal backend abstraction and crossterm implementation.
//!
//! The selector draws on stderr so stdout stays a clean pipe for the
//! emitted lines. Raw mode and the alternate screen are entered together
//! and unwound by an RAII guard, so a panic or early return cannot leave
//! the user's terminal scrambled.

use std::io::{stderr, IsTerminal, Write};

use anyhow::Result;
use crossterm::{
    cursor::{Hide, Show},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};

pub trait TerminalBackend {
    fn enter(&mut self) -> Result<()>;
    fn leave(&mut self) -> Result<()>;
    /// (columns, rows)
    fn size(&self) -> Result<(u16, u16)>;
}

/// Whether stdin carries piped data rather than an interactive terminal.
pub fn stdin_is_pipe() -> bool {
    !std::io::stdin().is_terminal()
}

/// Whether the UI surface (stderr) supports interactive rendering.
pub fn stderr_is_terminal() -> bool {
    stderr().is_terminal()
}

pub struct CrosstermBackend {
    entered: bool,
}

/// RAII guard ensuring terminal state restoration even if the caller
/// early-returns or panics.
pub struct TerminalGuard<'a> {
    backend: &'a mut CrosstermBackend,
}

impl Default for CrosstermBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl CrosstermBackend {
    pub fn new() -> Self {
        Self { entered: false }
    }

    /// Enter and return a guard that will leave on drop.
    pub fn enter_guard(&mut self) -> Result<TerminalGuard<'_>> {
        self.enter()?;
        Ok(TerminalGuard { backend: self })
    }
}

impl TerminalBackend for CrosstermBackend {
    fn enter(&mut self) -> Result<()> {
        if !self.entered {
            enable_raw_mode()?;
            execute!(stderr(), EnterAlternateScreen, Hide)?;
            self.entered = true;
        }
        Ok(())
    }

    fn leave(&mut self) -> Result<()> {
        if self.entered {
            execute!(stderr(), LeaveAlternateScreen, Show)?;
            disable_raw_mode()?;
            stderr().flush()?;
            self.entered = false;
        }
        Ok(())
    }

    fn size(&self) -> Result<(u16, u16)> {
        Ok(crossterm::terminal::size()?)
    }
}

impl Drop for CrosstermBackend {
    fn drop(&mut self) {
        let _ = self.leave();
    }
}

impl<'a> Drop for TerminalGuard<'a> {
    fn drop(&mut self) {
        let _ = self.backend.leave();
    }
}
