use std::io::{self, stdout, Stdout};

use crossterm::{
    event::{DisableMouseCapture, EnableMouseCapture},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use log::warn;
use ratatui::{backend::CrosstermBackend, Terminal};

/// Owns the terminal while a screen is up and puts it back the way it was
/// when dropped, whether the screen returned normally, with an error, or
/// by panicking.
pub struct TerminalGuard {
    terminal: Terminal<CrosstermBackend<Stdout>>,
    mouse: bool,
}

impl TerminalGuard {
    /// Switch to raw mode and the alternate screen, capturing the mouse if
    /// asked to.
    pub fn enter(mouse: bool) -> io::Result<Self> {
        enable_raw_mode()?;
        let mut out = stdout();
        if mouse {
            execute!(out, EnterAlternateScreen, EnableMouseCapture)?;
        } else {
            execute!(out, EnterAlternateScreen)?;
        }

        let mut terminal = Terminal::new(CrosstermBackend::new(out))?;
        terminal.clear()?;
        Ok(Self { terminal, mouse })
    }

    pub fn terminal(&mut self) -> &mut Terminal<CrosstermBackend<Stdout>> {
        &mut self.terminal
    }
}

impl Drop for TerminalGuard {
    fn drop(&mut self) {
        let restored = disable_raw_mode().and_then(|_| {
            if self.mouse {
                execute!(
                    self.terminal.backend_mut(),
                    LeaveAlternateScreen,
                    DisableMouseCapture
                )
            } else {
                execute!(self.terminal.backend_mut(), LeaveAlternateScreen)
            }
        });
        if let Err(e) = restored.and_then(|_| self.terminal.show_cursor()) {
            warn!("Could not restore the terminal: {}", e);
        }
    }
}
