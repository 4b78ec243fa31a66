use anyhow::{bail, Context, Result};
use crossterm::cursor::{Hide, Show};
use crossterm::execute;
use crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use crossterm::tty::IsTty;
use log::error;
use std::io::{self, stdin, stdout};

use crate::layout::TermSize;

/// Raw mode, alternate screen and a hidden cursor for as long as the guard lives. Dropping
/// it restores the terminal, on error paths included.
pub struct TerminalGuard {
    _private: (),
}

impl TerminalGuard {
    pub fn enter() -> Result<Self> {
        if !stdin().is_tty() || !stdout().is_tty() {
            bail!("stdin and stdout must both be terminals");
        }
        enable_raw_mode().context("Failed to enable raw mode")?;
        // From here on Drop undoes whatever did get applied.
        let guard = Self { _private: () };
        poll_reads().context("Failed to make terminal reads non-blocking")?;
        execute!(stdout(), EnterAlternateScreen, Hide)
            .context("Failed to switch to the alternate screen")?;
        Ok(guard)
    }
}

impl Drop for TerminalGuard {
    fn drop(&mut self) {
        if let Err(e) = execute!(stdout(), LeaveAlternateScreen, Show) {
            error!("failed to leave the alternate screen: {e}");
        }
        // Restores the termios saved by enable_raw_mode, which also undoes poll_reads.
        if let Err(e) = disable_raw_mode() {
            error!("failed to disable raw mode: {e}");
        }
    }
}

pub fn size() -> io::Result<TermSize> {
    let (cols, rows) = crossterm::terminal::size()?;
    Ok(TermSize::new(cols, rows))
}

/// Sets VMIN = 0 and VTIME = 0 on stdin, so a read with no pending key returns 0 bytes
/// instead of blocking.
fn poll_reads() -> io::Result<()> {
    let fd = libc::STDIN_FILENO;
    // SAFETY: termios is plain data and is fully written by tcgetattr before being read.
    let mut termios: libc::termios = unsafe { std::mem::zeroed() };
    // SAFETY: fd is a valid descriptor and termios points to writable memory.
    if unsafe { libc::tcgetattr(fd, &mut termios) } == -1 {
        return Err(io::Error::last_os_error());
    }
    termios.c_cc[libc::VMIN] = 0;
    termios.c_cc[libc::VTIME] = 0;
    // SAFETY: as above; termios was initialised by tcgetattr.
    if unsafe { libc::tcsetattr(fd, libc::TCSANOW, &termios) } == -1 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}
