//! Local terminal probing and resize notification.
//!
//! Resize events come from `SIGWINCH` on Unix. Other platforms get a watcher
//! that reports the initial size and never fires.

use std::future::Future;
use std::io::IsTerminal;

use log::{debug, warn};

use super::pty::TerminalSize;

/// Source of local terminal size changes.
pub trait ResizeWatcher: Send {
    /// Current size, or `None` if the local side is not a terminal.
    fn size(&self) -> Option<TerminalSize>;

    /// Wait for the next resize. `None` means no more events will arrive.
    ///
    /// Must be cancel-safe: it is polled inside `select!`.
    fn changed(&mut self) -> impl Future<Output = Option<TerminalSize>> + Send;
}

/// Watcher for sessions without a local terminal.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoResize;

impl ResizeWatcher for NoResize {
    fn size(&self) -> Option<TerminalSize> {
        None
    }

    async fn changed(&mut self) -> Option<TerminalSize> {
        std::future::pending().await
    }
}

/// Watcher for the process's own terminal.
pub struct LocalTerminal {
    is_terminal: bool,
    #[cfg(unix)]
    signal: Option<tokio::signal::unix::Signal>,
}

impl LocalTerminal {
    /// Probe the process stdin and, if it is a terminal, subscribe to resizes.
    ///
    /// Must be called from within a tokio runtime.
    pub fn stdin() -> Self {
        Self::probe(&std::io::stdin())
    }

    /// Probe `stream` instead of the process stdin.
    ///
    /// The size itself is always read from the controlling terminal.
    pub fn probe(stream: &impl IsTerminal) -> Self {
        let is_terminal = stream.is_terminal();

        #[cfg(unix)]
        let signal = if is_terminal {
            use tokio::signal::unix::{SignalKind, signal};
            match signal(SignalKind::window_change()) {
                Ok(signal) => Some(signal),
                Err(e) => {
                    warn!("cannot watch terminal resizes: {}", e);
                    None
                }
            }
        } else {
            None
        };

        Self {
            is_terminal,
            #[cfg(unix)]
            signal,
        }
    }

    /// Whether the probed stream is a terminal.
    pub fn is_terminal(&self) -> bool {
        self.is_terminal
    }
}

fn current_size() -> Option<TerminalSize> {
    match crossterm::terminal::size() {
        Ok(size) => Some(TerminalSize::from(size)),
        Err(e) => {
            debug!("terminal size unavailable: {}", e);
            None
        }
    }
}

impl ResizeWatcher for LocalTerminal {
    fn size(&self) -> Option<TerminalSize> {
        if self.is_terminal {
            current_size()
        } else {
            None
        }
    }

    #[cfg(unix)]
    async fn changed(&mut self) -> Option<TerminalSize> {
        let Some(signal) = self.signal.as_mut() else {
            return std::future::pending().await;
        };
        loop {
            signal.recv().await?;
            if let Some(size) = current_size() {
                return Some(size);
            }
        }
    }

    #[cfg(not(unix))]
    async fn changed(&mut self) -> Option<TerminalSize> {
        std::future::pending().await
    }
}

/// Puts the local terminal in raw mode until dropped.
///
/// Keystrokes then reach the remote PTY unprocessed (Ctrl-C included).
pub struct RawModeGuard {
    _private: (),
}

impl RawModeGuard {
    /// Enable raw mode.
    pub fn enable() -> std::io::Result<Self> {
        crossterm::terminal::enable_raw_mode()?;
        Ok(Self { _private: () })
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        if let Err(e) = crossterm::terminal::disable_raw_mode() {
            warn!("failed to restore terminal mode: {}", e);
        }
    }
}
