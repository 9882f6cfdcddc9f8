//! PTY request parameters for interactive sessions.

use russh::{Channel, Pty};
use russh::client::Msg;

use crate::error::{Result, TransportError};
use crate::transport::config::PTY_TERM;

/// Terminal dimensions in character cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TerminalSize {
    /// Columns.
    pub cols: u32,

    /// Rows.
    pub rows: u32,
}

impl TerminalSize {
    /// Create a size from columns and rows.
    pub fn new(cols: u32, rows: u32) -> Self {
        Self { cols, rows }
    }
}

impl Default for TerminalSize {
    /// 80x24, used when the local side is not a terminal.
    fn default() -> Self {
        Self { cols: 80, rows: 24 }
    }
}

impl From<(u16, u16)> for TerminalSize {
    fn from((cols, rows): (u16, u16)) -> Self {
        Self::new(u32::from(cols), u32::from(rows))
    }
}

/// Echo on, 14.4kbaud in both directions.
const TERMINAL_MODES: &[(Pty, u32)] = &[
    (Pty::ECHO, 1),
    (Pty::TTY_OP_ISPEED, 14400),
    (Pty::TTY_OP_OSPEED, 14400),
];

/// Configuration for the remote pseudo-terminal.
#[derive(Debug, Clone)]
pub struct PtyConfig {
    /// Value for the remote `TERM`.
    pub term: String,

    /// Initial size.
    pub size: TerminalSize,
}

impl Default for PtyConfig {
    fn default() -> Self {
        Self {
            term: PTY_TERM.to_string(),
            size: TerminalSize::default(),
        }
    }
}

impl PtyConfig {
    /// Create a PTY configuration for `term` at `size`.
    pub fn new(term: impl Into<String>, size: TerminalSize) -> Self {
        Self {
            term: term.into(),
            size,
        }
    }

    /// Terminal modes sent with the request.
    pub fn modes(&self) -> &'static [(Pty, u32)] {
        TERMINAL_MODES
    }

    /// Request the PTY, then a login shell, on `channel`.
    pub async fn open_shell(&self, channel: &Channel<Msg>) -> Result<()> {
        channel
            .request_pty(
                true,
                &self.term,
                self.size.cols,
                self.size.rows,
                0,
                0,
                self.modes(),
            )
            .await
            .map_err(TransportError::Ssh)?;

        channel
            .request_shell(true)
            .await
            .map_err(TransportError::Ssh)?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_size_is_80x24() {
        assert_eq!(TerminalSize::default(), TerminalSize::new(80, 24));
    }

    #[test]
    fn test_size_from_crossterm_tuple() {
        assert_eq!(TerminalSize::from((132u16, 43u16)), TerminalSize::new(132, 43));
    }

    #[test]
    fn test_pty_defaults() {
        let pty = PtyConfig::default();
        assert_eq!(pty.term, "xterm-256color");
        assert_eq!(pty.size, TerminalSize::new(80, 24));
        assert!(
            pty.modes()
                .iter()
                .any(|(mode, value)| matches!(mode, Pty::ECHO) && *value == 1)
        );
    }
}
