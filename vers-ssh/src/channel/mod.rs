//! Session channel plumbing.
//!
//! [`pump`] drives one SSH session channel to completion, copying its output
//! to local writers and feeding it stdin and window changes. [`pty`] holds the
//! PTY request parameters and [`resize`] the local terminal probes.

pub mod pty;
pub mod pump;
pub mod resize;

pub use pty::{PtyConfig, TerminalSize};
pub use pump::{ExitOutcome, RemoteChannel, RemoteEvent, pump};
pub use resize::{LocalTerminal, NoResize, RawModeGuard, ResizeWatcher};
