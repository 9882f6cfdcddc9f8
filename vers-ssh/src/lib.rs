//! # vers-ssh
//!
//! Async SSH-over-TLS client for Vers VMs.
//!
//! Every VM is reachable as `{vm-id}.vm.vers.sh:443`. The platform edge routes
//! on the TLS SNI name, and the SSH protocol runs inside that TLS stream.
//! This crate dials that tunnel, authenticates as `root` with the VM's private
//! key, and offers the operations a CLI needs on top of it.
//!
//! ## Features
//!
//! - TLS dial with SNI, SSH handshake over the TLS stream via russh
//! - Keep-alive monitor that drops silent connections
//! - Command execution with streamed stdout/stderr and exit codes
//! - Interactive PTY shells with terminal resize propagation
//! - Streaming sessions with raw stdin/stdout/stderr pipes
//! - SFTP upload and download of files and directory trees
//! - Cancellation of every operation through a [`CancellationToken`](tokio_util::sync::CancellationToken)
//!
//! ## Security
//!
//! Neither the TLS certificate nor the SSH host key is verified. The TLS
//! layer exists for routing; authentication rests entirely on possession of
//! the VM's SSH private key. Anyone able to intercept traffic to the edge can
//! impersonate a VM to this client.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use tokio_util::sync::CancellationToken;
//! use vers_ssh::Client;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), vers_ssh::Error> {
//!     let client = Client::new("abc123", "/home/me/.vers/keys/abc123");
//!     let cancel = CancellationToken::new();
//!
//!     let mut stdout = tokio::io::stdout();
//!     let mut stderr = tokio::io::stderr();
//!     match client.execute(&cancel, "uname -a", &mut stdout, &mut stderr).await {
//!         Ok(()) => {}
//!         Err(e) if e.exit_code().is_some() => eprintln!("command failed: {e}"),
//!         Err(e) => return Err(e),
//!     }
//!
//!     client.upload(&cancel, "./dist", "/srv/app", true).await?;
//!     Ok(())
//! }
//! ```

pub mod channel;
pub mod client;
pub mod error;
pub mod sftp;
pub mod transport;

// Re-export main types for convenience
pub use channel::{RawModeGuard, TerminalSize};
pub use client::{Client, ClientBuilder, Session, Target};
pub use error::{Error, Result};
pub use transport::{HANDSHAKE_TIMEOUT, VmConfig};
