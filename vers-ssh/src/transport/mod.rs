//! Transport layer: TLS dial, SSH handshake and connection liveness.
//!
//! Every VM is reached at `{vm-id}.vm.vers.sh:443`. The TCP stream is wrapped
//! in TLS (SNI = that hostname) and the SSH client handshake runs over the
//! TLS byte stream. Connections are never pooled: each operation dials its
//! own and closes it when done.

pub mod config;
pub mod keepalive;
mod ssh;
pub mod tls;

pub use config::{HANDSHAKE_TIMEOUT, KeepalivePolicy, VM_USER, VmConfig};
pub use keepalive::SshLink;
pub use ssh::{Connection, VmHandler, VmLink, connect, load_key};
