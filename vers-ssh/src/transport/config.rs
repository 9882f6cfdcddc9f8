//! Connection configuration for Vers VMs.

use std::net::SocketAddr;
use std::time::Duration;

use serde::Deserialize;

/// Domain under which every VM is reachable as `{vm-id}.{domain}`.
pub const VM_DOMAIN: &str = "vm.vers.sh";

/// Port of the platform edge that terminates TLS per VM hostname.
pub const VM_PORT: u16 = 443;

/// The only user VMs accept.
pub const VM_USER: &str = "root";

/// Terminal type requested for interactive shells.
pub const PTY_TERM: &str = "xterm-256color";

/// Upper bound on the SSH handshake (including authentication).
///
/// Fixed: neither extended nor shortened by the caller's cancellation token.
pub const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(30);

/// Interval between `keepalive@openssh.com` probes.
pub const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(10);

/// Consecutive failed probes after which the connection is closed.
pub const KEEPALIVE_MAX_MISSES: u32 = 6;

/// Connection settings for the Vers edge.
///
/// The defaults are the platform's wire contract. Overriding `domain` or
/// `port` is only meant for staging edges. The user is always [`VM_USER`].
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct VmConfig {
    /// Domain appended to the VM id to build the TLS/SSH hostname.
    pub domain: String,

    /// Edge port.
    pub port: u16,

    /// Dial this address instead of resolving the hostname. SNI still
    /// carries the hostname.
    pub resolve: Option<SocketAddr>,

    /// Keep-alive probe settings.
    pub keepalive: KeepalivePolicy,

    /// Terminal type for PTY requests.
    pub term: String,
}

impl Default for VmConfig {
    fn default() -> Self {
        Self {
            domain: VM_DOMAIN.to_string(),
            port: VM_PORT,
            resolve: None,
            keepalive: KeepalivePolicy::default(),
            term: PTY_TERM.to_string(),
        }
    }
}

impl VmConfig {
    /// Hostname used for SNI and as the SSH host: `{host}.{domain}`.
    pub fn hostname(&self, host: &str) -> String {
        format!("{}.{}", host, self.domain)
    }

    /// Socket address string for the TCP dial.
    pub fn socket_addr(&self, host: &str) -> String {
        format!("{}:{}", self.hostname(host), self.port)
    }
}

/// Keep-alive probe timing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct KeepalivePolicy {
    /// Time between probes.
    #[serde(with = "seconds")]
    pub interval: Duration,

    /// Consecutive misses tolerated before the link is closed.
    pub max_misses: u32,
}

impl Default for KeepalivePolicy {
    fn default() -> Self {
        Self {
            interval: KEEPALIVE_INTERVAL,
            max_misses: KEEPALIVE_MAX_MISSES,
        }
    }
}

mod seconds {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_secs)
    }
}
