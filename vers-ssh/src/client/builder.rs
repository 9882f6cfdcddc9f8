//! Builder for VM clients.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use super::Client;
use crate::transport::config::VmConfig;

/// Builder for constructing a [`Client`] with non-default settings.
///
/// # Example
///
/// ```rust,no_run
/// use vers_ssh::ClientBuilder;
///
/// let client = ClientBuilder::new("abc123", "/home/me/.vers/keys/abc123")
///     .domain("vm.staging.vers.sh")
///     .build();
/// assert_eq!(client.hostname(), "abc123.vm.staging.vers.sh");
/// ```
pub struct ClientBuilder {
    host: String,
    key_path: PathBuf,
    config: VmConfig,
}

impl ClientBuilder {
    /// Create a builder for the VM `host`, authenticating with `key_path`.
    pub fn new(host: impl Into<String>, key_path: impl Into<PathBuf>) -> Self {
        Self {
            host: host.into(),
            key_path: key_path.into(),
            config: VmConfig::default(),
        }
    }

    /// Replace the whole connection configuration.
    pub fn config(mut self, config: VmConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the hostname domain suffix (default: `vm.vers.sh`).
    pub fn domain(mut self, domain: impl Into<String>) -> Self {
        self.config.domain = domain.into();
        self
    }

    /// Set the edge port (default: 443).
    pub fn port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    /// Dial `addr` instead of resolving the VM hostname, which is still
    /// sent as the TLS server name.
    pub fn resolve(mut self, addr: SocketAddr) -> Self {
        self.config.resolve = Some(addr);
        self
    }

    /// Set the keep-alive interval (default: 10 seconds).
    pub fn keepalive_interval(mut self, interval: Duration) -> Self {
        self.config.keepalive.interval = interval;
        self
    }

    /// Set how many consecutive keep-alive misses close the connection (default: 6).
    pub fn keepalive_max_misses(mut self, misses: u32) -> Self {
        self.config.keepalive.max_misses = misses;
        self
    }

    /// Set the terminal type for interactive shells (default: `xterm-256color`).
    pub fn term(mut self, term: impl Into<String>) -> Self {
        self.config.term = term.into();
        self
    }

    /// Build the client. Nothing is dialed until an operation runs.
    pub fn build(self) -> Client {
        Client {
            host: self.host,
            key_path: self.key_path,
            config: self.config,
        }
    }
}
