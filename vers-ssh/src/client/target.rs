//! Resolved connection targets.

use std::path::PathBuf;

use serde::Deserialize;

/// A VM resolved to something dialable: its id and the key that opens it.
///
/// Produced by whatever resolves user-facing names (ids, aliases) to VMs and
/// provisions their keys; this crate only consumes it.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Target {
    /// VM identifier, used as the leftmost hostname label.
    pub host: String,

    /// Path to the VM's private key.
    pub key_path: PathBuf,
}

impl Target {
    /// Create a target.
    pub fn new(host: impl Into<String>, key_path: impl Into<PathBuf>) -> Self {
        Self {
            host: host.into(),
            key_path: key_path.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_target_from_json() {
        let target: Target =
            serde_json::from_str(r#"{"host": "abc123", "key_path": "/home/me/.vers/keys/abc123"}"#)
                .unwrap();
        assert_eq!(
            target,
            Target::new("abc123", "/home/me/.vers/keys/abc123")
        );
    }
}
