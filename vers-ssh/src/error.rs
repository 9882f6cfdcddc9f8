//! Error types for vers-ssh.

use std::io;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Main error type for vers-ssh operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Key loading, TLS dial or SSH handshake errors
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Remote command outcome errors
    #[error(transparent)]
    Exec(#[from] ExecError),

    /// Streaming session misuse or failure
    #[error("session: {0}")]
    Session(#[from] SessionError),

    /// SFTP upload/download errors
    #[error(transparent)]
    Transfer(#[from] TransferError),

    /// The caller's cancellation token fired
    #[error("operation cancelled")]
    Cancelled,
}

impl Error {
    /// Exit status of the remote command, if this error is a non-zero exit.
    pub fn exit_code(&self) -> Option<u32> {
        match self {
            Error::Exec(ExecError::ExitStatus { code }) => Some(*code),
            _ => None,
        }
    }

    /// Whether the operation was interrupted by cancellation.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled)
    }
}

/// Transport layer errors (key material, TLS, SSH handshake).
#[derive(Error, Debug)]
pub enum TransportError {
    /// Private key file missing or unreadable
    #[error("read SSH key: {}: {source}", .path.display())]
    ReadKey {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Key material could not be decoded (encrypted keys are not supported)
    #[error("parse SSH key: {0}")]
    ParseKey(String),

    /// The synthesized hostname is not a valid TLS server name
    #[error("TLS dial: invalid server name '{0}'")]
    InvalidServerName(String),

    /// TCP connect or TLS handshake failed
    #[error("TLS dial: {host}:{port}: {source}")]
    TlsDial {
        host: String,
        port: u16,
        #[source]
        source: io::Error,
    },

    /// TLS client configuration could not be built
    #[error("TLS dial: {0}")]
    TlsConfig(#[from] rustls::Error),

    /// SSH protocol handshake failed
    #[error("SSH handshake: {0}")]
    Handshake(russh::Error),

    /// Handshake did not finish within the fixed handshake timeout
    #[error("SSH handshake: timed out after {0:?}")]
    HandshakeTimeout(Duration),

    /// Server rejected the public key
    #[error("SSH handshake: authentication failed for user '{user}'")]
    AuthenticationFailed { user: String },

    /// SSH protocol error on an established connection
    #[error("SSH error: {0}")]
    Ssh(#[from] russh::Error),

    /// The peer did not answer a keep-alive probe in time
    #[error("keep-alive: no reply within {0:?}")]
    KeepaliveTimeout(Duration),

    /// Connection was closed unexpectedly
    #[error("connection disconnected")]
    Disconnected,
}

/// Outcome errors of a remote command.
#[derive(Error, Debug)]
pub enum ExecError {
    /// The command exited with a non-zero status
    #[error("remote command exited with status {code}")]
    ExitStatus { code: u32 },

    /// The command was terminated by a signal
    #[error("remote command killed by signal {signal}{}", signal_detail(.message))]
    ExitSignal { signal: String, message: String },

    /// The channel closed without reporting an exit status
    #[error("remote command exited without exit status or exit signal")]
    MissingExitStatus,

    /// Failed to move bytes between the channel and local streams
    #[error("stream I/O: {0}")]
    Io(#[from] io::Error),
}

fn signal_detail(message: &str) -> String {
    if message.is_empty() {
        String::new()
    } else {
        format!(": {message}")
    }
}

/// Streaming session errors.
#[derive(Error, Debug)]
pub enum SessionError {
    /// `wait` called before `start`, or a second time
    #[error("command not started")]
    NotStarted,

    /// `start` called twice
    #[error("command already started")]
    AlreadyStarted,

    /// The session was closed
    #[error("closed")]
    Closed,

    /// The background pump task panicked or was aborted
    #[error("task failed: {0}")]
    TaskFailed(String),
}

/// SFTP transfer errors.
#[derive(Error, Debug)]
pub enum TransferError {
    /// Directory source given without `recursive`
    #[error("{path} is a directory (recursive transfer not requested)")]
    IsDirectory { path: String },

    /// Local filesystem failure
    #[error("{}: {source}", .path.display())]
    LocalIo {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Remote filesystem failure
    #[error("sftp {path}: {message}")]
    Sftp { path: String, message: String },

    /// The SFTP subsystem could not be started
    #[error("sftp subsystem: {0}")]
    Subsystem(String),
}

impl TransferError {
    pub(crate) fn local(path: impl Into<PathBuf>, source: io::Error) -> Self {
        TransferError::LocalIo {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn sftp(path: impl Into<String>, err: impl std::fmt::Display) -> Self {
        TransferError::Sftp {
            path: path.into(),
            message: err.to_string(),
        }
    }
}

/// Result type alias using vers-ssh's Error.
pub type Result<T> = std::result::Result<T, Error>;
