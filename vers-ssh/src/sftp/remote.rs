//! The remote filesystem as seen by the transfer engine.

use std::future::Future;

use russh_sftp::client::SftpSession;
use russh_sftp::client::fs::File;
use russh_sftp::protocol::{FileAttributes, OpenFlags};
use tokio::io::{AsyncRead, AsyncWrite};

use crate::error::TransferError;

/// What the engine needs to know about a remote path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RemoteMetadata {
    /// Whether the path is a directory.
    pub is_dir: bool,

    /// Permission bits, if the server reported them.
    pub permissions: Option<u32>,
}

impl From<&FileAttributes> for RemoteMetadata {
    fn from(attrs: &FileAttributes) -> Self {
        Self {
            is_dir: attrs.is_dir(),
            permissions: attrs.permissions,
        }
    }
}

/// One directory entry, `.` and `..` excluded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteEntry {
    /// Entry name, without any directory part.
    pub name: String,

    /// Entry metadata.
    pub metadata: RemoteMetadata,
}

/// Remote filesystem operations used by uploads and downloads.
///
/// Paths are `/`-separated strings. Errors carry the offending path.
pub trait RemoteFs: Send + Sync {
    /// Open file handle.
    type File: AsyncRead + AsyncWrite + Unpin + Send;

    /// Stat `path`, following symlinks.
    fn metadata(
        &self,
        path: &str,
    ) -> impl Future<Output = Result<RemoteMetadata, TransferError>> + Send;

    /// Create or truncate `path` for writing.
    fn create(&self, path: &str) -> impl Future<Output = Result<Self::File, TransferError>> + Send;

    /// Open `path` for reading.
    fn open(&self, path: &str) -> impl Future<Output = Result<Self::File, TransferError>> + Send;

    /// Create a single directory.
    fn create_dir(&self, path: &str) -> impl Future<Output = Result<(), TransferError>> + Send;

    /// Set the permission bits of `path`.
    fn set_permissions(
        &self,
        path: &str,
        mode: u32,
    ) -> impl Future<Output = Result<(), TransferError>> + Send;

    /// List a directory.
    fn read_dir(
        &self,
        path: &str,
    ) -> impl Future<Output = Result<Vec<RemoteEntry>, TransferError>> + Send;
}

impl RemoteFs for SftpSession {
    type File = File;

    async fn metadata(&self, path: &str) -> Result<RemoteMetadata, TransferError> {
        let attrs = SftpSession::metadata(self, path)
            .await
            .map_err(|e| TransferError::sftp(path, e))?;
        Ok(RemoteMetadata::from(&attrs))
    }

    async fn create(&self, path: &str) -> Result<File, TransferError> {
        self.open_with_flags(
            path,
            OpenFlags::CREATE | OpenFlags::TRUNCATE | OpenFlags::WRITE,
        )
        .await
        .map_err(|e| TransferError::sftp(path, e))
    }

    async fn open(&self, path: &str) -> Result<File, TransferError> {
        self.open_with_flags(path, OpenFlags::READ)
            .await
            .map_err(|e| TransferError::sftp(path, e))
    }

    async fn create_dir(&self, path: &str) -> Result<(), TransferError> {
        SftpSession::create_dir(self, path)
            .await
            .map_err(|e| TransferError::sftp(path, e))
    }

    async fn set_permissions(&self, path: &str, mode: u32) -> Result<(), TransferError> {
        let attrs = FileAttributes {
            permissions: Some(mode),
            ..Default::default()
        };
        self.set_metadata(path, attrs)
            .await
            .map_err(|e| TransferError::sftp(path, e))
    }

    async fn read_dir(&self, path: &str) -> Result<Vec<RemoteEntry>, TransferError> {
        let entries = SftpSession::read_dir(self, path)
            .await
            .map_err(|e| TransferError::sftp(path, e))?;

        Ok(entries
            .filter(|entry| {
                let name = entry.file_name();
                name != "." && name != ".."
            })
            .map(|entry| RemoteEntry {
                name: entry.file_name(),
                metadata: RemoteMetadata::from(&entry.metadata()),
            })
            .collect())
    }
}
