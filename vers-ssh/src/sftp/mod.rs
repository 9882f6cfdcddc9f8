//! SFTP file transfer.
//!
//! [`open`] starts the `sftp` subsystem on a connection. The engine in
//! [`transfer`] only needs a [`RemoteFs`], so it runs the same against a live
//! session or any other implementation.

pub mod remote;
pub mod transfer;

pub use remote::{RemoteEntry, RemoteFs, RemoteMetadata};
pub use transfer::{download, upload};

use log::debug;
use russh_sftp::client::SftpSession;

use crate::error::{Result, TransferError};
use crate::transport::Connection;

/// Open a channel on `conn` and start an SFTP session on it.
pub async fn open(conn: &Connection) -> Result<SftpSession> {
    let channel = conn.open_channel().await?;
    channel
        .request_subsystem(true, "sftp")
        .await
        .map_err(|e| TransferError::Subsystem(e.to_string()))?;

    let sftp = SftpSession::new(channel.into_stream())
        .await
        .map_err(|e| TransferError::Subsystem(e.to_string()))?;
    debug!("sftp session started");
    Ok(sftp)
}

/// End an SFTP session. Failures are logged.
pub async fn close(sftp: SftpSession) {
    if let Err(e) = sftp.close().await {
        debug!("sftp close failed: {}", e);
    }
}
