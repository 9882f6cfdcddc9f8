//! Single-file and recursive copies between the local disk and a [`RemoteFs`].
//!
//! Files are truncated on the destination and streamed, then given the
//! source's permission bits on a best-effort basis. Directory sources need
//! `recursive` and are rejected before anything on the destination is
//! touched. The first error aborts the walk; files already copied stay.

use std::path::Path;

use log::{debug, trace};
use tokio::io::{AsyncWrite, AsyncWriteExt};

use super::remote::{RemoteFs, RemoteMetadata};
use crate::error::TransferError;

/// Upload `local` to `remote`.
pub async fn upload<R: RemoteFs>(
    fs: &R,
    local: &Path,
    remote: &str,
    recursive: bool,
) -> Result<(), TransferError> {
    let meta = tokio::fs::metadata(local)
        .await
        .map_err(|e| TransferError::local(local, e))?;

    if !meta.is_dir() {
        return upload_file(fs, local, remote, local_mode(&meta)).await;
    }
    if !recursive {
        return Err(TransferError::IsDirectory {
            path: local.display().to_string(),
        });
    }

    let mut pending = vec![(local.to_path_buf(), remote.to_string())];
    while let Some((dir, remote_dir)) = pending.pop() {
        mkdir_all(fs, &remote_dir).await?;

        let mut entries = tokio::fs::read_dir(&dir)
            .await
            .map_err(|e| TransferError::local(&dir, e))?;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| TransferError::local(&dir, e))?
        {
            let path = entry.path();
            let target = join_remote(&remote_dir, &entry.file_name().to_string_lossy());
            let file_type = entry
                .file_type()
                .await
                .map_err(|e| TransferError::local(&path, e))?;

            if file_type.is_dir() {
                pending.push((path, target));
            } else {
                let meta = tokio::fs::metadata(&path)
                    .await
                    .map_err(|e| TransferError::local(&path, e))?;
                upload_file(fs, &path, &target, local_mode(&meta)).await?;
            }
        }
    }
    Ok(())
}

/// Download `remote` to `local`.
pub async fn download<R: RemoteFs>(
    fs: &R,
    remote: &str,
    local: &Path,
    recursive: bool,
) -> Result<(), TransferError> {
    let meta = fs.metadata(remote).await?;

    if !meta.is_dir {
        return download_file(fs, remote, local, meta).await;
    }
    if !recursive {
        return Err(TransferError::IsDirectory {
            path: remote.to_string(),
        });
    }

    let mut pending = vec![(remote.to_string(), local.to_path_buf())];
    while let Some((remote_dir, dir)) = pending.pop() {
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| TransferError::local(&dir, e))?;

        for entry in fs.read_dir(&remote_dir).await? {
            let source = join_remote(&remote_dir, &entry.name);
            let path = dir.join(&entry.name);
            if entry.metadata.is_dir {
                pending.push((source, path));
            } else {
                download_file(fs, &source, &path, entry.metadata).await?;
            }
        }
    }
    Ok(())
}

async fn upload_file<R: RemoteFs>(
    fs: &R,
    local: &Path,
    remote: &str,
    mode: Option<u32>,
) -> Result<(), TransferError> {
    let mut source = tokio::fs::File::open(local)
        .await
        .map_err(|e| TransferError::local(local, e))?;
    let mut dest = fs.create(remote).await?;

    let bytes = copy_and_close(&mut source, &mut dest)
        .await
        .map_err(|e| TransferError::sftp(remote, e))?;
    trace!("uploaded {} bytes to {}", bytes, remote);

    if let Some(mode) = mode {
        if let Err(e) = fs.set_permissions(remote, mode).await {
            debug!("chmod {:o} {}: {}", mode, remote, e);
        }
    }
    Ok(())
}

async fn download_file<R: RemoteFs>(
    fs: &R,
    remote: &str,
    local: &Path,
    meta: RemoteMetadata,
) -> Result<(), TransferError> {
    let mut source = fs.open(remote).await?;
    let mut dest = tokio::fs::File::create(local)
        .await
        .map_err(|e| TransferError::local(local, e))?;

    let bytes = copy_and_close(&mut source, &mut dest)
        .await
        .map_err(|e| TransferError::local(local, e))?;
    trace!("downloaded {} bytes to {}", bytes, local.display());

    if let Some(mode) = meta.permissions {
        if let Err(e) = set_local_mode(local, mode).await {
            debug!("chmod {:o} {}: {}", mode, local.display(), e);
        }
    }
    Ok(())
}

async fn copy_and_close<S, D>(source: &mut S, dest: &mut D) -> std::io::Result<u64>
where
    S: tokio::io::AsyncRead + Unpin,
    D: AsyncWrite + Unpin,
{
    let bytes = tokio::io::copy(source, dest).await?;
    dest.flush().await?;
    dest.shutdown().await?;
    Ok(bytes)
}

/// Create `path` and any missing parents.
async fn mkdir_all<R: RemoteFs>(fs: &R, path: &str) -> Result<(), TransferError> {
    let mut current = String::new();
    if path.starts_with('/') {
        current.push('/');
    }

    for part in path.split('/').filter(|p| !p.is_empty() && *p != ".") {
        if !current.is_empty() && !current.ends_with('/') {
            current.push('/');
        }
        current.push_str(part);

        match fs.metadata(&current).await {
            Ok(meta) if meta.is_dir => {}
            Ok(_) => {
                return Err(TransferError::Sftp {
                    path: current,
                    message: "not a directory".to_string(),
                });
            }
            Err(_) => fs.create_dir(&current).await?,
        }
    }
    Ok(())
}

/// Join remote path segments with `/` whatever the local separator is.
pub(crate) fn join_remote(base: &str, name: &str) -> String {
    if base.is_empty() {
        name.to_string()
    } else if base.ends_with('/') {
        format!("{base}{name}")
    } else {
        format!("{base}/{name}")
    }
}

#[cfg(unix)]
fn local_mode(meta: &std::fs::Metadata) -> Option<u32> {
    use std::os::unix::fs::PermissionsExt;
    Some(meta.permissions().mode() & 0o7777)
}

#[cfg(not(unix))]
fn local_mode(_meta: &std::fs::Metadata) -> Option<u32> {
    None
}

#[cfg(unix)]
async fn set_local_mode(path: &Path, mode: u32) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(mode & 0o7777)).await
}

#[cfg(not(unix))]
async fn set_local_mode(path: &Path, mode: u32) -> std::io::Result<()> {
    // Only the read-only bit has a meaning here.
    let mut perms = tokio::fs::metadata(path).await?.permissions();
    perms.set_readonly(mode & 0o222 == 0);
    tokio::fs::set_permissions(path, perms).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_remote_uses_forward_slashes() {
        assert_eq!(join_remote("/root/app", "src"), "/root/app/src");
        assert_eq!(join_remote("/", "etc"), "/etc");
        assert_eq!(join_remote("app/", "main.rs"), "app/main.rs");
        assert_eq!(join_remote("", "file"), "file");
    }
}
