//! SFTP backend for boxsync. Implements the core `RemoteStore` trait over a
//! single shared `SftpSession`; Storage-Box style hosts expose exactly this.

mod ssh_client;
mod utils;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use boxsync_core::{EntryKind, RemoteEntry, RemoteError, RemoteStore};
use russh::client::AuthResult;
use russh_sftp::client::error::Error as SftpError;
use russh_sftp::client::SftpSession;
use russh_sftp::protocol::{FileAttributes, StatusCode};
use ssh_client::Client;
use std::path::Path;
use std::sync::Arc;
use std::time::UNIX_EPOCH;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use crate::utils::{create_dir_all, remove_dir_all};

pub struct SftpStore {
    sftp: SftpSession,
}

impl SftpStore {
    pub async fn connect(
        host_with_port: &str,
        user: &str,
        password: Option<&str>,
        allowed_fingerprints: Option<Vec<String>>,
    ) -> Result<Self> {
        let (host, port) = match host_with_port.rsplit_once(':') {
            Some((h, p)) => {
                let port: u16 = p
                    .parse()
                    .map_err(|_| anyhow!("invalid port in host: {host_with_port}"))?;
                (h.to_string(), port)
            }
            None => (host_with_port.to_string(), 22u16),
        };

        let config = russh::client::Config::default();
        let mut session = russh::client::connect(
            Arc::new(config),
            (host.as_str(), port),
            Client {
                allowed_fingerprints,
            },
        )
        .await?;
        let res = session
            .authenticate_password(user, password.unwrap_or(""))
            .await?;
        if let AuthResult::Failure { remaining_methods } = res {
            return Err(anyhow!(
                "authentication failed, remaining_methods: {:?}",
                remaining_methods
            ));
        }
        let channel = session.channel_open_session().await?;
        channel.request_subsystem(true, "sftp").await?;
        let sftp = SftpSession::new(channel.into_stream()).await?;
        info!("sftp session established, cwd: {:?}", sftp.canonicalize(".").await?);
        Ok(Self { sftp })
    }
}

/// Translate an sftp-level error, keeping NoSuchFile distinguishable so the
/// engine can treat "already gone" deletions as done.
fn map_sftp(path: &str, err: SftpError) -> RemoteError {
    if let SftpError::Status(status) = &err {
        if status.status_code == StatusCode::NoSuchFile {
            return RemoteError::NotFound(path.to_string());
        }
    }
    RemoteError::transport(err)
}

fn local_mtime_secs(meta: &std::fs::Metadata) -> u64 {
    meta.modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[async_trait]
impl RemoteStore for SftpStore {
    async fn list(&self, path: &str) -> Result<Vec<RemoteEntry>, RemoteError> {
        let dir = self
            .sftp
            .read_dir(path)
            .await
            .map_err(|e| map_sftp(path, e))?;
        let mut out = Vec::new();
        for entry in dir {
            let name = entry.file_name();
            if name == "." || name == ".." {
                continue;
            }
            let meta = entry.metadata();
            out.push(RemoteEntry {
                name,
                kind: if meta.is_dir() {
                    EntryKind::Directory
                } else {
                    EntryKind::File
                },
                modified: meta.mtime.map(u64::from).unwrap_or(0),
                size: meta.size.unwrap_or(0),
            });
        }
        Ok(out)
    }

    async fn upload(&self, local: &Path, remote: &str) -> Result<(), RemoteError> {
        let meta = tokio::fs::metadata(local)
            .await
            .map_err(RemoteError::transport)?;
        let mtime = local_mtime_secs(&meta);

        // watcher events can outrun the mkdir for a brand new subtree
        if let Some((parent, _)) = remote.rsplit_once('/') {
            if !parent.is_empty() {
                create_dir_all(&self.sftp, parent)
                    .await
                    .map_err(|e| map_sftp(parent, e))?;
            }
        }

        // write under a temporary name and rename into place, so a dropped
        // connection never leaves a partial file at the destination
        let part = format!("{remote}.part");
        let mut reader = tokio::fs::File::open(local)
            .await
            .map_err(RemoteError::transport)?;
        let mut writer = self
            .sftp
            .create(part.as_str())
            .await
            .map_err(|e| map_sftp(&part, e))?;
        tokio::io::copy(&mut reader, &mut writer)
            .await
            .map_err(RemoteError::transport)?;
        writer.shutdown().await.map_err(RemoteError::transport)?;
        drop(writer);

        let _ = self.sftp.remove_file(remote).await;
        self.sftp
            .rename(part.as_str(), remote)
            .await
            .map_err(|e| map_sftp(remote, e))?;

        // stamp the local mtime so the next full pass sees equal times
        let attrs = FileAttributes {
            mtime: Some(mtime as u32),
            atime: Some(mtime as u32),
            ..Default::default()
        };
        if let Err(e) = self.sftp.set_metadata(remote, attrs).await {
            debug!(path = remote, "could not set remote mtime: {e}");
        }
        Ok(())
    }

    async fn download(&self, remote: &str, local: &Path) -> Result<(), RemoteError> {
        let attrs = self
            .sftp
            .metadata(remote)
            .await
            .map_err(|e| map_sftp(remote, e))?;
        let mut reader = self
            .sftp
            .open(remote)
            .await
            .map_err(|e| map_sftp(remote, e))?;

        if let Some(parent) = local.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(RemoteError::transport)?;
        }
        let name = local
            .file_name()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default();
        let part = local.with_file_name(format!("{name}.part"));
        let mut writer = tokio::fs::File::create(&part)
            .await
            .map_err(RemoteError::transport)?;
        tokio::io::copy(&mut reader, &mut writer)
            .await
            .map_err(RemoteError::transport)?;
        writer.shutdown().await.map_err(RemoteError::transport)?;
        drop(writer);
        tokio::fs::rename(&part, local)
            .await
            .map_err(RemoteError::transport)?;

        // carry the remote mtime over, otherwise every restart re-uploads
        if let Some(mtime) = attrs.mtime {
            let ft = filetime::FileTime::from_unix_time(i64::from(mtime), 0);
            if let Err(e) = filetime::set_file_mtime(local, ft) {
                debug!(path = %local.display(), "could not set local mtime: {e}");
            }
        }
        Ok(())
    }

    async fn delete(&self, remote: &str) -> Result<(), RemoteError> {
        let meta = self
            .sftp
            .metadata(remote)
            .await
            .map_err(|e| map_sftp(remote, e))?;
        if meta.is_dir() {
            remove_dir_all(&self.sftp, remote)
                .await
                .map_err(|e| map_sftp(remote, e))
        } else {
            self.sftp
                .remove_file(remote)
                .await
                .map_err(|e| map_sftp(remote, e))
        }
    }

    async fn mkdir(&self, remote: &str) -> Result<(), RemoteError> {
        create_dir_all(&self.sftp, remote)
            .await
            .map_err(|e| map_sftp(remote, e))
    }

    async fn ping(&self) -> Result<(), RemoteError> {
        self.sftp
            .metadata(".")
            .await
            .map(|_| ())
            .map_err(|e| map_sftp(".", e))
    }
}
