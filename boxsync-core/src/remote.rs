use async_trait::async_trait;
use std::path::Path;

use crate::error::RemoteError;
use crate::snapshot::EntryKind;

/// One entry returned by a remote directory listing.
#[derive(Debug, Clone)]
pub struct RemoteEntry {
    pub name: String,
    pub kind: EntryKind,
    /// Modification time, seconds since the unix epoch. Zero when the
    /// backend does not report one.
    pub modified: u64,
    pub size: u64,
}

/// Capability surface of a remote store.
///
/// Every call is fallible on its own; the engine retries `Transport`
/// failures a bounded number of times before dropping the action. A single
/// session is shared across concurrent transfers, so implementations must
/// be safe for independent concurrent calls.
#[async_trait]
pub trait RemoteStore: Send + Sync + 'static {
    async fn list(&self, path: &str) -> Result<Vec<RemoteEntry>, RemoteError>;

    /// Upload `local` to `remote`. Must never leave a partial file visible
    /// at `remote`: write to a temporary name and rename into place.
    async fn upload(&self, local: &Path, remote: &str) -> Result<(), RemoteError>;

    /// Download `remote` into `local`, same partial-file contract as
    /// `upload` on the local side.
    async fn download(&self, remote: &str, local: &Path) -> Result<(), RemoteError>;

    /// Remove a file, or a directory together with its contents.
    async fn delete(&self, remote: &str) -> Result<(), RemoteError>;

    /// Create a directory, parents included. Succeeds if it already exists.
    async fn mkdir(&self, remote: &str) -> Result<(), RemoteError>;

    async fn ping(&self) -> Result<(), RemoteError>;
}

// Arc delegation lets callers keep a handle to the store they hand over
// to the engine.
#[async_trait]
impl<T: RemoteStore + ?Sized> RemoteStore for std::sync::Arc<T> {
    async fn list(&self, path: &str) -> Result<Vec<RemoteEntry>, RemoteError> {
        (**self).list(path).await
    }
    async fn upload(&self, local: &Path, remote: &str) -> Result<(), RemoteError> {
        (**self).upload(local, remote).await
    }
    async fn download(&self, remote: &str, local: &Path) -> Result<(), RemoteError> {
        (**self).download(remote, local).await
    }
    async fn delete(&self, remote: &str) -> Result<(), RemoteError> {
        (**self).delete(remote).await
    }
    async fn mkdir(&self, remote: &str) -> Result<(), RemoteError> {
        (**self).mkdir(remote).await
    }
    async fn ping(&self) -> Result<(), RemoteError> {
        (**self).ping().await
    }
}
