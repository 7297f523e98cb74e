use thiserror::Error;

use crate::snapshot::EntryKind;

/// Failure of a single remote store call.
#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("remote path not found: {0}")]
    NotFound(String),

    #[error("transport failure: {0}")]
    Transport(#[source] anyhow::Error),
}

impl RemoteError {
    pub fn transport<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        RemoteError::Transport(anyhow::Error::new(err))
    }
}

/// Errors surfaced by the sync engine itself.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The snapshot walk could not even start. Fatal to the pass; failures on
    /// individual subtree entries are logged and skipped instead.
    #[error("snapshot walk failed at {root}: {source}")]
    Traversal {
        root: String,
        #[source]
        source: anyhow::Error,
    },

    /// Same path, different kinds on the two sides. Resolved via the
    /// configured policy, never silently.
    #[error("kind conflict at {path}: local is {local_kind:?}, remote is {remote_kind:?}")]
    Conflict {
        path: String,
        local_kind: EntryKind,
        remote_kind: EntryKind,
    },

    #[error(transparent)]
    Remote(#[from] RemoteError),
}
