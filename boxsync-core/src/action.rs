/// Single reconciling step, produced by the reconciler or the event
/// translator and consumed exactly once by the executor.
///
/// All variants carry a POSIX-style path relative to the sync roots.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncAction {
    Upload { rel: String },
    Download { rel: String },
    DeleteRemote { rel: String },
    DeleteLocal { rel: String },
    MkDirRemote { rel: String },
    MkDirLocal { rel: String },
    NoOp { rel: String },
}

impl SyncAction {
    pub fn rel(&self) -> &str {
        match self {
            SyncAction::Upload { rel }
            | SyncAction::Download { rel }
            | SyncAction::DeleteRemote { rel }
            | SyncAction::DeleteLocal { rel }
            | SyncAction::MkDirRemote { rel }
            | SyncAction::MkDirLocal { rel }
            | SyncAction::NoOp { rel } => rel,
        }
    }

    /// Uploads and downloads may run concurrently with each other;
    /// everything else must keep its place in the action sequence.
    pub fn is_transfer(&self) -> bool {
        matches!(self, SyncAction::Upload { .. } | SyncAction::Download { .. })
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            SyncAction::Upload { .. } => "upload",
            SyncAction::Download { .. } => "download",
            SyncAction::DeleteRemote { .. } => "delete-remote",
            SyncAction::DeleteLocal { .. } => "delete-local",
            SyncAction::MkDirRemote { .. } => "mkdir-remote",
            SyncAction::MkDirLocal { .. } => "mkdir-local",
            SyncAction::NoOp { .. } => "noop",
        }
    }
}
