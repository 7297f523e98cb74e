use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Glob pattern (wrapper type for clarity)
/// Stored as a plain String; compiled to `globset` matchers at runtime.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pattern(pub String);

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum RemoteCfg {
    /// SFTP remote endpoint (Storage-Box style backends)
    Sftp {
        host: String,
        user: String,
        password: Option<String>,
        #[serde(default)]
        fingerprints: Option<Vec<String>>, // allowed host key fingerprints or base64 keys
    },
    // Future variants: WebDav { ... }
}

/// Symbolic links encountered while walking the local tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SymlinkPolicy {
    /// Resolve links and sync their targets.
    Follow,
    /// Leave links out of the snapshot entirely.
    #[default]
    Skip,
}

/// Resolution for a path that is a file on one side and a directory on the other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum ConflictPolicy {
    #[default]
    PreferLocal,
    PreferRemote,
}

/// What to do with a path that exists remotely but not locally.
///
/// `Delete` treats the remote as a mirror: absence locally means the file was
/// intentionally removed, so the remote copy is deleted. This is destructive.
/// `Download` pulls the remote-only file down instead, for users who expect a
/// pure two-way merge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RemoteOnlyPolicy {
    #[default]
    Delete,
    Download,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    pub local_root: PathBuf,
    pub remote_root: String,
    #[serde(default)]
    pub include: Vec<Pattern>,
    #[serde(default)]
    pub exclude: Vec<Pattern>,
    /// Upper bound on transfers in flight at once.
    #[serde(default = "SyncConfig::default_concurrency")]
    pub concurrency: usize,
    /// Coalescing window for watcher events (ms).
    #[serde(default = "SyncConfig::default_debounce_ms")]
    pub debounce_ms: u64,
    #[serde(default)]
    pub symlinks: SymlinkPolicy,
    #[serde(default)]
    pub conflicts: ConflictPolicy,
    #[serde(default)]
    pub remote_only: RemoteOnlyPolicy,
    /// Max retry attempts for remote operations
    #[serde(default = "SyncConfig::default_retry_max")]
    pub retry_max: u32,
    /// Initial backoff in ms for retries (exponential)
    #[serde(default = "SyncConfig::default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
    pub remote: RemoteCfg,
}

impl SyncConfig {
    fn default_concurrency() -> usize {
        4
    }
    fn default_debounce_ms() -> u64 {
        300
    }
    fn default_retry_max() -> u32 {
        3
    }
    fn default_retry_backoff_ms() -> u64 {
        500
    }
}
