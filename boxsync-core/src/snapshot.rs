use std::collections::BTreeMap;
use std::path::Path;
use std::time::UNIX_EPOCH;

use anyhow::anyhow;
use tracing::warn;
use walkdir::WalkDir;

use crate::config::SymlinkPolicy;
use crate::error::SyncError;
use crate::filter::PathFilter;
use crate::remote::RemoteStore;
use crate::util::{join_remote, rel_path};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Directory,
}

/// One file or directory observed during a tree walk.
#[derive(Debug, Clone)]
pub struct PathEntry {
    /// POSIX-style path relative to the walked root; identity key.
    pub rel: String,
    pub kind: EntryKind,
    /// Seconds since the unix epoch; zero when unknown.
    pub modified: u64,
    /// Zero for directories.
    pub size: u64,
}

/// Point-in-time view of one tree. Rebuilt per reconciliation pass,
/// discarded afterwards; nothing is persisted across restarts.
pub type Snapshot = BTreeMap<String, PathEntry>;

/// Walk the local tree under `root`.
///
/// An unreadable root fails the whole walk; an unreadable entry deeper in
/// is logged and left out, so one broken subtree does not take sync down.
pub fn build_local_snapshot(
    root: &Path,
    symlinks: SymlinkPolicy,
    filter: &PathFilter,
) -> Result<Snapshot, SyncError> {
    std::fs::metadata(root).map_err(|e| SyncError::Traversal {
        root: root.display().to_string(),
        source: e.into(),
    })?;

    let mut snap = Snapshot::new();
    let walker = WalkDir::new(root).follow_links(symlinks == SymlinkPolicy::Follow);
    for entry in walker {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                warn!("skipping unreadable entry: {e}");
                continue;
            }
        };
        let Some(rel) = rel_path(root, entry.path()) else {
            continue; // the root itself
        };
        if !filter.allows(&rel) {
            continue;
        }
        let kind = if entry.file_type().is_dir() {
            EntryKind::Directory
        } else if entry.file_type().is_file() {
            EntryKind::File
        } else {
            // symlink with SymlinkPolicy::Skip, fifo, socket, ...
            continue;
        };
        let meta = match entry.metadata() {
            Ok(m) => m,
            Err(e) => {
                warn!(path = %rel, "skipping entry without metadata: {e}");
                continue;
            }
        };
        let modified = meta
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_secs())
            .unwrap_or(0);
        let size = if kind == EntryKind::File { meta.len() } else { 0 };
        snap.insert(
            rel.clone(),
            PathEntry {
                rel,
                kind,
                modified,
                size,
            },
        );
    }
    Ok(snap)
}

/// Walk the remote tree by listing directories breadth-first.
///
/// A failed listing of the root aborts the pass; a failed listing of a
/// subdirectory is logged and that subtree is omitted.
pub async fn build_remote_snapshot(
    store: &dyn RemoteStore,
    remote_root: &str,
    filter: &PathFilter,
) -> Result<Snapshot, SyncError> {
    let mut snap = Snapshot::new();
    let mut pending: Vec<String> = vec![String::new()];

    while let Some(rel_dir) = pending.pop() {
        let abs = join_remote(remote_root, &rel_dir);
        let entries = match store.list(&abs).await {
            Ok(entries) => entries,
            Err(e) if rel_dir.is_empty() => {
                return Err(SyncError::Traversal {
                    root: remote_root.to_string(),
                    source: anyhow!(e),
                })
            }
            Err(e) => {
                warn!(path = %abs, "skipping unlistable remote directory: {e}");
                continue;
            }
        };
        for entry in entries {
            if entry.name == "." || entry.name == ".." {
                continue;
            }
            let rel = if rel_dir.is_empty() {
                entry.name.clone()
            } else {
                format!("{rel_dir}/{}", entry.name)
            };
            if !filter.allows(&rel) {
                continue;
            }
            if entry.kind == EntryKind::Directory {
                pending.push(rel.clone());
            }
            snap.insert(
                rel.clone(),
                PathEntry {
                    rel,
                    kind: entry.kind,
                    modified: entry.modified,
                    size: entry.size,
                },
            );
        }
    }
    Ok(snap)
}
