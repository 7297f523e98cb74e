use std::collections::BTreeSet;

use tracing::warn;

use crate::action::SyncAction;
use crate::config::{ConflictPolicy, RemoteOnlyPolicy};
use crate::error::SyncError;
use crate::snapshot::{EntryKind, Snapshot};

/// Compute the ordered action list that converges the two trees.
///
/// Newest-wins on files present on both sides; equal mtimes are a `NoOp`.
/// A path present only remotely is handled per `remote_only` — the default
/// treats the remote as a mirror of local and deletes it, which is
/// destructive on purpose and documented as such in the config type.
///
/// Ordering guarantees relied on by the executor:
/// - directory creations come before any action on paths inside them,
///   parent before child;
/// - deletions come last, child before parent, so "directory not empty"
///   backends are satisfied;
/// - a conflict resolution (delete losing side, then create the winning
///   side and its subtree) stays adjacent and in that order; descendants
///   of a conflicted path are owned entirely by the conflict resolution
///   and never reach the generic one-side-only rules.
pub fn reconcile(
    local: &Snapshot,
    remote: &Snapshot,
    conflicts: ConflictPolicy,
    remote_only: RemoteOnlyPolicy,
) -> Vec<SyncAction> {
    let mut mkdirs: Vec<SyncAction> = Vec::new();
    let mut middle: Vec<SyncAction> = Vec::new();
    let mut deletes: Vec<SyncAction> = Vec::new();

    // Ascending key order puts every parent before its children, because a
    // parent path is a strict prefix of its childrens' paths. Reversing the
    // delete bucket at the end therefore yields child-before-parent.
    let keys: BTreeSet<&String> = local.keys().chain(remote.keys()).collect();

    // Set while walking past the descendants of a conflicted path; they only
    // exist on the directory side of the conflict and are resolved with it.
    let mut skip_prefix: Option<String> = None;

    for &rel in &keys {
        if skip_prefix
            .as_deref()
            .is_some_and(|p| rel.starts_with(p))
        {
            continue;
        }
        match (local.get(rel), remote.get(rel)) {
            (Some(l), None) => match l.kind {
                EntryKind::Directory => mkdirs.push(SyncAction::MkDirRemote { rel: rel.clone() }),
                EntryKind::File => middle.push(SyncAction::Upload { rel: rel.clone() }),
            },
            (None, Some(r)) => match remote_only {
                RemoteOnlyPolicy::Delete => {
                    deletes.push(SyncAction::DeleteRemote { rel: rel.clone() })
                }
                RemoteOnlyPolicy::Download => match r.kind {
                    EntryKind::Directory => {
                        mkdirs.push(SyncAction::MkDirLocal { rel: rel.clone() })
                    }
                    EntryKind::File => middle.push(SyncAction::Download { rel: rel.clone() }),
                },
            },
            (Some(l), Some(r)) => {
                if l.kind != r.kind {
                    let conflict = SyncError::Conflict {
                        path: rel.clone(),
                        local_kind: l.kind,
                        remote_kind: r.kind,
                    };
                    warn!(policy = ?conflicts, "{conflict}");
                    resolve_conflict(local, remote, rel, l.kind, conflicts, &mut middle);
                    skip_prefix = Some(format!("{rel}/"));
                } else if l.kind == EntryKind::Directory {
                    middle.push(SyncAction::NoOp { rel: rel.clone() });
                } else if l.modified > r.modified {
                    middle.push(SyncAction::Upload { rel: rel.clone() });
                } else if r.modified > l.modified {
                    middle.push(SyncAction::Download { rel: rel.clone() });
                } else {
                    middle.push(SyncAction::NoOp { rel: rel.clone() });
                }
            }
            (None, None) => unreachable!("key came from one of the snapshots"),
        }
    }

    deletes.reverse();
    let mut actions = mkdirs;
    actions.append(&mut middle);
    actions.append(&mut deletes);
    actions
}

/// Replace the losing side with the winning side's kind, then recreate the
/// winner's subtree. The delete must precede the creates, so the whole run
/// goes into the ordered middle bucket rather than the mkdir/delete
/// buckets; only the directory side of a conflict can have descendants,
/// and a losing directory's children simply vanish with their parent.
fn resolve_conflict(
    local: &Snapshot,
    remote: &Snapshot,
    rel: &str,
    local_kind: EntryKind,
    policy: ConflictPolicy,
    out: &mut Vec<SyncAction>,
) {
    match policy {
        ConflictPolicy::PreferLocal => {
            out.push(SyncAction::DeleteRemote {
                rel: rel.to_string(),
            });
            match local_kind {
                EntryKind::File => out.push(SyncAction::Upload {
                    rel: rel.to_string(),
                }),
                EntryKind::Directory => {
                    out.push(SyncAction::MkDirRemote {
                        rel: rel.to_string(),
                    });
                    for entry in subtree(local, rel) {
                        out.push(match entry.kind {
                            EntryKind::Directory => SyncAction::MkDirRemote {
                                rel: entry.rel.clone(),
                            },
                            EntryKind::File => SyncAction::Upload {
                                rel: entry.rel.clone(),
                            },
                        });
                    }
                }
            }
        }
        // Remote wins: mirror image against the local tree.
        ConflictPolicy::PreferRemote => {
            out.push(SyncAction::DeleteLocal {
                rel: rel.to_string(),
            });
            match local_kind {
                // remote side is a directory
                EntryKind::File => {
                    out.push(SyncAction::MkDirLocal {
                        rel: rel.to_string(),
                    });
                    for entry in subtree(remote, rel) {
                        out.push(match entry.kind {
                            EntryKind::Directory => SyncAction::MkDirLocal {
                                rel: entry.rel.clone(),
                            },
                            EntryKind::File => SyncAction::Download {
                                rel: entry.rel.clone(),
                            },
                        });
                    }
                }
                // remote side is a file
                EntryKind::Directory => out.push(SyncAction::Download {
                    rel: rel.to_string(),
                }),
            }
        }
    }
}

/// Entries strictly below `rel`, in ascending (parent-first) order.
fn subtree<'a>(
    snap: &'a Snapshot,
    rel: &str,
) -> impl Iterator<Item = &'a crate::snapshot::PathEntry> {
    let prefix = format!("{rel}/");
    snap.range(prefix.clone()..)
        .take_while(move |(k, _)| k.starts_with(&prefix))
        .map(|(_, e)| e)
}
