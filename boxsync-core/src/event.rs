use notify::{
    event::{CreateKind, ModifyKind, RemoveKind},
    EventKind,
};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::action::SyncAction;
use crate::util::rel_path;

/// Local filesystem event, one per affected path.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FsEvent {
    Create(PathBuf),
    Modify(PathBuf),
    MkDir(PathBuf),
    Remove(PathBuf),
    Rename(PathBuf, PathBuf),
}

impl FsEvent {
    pub fn path(&self) -> &Path {
        match self {
            FsEvent::Create(p) | FsEvent::Modify(p) | FsEvent::MkDir(p) | FsEvent::Remove(p) => p,
            FsEvent::Rename(_from, to) => to,
        }
    }
}

/// Flatten a notify::Event into zero or more FsEvent.
pub fn events_from_notify(event: notify::Event) -> Vec<FsEvent> {
    let mut out = Vec::new();
    match event.kind {
        EventKind::Create(CreateKind::Folder) => {
            for p in event.paths {
                out.push(FsEvent::MkDir(p));
            }
        }
        EventKind::Create(_) => {
            for p in event.paths {
                out.push(FsEvent::Create(p));
            }
        }
        EventKind::Modify(ModifyKind::Name(_)) => {
            // a full rename carries (from, to); partial notifications are dropped
            if event.paths.len() == 2 {
                let mut paths = event.paths;
                let to = paths.pop().unwrap();
                let from = paths.pop().unwrap();
                out.push(FsEvent::Rename(from, to));
            }
        }
        // Any covers backends that cannot classify the modification
        EventKind::Modify(ModifyKind::Data(_))
        | EventKind::Modify(ModifyKind::Metadata(_))
        | EventKind::Modify(ModifyKind::Any) => {
            for p in event.paths {
                out.push(FsEvent::Modify(p));
            }
        }
        EventKind::Remove(RemoveKind::File) | EventKind::Remove(RemoveKind::Folder) => {
            for p in event.paths {
                out.push(FsEvent::Remove(p));
            }
        }
        _ => {}
    }
    out
}

/// Collapse a debounced batch so that only the latest Modify per path
/// survives. Any Create/MkDir/Remove/Rename touching a path breaks its
/// modify chain; order of surviving events is preserved.
pub fn collapse_events(events: Vec<FsEvent>) -> Vec<FsEvent> {
    let mut out: Vec<FsEvent> = Vec::with_capacity(events.len());
    let mut last_modify_idx: HashMap<PathBuf, usize> = HashMap::new();

    for ev in events {
        match &ev {
            FsEvent::Modify(p) => {
                if let Some(&idx) = last_modify_idx.get(p) {
                    out[idx] = FsEvent::Modify(p.clone());
                } else {
                    last_modify_idx.insert(p.clone(), out.len());
                    out.push(ev);
                }
            }
            FsEvent::Remove(p) | FsEvent::Create(p) | FsEvent::MkDir(p) => {
                last_modify_idx.remove(p);
                out.push(ev);
            }
            FsEvent::Rename(from, to) => {
                last_modify_idx.remove(from);
                last_modify_idx.remove(to);
                out.push(ev);
            }
        }
    }
    out
}

/// Map one watcher event to its reconciling actions.
///
/// Watcher events only fire for local activity, so the local side is taken
/// as authoritative and pushed without consulting remote mtimes; the full
/// reconciliation pass is the only place remote changes are pulled in.
///
/// `target_is_dir` is the caller's stat of the event's target path (the
/// destination for renames). A rename becomes delete-then-create, in that
/// order, so the old remote copy never coexists with the new one after a
/// successful pair.
pub fn translate(event: &FsEvent, root: &Path, target_is_dir: bool) -> Vec<SyncAction> {
    let mut out = Vec::new();
    match event {
        FsEvent::Create(p) | FsEvent::Modify(p) => {
            if let Some(rel) = rel_path(root, p) {
                if target_is_dir {
                    // late stat: the path became a directory after the event fired
                    if matches!(event, FsEvent::Create(_)) {
                        out.push(SyncAction::MkDirRemote { rel });
                    }
                } else {
                    out.push(SyncAction::Upload { rel });
                }
            }
        }
        FsEvent::MkDir(p) => {
            if let Some(rel) = rel_path(root, p) {
                out.push(SyncAction::MkDirRemote { rel });
            }
        }
        FsEvent::Remove(p) => {
            if let Some(rel) = rel_path(root, p) {
                out.push(SyncAction::DeleteRemote { rel });
            }
        }
        FsEvent::Rename(from, to) => {
            if let Some(rel) = rel_path(root, from) {
                out.push(SyncAction::DeleteRemote { rel });
            }
            if let Some(rel) = rel_path(root, to) {
                if target_is_dir {
                    out.push(SyncAction::MkDirRemote { rel });
                } else {
                    out.push(SyncAction::Upload { rel });
                }
            }
        }
    }
    out
}
