//! Core library for BoxSync – bidirectional directory/remote synchronisation engine.

mod action;
mod config;
mod engine;
mod error;
mod event;
mod filter;
mod reconcile;
mod remote;
mod snapshot;
mod util;

pub use action::SyncAction;
pub use config::{
    ConflictPolicy, Pattern, RemoteCfg, RemoteOnlyPolicy, SymlinkPolicy, SyncConfig,
};
pub use engine::{spawn_engine, EngineCommand, EngineHandle, EngineState};
pub use error::{RemoteError, SyncError};
pub use event::{collapse_events, events_from_notify, translate, FsEvent};
pub use filter::PathFilter;
pub use reconcile::reconcile;
pub use remote::{RemoteEntry, RemoteStore};
pub use snapshot::{build_local_snapshot, build_remote_snapshot, EntryKind, PathEntry, Snapshot};
pub use util::{join_remote, rel_path};
