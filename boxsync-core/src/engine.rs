use anyhow::Result;
use futures::stream::{self, StreamExt};
use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use std::path::Path;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::{sleep, Sleep};
use tracing::{debug, error, info, warn};

use crate::action::SyncAction;
use crate::config::SyncConfig;
use crate::error::{RemoteError, SyncError};
use crate::event::{collapse_events, events_from_notify, translate, FsEvent};
use crate::filter::PathFilter;
use crate::reconcile::reconcile;
use crate::remote::RemoteStore;
use crate::snapshot::{build_local_snapshot, build_remote_snapshot};
use crate::util::{join_remote, rel_path};

/// Public handle returned to callers for controlling a running engine.
/// Clones share the same engine.
#[derive(Debug, Clone)]
pub struct EngineHandle {
    cfg: SyncConfig,
    ctrl_tx: mpsc::Sender<EngineCommand>,
    state_rx: watch::Receiver<EngineState>,
}

impl EngineHandle {
    pub fn config(&self) -> &SyncConfig {
        &self.cfg
    }

    /// Request a graceful shutdown; in-flight actions finish first.
    pub fn stop(&self) {
        let _ = self.ctrl_tx.try_send(EngineCommand::Stop);
    }

    pub fn state(&self) -> EngineState {
        self.state_rx.borrow().clone()
    }

    /// Wait until the engine reaches a terminal state.
    pub async fn wait_stopped(&mut self) -> EngineState {
        loop {
            let current = self.state_rx.borrow().clone();
            if matches!(current, EngineState::Stopped | EngineState::Failed(_)) {
                return current;
            }
            if self.state_rx.changed().await.is_err() {
                return self.state_rx.borrow().clone();
            }
        }
    }
}

#[derive(Debug, Clone)]
pub enum EngineCommand {
    Stop,
}

/// Engine lifecycle. `Failed` is terminal and only reachable from startup
/// errors; per-action failures never leave `Watching`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineState {
    Idle,
    InitialSync,
    Watching,
    ShuttingDown,
    Stopped,
    Failed(String),
}

pub fn spawn_engine<R: RemoteStore>(cfg: SyncConfig, remote: R) -> EngineHandle {
    let (ctrl_tx, ctrl_rx) = mpsc::channel(4);
    let (state_tx, state_rx) = watch::channel(EngineState::Idle);
    let engine = SyncEngine::new(cfg.clone());
    tokio::spawn(engine.run(Arc::new(remote), ctrl_rx, state_tx));
    EngineHandle {
        cfg,
        ctrl_tx,
        state_rx,
    }
}

struct SyncEngine {
    cfg: SyncConfig,
    filter: Arc<PathFilter>,
}

impl SyncEngine {
    fn new(cfg: SyncConfig) -> Self {
        let filter = Arc::new(PathFilter::new(&cfg.include, &cfg.exclude));
        Self { cfg, filter }
    }

    async fn run<R: RemoteStore>(
        mut self,
        remote: Arc<R>,
        mut ctrl_rx: mpsc::Receiver<EngineCommand>,
        state_tx: watch::Sender<EngineState>,
    ) {
        let _ = state_tx.send(EngineState::InitialSync);

        if let Err(e) = tokio::fs::create_dir_all(&self.cfg.local_root).await {
            let _ = state_tx.send(EngineState::Failed(format!(
                "local root {} not creatable: {e}",
                self.cfg.local_root.display()
            )));
            return;
        }
        // watcher events carry absolute paths, so the root must be absolute
        // too or relative-path roots would never match them
        match tokio::fs::canonicalize(&self.cfg.local_root).await {
            Ok(p) => self.cfg.local_root = p,
            Err(e) => {
                let _ = state_tx.send(EngineState::Failed(format!(
                    "local root {} not resolvable: {e}",
                    self.cfg.local_root.display()
                )));
                return;
            }
        }
        // A dead session fails every action anyway; surface it up front
        // instead of limping through the pass.
        if let Err(e) = remote.ping().await {
            let _ = state_tx.send(EngineState::Failed(format!(
                "remote store unreachable: {e}"
            )));
            return;
        }
        // Best-effort: the root usually already exists, and some accounts
        // cannot mkdir at the top level at all.
        if let Err(e) = remote.mkdir(&self.cfg.remote_root).await {
            warn!(root = %self.cfg.remote_root, "could not ensure remote root: {e}");
        }

        match self.initial_pass(remote.as_ref()).await {
            Ok(dropped) => info!(dropped, "initial reconciliation complete"),
            Err(e) => {
                let _ = state_tx.send(EngineState::Failed(format!(
                    "initial reconciliation failed: {e}"
                )));
                return;
            }
        }

        let (ev_tx, mut ev_rx) = mpsc::channel::<FsEvent>(1024);
        let mut watcher = match self.spawn_watcher(ev_tx) {
            Ok(w) => w,
            Err(e) => {
                let _ = state_tx.send(EngineState::Failed(format!("watch error: {e}")));
                return;
            }
        };

        let _ = state_tx.send(EngineState::Watching);

        let debounce = Duration::from_millis(self.cfg.debounce_ms);
        let mut batch: Vec<FsEvent> = Vec::new();
        let mut sleeper: Option<Pin<Box<Sleep>>> = None;
        loop {
            tokio::select! {
                Some(cmd) = ctrl_rx.recv() => {
                    match cmd {
                        EngineCommand::Stop => break,
                    }
                }
                Some(ev) = ev_rx.recv() => {
                    batch.push(ev);
                    sleeper = Some(Box::pin(sleep(debounce)));
                }
                _ = async { if let Some(ref mut s) = sleeper { s.as_mut().await } }, if sleeper.is_some() => {
                    let dropped = self.flush_events(remote.as_ref(), std::mem::take(&mut batch)).await;
                    if dropped > 0 {
                        warn!(dropped, "actions were dropped; a restart will re-reconcile");
                    }
                    sleeper = None;
                }
            }
        }

        let _ = state_tx.send(EngineState::ShuttingDown);
        if !batch.is_empty() {
            let _ = self.flush_events(remote.as_ref(), batch).await;
        }
        if let Err(e) = watcher.unwatch(&self.cfg.local_root) {
            debug!("unwatch: {e}");
        }
        let _ = state_tx.send(EngineState::Stopped);
    }

    /// One full reconciliation: snapshot both trees, diff, execute.
    /// Returns the number of actions dropped after retries.
    async fn initial_pass<R: RemoteStore>(&self, remote: &R) -> Result<usize, SyncError> {
        let local = build_local_snapshot(&self.cfg.local_root, self.cfg.symlinks, &self.filter)?;
        let remote_snap =
            build_remote_snapshot(remote, &self.cfg.remote_root, &self.filter).await?;
        let actions = reconcile(
            &local,
            &remote_snap,
            self.cfg.conflicts,
            self.cfg.remote_only,
        );
        info!(
            local = local.len(),
            remote = remote_snap.len(),
            actions = actions.len(),
            "reconciliation plan computed"
        );
        Ok(self.execute(remote, actions).await)
    }

    /// Translate one debounced batch of watcher events and execute it.
    async fn flush_events<R: RemoteStore>(&self, remote: &R, events: Vec<FsEvent>) -> usize {
        if events.is_empty() {
            return 0;
        }
        let mut actions = Vec::new();
        for ev in collapse_events(events) {
            let pass = match &ev {
                FsEvent::Rename(from, to) => self.allows(from) || self.allows(to),
                other => self.allows(other.path()),
            };
            if !pass {
                continue;
            }
            let is_dir = tokio::fs::metadata(ev.path())
                .await
                .map(|m| m.is_dir())
                .unwrap_or(false);
            actions.extend(translate(&ev, &self.cfg.local_root, is_dir));
        }
        self.execute(remote, actions).await
    }

    /// Execute actions in order. Maximal runs of consecutive transfers are
    /// dispatched concurrently up to the configured limit; everything else
    /// stays strictly sequential, which preserves the reconciler's ordering
    /// and the delete-before-create shape of a rename pair. Returns how
    /// many actions were dropped after exhausting retries.
    async fn execute<R: RemoteStore>(&self, remote: &R, actions: Vec<SyncAction>) -> usize {
        let mut dropped = 0usize;
        let mut transfers: Vec<SyncAction> = Vec::new();
        for action in actions {
            if action.is_transfer() {
                transfers.push(action);
                continue;
            }
            dropped += self.flush_transfers(remote, &mut transfers).await;
            if let Err(e) = self.run_action(remote, &action).await {
                warn!(
                    path = action.rel(),
                    action = action.kind_name(),
                    "dropping action: {e}"
                );
                dropped += 1;
            }
        }
        dropped + self.flush_transfers(remote, &mut transfers).await
    }

    async fn flush_transfers<R: RemoteStore>(
        &self,
        remote: &R,
        transfers: &mut Vec<SyncAction>,
    ) -> usize {
        if transfers.is_empty() {
            return 0;
        }
        let mut batch = std::mem::take(transfers);
        // A create event followed by modifies of the same path translates to
        // duplicate uploads; keep one per path so no two in-flight transfers
        // ever target the same file.
        let mut seen = std::collections::HashSet::new();
        batch.retain(|a| seen.insert(a.rel().to_string()));
        stream::iter(batch)
            .map(|action| async move {
                match self.run_action(remote, &action).await {
                    Ok(()) => 0usize,
                    Err(e) => {
                        warn!(
                            path = action.rel(),
                            action = action.kind_name(),
                            "dropping action: {e}"
                        );
                        1
                    }
                }
            })
            .buffer_unordered(self.cfg.concurrency.max(1))
            .collect::<Vec<_>>()
            .await
            .into_iter()
            .sum()
    }

    /// Apply one action, retrying remote failures with exponential backoff.
    async fn run_action<R: RemoteStore>(
        &self,
        remote: &R,
        action: &SyncAction,
    ) -> Result<(), RemoteError> {
        if matches!(action, SyncAction::NoOp { .. }) {
            return Ok(());
        }
        let mut attempt: u32 = 0;
        let mut backoff = self.cfg.retry_backoff_ms;
        loop {
            match self.apply(remote, action).await {
                Ok(()) => return Ok(()),
                Err(e) => {
                    attempt += 1;
                    if attempt > self.cfg.retry_max {
                        return Err(e);
                    }
                    debug!(
                        path = action.rel(),
                        attempt, "retrying failed action: {e}"
                    );
                    sleep(Duration::from_millis(backoff)).await;
                    backoff = backoff.saturating_mul(2);
                }
            }
        }
    }

    async fn apply<R: RemoteStore>(
        &self,
        remote: &R,
        action: &SyncAction,
    ) -> Result<(), RemoteError> {
        let local = self.cfg.local_root.join(action.rel());
        let rpath = join_remote(&self.cfg.remote_root, action.rel());
        match action {
            SyncAction::Upload { .. } => remote.upload(&local, &rpath).await,
            SyncAction::Download { .. } => remote.download(&rpath, &local).await,
            SyncAction::MkDirRemote { .. } => remote.mkdir(&rpath).await,
            SyncAction::DeleteRemote { .. } => match remote.delete(&rpath).await {
                // already gone is the desired end state
                Err(RemoteError::NotFound(_)) => Ok(()),
                other => other,
            },
            SyncAction::MkDirLocal { .. } => tokio::fs::create_dir_all(&local)
                .await
                .map_err(RemoteError::transport),
            SyncAction::DeleteLocal { .. } => delete_local(&local).await,
            SyncAction::NoOp { .. } => Ok(()),
        }
    }

    fn allows(&self, path: &Path) -> bool {
        match rel_path(&self.cfg.local_root, path) {
            Some(rel) => self.filter.allows(rel),
            None => false,
        }
    }

    fn spawn_watcher(&self, ev_tx: mpsc::Sender<FsEvent>) -> Result<RecommendedWatcher> {
        let mut watcher = RecommendedWatcher::new(
            move |res: std::result::Result<notify::Event, notify::Error>| match res {
                Ok(event) => {
                    for ev in events_from_notify(event) {
                        // blocking_send applies backpressure when transfers
                        // lag behind the event stream
                        if ev_tx.blocking_send(ev).is_err() {
                            return;
                        }
                    }
                }
                Err(e) => error!("watch error: {e}"),
            },
            notify::Config::default(),
        )?;
        watcher.watch(&self.cfg.local_root, RecursiveMode::Recursive)?;
        Ok(watcher)
    }
}

async fn delete_local(path: &Path) -> Result<(), RemoteError> {
    match tokio::fs::metadata(path).await {
        Ok(meta) if meta.is_dir() => tokio::fs::remove_dir_all(path)
            .await
            .map_err(RemoteError::transport),
        Ok(_) => tokio::fs::remove_file(path)
            .await
            .map_err(RemoteError::transport),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(RemoteError::transport(e)),
    }
}
