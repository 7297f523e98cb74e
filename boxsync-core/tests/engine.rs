//! End-to-end engine tests against an in-memory remote store.

use async_trait::async_trait;
use boxsync_core::{
    spawn_engine, ConflictPolicy, EngineHandle, EngineState, EntryKind, RemoteCfg, RemoteEntry,
    RemoteError, RemoteOnlyPolicy, RemoteStore, SymlinkPolicy, SyncConfig,
};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, UNIX_EPOCH};

#[derive(Debug, Clone)]
enum Node {
    Dir,
    File { modified: u64, data: Vec<u8> },
}

/// Remote store backed by a map of absolute path -> node.
#[derive(Default)]
struct MockStore {
    tree: Mutex<BTreeMap<String, Node>>,
    /// Remote paths whose upload always fails with a transport error.
    fail_uploads: HashSet<String>,
    /// Simulates a dead session: every ping fails.
    fail_ping: bool,
}

impl MockStore {
    fn with_tree(entries: &[(&str, Node)]) -> Self {
        let store = Self::default();
        {
            let mut tree = store.tree.lock().unwrap();
            for (path, node) in entries {
                tree.insert(path.to_string(), node.clone());
            }
        }
        store
    }

    fn contains(&self, path: &str) -> bool {
        self.tree.lock().unwrap().contains_key(path)
    }

    fn file_data(&self, path: &str) -> Option<Vec<u8>> {
        match self.tree.lock().unwrap().get(path) {
            Some(Node::File { data, .. }) => Some(data.clone()),
            _ => None,
        }
    }
}

fn transport(msg: &str) -> RemoteError {
    RemoteError::Transport(anyhow::anyhow!(msg.to_string()))
}

#[async_trait]
impl RemoteStore for MockStore {
    async fn list(&self, path: &str) -> Result<Vec<RemoteEntry>, RemoteError> {
        let tree = self.tree.lock().unwrap();
        if !matches!(tree.get(path), Some(Node::Dir)) {
            return Err(RemoteError::NotFound(path.to_string()));
        }
        let prefix = format!("{path}/");
        let mut out = Vec::new();
        for (k, node) in tree.range(prefix.clone()..) {
            let Some(rest) = k.strip_prefix(&prefix) else {
                break;
            };
            if rest.contains('/') {
                continue;
            }
            out.push(match node {
                Node::Dir => RemoteEntry {
                    name: rest.to_string(),
                    kind: EntryKind::Directory,
                    modified: 0,
                    size: 0,
                },
                Node::File { modified, data } => RemoteEntry {
                    name: rest.to_string(),
                    kind: EntryKind::File,
                    modified: *modified,
                    size: data.len() as u64,
                },
            });
        }
        Ok(out)
    }

    async fn upload(&self, local: &Path, remote: &str) -> Result<(), RemoteError> {
        if self.fail_uploads.contains(remote) {
            return Err(transport("injected upload failure"));
        }
        let data = tokio::fs::read(local)
            .await
            .map_err(RemoteError::transport)?;
        let modified = tokio::fs::metadata(local)
            .await
            .map_err(RemoteError::transport)?
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_secs())
            .unwrap_or(0);
        self.tree
            .lock()
            .unwrap()
            .insert(remote.to_string(), Node::File { modified, data });
        Ok(())
    }

    async fn download(&self, remote: &str, local: &Path) -> Result<(), RemoteError> {
        let data = self
            .file_data(remote)
            .ok_or_else(|| RemoteError::NotFound(remote.to_string()))?;
        tokio::fs::write(local, data)
            .await
            .map_err(RemoteError::transport)
    }

    async fn delete(&self, remote: &str) -> Result<(), RemoteError> {
        let mut tree = self.tree.lock().unwrap();
        if tree.remove(remote).is_none() {
            return Err(RemoteError::NotFound(remote.to_string()));
        }
        let prefix = format!("{remote}/");
        tree.retain(|k, _| !k.starts_with(&prefix));
        Ok(())
    }

    async fn mkdir(&self, remote: &str) -> Result<(), RemoteError> {
        let mut tree = self.tree.lock().unwrap();
        let mut acc = String::new();
        for seg in remote.split('/').filter(|s| !s.is_empty()) {
            acc.push('/');
            acc.push_str(seg);
            tree.entry(acc.clone()).or_insert(Node::Dir);
        }
        Ok(())
    }

    async fn ping(&self) -> Result<(), RemoteError> {
        if self.fail_ping {
            return Err(transport("injected dead session"));
        }
        Ok(())
    }
}

fn config(local_root: PathBuf) -> SyncConfig {
    SyncConfig {
        local_root,
        remote_root: "/Drive".to_string(),
        include: vec![],
        exclude: vec![],
        concurrency: 4,
        debounce_ms: 50,
        symlinks: SymlinkPolicy::Skip,
        conflicts: ConflictPolicy::PreferLocal,
        remote_only: RemoteOnlyPolicy::Delete,
        retry_max: 1,
        retry_backoff_ms: 1,
        remote: RemoteCfg::Sftp {
            host: "unused".into(),
            user: "unused".into(),
            password: None,
            fingerprints: None,
        },
    }
}

async fn wait_for_watching(handle: &EngineHandle) {
    for _ in 0..500 {
        match handle.state() {
            EngineState::Watching => return,
            EngineState::Failed(e) => panic!("engine failed: {e}"),
            _ => tokio::time::sleep(Duration::from_millis(10)).await,
        }
    }
    panic!("engine never reached Watching, state: {:?}", handle.state());
}

async fn stop_and_join(mut handle: EngineHandle) {
    handle.stop();
    let state = handle.wait_stopped().await;
    assert_eq!(state, EngineState::Stopped);
}

#[tokio::test(flavor = "multi_thread")]
async fn initial_sync_pushes_local_tree() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir(dir.path().join("sub")).unwrap();
    std::fs::write(dir.path().join("a.txt"), b"alpha").unwrap();
    std::fs::write(dir.path().join("sub/b.txt"), b"beta").unwrap();

    let store = Arc::new(MockStore::default());
    let handle = spawn_engine(config(dir.path().to_path_buf()), store.clone());
    wait_for_watching(&handle).await;

    assert_eq!(store.file_data("/Drive/a.txt").as_deref(), Some(&b"alpha"[..]));
    assert!(store.contains("/Drive/sub"));
    assert_eq!(
        store.file_data("/Drive/sub/b.txt").as_deref(),
        Some(&b"beta"[..])
    );

    stop_and_join(handle).await;
}

#[tokio::test(flavor = "multi_thread")]
async fn one_failing_upload_does_not_block_the_rest() {
    let dir = tempfile::tempdir().unwrap();
    for name in ["a", "b", "c", "d", "e"] {
        std::fs::write(dir.path().join(format!("{name}.txt")), name).unwrap();
    }

    let mut store = MockStore::default();
    store.fail_uploads.insert("/Drive/c.txt".to_string());
    let store = Arc::new(store);

    let handle = spawn_engine(config(dir.path().to_path_buf()), store.clone());
    wait_for_watching(&handle).await;

    for name in ["a", "b", "d", "e"] {
        assert!(store.contains(&format!("/Drive/{name}.txt")), "{name} missing");
    }
    assert!(!store.contains("/Drive/c.txt"));

    stop_and_join(handle).await;
}

#[tokio::test(flavor = "multi_thread")]
async fn remote_only_entries_are_mirrored_away() {
    let dir = tempfile::tempdir().unwrap();

    let store = Arc::new(MockStore::with_tree(&[
        ("/Drive", Node::Dir),
        (
            "/Drive/old.txt",
            Node::File {
                modified: 100,
                data: b"stale".to_vec(),
            },
        ),
    ]));

    let handle = spawn_engine(config(dir.path().to_path_buf()), store.clone());
    wait_for_watching(&handle).await;

    assert!(!store.contains("/Drive/old.txt"));

    stop_and_join(handle).await;
}

#[tokio::test(flavor = "multi_thread")]
async fn newer_remote_file_is_downloaded() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("notes.txt"), b"old local").unwrap();
    let local_mtime = std::fs::metadata(dir.path().join("notes.txt"))
        .unwrap()
        .modified()
        .unwrap()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_secs();

    let store = Arc::new(MockStore::with_tree(&[
        ("/Drive", Node::Dir),
        (
            "/Drive/notes.txt",
            Node::File {
                modified: local_mtime + 100,
                data: b"newer remote".to_vec(),
            },
        ),
    ]));

    let handle = spawn_engine(config(dir.path().to_path_buf()), store.clone());
    wait_for_watching(&handle).await;

    let data = std::fs::read(dir.path().join("notes.txt")).unwrap();
    assert_eq!(data, b"newer remote");

    stop_and_join(handle).await;
}

#[tokio::test(flavor = "multi_thread")]
async fn unreachable_remote_fails_startup() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("a.txt"), b"alpha").unwrap();

    let mut store = MockStore::default();
    store.fail_ping = true;
    let store = Arc::new(store);

    let mut handle = spawn_engine(config(dir.path().to_path_buf()), store.clone());
    match handle.wait_stopped().await {
        EngineState::Failed(msg) => assert!(msg.contains("unreachable"), "{msg}"),
        state => panic!("expected Failed, got {state:?}"),
    }
    // nothing was attempted against the dead store
    assert!(!store.contains("/Drive/a.txt"));
}

#[tokio::test(flavor = "multi_thread")]
async fn watcher_pushes_new_files() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(MockStore::default());
    let handle = spawn_engine(config(dir.path().to_path_buf()), store.clone());
    wait_for_watching(&handle).await;

    std::fs::write(dir.path().join("live.txt"), b"fresh").unwrap();

    // debounce window is 50ms; give the watcher generous slack
    for _ in 0..500 {
        if store.contains("/Drive/live.txt") {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(
        store.file_data("/Drive/live.txt").as_deref(),
        Some(&b"fresh"[..])
    );

    stop_and_join(handle).await;
}
