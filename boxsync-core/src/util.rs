use std::path::Path;

/// Relative POSIX-style path of `path` under `root`, or `None` if `path`
/// is outside `root` (or is `root` itself).
pub fn rel_path(root: &Path, path: &Path) -> Option<String> {
    let rel = path.strip_prefix(root).ok()?;
    if rel.as_os_str().is_empty() {
        return None;
    }
    Some(rel.to_string_lossy().replace('\\', "/"))
}

/// Join a relative path onto the remote root, always with forward slashes.
pub fn join_remote(remote_root: &str, rel: &str) -> String {
    let root = remote_root.trim_end_matches('/');
    if rel.is_empty() {
        root.to_string()
    } else {
        format!("{root}/{rel}")
    }
}
