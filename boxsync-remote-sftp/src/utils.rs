//! Recursive directory helpers the sftp protocol itself does not offer.

use russh_sftp::client::error::Error;
use russh_sftp::client::SftpSession;
use russh_sftp::protocol::{Status, StatusCode};
use std::path::{Path, PathBuf};

fn posix<P: AsRef<Path>>(p: P) -> String {
    p.as_ref().to_string_lossy().replace('\\', "/")
}

fn failure(msg: String) -> Error {
    Error::Status(Status {
        id: 0,
        status_code: StatusCode::Failure,
        error_message: msg,
        language_tag: "en-US".to_string(),
    })
}

fn is_no_such_file(err: &Error) -> bool {
    matches!(err, Error::Status(s) if s.status_code == StatusCode::NoSuchFile)
}

/// Create `path` and any missing ancestors. Succeeds if the directory is
/// already there; fails if any component exists as a file.
pub async fn create_dir_all(sftp: &SftpSession, path: impl AsRef<Path>) -> Result<(), Error> {
    let path = path.as_ref();
    if let Ok(attrs) = sftp.metadata(posix(path)).await {
        return if attrs.is_dir() {
            Ok(())
        } else {
            Err(failure(format!(
                "a file with the same name already exists: {}",
                path.display()
            )))
        };
    }

    let ancestors: Vec<PathBuf> = path.ancestors().map(|p| p.to_path_buf()).collect();
    for p in ancestors.iter().rev() {
        if p.as_os_str().is_empty() || p.as_os_str() == "/" {
            continue;
        }
        match sftp.create_dir(posix(p)).await {
            Ok(()) => {}
            Err(e) => {
                // sftp reports "already exists" as a bare Failure; confirm
                // with a stat before deciding whether it is actually fatal
                let maybe_exists =
                    matches!(&e, Error::Status(s) if s.status_code == StatusCode::Failure);
                if !maybe_exists {
                    return Err(e);
                }
                match sftp.metadata(posix(p)).await {
                    Ok(attrs) if attrs.is_dir() => {}
                    Ok(_) => {
                        return Err(failure(format!(
                            "path component is a file, not a directory: {}",
                            p.display()
                        )))
                    }
                    Err(_) => return Err(e),
                }
            }
        }
    }
    Ok(())
}

/// Delete a directory tree, children before parents, since sftp servers
/// refuse to remove non-empty directories. A path that is already gone
/// counts as success.
pub async fn remove_dir_all(sftp: &SftpSession, path: impl AsRef<Path>) -> Result<(), Error> {
    let root = path.as_ref().to_path_buf();
    match sftp.metadata(posix(&root)).await {
        Ok(attrs) if attrs.is_dir() => {}
        Ok(_) => {
            return Err(failure(format!(
                "path is not a directory: {}",
                root.display()
            )))
        }
        Err(e) if is_no_such_file(&e) => return Ok(()),
        Err(e) => return Err(e),
    }

    // iterative post-order walk: visit a directory once to queue its
    // children, a second time to remove the now-empty directory itself
    let mut stack: Vec<(PathBuf, bool)> = vec![(root, false)];
    while let Some((dir, visited)) = stack.pop() {
        if visited {
            let _ = sftp.remove_dir(posix(&dir)).await;
            continue;
        }
        stack.push((dir.clone(), true));
        let entries = match sftp.read_dir(posix(&dir)).await {
            Ok(entries) => entries,
            Err(e) if is_no_such_file(&e) => continue,
            Err(e) => return Err(e),
        };
        for entry in entries {
            let name = entry.file_name();
            if name == "." || name == ".." {
                continue;
            }
            let child = dir.join(name);
            if entry.metadata().is_dir() {
                stack.push((child, false));
            } else {
                let _ = sftp.remove_file(posix(&child)).await;
            }
        }
    }
    Ok(())
}
