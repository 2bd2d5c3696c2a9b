//! On-disk locations of the store, its backup and their temp files.

use std::ffi::OsString;
use std::io;
use std::path::{Component, Path, PathBuf};

pub const STORE_DIR: &str = ".vscode";
pub const STORE_FILE: &str = "agent-notes.json";
pub const BACKUP_FILE: &str = "agent-notes.backup.json";

/// Store path relative to the workspace root, `/`-separated.
pub const STORE_REL_PATH: &str = ".vscode/agent-notes.json";

pub fn store_dir(root: &Path) -> PathBuf {
    root.join(STORE_DIR)
}

pub fn store_path(root: &Path) -> PathBuf {
    store_dir(root).join(STORE_FILE)
}

pub fn backup_path(root: &Path) -> PathBuf {
    store_dir(root).join(BACKUP_FILE)
}

/// Sibling temp path used for write-then-rename (`<path>.tmp`).
pub fn temp_path(path: &Path) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(".tmp");
    PathBuf::from(name)
}

/// Converts `path` into a workspace-relative, `/`-separated uri.
///
/// Relative paths are taken as already relative to `root`. Returns `None` when
/// `path` lies outside `root` or names the root itself.
pub fn relative_uri(root: &Path, path: &Path) -> Option<String> {
    let rel = if path.is_absolute() {
        path.strip_prefix(root).ok()?
    } else {
        path
    };
    let mut parts: Vec<String> = Vec::new();
    for component in rel.components() {
        match component {
            Component::Normal(part) => parts.push(part.to_string_lossy().into_owned()),
            Component::CurDir => {}
            Component::ParentDir => {
                parts.pop()?;
            }
            Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    if parts.is_empty() {
        return None;
    }
    Some(parts.join("/"))
}

/// Makes sure `<root>/.gitignore` excludes the store file.
///
/// Creates `.gitignore` when missing; appends the entry (with a separating
/// newline if needed) when absent. Returns `true` if the file was written.
///
/// # Errors
///
/// Returns the underlying I/O error if `.gitignore` cannot be read or written.
pub fn ensure_gitignored(root: &Path) -> io::Result<bool> {
    let gitignore = root.join(".gitignore");
    let content = match std::fs::read_to_string(&gitignore) {
        Ok(content) => content,
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            std::fs::write(&gitignore, format!("{STORE_REL_PATH}\n"))?;
            return Ok(true);
        }
        Err(err) => return Err(err),
    };

    if content.lines().any(|line| line.trim() == STORE_REL_PATH) {
        return Ok(false);
    }

    let separator = if content.is_empty() || content.ends_with('\n') { "" } else { "\n" };
    std::fs::write(&gitignore, format!("{content}{separator}{STORE_REL_PATH}\n"))?;
    Ok(true)
}
