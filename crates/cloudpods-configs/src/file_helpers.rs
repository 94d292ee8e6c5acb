//! Path helpers shared by the config loader and storage setup.

use std::path::{Path, PathBuf};

/// Normalize a directory-like path to an absolute path string.
///
/// Relative paths are resolved against the current working directory once,
/// here, so every subsystem that later joins onto the path sees the same
/// location regardless of where the join happens.
pub fn normalize_dir_path(path: &str) -> String {
    let p = Path::new(path);
    let absolute = if p.is_absolute() {
        p.to_path_buf()
    } else {
        match std::env::current_dir() {
            Ok(cwd) => cwd.join(p),
            Err(_) => p.to_path_buf(),
        }
    };
    absolute.to_string_lossy().into_owned()
}

/// Join a child directory onto an already-normalized base path.
pub fn join_path(base: impl Into<PathBuf>, child: &str) -> PathBuf {
    let mut path: PathBuf = base.into();
    path.push(child);
    path
}
