//! Locating the CLI executable before a run.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};

#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;

fn is_executable_file(path: &Path) -> bool {
    let Ok(metadata) = std::fs::metadata(path) else {
        return false;
    };
    if !metadata.is_file() {
        return false;
    }
    #[cfg(unix)]
    {
        metadata.permissions().mode() & 0o111 != 0
    }
    #[cfg(not(unix))]
    {
        true
    }
}

/// Resolves `executable` to a runnable file: paths are checked directly, bare
/// names are looked up on `PATH`.
pub fn resolve_executable(executable: &str) -> Option<PathBuf> {
    resolve_executable_in(executable, std::env::var_os("PATH").as_deref())
}

fn resolve_executable_in(executable: &str, path_var: Option<&OsStr>) -> Option<PathBuf> {
    let trimmed = executable.trim();
    if trimmed.is_empty() {
        return None;
    }

    let candidate = Path::new(trimmed);
    if candidate.is_absolute() || trimmed.contains(std::path::MAIN_SEPARATOR) {
        return is_executable_file(candidate).then(|| candidate.to_path_buf());
    }

    std::env::split_paths(path_var?)
        .map(|dir| dir.join(trimmed))
        .find(|path| is_executable_file(path))
}

pub fn is_executable_available(executable: &str) -> bool {
    resolve_executable(executable).is_some()
}
