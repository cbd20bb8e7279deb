use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::{bail, Context, Result};

use crate::time_utils::current_unix_timestamp_ms;

static TEMP_COUNTER: AtomicU64 = AtomicU64::new(1);

#[cfg(unix)]
const PRIVATE_FILE_MODE: u32 = 0o600;

/// Writes text using a temp file + rename so readers never observe partial
/// data. The file is owner read/write only (0600 on unix) before it becomes
/// visible at `path`.
pub fn write_private_text_atomic(path: &Path, content: &str) -> Result<()> {
    stage_private_text(path, content)?.commit()
}

/// Writes `content` to an owner-only temp file next to `path` without
/// publishing it. Dropping the returned value without calling
/// [`StagedWrite::commit`] removes the temp file and leaves `path` untouched.
pub fn stage_private_text(path: &Path, content: &str) -> Result<StagedWrite> {
    if path.as_os_str().is_empty() {
        bail!("destination path cannot be empty");
    }
    if path.is_dir() {
        bail!("destination path '{}' is a directory", path.display());
    }

    let parent_dir = path
        .parent()
        .filter(|dir| !dir.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent_dir)
        .with_context(|| format!("failed to create {}", parent_dir.display()))?;

    let temp_name = format!(
        ".{}.tmp-{}-{}-{}",
        path.file_name()
            .and_then(|name| name.to_str())
            .unwrap_or("kite"),
        std::process::id(),
        current_unix_timestamp_ms(),
        TEMP_COUNTER.fetch_add(1, Ordering::Relaxed)
    );
    let temp_path = parent_dir.join(temp_name);

    let mut options = OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(PRIVATE_FILE_MODE);
    }
    let mut file = options
        .open(&temp_path)
        .with_context(|| format!("failed to create temporary file {}", temp_path.display()))?;

    // From here on the guard owns cleanup of the temp file.
    let staged = StagedWrite {
        temp_path,
        destination: path.to_path_buf(),
        committed: false,
    };

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(
            &staged.temp_path,
            fs::Permissions::from_mode(PRIVATE_FILE_MODE),
        )
        .with_context(|| {
            format!(
                "failed to restrict permissions on {}",
                staged.temp_path.display()
            )
        })?;
    }

    file.write_all(content.as_bytes()).with_context(|| {
        format!(
            "failed to write temporary file {}",
            staged.temp_path.display()
        )
    })?;
    file.sync_all().with_context(|| {
        format!(
            "failed to flush temporary file {}",
            staged.temp_path.display()
        )
    })?;
    Ok(staged)
}

/// Creates `dir` (and parents) restricted to the owner (0700 on unix).
pub fn create_private_dir_all(dir: &Path) -> Result<()> {
    if dir.as_os_str().is_empty() {
        return Ok(());
    }
    #[cfg(unix)]
    {
        use std::os::unix::fs::{DirBuilderExt, PermissionsExt};
        if !dir.exists() {
            fs::DirBuilder::new()
                .recursive(true)
                .mode(0o700)
                .create(dir)
                .with_context(|| format!("failed to create {}", dir.display()))?;
        }
        fs::set_permissions(dir, fs::Permissions::from_mode(0o700))
            .with_context(|| format!("failed to restrict permissions on {}", dir.display()))?;
    }
    #[cfg(not(unix))]
    {
        fs::create_dir_all(dir).with_context(|| format!("failed to create {}", dir.display()))?;
    }
    Ok(())
}

/// A fully written temp file waiting to be renamed over its destination.
#[derive(Debug)]
pub struct StagedWrite {
    temp_path: PathBuf,
    destination: PathBuf,
    committed: bool,
}

impl StagedWrite {
    /// Atomically renames the temp file over the destination.
    pub fn commit(mut self) -> Result<()> {
        fs::rename(&self.temp_path, &self.destination).with_context(|| {
            format!(
                "failed to rename temporary file {} to {}",
                self.temp_path.display(),
                self.destination.display()
            )
        })?;
        self.committed = true;
        Ok(())
    }
}

impl Drop for StagedWrite {
    fn drop(&mut self) {
        if !self.committed {
            let _ = fs::remove_file(&self.temp_path);
        }
    }
}
