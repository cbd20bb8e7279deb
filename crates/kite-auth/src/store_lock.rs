//! Cross-process advisory lock guarding credential store read-modify-write.
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use fs2::FileExt;
use kite_core::create_private_dir_all;

use crate::error::AuthError;

const LOCK_POLL_INTERVAL: Duration = Duration::from_millis(20);

#[derive(Debug, Clone)]
pub struct StoreLock {
    path: PathBuf,
    timeout: Duration,
}

/// Holds the exclusive lock until dropped.
#[derive(Debug)]
pub struct StoreLockGuard {
    file: File,
    path: PathBuf,
}

impl Drop for StoreLockGuard {
    fn drop(&mut self) {
        if let Err(error) = FileExt::unlock(&self.file) {
            tracing::warn!(
                lock = %self.path.display(),
                error = %error,
                "failed to release credential lock"
            );
        }
    }
}

impl StoreLock {
    pub fn new(path: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            path: path.into(),
            timeout,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Polls for the exclusive lock without blocking the runtime, failing with
    /// [`AuthError::LockTimeout`] once `timeout` has elapsed.
    pub async fn acquire(&self) -> Result<StoreLockGuard, AuthError> {
        if let Some(parent) = self.path.parent() {
            create_private_dir_all(parent).map_err(|error| AuthError::Lock {
                path: self.path.clone(),
                source: std::io::Error::other(format!("{error:#}")),
            })?;
        }

        // A fresh descriptor per acquisition so concurrent tasks in this
        // process contend with each other as well as with other processes.
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(&self.path)
            .map_err(|source| AuthError::Lock {
                path: self.path.clone(),
                source,
            })?;

        let started = Instant::now();
        let contended = fs2::lock_contended_error().raw_os_error();
        loop {
            match FileExt::try_lock_exclusive(&file) {
                Ok(()) => {
                    tracing::trace!(
                        lock = %self.path.display(),
                        waited_ms = started.elapsed().as_millis() as u64,
                        "acquired credential lock"
                    );
                    return Ok(StoreLockGuard {
                        file,
                        path: self.path.clone(),
                    });
                }
                Err(error)
                    if error.kind() == std::io::ErrorKind::WouldBlock
                        || error.raw_os_error() == contended =>
                {
                    let waited = started.elapsed();
                    if waited >= self.timeout {
                        return Err(AuthError::LockTimeout {
                            path: self.path.clone(),
                            waited_ms: waited.as_millis() as u64,
                        });
                    }
                    tokio::time::sleep(LOCK_POLL_INTERVAL).await;
                }
                Err(source) => {
                    return Err(AuthError::Lock {
                        path: self.path.clone(),
                        source,
                    });
                }
            }
        }
    }
}
