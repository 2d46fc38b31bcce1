// Advisory lock held while a state file is being replaced

use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::warn;

use crate::error::{TradingError, TradingResult};

static UNSUPPORTED_WARNED: AtomicBool = AtomicBool::new(false);

/// Exclusive lock on `<state file>.lock`, released on drop.
///
/// When the platform cannot lock files the guard is still returned without a
/// lock and a warning is logged the first time it happens.
#[derive(Debug)]
pub struct FileLock {
    file: Option<File>,
}

impl FileLock {
    pub fn lock_path_for(target: &Path) -> PathBuf {
        let mut name = target
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".lock");
        target.with_file_name(name)
    }

    /// Block until the exclusive lock for `target` is acquired
    pub fn acquire(target: &Path) -> TradingResult<Self> {
        let path = Self::lock_path_for(target);
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&path)
            .map_err(|e| TradingError::StateLock(format!("{}: {}", path.display(), e)))?;

        match file.lock() {
            Ok(()) => Ok(Self { file: Some(file) }),
            Err(e) if e.kind() == io::ErrorKind::Unsupported => {
                if !UNSUPPORTED_WARNED.swap(true, Ordering::Relaxed) {
                    warn!(
                        "⚠️  File locking is not supported here ({}); state writes to {} proceed WITHOUT a lock",
                        e,
                        target.display()
                    );
                }
                Ok(Self { file: None })
            }
            Err(e) => Err(TradingError::StateLock(format!("{}: {}", path.display(), e))),
        }
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        if let Some(file) = self.file.take() {
            let _ = file.unlock();
        }
    }
}
