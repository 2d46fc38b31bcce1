//! JSON state persistence
//!
//! Every state blob (trading state, split state, watcher checkpoint, runtime
//! stats) goes through a [`StateStore`]. Writes go to a temp file in the same
//! directory, are fsynced, then renamed over the target while an exclusive
//! advisory lock is held, so a concurrent reader sees either the old or the
//! new file and never a partial one.

pub mod lock;
pub mod stats;

use std::fs::{self, File};
use std::io::Write;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::error::{TradingError, TradingResult};

pub use lock::FileLock;
pub use stats::{RuntimeStats, StatsRecorder};

/// What to do when a state file exists but cannot be parsed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CorruptStatePolicy {
    /// Log a warning and start from defaults
    Reset,
    /// Move the file to `<name>.corrupt-<ts>` and start from defaults
    Quarantine,
    /// Fail with `StateCorrupt`; an operator must repair the file
    Refuse,
}

#[derive(Debug, Clone)]
pub struct StateStore<T> {
    path: PathBuf,
    policy: CorruptStatePolicy,
    _state: PhantomData<fn() -> T>,
}

impl<T> StateStore<T>
where
    T: Serialize + DeserializeOwned + Default,
{
    pub fn new(path: impl Into<PathBuf>, policy: CorruptStatePolicy) -> Self {
        Self {
            path: path.into(),
            policy,
            _state: PhantomData,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the state, falling back to `T::default()` when the file is absent
    pub fn load(&self) -> TradingResult<T> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("📁 No state at {}, starting fresh", self.path.display());
                return Ok(T::default());
            }
            Err(e) => {
                return Err(TradingError::StateRead(format!("{}: {}", self.path.display(), e)));
            }
        };

        match serde_json::from_str::<T>(&content) {
            Ok(state) => {
                debug!("Loaded state from {}", self.path.display());
                Ok(state)
            }
            Err(e) => self.recover_from_corruption(e),
        }
    }

    fn recover_from_corruption(&self, err: serde_json::Error) -> TradingResult<T> {
        let detail = format!("{}: {}", self.path.display(), err);
        match self.policy {
            CorruptStatePolicy::Reset => {
                warn!("⚠️  Corrupt state {} - resetting to defaults", detail);
                Ok(T::default())
            }
            CorruptStatePolicy::Quarantine => {
                let aside = self.quarantine_path();
                fs::rename(&self.path, &aside)
                    .map_err(|e| TradingError::StateWrite(format!("quarantine {}: {}", aside.display(), e)))?;
                error!(
                    "❌ Corrupt state {} - moved to {} and starting from defaults",
                    detail,
                    aside.display()
                );
                Ok(T::default())
            }
            CorruptStatePolicy::Refuse => Err(TradingError::StateCorrupt(detail)),
        }
    }

    fn quarantine_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(format!(".corrupt-{}", Utc::now().format("%Y%m%d%H%M%S")));
        self.path.with_file_name(name)
    }

    /// Atomically replace the state file
    pub fn save(&self, state: &T) -> TradingResult<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .map_err(|e| TradingError::StateWrite(format!("{}: {}", parent.display(), e)))?;
            }
        }

        let body = serde_json::to_vec_pretty(state)
            .map_err(|e| TradingError::StateWrite(format!("serialize {}: {}", self.path.display(), e)))?;

        let _lock = FileLock::acquire(&self.path)?;
        let tmp = self.temp_path();
        let written = write_synced(&tmp, &body).and_then(|_| fs::rename(&tmp, &self.path));
        if let Err(e) = written {
            let _ = fs::remove_file(&tmp);
            return Err(TradingError::StateWrite(format!("{}: {}", self.path.display(), e)));
        }
        Ok(())
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(format!(".tmp.{}", std::process::id()));
        self.path.with_file_name(name)
    }
}

fn write_synced(path: &Path, body: &[u8]) -> std::io::Result<()> {
    let mut file = File::create(path)?;
    file.write_all(body)?;
    file.sync_all()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
    struct Counter {
        value: u32,
        label: String,
    }

    #[test]
    fn test_missing_file_yields_default() {
        let dir = tempdir().unwrap();
        let store: StateStore<Counter> =
            StateStore::new(dir.path().join("absent.json"), CorruptStatePolicy::Refuse);
        assert_eq!(store.load().unwrap(), Counter::default());
    }

    #[test]
    fn test_save_then_load_round_trip() {
        let dir = tempdir().unwrap();
        let store = StateStore::new(dir.path().join("nested/counter.json"), CorruptStatePolicy::Refuse);
        let state = Counter { value: 7, label: "seven".into() };

        store.save(&state).unwrap();
        assert_eq!(store.load().unwrap(), state);

        // no temp file is left behind
        let leftovers: Vec<_> = fs::read_dir(dir.path().join("nested"))
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().contains(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn test_refuse_policy_reports_corruption() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bad.json");
        fs::write(&path, "{ not json").unwrap();

        let store: StateStore<Counter> = StateStore::new(&path, CorruptStatePolicy::Refuse);
        assert!(matches!(store.load(), Err(TradingError::StateCorrupt(_))));
        assert!(path.exists());
    }

    #[test]
    fn test_quarantine_policy_moves_file_aside() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bad.json");
        fs::write(&path, "[1, 2").unwrap();

        let store: StateStore<Counter> = StateStore::new(&path, CorruptStatePolicy::Quarantine);
        assert_eq!(store.load().unwrap(), Counter::default());
        assert!(!path.exists());

        let quarantined = fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .any(|e| e.file_name().to_string_lossy().starts_with("bad.json.corrupt-"));
        assert!(quarantined);
    }

    #[test]
    fn test_reset_policy_keeps_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bad.json");
        fs::write(&path, "garbage").unwrap();

        let store: StateStore<Counter> = StateStore::new(&path, CorruptStatePolicy::Reset);
        assert_eq!(store.load().unwrap(), Counter::default());
        assert!(path.exists());
    }
}
