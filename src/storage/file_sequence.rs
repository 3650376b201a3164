use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use crate::contracts::{Environment, SequenceError, SequenceState, SequenceStore, Versioned};

/// On-disk shape: the counters plus the optimistic-concurrency version.
/// Counter field names match the external contract (`last_number`,
/// `last_reception`, `year`).
#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct PersistedState {
    last_number: u64,
    last_reception: u64,
    year: u16,
    version: u64,
}

/// File-backed sequence store, one JSON file per environment.
///
/// Writes go to a temp file and are renamed into place, so readers never see
/// a partial state. The version check runs under a per-environment mutex;
/// the version itself guards against writers outside this process (an
/// administrator editing the file between our read and write loses cleanly
/// with `Conflict` instead of being silently overwritten).
///
/// A missing file inside an existing data directory is a fresh zero state.
/// A missing directory, unreadable file, or unparsable file is an error —
/// allocation must fail loudly rather than risk re-issuing numbers over real
/// history.
#[derive(Debug)]
pub struct FileSequenceStore {
    dir: PathBuf,
    production_lock: Mutex<()>,
    test_lock: Mutex<()>,
}

impl FileSequenceStore {
    /// Opens a store over an existing data directory.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, SequenceError> {
        let dir = dir.into();
        if !dir.is_dir() {
            return Err(SequenceError::Unavailable(format!(
                "Data directory does not exist: {}",
                dir.display()
            )));
        }
        Ok(Self {
            dir,
            production_lock: Mutex::new(()),
            test_lock: Mutex::new(()),
        })
    }

    fn state_path(&self, env: Environment) -> PathBuf {
        self.dir.join(format!("sequence_{}.json", env.file_tag()))
    }

    fn write_lock(&self, env: Environment) -> &Mutex<()> {
        match env {
            Environment::Production => &self.production_lock,
            Environment::Test => &self.test_lock,
        }
    }

    fn read_persisted(&self, path: &Path) -> Result<Option<PersistedState>, SequenceError> {
        let contents = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(SequenceError::Unavailable(format!(
                    "Failed to read {}: {}",
                    path.display(),
                    e
                )))
            }
        };
        let persisted: PersistedState = serde_json::from_str(&contents).map_err(|e| {
            SequenceError::Corrupt(format!("Unparsable state in {}: {}", path.display(), e))
        })?;
        Ok(Some(persisted))
    }
}

impl SequenceStore for FileSequenceStore {
    fn load(&self, env: Environment) -> Result<Versioned, SequenceError> {
        if !self.dir.is_dir() {
            return Err(SequenceError::Unavailable(format!(
                "Data directory does not exist: {}",
                self.dir.display()
            )));
        }
        let path = self.state_path(env);
        Ok(match self.read_persisted(&path)? {
            Some(p) => Versioned {
                version: p.version,
                state: SequenceState {
                    last_number: p.last_number,
                    last_reception: p.last_reception,
                    year: p.year,
                },
            },
            None => Versioned {
                version: 0,
                state: SequenceState::default(),
            },
        })
    }

    fn store(
        &self,
        env: Environment,
        expected_version: u64,
        state: &SequenceState,
    ) -> Result<(), SequenceError> {
        let _guard = self
            .write_lock(env)
            .lock()
            .map_err(|e| SequenceError::LockPoisoned(e.to_string()))?;

        let path = self.state_path(env);
        // A corrupt file has no usable version. Allocation never reaches this
        // point with one (its load already failed), so the writer here is the
        // administrative reset replacing the damaged record from version 0.
        let current_version = match self.read_persisted(&path) {
            Ok(p) => p.map(|p| p.version).unwrap_or(0),
            Err(SequenceError::Corrupt(_)) => 0,
            Err(e) => return Err(e),
        };
        if current_version != expected_version {
            return Err(SequenceError::Conflict);
        }

        let persisted = PersistedState {
            last_number: state.last_number,
            last_reception: state.last_reception,
            year: state.year,
            version: expected_version + 1,
        };
        let json = serde_json::to_string_pretty(&persisted)
            .map_err(|e| SequenceError::Corrupt(format!("Failed to encode state: {}", e)))?;

        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, json).map_err(|e| {
            SequenceError::Unavailable(format!("Failed to write {}: {}", tmp.display(), e))
        })?;
        std::fs::rename(&tmp, &path).map_err(|e| {
            SequenceError::Unavailable(format!("Failed to replace {}: {}", path.display(), e))
        })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sample_state() -> SequenceState {
        SequenceState {
            last_number: 7,
            last_reception: 314,
            year: 26,
        }
    }

    #[test]
    fn missing_directory_is_unavailable_not_zero() {
        let err = FileSequenceStore::open("/nonexistent/recibo-data").unwrap_err();
        assert!(matches!(err, SequenceError::Unavailable(_)));
    }

    #[test]
    fn fresh_directory_loads_zero_state() {
        let dir = TempDir::new().unwrap();
        let store = FileSequenceStore::open(dir.path()).unwrap();
        let v = store.load(Environment::Production).unwrap();
        assert_eq!(v.version, 0);
        assert_eq!(v.state, SequenceState::default());
    }

    #[test]
    fn state_survives_reopen() {
        let dir = TempDir::new().unwrap();
        {
            let store = FileSequenceStore::open(dir.path()).unwrap();
            store
                .store(Environment::Production, 0, &sample_state())
                .unwrap();
        }
        let store = FileSequenceStore::open(dir.path()).unwrap();
        let v = store.load(Environment::Production).unwrap();
        assert_eq!(v.version, 1);
        assert_eq!(v.state, sample_state());
    }

    #[test]
    fn stale_version_is_rejected() {
        let dir = TempDir::new().unwrap();
        let store = FileSequenceStore::open(dir.path()).unwrap();
        store
            .store(Environment::Production, 0, &sample_state())
            .unwrap();
        let err = store
            .store(Environment::Production, 0, &sample_state())
            .unwrap_err();
        assert!(matches!(err, SequenceError::Conflict));
    }

    #[test]
    fn corrupt_file_is_an_error_not_a_default() {
        let dir = TempDir::new().unwrap();
        let store = FileSequenceStore::open(dir.path()).unwrap();
        std::fs::write(dir.path().join("sequence_production.json"), "{not json").unwrap();
        let err = store.load(Environment::Production).unwrap_err();
        assert!(matches!(err, SequenceError::Corrupt(_)));
    }

    #[test]
    fn unexpected_fields_in_state_file_are_corrupt() {
        let dir = TempDir::new().unwrap();
        let store = FileSequenceStore::open(dir.path()).unwrap();
        std::fs::write(
            dir.path().join("sequence_production.json"),
            r#"{"last_number":1,"last_reception":1,"year":26,"version":1,"extra":true}"#,
        )
        .unwrap();
        assert!(matches!(
            store.load(Environment::Production).unwrap_err(),
            SequenceError::Corrupt(_)
        ));
    }

    #[test]
    fn corrupt_state_is_recoverable_by_reset() {
        use crate::storage::{ManualClock, SequenceAllocator};
        use std::sync::Arc;

        let dir = TempDir::new().unwrap();
        let store = Arc::new(FileSequenceStore::open(dir.path()).unwrap());
        std::fs::write(dir.path().join("sequence_production.json"), "{not json").unwrap();

        let alloc = SequenceAllocator::with_clock(store, Arc::new(ManualClock::new(26)));
        assert!(matches!(
            alloc
                .allocate_analysis_number(Environment::Production)
                .unwrap_err(),
            SequenceError::Corrupt(_)
        ));

        alloc.reset(Environment::Production).unwrap();
        assert_eq!(
            alloc
                .allocate_analysis_number(Environment::Production)
                .unwrap(),
            "0001/26"
        );
    }

    #[test]
    fn external_edit_between_read_and_write_conflicts() {
        let dir = TempDir::new().unwrap();
        let store = FileSequenceStore::open(dir.path()).unwrap();
        let loaded = store.load(Environment::Production).unwrap();

        // Someone else writes version 1 behind our back.
        std::fs::write(
            dir.path().join("sequence_production.json"),
            r#"{"last_number":9,"last_reception":9,"year":26,"version":1}"#,
        )
        .unwrap();

        let err = store
            .store(Environment::Production, loaded.version, &sample_state())
            .unwrap_err();
        assert!(matches!(err, SequenceError::Conflict));
    }

    #[test]
    fn environments_use_separate_files() {
        let dir = TempDir::new().unwrap();
        let store = FileSequenceStore::open(dir.path()).unwrap();
        store
            .store(Environment::Test, 0, &sample_state())
            .unwrap();
        assert_eq!(store.load(Environment::Production).unwrap().version, 0);
        assert!(dir.path().join("sequence_test.json").exists());
        assert!(!dir.path().join("sequence_production.json").exists());
    }
}
