use std::io::Write;
use std::path::PathBuf;
use std::sync::Mutex;

use crate::contracts::{
    Environment, LockResultExt, ReceivingRecord, RecordStore, StoreError,
};

/// JSON-lines record store, one history file per environment.
///
/// Appends are serialized per environment and flushed before returning, so a
/// submission whose append succeeded is readable by the next history query.
pub struct FileRecordStore {
    dir: PathBuf,
    production_lock: Mutex<()>,
    test_lock: Mutex<()>,
}

impl FileRecordStore {
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        if !dir.is_dir() {
            return Err(StoreError::Io(format!(
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

    fn records_path(&self, env: Environment) -> PathBuf {
        self.dir.join(format!("records_{}.jsonl", env.file_tag()))
    }

    fn append_lock(&self, env: Environment) -> &Mutex<()> {
        match env {
            Environment::Production => &self.production_lock,
            Environment::Test => &self.test_lock,
        }
    }

    fn read_all(&self, env: Environment) -> Result<Vec<ReceivingRecord>, StoreError> {
        let path = self.records_path(env);
        let contents = match std::fs::read_to_string(&path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(StoreError::Io(format!(
                    "Failed to read {}: {}",
                    path.display(),
                    e
                )))
            }
        };
        contents
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| {
                serde_json::from_str(line).map_err(|e| {
                    StoreError::Serialization(format!(
                        "Bad record row in {}: {}",
                        path.display(),
                        e
                    ))
                })
            })
            .collect()
    }
}

impl RecordStore for FileRecordStore {
    fn append(&self, record: &ReceivingRecord) -> Result<(), StoreError> {
        let env = record.environment;
        let _guard = self.append_lock(env).lock().map_lock_err()?;

        let line = serde_json::to_string(record)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;

        let path = self.records_path(env);
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| StoreError::Io(format!("Failed to open {}: {}", path.display(), e)))?;
        writeln!(file, "{}", line)
            .map_err(|e| StoreError::Io(format!("Failed to append to {}: {}", path.display(), e)))?;
        file.flush()
            .map_err(|e| StoreError::Io(format!("Failed to flush {}: {}", path.display(), e)))?;
        Ok(())
    }

    fn list(&self, env: Environment, limit: usize) -> Result<Vec<ReceivingRecord>, StoreError> {
        let mut records = self.read_all(env)?;
        records.reverse();
        records.truncate(limit);
        Ok(records)
    }

    fn find_by_reception(
        &self,
        env: Environment,
        reception_number: &str,
    ) -> Result<Option<ReceivingRecord>, StoreError> {
        Ok(self
            .read_all(env)?
            .into_iter()
            .find(|r| r.reception_number == reception_number))
    }
}
