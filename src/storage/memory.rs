use std::sync::Mutex;

use dashmap::DashMap;

use crate::contracts::{
    Environment, LockResultExt, ReceivingRecord, RecordStore, SequenceError, SequenceState,
    SequenceStore, StoreError, Versioned,
};

/// In-memory sequence store with compare-and-swap semantics.
///
/// The per-environment map entry is held exclusively for the duration of the
/// version check and write, so a stale writer always observes `Conflict`.
/// Used by tests and as the single-process reference implementation.
#[derive(Default)]
pub struct InMemorySequenceStore {
    states: DashMap<Environment, Versioned>,
}

impl InMemorySequenceStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SequenceStore for InMemorySequenceStore {
    fn load(&self, env: Environment) -> Result<Versioned, SequenceError> {
        Ok(self.states.get(&env).map(|v| *v).unwrap_or(Versioned {
            version: 0,
            state: SequenceState::default(),
        }))
    }

    fn store(
        &self,
        env: Environment,
        expected_version: u64,
        state: &SequenceState,
    ) -> Result<(), SequenceError> {
        let mut entry = self.states.entry(env).or_insert(Versioned {
            version: 0,
            state: SequenceState::default(),
        });
        if entry.version != expected_version {
            return Err(SequenceError::Conflict);
        }
        *entry = Versioned {
            version: expected_version + 1,
            state: *state,
        };
        Ok(())
    }
}

/// In-memory append-only record store for tests.
#[derive(Default)]
pub struct InMemoryRecordStore {
    records: Mutex<Vec<ReceivingRecord>>,
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RecordStore for InMemoryRecordStore {
    fn append(&self, record: &ReceivingRecord) -> Result<(), StoreError> {
        self.records.lock().map_lock_err()?.push(record.clone());
        Ok(())
    }

    fn list(&self, env: Environment, limit: usize) -> Result<Vec<ReceivingRecord>, StoreError> {
        Ok(self
            .records
            .lock()
            .map_lock_err()?
            .iter()
            .rev()
            .filter(|r| r.environment == env)
            .take(limit)
            .cloned()
            .collect())
    }

    fn find_by_reception(
        &self,
        env: Environment,
        reception_number: &str,
    ) -> Result<Option<ReceivingRecord>, StoreError> {
        Ok(self
            .records
            .lock()
            .map_lock_err()?
            .iter()
            .find(|r| r.environment == env && r.reception_number == reception_number)
            .cloned())
    }
}
