use serde::{Deserialize, Serialize};

use crate::contracts::error::SequenceError;
use crate::contracts::record::Environment;

/// Shared counter record, one per environment.
///
/// `last_number` is only meaningful relative to the `year` stored alongside
/// it; the two are always read and written together. `last_reception` has no
/// year scoping and never resets.
///
/// Field names are the on-disk contract external tooling (spreadsheet
/// viewers, reset scripts) relies on. Do not rename.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SequenceState {
    pub last_number: u64,
    pub last_reception: u64,
    pub year: u16,
}

/// A state snapshot together with the store version it was read at.
///
/// The version is the optimistic-concurrency token: a write is only accepted
/// if the store still holds the version the state was read at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Versioned {
    pub version: u64,
    pub state: SequenceState,
}

/// Versioned store for per-environment sequence state.
///
/// # Invariants
/// - `load` followed by `store` with the loaded version either applies the
///   write or fails with `Conflict`; a lost update is never silent.
/// - Environments are independent; writes to one never affect the other.
/// - A healthy store with no record yet loads as the zero state at version 0.
///   An unreadable or malformed store is an error, never a zero default.
pub trait SequenceStore: Send + Sync {
    /// Reads the current state and version for an environment.
    fn load(&self, env: Environment) -> Result<Versioned, SequenceError>;

    /// Writes `state` if the store is still at `expected_version`.
    /// Fails with `SequenceError::Conflict` if another writer got there first.
    fn store(
        &self,
        env: Environment,
        expected_version: u64,
        state: &SequenceState,
    ) -> Result<(), SequenceError>;
}
