use crate::contracts::error::StoreError;
use crate::contracts::record::{Environment, ReceivingRecord};

/// Append-only store of submitted receiving entries.
///
/// # Invariants
/// - Records are never updated or deleted once appended.
/// - Each environment has its own isolated history.
/// - A record is only appended after both of its identifiers were allocated;
///   the store itself never fills them in.
pub trait RecordStore: Send + Sync {
    /// Appends a record to the environment's history.
    fn append(&self, record: &ReceivingRecord) -> Result<(), StoreError>;

    /// Returns up to `limit` records for an environment, newest first.
    fn list(&self, env: Environment, limit: usize) -> Result<Vec<ReceivingRecord>, StoreError>;

    /// Looks up a record by its reception number.
    fn find_by_reception(
        &self,
        env: Environment,
        reception_number: &str,
    ) -> Result<Option<ReceivingRecord>, StoreError>;
}
