pub mod error;
pub mod record;
pub mod sequence;
pub mod store;

pub use error::{CatalogError, LockResultExt, ReciboError, SequenceError, StoreError};
pub use record::{Environment, Packaging, ReceivingRecord, Unit};
pub use sequence::{SequenceState, SequenceStore, Versioned};
pub use store::RecordStore;
