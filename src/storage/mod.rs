mod allocator;
mod file_records;
mod file_sequence;
mod memory;
mod retry;

pub use allocator::{
    format_analysis_number, Clock, ManualClock, SequenceAllocator, SystemClock,
};
pub use file_records::FileRecordStore;
pub use file_sequence::FileSequenceStore;
pub use memory::{InMemoryRecordStore, InMemorySequenceStore};
pub use retry::{is_retryable_fetch_error, RetryConfig};
