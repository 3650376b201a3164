use std::sync::Arc;

use crate::contracts::{Environment, SequenceError, SequenceState, SequenceStore, Versioned};

/// Wall-clock source for year scoping. Injectable so rollover is testable.
pub trait Clock: Send + Sync {
    /// Current two-digit calendar year (e.g. 26 for 2026).
    fn two_digit_year(&self) -> u16;
}

/// Clock backed by local wall-clock time.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn two_digit_year(&self) -> u16 {
        use chrono::Datelike;
        (chrono::Local::now().year() % 100) as u16
    }
}

/// Clock pinned to a settable year, for rollover tests.
#[derive(Debug)]
pub struct ManualClock {
    year: std::sync::atomic::AtomicU16,
}

impl ManualClock {
    pub fn new(year: u16) -> Self {
        Self {
            year: std::sync::atomic::AtomicU16::new(year),
        }
    }

    pub fn set_year(&self, year: u16) {
        self.year.store(year, std::sync::atomic::Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn two_digit_year(&self) -> u16 {
        self.year.load(std::sync::atomic::Ordering::SeqCst)
    }
}

/// Formats an analysis number as printed on the quarantine label.
pub fn format_analysis_number(number: u64, year: u16) -> String {
    format!("{:04}/{:02}", number, year)
}

/// Hands out unique, strictly increasing identifiers per environment.
///
/// Every allocation is a read-increment-CAS cycle against the backing
/// [`SequenceStore`]; a version conflict means another submission won the
/// race, and the whole cycle is retried from a fresh read. Two racing callers
/// therefore always receive distinct values — the losing side re-reads the
/// winner's state and increments past it.
///
/// # Invariants
/// - Analysis numbers are unique and strictly increasing within a
///   (environment, year) pair, with no skips.
/// - The analysis counter resets to 1 on year rollover. Deliberate policy:
///   label identifiers restart each calendar year.
/// - Reception numbers increment forever and never reset.
pub struct SequenceAllocator<S: SequenceStore> {
    store: Arc<S>,
    clock: Arc<dyn Clock>,
    max_retries: usize,
}

/// Conflict retries before giving up and reporting `Conflict` to the caller.
const DEFAULT_MAX_RETRIES: usize = 5;

impl<S: SequenceStore> SequenceAllocator<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self::with_clock(store, Arc::new(SystemClock))
    }

    pub fn with_clock(store: Arc<S>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            clock,
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }

    pub fn with_max_retries(mut self, max_retries: usize) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Allocates the next analysis number for `env`, formatted `NNNN/YY`.
    ///
    /// If the stored year differs from the current year the counter restarts
    /// at 1 under the new year; otherwise it increments by one.
    pub fn allocate_analysis_number(&self, env: Environment) -> Result<String, SequenceError> {
        self.read_modify_write(env, |state| {
            let year = self.clock.two_digit_year();
            if state.year != year {
                state.year = year;
                state.last_number = 1;
            } else {
                state.last_number = state
                    .last_number
                    .checked_add(1)
                    .ok_or(SequenceError::Overflow)?;
            }
            Ok(format_analysis_number(state.last_number, state.year))
        })
    }

    /// Allocates the next reception number for `env`, as a decimal string.
    /// No year scoping, no reset policy.
    pub fn allocate_reception_number(&self, env: Environment) -> Result<String, SequenceError> {
        self.read_modify_write(env, |state| {
            state.last_reception = state
                .last_reception
                .checked_add(1)
                .ok_or(SequenceError::Overflow)?;
            Ok(state.last_reception.to_string())
        })
    }

    /// Administrative reset: both counters to zero, year to the current year.
    ///
    /// Only ever invoked through the authenticated admin surface — this is
    /// the one sanctioned way to re-initialize a corrupt or migrated store.
    pub fn reset(&self, env: Environment) -> Result<SequenceState, SequenceError> {
        let year = self.clock.two_digit_year();
        let zeroed = SequenceState {
            last_number: 0,
            last_reception: 0,
            year,
        };
        let mut attempts = 0;
        loop {
            let Versioned { version, .. } = match self.store.load(env) {
                Ok(v) => v,
                // Reset is the recovery path for a corrupt record, so a
                // corrupt load starts from version 0 rather than failing.
                Err(SequenceError::Corrupt(_)) => Versioned {
                    version: 0,
                    state: SequenceState::default(),
                },
                Err(e) => return Err(e),
            };
            match self.store.store(env, version, &zeroed) {
                Ok(()) => {
                    tracing::info!(env = %env, year, "Sequence counters reset");
                    return Ok(zeroed);
                }
                Err(SequenceError::Conflict) if attempts < self.max_retries => {
                    attempts += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Current state without incrementing. Used by the form's
    /// next-reception-number preview.
    pub fn current(&self, env: Environment) -> Result<SequenceState, SequenceError> {
        Ok(self.store.load(env)?.state)
    }

    /// Runs one allocation cycle: load, mutate, CAS-write, retry on conflict.
    fn read_modify_write<T>(
        &self,
        env: Environment,
        mutate: impl Fn(&mut SequenceState) -> Result<T, SequenceError>,
    ) -> Result<T, SequenceError> {
        let mut attempts = 0;
        loop {
            let Versioned { version, mut state } = self.store.load(env)?;
            let out = mutate(&mut state)?;
            match self.store.store(env, version, &state) {
                Ok(()) => return Ok(out),
                Err(SequenceError::Conflict) if attempts < self.max_retries => {
                    attempts += 1;
                    tracing::debug!(env = %env, attempts, "Sequence write conflict, retrying");
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::InMemorySequenceStore;

    fn allocator_at_year(year: u16) -> (SequenceAllocator<InMemorySequenceStore>, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(year));
        let store = Arc::new(InMemorySequenceStore::new());
        (
            SequenceAllocator::with_clock(store, Arc::clone(&clock) as Arc<dyn Clock>),
            clock,
        )
    }

    #[test]
    fn analysis_numbers_count_up_from_one() {
        let (alloc, _) = allocator_at_year(26);
        for n in 1..=12u64 {
            let number = alloc
                .allocate_analysis_number(Environment::Production)
                .unwrap();
            assert_eq!(number, format!("{:04}/26", n));
        }
    }

    #[test]
    fn year_rollover_resets_analysis_counter() {
        let (alloc, clock) = allocator_at_year(25);
        for _ in 0..42 {
            alloc
                .allocate_analysis_number(Environment::Production)
                .unwrap();
        }
        clock.set_year(26);
        assert_eq!(
            alloc
                .allocate_analysis_number(Environment::Production)
                .unwrap(),
            "0001/26"
        );
        assert_eq!(
            alloc
                .allocate_analysis_number(Environment::Production)
                .unwrap(),
            "0002/26"
        );
    }

    #[test]
    fn reception_numbers_survive_year_rollover() {
        let (alloc, clock) = allocator_at_year(25);
        for _ in 0..99 {
            alloc
                .allocate_reception_number(Environment::Production)
                .unwrap();
        }
        clock.set_year(26);
        assert_eq!(
            alloc
                .allocate_reception_number(Environment::Production)
                .unwrap(),
            "100"
        );
    }

    #[test]
    fn environments_have_independent_counters() {
        let (alloc, _) = allocator_at_year(26);
        for _ in 0..3 {
            alloc.allocate_analysis_number(Environment::Test).unwrap();
            alloc.allocate_reception_number(Environment::Test).unwrap();
        }
        assert_eq!(
            alloc
                .allocate_analysis_number(Environment::Production)
                .unwrap(),
            "0001/26"
        );
        assert_eq!(
            alloc
                .allocate_reception_number(Environment::Production)
                .unwrap(),
            "1"
        );
    }

    #[test]
    fn reset_zeroes_both_counters_under_current_year() {
        let (alloc, _) = allocator_at_year(26);
        for _ in 0..7 {
            alloc
                .allocate_analysis_number(Environment::Production)
                .unwrap();
            alloc
                .allocate_reception_number(Environment::Production)
                .unwrap();
        }
        let state = alloc.reset(Environment::Production).unwrap();
        assert_eq!(
            state,
            SequenceState {
                last_number: 0,
                last_reception: 0,
                year: 26
            }
        );
        assert_eq!(
            alloc
                .allocate_analysis_number(Environment::Production)
                .unwrap(),
            "0001/26"
        );
        assert_eq!(
            alloc
                .allocate_reception_number(Environment::Production)
                .unwrap(),
            "1"
        );
    }

    #[test]
    fn current_does_not_increment() {
        let (alloc, _) = allocator_at_year(26);
        alloc
            .allocate_reception_number(Environment::Production)
            .unwrap();
        let before = alloc.current(Environment::Production).unwrap();
        let again = alloc.current(Environment::Production).unwrap();
        assert_eq!(before, again);
        assert_eq!(before.last_reception, 1);
    }

    #[test]
    fn unavailable_store_blocks_allocation() {
        struct DownStore;
        impl SequenceStore for DownStore {
            fn load(&self, _env: Environment) -> Result<Versioned, SequenceError> {
                Err(SequenceError::Unavailable("network down".into()))
            }
            fn store(
                &self,
                _env: Environment,
                _expected_version: u64,
                _state: &SequenceState,
            ) -> Result<(), SequenceError> {
                Err(SequenceError::Unavailable("network down".into()))
            }
        }

        let alloc = SequenceAllocator::with_clock(Arc::new(DownStore), Arc::new(ManualClock::new(26)));
        let err = alloc
            .allocate_analysis_number(Environment::Production)
            .unwrap_err();
        assert!(matches!(err, SequenceError::Unavailable(_)));
    }

    #[test]
    fn conflict_is_surfaced_after_bounded_retries() {
        struct AlwaysConflict;
        impl SequenceStore for AlwaysConflict {
            fn load(&self, _env: Environment) -> Result<Versioned, SequenceError> {
                Ok(Versioned {
                    version: 1,
                    state: SequenceState::default(),
                })
            }
            fn store(
                &self,
                _env: Environment,
                _expected_version: u64,
                _state: &SequenceState,
            ) -> Result<(), SequenceError> {
                Err(SequenceError::Conflict)
            }
        }

        let alloc =
            SequenceAllocator::with_clock(Arc::new(AlwaysConflict), Arc::new(ManualClock::new(26)))
                .with_max_retries(3);
        let err = alloc
            .allocate_analysis_number(Environment::Production)
            .unwrap_err();
        assert!(matches!(err, SequenceError::Conflict));
    }

    #[test]
    fn conflict_retry_rereads_fresh_state() {
        // One losing CAS, then success: the retry must observe the winner's
        // increment instead of re-submitting its stale value.
        use std::sync::Mutex;

        struct FlakyStore {
            inner: InMemorySequenceStore,
            conflicted_once: Mutex<bool>,
        }
        impl SequenceStore for FlakyStore {
            fn load(&self, env: Environment) -> Result<Versioned, SequenceError> {
                self.inner.load(env)
            }
            fn store(
                &self,
                env: Environment,
                expected_version: u64,
                state: &SequenceState,
            ) -> Result<(), SequenceError> {
                let mut done = self.conflicted_once.lock().unwrap();
                if !*done {
                    *done = true;
                    // Simulate a racing writer landing first.
                    let winner = SequenceState {
                        last_number: 1,
                        last_reception: 0,
                        year: 26,
                    };
                    self.inner.store(env, expected_version, &winner)?;
                    return Err(SequenceError::Conflict);
                }
                self.inner.store(env, expected_version, state)
            }
        }

        let store = Arc::new(FlakyStore {
            inner: InMemorySequenceStore::new(),
            conflicted_once: Mutex::new(false),
        });
        let alloc = SequenceAllocator::with_clock(store, Arc::new(ManualClock::new(26)));
        assert_eq!(
            alloc
                .allocate_analysis_number(Environment::Production)
                .unwrap(),
            "0002/26"
        );
    }

    #[test]
    fn format_pads_to_four_digits() {
        assert_eq!(format_analysis_number(7, 26), "0007/26");
        assert_eq!(format_analysis_number(1234, 5), "1234/05");
        assert_eq!(format_analysis_number(10000, 26), "10000/26");
    }
}
