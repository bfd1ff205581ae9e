//! Table-backed high/low identifier allocation.
//!
//! Each named block (one per entity type, e.g. `"users"`) owns a counter row
//! holding the next unused *high* value. An allocator claims a high value with
//! a single conditional write and then hands out `max_low` ids from it without
//! touching storage:
//!
//! ```text
//! id = high * max_low + low        0 <= low < max_low
//! ```
//!
//! Claimed high values are never released. An instance that stops half-way
//! through a block wastes the remainder, so ids are unique and increasing per
//! instance but not contiguous across restarts.
//!
//! The id `0` is never issued: when the claimed high is `0` the block starts
//! at low `1`. Ids never exceed `i64::MAX`, the largest key an SQL `INTEGER`
//! column stores; past that `next_id` fails with [`AllocError::Overflow`].

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use hilo_core::{CasOutcome, CounterStore, RepoError};
use parking_lot::Mutex;

#[cfg(feature = "tracing")]
use tracing::{debug, warn};

/// Largest id the allocator issues.
pub const MAX_ID: u64 = i64::MAX as u64;

/// Tuning knobs for [`HiLoAllocator`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllocatorConfig {
    /// Ids handed out per claimed high value.
    pub max_low: u64,
    /// Claim attempts before giving up with [`AllocError::Contended`].
    pub max_attempts: u32,
    /// Sleep before the second attempt; doubles on each further attempt.
    pub backoff_base: Duration,
}

impl Default for AllocatorConfig {
    fn default() -> Self {
        Self {
            max_low: 1000,
            max_attempts: 5,
            backoff_base: Duration::from_millis(10),
        }
    }
}

impl AllocatorConfig {
    pub fn with_max_low(mut self, max_low: u64) -> Self {
        self.max_low = max_low;
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn with_backoff_base(mut self, backoff_base: Duration) -> Self {
        self.backoff_base = backoff_base;
        self
    }

    pub fn validate(&self) -> Result<(), AllocError> {
        if self.max_low == 0 {
            return Err(AllocError::InvalidConfig("max_low must be at least 1"));
        }
        if self.max_attempts == 0 {
            return Err(AllocError::InvalidConfig("max_attempts must be at least 1"));
        }
        Ok(())
    }

    fn backoff(&self, attempt: u32) -> Duration {
        let shift = attempt.saturating_sub(1).min(16);
        self.backoff_base.saturating_mul(1u32 << shift)
    }
}

/// Why no id could be issued.
#[derive(Debug, thiserror::Error)]
pub enum AllocError {
    /// Every claim attempt lost the race to another allocator instance.
    #[error("no high value claimed for block `{block}` after {attempts} attempts")]
    Contended { block: String, attempts: u32 },
    /// The counter store failed while claiming a high value.
    #[error("counter store failed while claiming a high value for block `{block}`")]
    Store {
        block: String,
        #[source]
        source: RepoError,
    },
    /// The stored counter holds a value no allocator could have written.
    #[error("counter for block `{block}` holds invalid value {value}")]
    CorruptCounter { block: String, value: i64 },
    /// The next id would exceed [`MAX_ID`].
    #[error("id space exhausted for block `{block}` at high value {high}")]
    Overflow { block: String, high: u64 },
    #[error("invalid allocator config: {0}")]
    InvalidConfig(&'static str),
}

/// Point-in-time view of one block's in-memory state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockSnapshot {
    pub current_high: u64,
    /// The low value the next id will use.
    pub current_low: u64,
}

#[derive(Debug, Default)]
struct BlockState {
    high: Option<u64>,
    low: u64,
}

/// Issues unique ids per block, claiming high values from a [`CounterStore`].
///
/// Calls for the same block are serialized by a per-block async mutex; calls
/// for different blocks proceed independently. Several allocators (in one or
/// many processes) may share a store: the store's compare-and-swap is the only
/// coordination between them.
pub struct HiLoAllocator<C> {
    store: C,
    config: AllocatorConfig,
    blocks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<BlockState>>>>,
}

impl<C> HiLoAllocator<C>
where
    C: CounterStore + Send + Sync,
{
    pub fn new(store: C, config: AllocatorConfig) -> Result<Self, AllocError> {
        config.validate()?;
        Ok(Self {
            store,
            config,
            blocks: Mutex::new(HashMap::new()),
        })
    }

    pub fn config(&self) -> &AllocatorConfig {
        &self.config
    }

    pub fn store(&self) -> &C {
        &self.store
    }

    fn block(&self, block: &str) -> Arc<tokio::sync::Mutex<BlockState>> {
        let mut blocks = self.blocks.lock();
        match blocks.get(block) {
            Some(slot) => Arc::clone(slot),
            None => {
                let slot = Arc::new(tokio::sync::Mutex::new(BlockState::default()));
                blocks.insert(block.to_string(), Arc::clone(&slot));
                slot
            }
        }
    }

    /// Issue the next id for `block`.
    ///
    /// Touches storage only on the first call for a block and whenever the
    /// current block of `max_low` ids is used up. On error no id is issued and
    /// the in-memory state is unchanged, so the call can simply be retried.
    pub async fn next_id(&self, block: &str) -> Result<u64, AllocError> {
        let slot = self.block(block);
        let mut state = slot.lock().await;
        loop {
            if let Some(high) = state.high {
                if state.low < self.config.max_low {
                    let id = high
                        .checked_mul(self.config.max_low)
                        .and_then(|base| base.checked_add(state.low))
                        .filter(|id| *id <= MAX_ID)
                        .ok_or_else(|| AllocError::Overflow {
                            block: block.to_string(),
                            high,
                        })?;
                    state.low += 1;
                    return Ok(id);
                }
            }
            let high = self.claim_high(block).await?;
            state.high = Some(high);
            state.low = if high == 0 { 1 } else { 0 };
        }
    }

    /// Current in-memory state of `block`, or `None` before its first claim.
    pub async fn snapshot(&self, block: &str) -> Option<BlockSnapshot> {
        let slot = self.blocks.lock().get(block).cloned()?;
        let state = slot.lock().await;
        state.high.map(|current_high| BlockSnapshot {
            current_high,
            current_low: state.low,
        })
    }

    async fn claim_high(&self, block: &str) -> Result<u64, AllocError> {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            if let Some(high) = self.try_claim(block).await? {
                #[cfg(feature = "tracing")]
                debug!(block, high, attempt, "claimed high value");
                #[cfg(feature = "metrics")]
                metrics::counter!("hilo_high_claims_total", 1, "block" => block.to_string());
                return Ok(high);
            }
            #[cfg(feature = "metrics")]
            metrics::counter!("hilo_claim_conflicts_total", 1, "block" => block.to_string());
            if attempt >= self.config.max_attempts {
                #[cfg(feature = "tracing")]
                warn!(block, attempts = attempt, "giving up on contended block");
                return Err(AllocError::Contended {
                    block: block.to_string(),
                    attempts: attempt,
                });
            }
            #[cfg(feature = "tracing")]
            debug!(block, attempt, "high value claim lost a race, backing off");
            tokio::time::sleep(self.config.backoff(attempt)).await;
        }
    }

    /// One claim round. `Ok(None)` means another instance won the race.
    async fn try_claim(&self, block: &str) -> Result<Option<u64>, AllocError> {
        let store_err = |source| AllocError::Store {
            block: block.to_string(),
            source,
        };
        match self.store.load(block).await.map_err(store_err)? {
            None => {
                let outcome = self
                    .store
                    .insert_if_absent(block, 1)
                    .await
                    .map_err(store_err)?;
                Ok(outcome.is_swapped().then_some(0))
            }
            Some(stored) => {
                let high = u64::try_from(stored).map_err(|_| AllocError::CorruptCounter {
                    block: block.to_string(),
                    value: stored,
                })?;
                let next = stored.checked_add(1).ok_or_else(|| AllocError::Overflow {
                    block: block.to_string(),
                    high,
                })?;
                match self
                    .store
                    .compare_and_swap(block, stored, next)
                    .await
                    .map_err(store_err)?
                {
                    CasOutcome::Swapped => Ok(Some(high)),
                    CasOutcome::Conflict => Ok(None),
                }
            }
        }
    }
}
