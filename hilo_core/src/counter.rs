//! Persistent high-value counters backing the hi/lo allocator.
//!
//! A counter row is keyed by a block name and holds the next unused high
//! value. The only mutation primitives are an insert that never overwrites and
//! a conditional compare-and-swap, so two allocator instances can never both
//! observe success for the same value.

use crate::{async_trait, RepoResult};

/// Result of a conditional write against a counter row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CasOutcome {
    /// The write was applied.
    Swapped,
    /// The stored state did not match the expectation; nothing was written.
    Conflict,
}

impl CasOutcome {
    pub fn is_swapped(self) -> bool {
        matches!(self, CasOutcome::Swapped)
    }
}

/// Durable storage for named high-value counters.
#[async_trait]
pub trait CounterStore {
    /// Read the stored next high value for `block`, or `None` if the block
    /// has never been claimed.
    async fn load(&self, block: &str) -> RepoResult<Option<i64>>;

    /// Create the counter row for `block` holding `value`. Returns
    /// [`CasOutcome::Conflict`] if a row already exists.
    async fn insert_if_absent(&self, block: &str, value: i64) -> RepoResult<CasOutcome>;

    /// Atomically replace `expected` with `new`. Returns
    /// [`CasOutcome::Conflict`] if the stored value differs from `expected`
    /// or the row does not exist.
    async fn compare_and_swap(&self, block: &str, expected: i64, new: i64)
        -> RepoResult<CasOutcome>;
}

#[async_trait]
impl<C> CounterStore for std::sync::Arc<C>
where
    C: CounterStore + Send + Sync + ?Sized,
{
    async fn load(&self, block: &str) -> RepoResult<Option<i64>> {
        (**self).load(block).await
    }

    async fn insert_if_absent(&self, block: &str, value: i64) -> RepoResult<CasOutcome> {
        (**self).insert_if_absent(block, value).await
    }

    async fn compare_and_swap(
        &self,
        block: &str,
        expected: i64,
        new: i64,
    ) -> RepoResult<CasOutcome> {
        (**self).compare_and_swap(block, expected, new).await
    }
}
