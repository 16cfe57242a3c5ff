//! Reference-counted group registry.
//!
//! Maps each group key to the number of connections bound to it. An entry
//! exists only while its count is at least one, so the number of entries is
//! the number of distinct online users and the running total is the number
//! of online connections.

use crate::group::GroupKey;
use std::collections::HashMap;
use tracing::{trace, warn};

/// Live member counts per group key.
#[derive(Debug, Default)]
pub struct GroupRegistry {
    counts: HashMap<GroupKey, usize>,
    total: usize,
}

impl GroupRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one member to `key`, creating the entry at 1 if absent.
    pub fn bind(&mut self, key: &GroupKey) {
        let count = self.counts.entry(key.clone()).or_insert(0);
        *count += 1;
        self.total += 1;
        trace!(group = %key, members = *count, "Bound");
    }

    /// Remove one member from `key`, dropping the entry when it reaches zero.
    ///
    /// Unbinding an absent key is a no-op.
    pub fn unbind(&mut self, key: &GroupKey) {
        let Some(count) = self.counts.get_mut(key) else {
            warn!(group = %key, "Unbind of unknown group ignored");
            return;
        };

        *count = count.saturating_sub(1);
        self.total = self.total.saturating_sub(1);
        trace!(group = %key, members = *count, "Unbound");

        if *count == 0 {
            self.counts.remove(key);
        }
    }

    /// Current member count for `key`, 0 if absent.
    #[must_use]
    pub fn count_of(&self, key: &str) -> usize {
        self.counts.get(key).copied().unwrap_or(0)
    }

    /// Number of groups with at least one member.
    #[must_use]
    pub fn distinct_keys(&self) -> usize {
        self.counts.len()
    }

    /// Sum of all member counts.
    #[must_use]
    pub fn total_members(&self) -> usize {
        self.total
    }

    /// Check if no group has members.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    /// Iterate over `(key, count)` entries.
    pub fn iter(&self) -> impl Iterator<Item = (&GroupKey, usize)> {
        self.counts.iter().map(|(k, c)| (k, *c))
    }
}
