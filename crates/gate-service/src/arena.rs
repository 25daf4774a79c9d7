//! Subscriber arena shared by the log and stats feeds.
//!
//! Ids come from a counter that only moves forward, so an id handed out
//! once is never handed out again, even after its entry is removed.

use std::collections::BTreeMap;
use std::fmt;

/// Identifier of one feed subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubscriberId(u64);

impl SubscriberId {
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Subscriber entries keyed by a monotonically increasing id.
#[derive(Debug)]
pub struct SubscriberArena<T> {
    next_id: u64,
    entries: BTreeMap<SubscriberId, T>,
}

impl<T> Default for SubscriberArena<T> {
    fn default() -> Self {
        Self {
            next_id: 0,
            entries: BTreeMap::new(),
        }
    }
}

impl<T> SubscriberArena<T> {
    /// Store `entry` under a fresh id.
    pub fn insert(&mut self, entry: T) -> SubscriberId {
        let id = SubscriberId(self.next_id);
        self.next_id += 1;
        self.entries.insert(id, entry);
        id
    }

    pub fn remove(&mut self, id: SubscriberId) -> Option<T> {
        self.entries.remove(&id)
    }

    pub fn get(&self, id: SubscriberId) -> Option<&T> {
        self.entries.get(&id)
    }

    pub fn get_mut(&mut self, id: SubscriberId) -> Option<&mut T> {
        self.entries.get_mut(&id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (SubscriberId, &T)> {
        self.entries.iter().map(|(id, entry)| (*id, entry))
    }

    pub fn values_mut(&mut self) -> impl Iterator<Item = &mut T> {
        self.entries.values_mut()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
