//! Snapshot store for one entity collection.
//!
//! A refresh replaces the whole collection at once. Readers load the current
//! `Arc<Snapshot<T>>` without locking and never observe a half-applied
//! replacement.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use arc_swap::ArcSwap;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use lifeline_core::Entity;

/// Immutable view of one collection at one point in time.
#[derive(Debug)]
pub struct Snapshot<T> {
    pub items: Vec<T>,
    index: HashMap<String, usize>,
    pub version: u64,
    pub replaced_at: Option<DateTime<Utc>>,
}

impl<T: Entity> Snapshot<T> {
    fn empty() -> Self {
        Self {
            items: Vec::new(),
            index: HashMap::new(),
            version: 0,
            replaced_at: None,
        }
    }

    fn build(items: Vec<T>, version: u64, replaced_at: DateTime<Utc>) -> Self {
        let index = items
            .iter()
            .enumerate()
            .map(|(idx, item)| (item.entity_id(), idx))
            .collect();
        Self {
            items,
            index,
            version,
            replaced_at: Some(replaced_at),
        }
    }

    pub fn get(&self, id: &str) -> Option<&T> {
        self.index.get(id).map(|idx| &self.items[*idx])
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Result of one [`TelemetryStore::replace_snapshot`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplaceOutcome {
    pub version: u64,
    pub stored: usize,
    /// Records older than the last accepted one for their id
    pub stale: usize,
}

pub struct TelemetryStore<T: Entity> {
    current: ArcSwap<Snapshot<T>>,
    /// Newest accepted source timestamp per entity id
    high_water: DashMap<String, DateTime<Utc>>,
}

impl<T: Entity> Default for TelemetryStore<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Entity> TelemetryStore<T> {
    pub fn new() -> Self {
        Self {
            current: ArcSwap::from_pointee(Snapshot::empty()),
            high_water: DashMap::new(),
        }
    }

    /// Swap in a new collection.
    ///
    /// Callers must serialise replacements (the scan guard does). A record
    /// whose `observed_at` is older than the last accepted one for its id is
    /// replaced by the currently stored copy, or dropped when none is stored.
    pub fn replace_snapshot(&self, incoming: Vec<T>, at: DateTime<Utc>) -> ReplaceOutcome {
        self.replace_snapshot_retaining(incoming, &HashSet::new(), at)
    }

    /// Like [`replace_snapshot`](Self::replace_snapshot), but the high-water
    /// marks of `held` ids survive even though they are absent from
    /// `incoming`. Ids rejected by validation this cycle belong here.
    pub fn replace_snapshot_retaining(
        &self,
        incoming: Vec<T>,
        held: &HashSet<String>,
        at: DateTime<Utc>,
    ) -> ReplaceOutcome {
        let previous = self.current.load_full();
        let mut stale = 0;
        let mut items = Vec::with_capacity(incoming.len());

        for item in incoming {
            let Some(observed) = item.observed_at() else {
                items.push(item);
                continue;
            };
            let id = item.entity_id();
            let mark = self.high_water.get(&id).map(|entry| *entry.value());
            match mark {
                Some(mark) if observed < mark => {
                    stale += 1;
                    if let Some(prior) = previous.get(&id) {
                        items.push(prior.clone());
                    }
                }
                _ => {
                    self.high_water.insert(id, observed);
                    items.push(item);
                }
            }
        }

        let snapshot = Snapshot::build(items, previous.version + 1, at);
        self.high_water
            .retain(|id, _| snapshot.index.contains_key(id) || held.contains(id));
        let outcome = ReplaceOutcome {
            version: snapshot.version,
            stored: snapshot.len(),
            stale,
        };
        self.current.store(Arc::new(snapshot));
        outcome
    }

    pub fn snapshot(&self) -> Arc<Snapshot<T>> {
        self.current.load_full()
    }

    pub fn get(&self, id: &str) -> Option<T> {
        self.current.load().get(id).cloned()
    }

    pub fn list(&self) -> Vec<T> {
        self.current.load().items.clone()
    }

    pub fn version(&self) -> u64 {
        self.current.load().version
    }
}
