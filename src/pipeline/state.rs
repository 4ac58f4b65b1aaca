//! In-memory latest-state table with dirty tracking
//!
//! The table and the dirty set live behind one mutex so that an update can
//! never be both "new for the next cycle" and "already flushed" for the
//! current one. The lock is held only while the map/set is mutated or the
//! drained entries are copied out; serialization and I/O happen elsewhere.

use super::config::EqualTimestampPolicy;
use super::types::{DeviceId, EntitySnapshot, EntityState, FlushBatch, LocationEvent};
use std::collections::{BTreeSet, HashMap};
use std::sync::{Mutex, MutexGuard};

/// Result of offering an event to the store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// State replaced and key marked dirty
    Accepted,
    /// Event was not newer than what is stored; nothing changed
    Stale,
}

impl UpdateOutcome {
    pub fn accepted(self) -> bool {
        matches!(self, UpdateOutcome::Accepted)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreStats {
    pub accepted: u64,
    pub stale: u64,
    pub drains: u64,
    pub requeued: u64,
}

#[derive(Debug, Default)]
struct Inner {
    latest: HashMap<DeviceId, EntityState>,
    dirty: BTreeSet<DeviceId>,
    /// Drained but not yet acknowledged as written
    in_flight: BTreeSet<DeviceId>,
    stats: StoreStats,
}

/// Latest known state per device plus the keys changed since the last drain
#[derive(Debug, Default)]
pub struct StateStore {
    inner: Mutex<Inner>,
    policy: EqualTimestampPolicy,
}

impl StateStore {
    pub fn new(policy: EqualTimestampPolicy) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            policy,
        }
    }

    // A panic while holding the lock cannot leave a half-written entry
    // (insert is a single move), so a poisoned guard is still usable.
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Offer an event; accepted iff the device is unknown or the event is newer
    pub fn update(&self, event: &LocationEvent) -> UpdateOutcome {
        let mut inner = self.lock();

        let newer = match inner.latest.get(&event.device_id) {
            None => true,
            Some(current) => match self.policy {
                EqualTimestampPolicy::Reject => event.event_time > current.event_time,
                EqualTimestampPolicy::Accept => event.event_time >= current.event_time,
            },
        };

        if !newer {
            inner.stats.stale += 1;
            return UpdateOutcome::Stale;
        }

        inner
            .latest
            .insert(event.device_id.clone(), EntityState::from_event(event));
        if !inner.dirty.contains(&event.device_id) {
            inner.dirty.insert(event.device_id.clone());
        }
        inner.stats.accepted += 1;
        UpdateOutcome::Accepted
    }

    /// Take and clear the dirty set, returning a snapshot of those entries
    pub fn drain_dirty(&self) -> FlushBatch {
        let mut inner = self.lock();
        if inner.dirty.is_empty() {
            return FlushBatch::default();
        }

        let dirty = std::mem::take(&mut inner.dirty);
        inner.stats.drains += 1;
        inner.in_flight.extend(dirty.iter().cloned());

        let snapshots = dirty
            .into_iter()
            .filter_map(|device_id| {
                let state = inner.latest.get(&device_id)?.clone();
                Some(EntitySnapshot { device_id, state })
            })
            .collect();

        FlushBatch::new(snapshots)
    }

    /// Mark keys dirty again after their batch could not be written
    ///
    /// The next drain re-reads the table, so a key that was updated in the
    /// meantime is written with its newer state.
    pub fn requeue<'a, I>(&self, keys: I) -> usize
    where
        I: IntoIterator<Item = &'a DeviceId>,
    {
        let mut inner = self.lock();
        let mut count = 0;
        for key in keys {
            inner.in_flight.remove(key);
            if inner.latest.contains_key(key) {
                inner.dirty.insert(key.clone());
                count += 1;
            }
        }
        inner.stats.requeued += count as u64;
        count
    }

    /// Clear drained keys once their batch has reached the sink
    pub fn acknowledge<'a, I>(&self, keys: I)
    where
        I: IntoIterator<Item = &'a DeviceId>,
    {
        let mut inner = self.lock();
        for key in keys {
            inner.in_flight.remove(key);
        }
    }

    /// Re-mark every drained-but-unacknowledged key dirty
    ///
    /// Used when a write was abandoned mid-flight, so those devices are
    /// counted as pending instead of vanishing with the cancelled batch.
    pub fn requeue_in_flight(&self) -> usize {
        let mut inner = self.lock();
        let keys = std::mem::take(&mut inner.in_flight);
        let count = keys.len();
        inner.dirty.extend(keys);
        inner.stats.requeued += count as u64;
        count
    }

    pub fn get(&self, device_id: &str) -> Option<EntityState> {
        self.lock().latest.get(device_id).cloned()
    }

    /// Number of devices ever observed
    pub fn len(&self) -> usize {
        self.lock().latest.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().latest.is_empty()
    }

    pub fn dirty_len(&self) -> usize {
        self.lock().dirty.len()
    }

    pub fn in_flight_len(&self) -> usize {
        self.lock().in_flight.len()
    }

    pub fn stats(&self) -> StoreStats {
        self.lock().stats
    }
}
