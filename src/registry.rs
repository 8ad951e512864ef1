use crate::types::{PropKey, PropertyEventCallback, PropertyId};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tracing::debug;

/// Identifies one subscription client of the bus.
pub type ClientId = u64;

/// Registry-side handle to one continuous updater owned by the scheduler.
///
/// The stop flag is shared with the scheduler worker: setting it before the
/// Stop message is queued guarantees no delivery happens after the stopping
/// call returns, even if a tick is already in flight.
#[derive(Debug, Clone)]
pub struct UpdaterHandle {
    pub id: u64,
    pub sample_rate: f32,
    pub stopped: Arc<AtomicBool>,
}

/// Tracks, per (propId, areaId), the clients subscribed to on-change
/// notifications, and per client the set of active continuous updaters with
/// their negotiated rates.
///
/// All methods are called with the dispatcher's state lock held; fan-out
/// happens on snapshots taken here and delivered after the lock is
/// released.
#[derive(Default)]
pub struct SubscriptionRegistry {
    callbacks: HashMap<ClientId, Arc<dyn PropertyEventCallback>>,
    on_change: HashMap<PropKey, HashSet<ClientId>>,
    updaters: HashMap<ClientId, HashMap<PropKey, UpdaterHandle>>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_client(&mut self, client: ClientId, callback: Arc<dyn PropertyEventCallback>) {
        self.callbacks.insert(client, callback);
        debug!(client, "subscription client registered");
    }

    pub fn callback_of(&self, client: ClientId) -> Option<Arc<dyn PropertyEventCallback>> {
        self.callbacks.get(&client).cloned()
    }

    /// Adds the client to the (propId, areaId) entry's subscriber set,
    /// creating the entry if absent.
    pub fn subscribe_on_change(&mut self, client: ClientId, key: PropKey) {
        self.on_change.entry(key).or_default().insert(client);
    }

    /// Removes the client from every area's subscriber set for the
    /// property, deleting entries that become empty.
    pub fn unsubscribe_on_change(&mut self, client: ClientId, prop_id: PropertyId) {
        self.on_change.retain(|key, clients| {
            if key.prop_id == prop_id {
                clients.remove(&client);
            }
            !clients.is_empty()
        });
    }

    /// Snapshot of the callbacks subscribed to one (propId, areaId), taken
    /// under the lock for invocation outside it.
    pub fn snapshot_subscribers(&self, key: PropKey) -> Vec<Arc<dyn PropertyEventCallback>> {
        self.on_change
            .get(&key)
            .map(|clients| {
                clients
                    .iter()
                    .filter_map(|c| self.callbacks.get(c).cloned())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// The negotiated rate of the client's updater at this key, if one is
    /// active.
    pub fn updater_rate(&self, client: ClientId, key: PropKey) -> Option<f32> {
        self.updaters
            .get(&client)
            .and_then(|by_key| by_key.get(&key))
            .map(|h| h.sample_rate)
    }

    /// Replaces the client's updater at this key, returning the old handle
    /// for the caller to stop.
    pub fn insert_updater(
        &mut self,
        client: ClientId,
        key: PropKey,
        handle: UpdaterHandle,
    ) -> Option<UpdaterHandle> {
        self.updaters.entry(client).or_default().insert(key, handle)
    }

    /// Removes the client's updater at one key, returning the handle for
    /// the caller to stop.
    pub fn remove_updater(&mut self, client: ClientId, key: PropKey) -> Option<UpdaterHandle> {
        let by_key = self.updaters.get_mut(&client)?;
        let removed = by_key.remove(&key);
        if by_key.is_empty() {
            self.updaters.remove(&client);
        }
        removed
    }

    /// Removes every updater the client owns for the property, across all
    /// its subscribed areas.
    pub fn remove_updaters_for_prop(
        &mut self,
        client: ClientId,
        prop_id: PropertyId,
    ) -> Vec<UpdaterHandle> {
        let Some(by_key) = self.updaters.get_mut(&client) else {
            return Vec::new();
        };
        let keys: Vec<PropKey> = by_key
            .keys()
            .filter(|k| k.prop_id == prop_id)
            .copied()
            .collect();
        let removed = keys.iter().filter_map(|k| by_key.remove(k)).collect();
        if by_key.is_empty() {
            self.updaters.remove(&client);
        }
        removed
    }

    /// Tears down everything the client owns: its callback, its on-change
    /// registrations, and its continuous updaters, which are returned for
    /// the caller to stop.
    pub fn remove_client(&mut self, client: ClientId) -> Vec<UpdaterHandle> {
        self.callbacks.remove(&client);
        self.on_change.retain(|_, clients| {
            clients.remove(&client);
            !clients.is_empty()
        });
        let removed = self
            .updaters
            .remove(&client)
            .map(|by_key| by_key.into_values().collect())
            .unwrap_or_default();
        debug!(client, "subscription client removed");
        removed
    }

    /// Number of distinct (propId, areaId) entries with at least one
    /// on-change subscriber.
    pub fn on_change_entry_count(&self) -> usize {
        self.on_change.len()
    }
}
