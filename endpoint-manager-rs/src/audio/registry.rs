//! Device registry.
//!
//! Owns the id -> record map and the id -> subscription map as one unit.
//! The registry itself is not synchronized; the endpoint manager keeps it
//! behind a single mutex so both maps change together.

use super::backend::{DeviceBackend, VolumeHandler};
use super::device::{AudioError, DeviceRecord, Direction};
use super::subscription::{SubscriptionHandle, Subscriptions};
use std::collections::HashMap;

/// A tracked endpoint: the cached record plus the native handle commands write through.
pub(crate) struct TrackedDevice<D> {
    pub record: DeviceRecord,
    pub device: D,
}

pub(crate) struct Registry<D, S> {
    records: HashMap<String, TrackedDevice<D>>,
    subscriptions: Subscriptions<S>,
}

impl<D: Clone, S: Send + 'static> Registry<D, S> {
    pub(crate) fn new() -> Self {
        Self {
            records: HashMap::new(),
            subscriptions: Subscriptions::new(),
        }
    }

    /// Start tracking a device: attach its volume subscription, then insert its record.
    ///
    /// Nothing is inserted if the attach fails, and an id that is already
    /// tracked is rejected with `AlreadyAttached` before the backend is called.
    pub(crate) fn track<B>(
        &mut self,
        backend: &B,
        tracked: TrackedDevice<D>,
        make_handler: impl FnOnce(u64) -> VolumeHandler,
    ) -> Result<u64, AudioError>
    where
        B: DeviceBackend<Device = D, Subscription = S>,
    {
        let id = tracked.record.id.clone();
        if self.records.contains_key(&id) {
            return Err(AudioError::AlreadyAttached { device_id: id });
        }
        let generation = self
            .subscriptions
            .attach(backend, &tracked.device, &id, make_handler)?;
        if tracked.record.is_default {
            self.clear_defaults(tracked.record.direction);
        }
        self.upsert(tracked);
        Ok(generation)
    }

    /// Stop tracking a device. Returns the removed record and its detached
    /// subscription; both are `None` if the id was not tracked.
    pub(crate) fn untrack(
        &mut self,
        device_id: &str,
    ) -> (Option<DeviceRecord>, Option<SubscriptionHandle<S>>) {
        let handle = self.subscriptions.detach(device_id);
        (self.remove(device_id), handle)
    }

    /// Detach every subscription and clear every record.
    pub(crate) fn drain(&mut self) -> Vec<SubscriptionHandle<S>> {
        self.records.clear();
        self.subscriptions.drain()
    }

    pub(crate) fn get(&self, device_id: &str) -> Option<&DeviceRecord> {
        self.records.get(device_id).map(|t| &t.record)
    }

    pub(crate) fn get_mut(&mut self, device_id: &str) -> Option<&mut DeviceRecord> {
        self.records.get_mut(device_id).map(|t| &mut t.record)
    }

    /// Native handle of a tracked device, cloned so it can be used after the lock is released.
    pub(crate) fn device(&self, device_id: &str) -> Option<D> {
        self.records.get(device_id).map(|t| t.device.clone())
    }

    pub(crate) fn contains(&self, device_id: &str) -> bool {
        self.records.contains_key(device_id)
    }

    /// Clear `is_default` on every record of `direction`.
    pub(crate) fn clear_defaults(&mut self, direction: Direction) {
        for tracked in self.records.values_mut() {
            if tracked.record.direction == direction {
                tracked.record.is_default = false;
            }
        }
    }

    /// Mark `device_id` as the only default of `direction`. Returns false if
    /// the id is untracked or belongs to the other direction; defaults of
    /// `direction` are cleared either way.
    pub(crate) fn set_default(&mut self, direction: Direction, device_id: Option<&str>) -> bool {
        self.clear_defaults(direction);
        match device_id.and_then(|id| self.get_mut(id)) {
            Some(record) if record.direction == direction => {
                record.is_default = true;
                true
            }
            _ => false,
        }
    }

    /// Copy of every record, ordered by id.
    pub(crate) fn snapshot(&self) -> Vec<DeviceRecord> {
        let mut records: Vec<DeviceRecord> =
            self.records.values().map(|t| t.record.clone()).collect();
        records.sort_by(|a, b| a.id.cmp(&b.id));
        records
    }

    pub(crate) fn ids(&self) -> Vec<String> {
        self.records.keys().cloned().collect()
    }

    pub(crate) fn subscription_generation(&self, device_id: &str) -> Option<u64> {
        self.subscriptions.generation_of(device_id)
    }

    pub(crate) fn subscription_count(&self) -> usize {
        self.subscriptions.len()
    }

    pub(crate) fn len(&self) -> usize {
        self.records.len()
    }

    /// True when every record has exactly one subscription and vice versa.
    pub(crate) fn is_consistent(&self) -> bool {
        self.records.len() == self.subscriptions.len()
            && self.subscriptions.ids().all(|id| self.records.contains_key(id))
            && self.records.keys().all(|id| self.subscriptions.contains(id))
    }

    fn upsert(&mut self, tracked: TrackedDevice<D>) -> Option<TrackedDevice<D>> {
        self.records.insert(tracked.record.id.clone(), tracked)
    }

    fn remove(&mut self, device_id: &str) -> Option<DeviceRecord> {
        self.records.remove(device_id).map(|t| t.record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::device::VolumeState;
    use crate::audio::memory::{MemoryBackend, MemoryDevice, MemorySubscription};

    type TestRegistry = Registry<MemoryDevice, MemorySubscription>;

    fn tracked(backend: &MemoryBackend, id: &str, direction: Direction, is_default: bool) -> TrackedDevice<MemoryDevice> {
        backend.add_device(id, id, direction);
        let device = backend.get_device(id).unwrap().unwrap();
        let info = backend.describe(&device).unwrap();
        TrackedDevice {
            record: DeviceRecord::from_parts(info, VolumeState::new(40.0, false), is_default),
            device,
        }
    }

    fn release_all(registry: &mut TestRegistry, backend: &MemoryBackend) {
        for handle in registry.drain() {
            handle.release(backend);
        }
    }

    #[test]
    fn test_track_pairs_record_and_subscription() {
        let backend = MemoryBackend::new();
        let mut registry = TestRegistry::new();

        registry
            .track(&backend, tracked(&backend, "a", Direction::Render, false), |_| Box::new(|_| {}))
            .unwrap();

        assert_eq!(registry.len(), 1);
        assert_eq!(registry.subscription_count(), 1);
        assert!(registry.is_consistent());
        release_all(&mut registry, &backend);
    }

    #[test]
    fn test_failed_attach_inserts_nothing() {
        let backend = MemoryBackend::new();
        let mut registry = TestRegistry::new();
        let device = tracked(&backend, "a", Direction::Render, false);
        backend.set_failing(crate::audio::memory::FailPoint::Subscribe, true);

        assert!(registry.track(&backend, device, |_| Box::new(|_| {})).is_err());
        assert_eq!(registry.len(), 0);
        assert!(registry.is_consistent());
    }

    #[test]
    fn test_track_twice_is_rejected() {
        let backend = MemoryBackend::new();
        let mut registry = TestRegistry::new();
        registry
            .track(&backend, tracked(&backend, "a", Direction::Render, false), |_| Box::new(|_| {}))
            .unwrap();

        let err = registry
            .track(&backend, tracked(&backend, "a", Direction::Render, false), |_| Box::new(|_| {}))
            .unwrap_err();

        assert!(matches!(err, AudioError::AlreadyAttached { .. }));
        assert_eq!(backend.active_subscriptions("a"), 1);
        release_all(&mut registry, &backend);
    }

    #[test]
    fn test_untrack_twice_is_noop() {
        let backend = MemoryBackend::new();
        let mut registry = TestRegistry::new();
        registry
            .track(&backend, tracked(&backend, "a", Direction::Render, false), |_| Box::new(|_| {}))
            .unwrap();

        let (record, handle) = registry.untrack("a");
        assert_eq!(record.unwrap().id, "a");
        handle.unwrap().release(&backend);

        let (record, handle) = registry.untrack("a");
        assert!(record.is_none());
        assert!(handle.is_none());
        assert_eq!(backend.unsubscribe_calls(), 1);
        assert!(registry.is_consistent());
    }

    #[test]
    fn test_tracking_a_default_clears_other_defaults() {
        let backend = MemoryBackend::new();
        let mut registry = TestRegistry::new();
        registry
            .track(&backend, tracked(&backend, "a", Direction::Render, true), |_| Box::new(|_| {}))
            .unwrap();
        registry
            .track(&backend, tracked(&backend, "m", Direction::Capture, true), |_| Box::new(|_| {}))
            .unwrap();
        registry
            .track(&backend, tracked(&backend, "b", Direction::Render, true), |_| Box::new(|_| {}))
            .unwrap();

        assert!(!registry.get("a").unwrap().is_default);
        assert!(registry.get("b").unwrap().is_default);
        assert!(registry.get("m").unwrap().is_default);
        release_all(&mut registry, &backend);
    }

    #[test]
    fn test_set_default_ignores_other_direction() {
        let backend = MemoryBackend::new();
        let mut registry = TestRegistry::new();
        registry
            .track(&backend, tracked(&backend, "a", Direction::Render, true), |_| Box::new(|_| {}))
            .unwrap();
        registry
            .track(&backend, tracked(&backend, "m", Direction::Capture, false), |_| Box::new(|_| {}))
            .unwrap();

        assert!(!registry.set_default(Direction::Render, Some("m")));
        assert!(!registry.get("a").unwrap().is_default);
        assert!(!registry.get("m").unwrap().is_default);

        assert!(registry.set_default(Direction::Render, Some("a")));
        assert!(registry.get("a").unwrap().is_default);
        release_all(&mut registry, &backend);
    }

    #[test]
    fn test_snapshot_is_sorted() {
        let backend = MemoryBackend::new();
        let mut registry = TestRegistry::new();
        for id in ["c", "a", "b"] {
            registry
                .track(&backend, tracked(&backend, id, Direction::Render, false), |_| Box::new(|_| {}))
                .unwrap();
        }
        let ids: Vec<String> = registry.snapshot().into_iter().map(|r| r.id).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
        release_all(&mut registry, &backend);
    }
}
