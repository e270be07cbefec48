//! Volume subscription lifecycle.
//!
//! Every tracked endpoint owns exactly one [`SubscriptionHandle`]. Handles are
//! created by [`Subscriptions::attach`] and leave the map through
//! [`Subscriptions::detach`] or [`Subscriptions::drain`]; the native callback
//! is removed when the moved-out handle is released.

use super::backend::{DeviceBackend, VolumeHandler};
use super::device::AudioError;
use std::collections::HashMap;
use tracing::{debug, error, warn};

/// Ownership of one installed native volume callback.
pub(crate) struct SubscriptionHandle<S> {
    device_id: String,
    generation: u64,
    token: Option<S>,
}

impl<S> SubscriptionHandle<S> {
    /// Remove the native callback. Consumes the handle, so it can run only once.
    pub(crate) fn release<B>(mut self, backend: &B)
    where
        B: DeviceBackend<Subscription = S>,
    {
        if let Some(token) = self.token.take() {
            match backend.unsubscribe_volume(token) {
                Ok(()) => debug!(
                    device_id = %self.device_id,
                    generation = self.generation,
                    "Volume subscription released"
                ),
                Err(e) => warn!(
                    device_id = %self.device_id,
                    error = %e,
                    "Failed to unsubscribe volume callback"
                ),
            }
        }
    }
}

impl<S> Drop for SubscriptionHandle<S> {
    fn drop(&mut self) {
        if self.token.is_some() {
            error!(
                device_id = %self.device_id,
                generation = self.generation,
                "Volume subscription dropped without being released"
            );
        }
    }
}

/// Map of device id to its installed subscription.
pub(crate) struct Subscriptions<S> {
    handles: HashMap<String, SubscriptionHandle<S>>,
    next_generation: u64,
}

impl<S: Send + 'static> Subscriptions<S> {
    pub(crate) fn new() -> Self {
        Self {
            handles: HashMap::new(),
            next_generation: 1,
        }
    }

    /// Install a volume callback for `device_id`.
    ///
    /// `make_handler` receives the generation stamped on the new handle so the
    /// callback can identify itself later. Fails with `AlreadyAttached` if the
    /// id already has a handle; the backend is not called in that case.
    pub(crate) fn attach<B>(
        &mut self,
        backend: &B,
        device: &B::Device,
        device_id: &str,
        make_handler: impl FnOnce(u64) -> VolumeHandler,
    ) -> Result<u64, AudioError>
    where
        B: DeviceBackend<Subscription = S>,
    {
        if self.handles.contains_key(device_id) {
            return Err(AudioError::AlreadyAttached {
                device_id: device_id.to_string(),
            });
        }

        let generation = self.next_generation;
        self.next_generation += 1;

        let token = backend.subscribe_volume(device, make_handler(generation))?;
        self.handles.insert(
            device_id.to_string(),
            SubscriptionHandle {
                device_id: device_id.to_string(),
                generation,
                token: Some(token),
            },
        );
        debug!(device_id, generation, "Volume subscription attached");
        Ok(generation)
    }

    /// Take the handle for `device_id` out of the map. `None` if there is nothing to detach.
    pub(crate) fn detach(&mut self, device_id: &str) -> Option<SubscriptionHandle<S>> {
        self.handles.remove(device_id)
    }

    /// Take every handle out of the map.
    pub(crate) fn drain(&mut self) -> Vec<SubscriptionHandle<S>> {
        self.handles.drain().map(|(_, handle)| handle).collect()
    }

    pub(crate) fn generation_of(&self, device_id: &str) -> Option<u64> {
        self.handles.get(device_id).map(|h| h.generation)
    }

    pub(crate) fn contains(&self, device_id: &str) -> bool {
        self.handles.contains_key(device_id)
    }

    pub(crate) fn ids(&self) -> impl Iterator<Item = &str> {
        self.handles.keys().map(String::as_str)
    }

    pub(crate) fn len(&self) -> usize {
        self.handles.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::memory::{MemoryBackend, MemoryDevice};
    use crate::audio::device::Direction;

    fn backend_with(id: &str) -> (MemoryBackend, MemoryDevice) {
        let backend = MemoryBackend::new();
        backend.add_device(id, "Speakers", Direction::Render);
        let device = backend.get_device(id).unwrap().unwrap();
        (backend, device)
    }

    #[test]
    fn test_attach_installs_one_callback() {
        let (backend, device) = backend_with("a");
        let mut subs = Subscriptions::new();

        let generation = subs
            .attach(&backend, &device, "a", |_| Box::new(|_| {}))
            .unwrap();

        assert_eq!(subs.generation_of("a"), Some(generation));
        assert_eq!(backend.active_subscriptions("a"), 1);
        for handle in subs.drain() {
            handle.release(&backend);
        }
    }

    #[test]
    fn test_second_attach_is_rejected_without_backend_call() {
        let (backend, device) = backend_with("a");
        let mut subs = Subscriptions::new();
        subs.attach(&backend, &device, "a", |_| Box::new(|_| {}))
            .unwrap();

        let err = subs
            .attach(&backend, &device, "a", |_| Box::new(|_| {}))
            .unwrap_err();

        assert!(matches!(err, AudioError::AlreadyAttached { .. }));
        assert_eq!(backend.subscribe_calls(), 1);
        for handle in subs.drain() {
            handle.release(&backend);
        }
    }

    #[test]
    fn test_detach_unknown_id_is_noop() {
        let mut subs: Subscriptions<u64> = Subscriptions::new();
        assert!(subs.detach("missing").is_none());
        assert!(subs.detach("missing").is_none());
    }

    #[test]
    fn test_release_unsubscribes_once() {
        let (backend, device) = backend_with("a");
        let mut subs = Subscriptions::new();
        subs.attach(&backend, &device, "a", |_| Box::new(|_| {}))
            .unwrap();

        let handle = subs.detach("a").unwrap();
        assert_eq!(handle.device_id, "a");
        handle.release(&backend);

        assert!(subs.detach("a").is_none());
        assert_eq!(backend.unsubscribe_calls(), 1);
        assert_eq!(backend.active_subscriptions("a"), 0);
    }

    #[test]
    fn test_generations_are_unique() {
        let (backend, device) = backend_with("a");
        let mut subs = Subscriptions::new();
        let first = subs
            .attach(&backend, &device, "a", |_| Box::new(|_| {}))
            .unwrap();
        subs.detach("a").unwrap().release(&backend);
        let second = subs
            .attach(&backend, &device, "a", |_| Box::new(|_| {}))
            .unwrap();
        assert_ne!(first, second);
        for handle in subs.drain() {
            handle.release(&backend);
        }
    }
}
