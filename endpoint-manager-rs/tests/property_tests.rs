//! Property-based tests for the endpoint registry
//!
//! Random notification sequences are replayed against the in-memory backend
//! and the registry's structural invariants are checked after every step.

use proptest::prelude::*;

use endpoint_manager_rs::audio::{
    create_event_channel, AudioError, ChangeEvent, DeviceRole, DeviceState, Direction,
    EndpointManager, MemoryBackend, VolumeState, WriteRecord,
};
use endpoint_manager_rs::ManagerConfig;
use std::sync::mpsc::Receiver;

// ============================================================================
// Test Helpers
// ============================================================================

const DEVICE_COUNT: usize = 6;

fn device_id(index: usize) -> String {
    format!("dev-{index}")
}

/// Even indices render, odd indices capture.
fn direction_of(index: usize) -> Direction {
    if index % 2 == 0 {
        Direction::Render
    } else {
        Direction::Capture
    }
}

#[derive(Debug, Clone)]
enum Op {
    Connect(usize),
    Remove(usize),
    SetState(usize, DeviceState),
    SetDefault(Direction, DeviceRole, Option<usize>),
    HardwareVolume(usize, u8, bool),
    Reinitialize,
}

fn state_strategy() -> impl Strategy<Value = DeviceState> {
    prop_oneof![
        Just(DeviceState::Active),
        Just(DeviceState::Disabled),
        Just(DeviceState::NotPresent),
        Just(DeviceState::Unplugged),
    ]
}

fn role_strategy() -> impl Strategy<Value = DeviceRole> {
    prop_oneof![
        Just(DeviceRole::Console),
        Just(DeviceRole::Multimedia),
        Just(DeviceRole::Communications),
    ]
}

fn direction_strategy() -> impl Strategy<Value = Direction> {
    prop_oneof![Just(Direction::Render), Just(Direction::Capture)]
}

fn op_strategy() -> impl Strategy<Value = Op> {
    let index = 0..DEVICE_COUNT;
    prop_oneof![
        3 => index.clone().prop_map(Op::Connect),
        2 => index.clone().prop_map(Op::Remove),
        2 => (index.clone(), state_strategy()).prop_map(|(i, s)| Op::SetState(i, s)),
        3 => (direction_strategy(), role_strategy(), proptest::option::of(index.clone()))
            .prop_map(|(d, r, i)| Op::SetDefault(d, r, i)),
        2 => (index, 0u8..=100, any::<bool>()).prop_map(|(i, v, m)| Op::HardwareVolume(i, v, m)),
        1 => Just(Op::Reinitialize),
    ]
}

fn start(backend: MemoryBackend) -> (EndpointManager<MemoryBackend>, Receiver<ChangeEvent>) {
    let (tx, rx) = create_event_channel();
    let manager = EndpointManager::new(backend, ManagerConfig::default(), tx).unwrap();
    manager.initialize_devices().unwrap();
    (manager, rx)
}

fn apply(manager: &EndpointManager<MemoryBackend>, op: &Op) {
    let backend = manager.backend();
    match op {
        Op::Connect(i) => {
            if backend.hardware_volume(&device_id(*i)).is_none() {
                backend.connect_device(&device_id(*i), "Device", direction_of(*i));
            }
        }
        Op::Remove(i) => backend.remove_device(&device_id(*i)),
        Op::SetState(i, state) => backend.set_state(&device_id(*i), *state),
        Op::SetDefault(direction, role, i) => {
            let id = i.map(device_id);
            backend.set_default(*direction, *role, id.as_deref());
        }
        Op::HardwareVolume(i, percent, muted) => {
            backend.set_hardware_volume(&device_id(*i), VolumeState::new(f32::from(*percent), *muted))
        }
        Op::Reinitialize => manager.initialize_devices().unwrap(),
    }
}

fn assert_invariants(manager: &EndpointManager<MemoryBackend>) -> Result<(), TestCaseError> {
    let devices = manager.devices();
    prop_assert!(manager.is_consistent());
    prop_assert_eq!(manager.subscription_count(), devices.len());
    prop_assert_eq!(
        manager.backend().total_active_subscriptions(),
        devices.len()
    );
    for device in &devices {
        prop_assert_eq!(manager.backend().active_subscriptions(&device.id), 1);
    }
    for direction in Direction::ALL {
        let defaults = devices
            .iter()
            .filter(|d| d.direction == direction && d.is_default)
            .count();
        prop_assert!(defaults <= 1, "{} defaults for {}", defaults, direction);
    }
    Ok(())
}

// ============================================================================
// Structural invariants
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Subscriptions always match tracked ids one to one, and each direction
    /// has at most one default, after every notification.
    #[test]
    fn prop_registry_invariants_hold(ops in proptest::collection::vec(op_strategy(), 1..40)) {
        let (manager, _rx) = start(MemoryBackend::new());
        assert_invariants(&manager)?;

        for op in &ops {
            apply(&manager, op);
            assert_invariants(&manager)?;
        }

        manager.shutdown();
        prop_assert_eq!(manager.subscription_count(), 0);
        prop_assert_eq!(manager.backend().total_active_subscriptions(), 0);
        prop_assert_eq!(
            manager.backend().subscribe_calls(),
            manager.backend().unsubscribe_calls()
        );
    }

    /// Repeating a volume tick with the same rounded value and mute state
    /// emits nothing.
    #[test]
    fn prop_unchanged_volume_emits_nothing(percent in 0.0f32..=100.0, muted in any::<bool>()) {
        let backend = MemoryBackend::new();
        backend.add_device("A", "Speakers", Direction::Render);
        let (manager, rx) = start(backend);
        manager.backend().set_hardware_volume("A", VolumeState::new(percent, muted));
        let _ = rx.try_iter().count();

        manager.backend().fire_volume("A", VolumeState::new(percent, muted));

        prop_assert_eq!(rx.try_iter().count(), 0);
    }

    /// Out-of-range volumes are rejected without touching the backend.
    #[test]
    fn prop_out_of_range_volume_rejected(
        value in prop_oneof![100.01f32..1000.0, -1000.0f32..-0.01],
    ) {
        let backend = MemoryBackend::new();
        backend.add_device("A", "Speakers", Direction::Render);
        backend.set_default_silently(Direction::Render, DeviceRole::Multimedia, Some("A"));
        let (manager, _rx) = start(backend);
        let before = manager.devices();

        let by_default = manager.set_volume(value);
        let by_id = manager.set_volume_by_id("A", value);
        prop_assert!(matches!(by_default, Err(AudioError::InvalidArgument(_))));
        prop_assert!(matches!(by_id, Err(AudioError::InvalidArgument(_))));
        prop_assert!(manager.backend().writes().is_empty());
        prop_assert_eq!(manager.devices(), before);
    }

    /// Stepping always writes a value inside [0, 100].
    #[test]
    fn prop_step_is_clamped(cached in 0u8..=100, step in 0.5f32..=100.0, up in any::<bool>()) {
        let backend = MemoryBackend::new();
        backend.add_device("A", "Speakers", Direction::Render);
        backend.set_volume_silently("A", VolumeState::new(f32::from(cached), false));
        let (manager, _rx) = start(backend);
        manager.set_step_volume(step).unwrap();

        if up {
            manager.increment_volume_by_id("A").unwrap();
        } else {
            manager.decrement_volume_by_id("A").unwrap();
        }

        let expected = if up {
            (f32::from(cached) + step).min(100.0)
        } else {
            (f32::from(cached) - step).max(0.0)
        };
        let writes = manager.backend().writes();
        prop_assert_eq!(writes.len(), 1);
        match &writes[0] {
            WriteRecord::Volume { device_id, percent } => {
                prop_assert_eq!(device_id.as_str(), "A");
                prop_assert!((percent - expected).abs() < 1e-4);
            }
            other => prop_assert!(false, "unexpected write {:?}", other),
        }
    }
}
