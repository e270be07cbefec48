//! Platform device backends.
//!
//! Only Windows has a native backend; elsewhere the in-process
//! [`MemoryBackend`](crate::audio::MemoryBackend) is the only option.

#[cfg(windows)]
pub mod wasapi;

#[cfg(windows)]
pub use wasapi::{ComGuard, WasapiBackend, WasapiDevice};
