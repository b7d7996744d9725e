//! Mock provider implementations for testing.
//!
//! This module provides simple, in-memory implementations of all provider traits
//! for use in unit and integration tests. Responses are scripted up front and
//! every call is recorded so tests can assert on what the core asked for.

pub mod key_value;
pub mod ride;
pub mod subscription;
pub mod transport;
pub mod vehicles;

pub use key_value::InMemoryKeyValueStore;
pub use ride::MockRideApi;
pub use subscription::MockSubscriptionApi;
pub use transport::MockTransport;
pub use vehicles::MockVehicleSource;

use std::sync::{Mutex, MutexGuard, PoisonError};

/// Lock a mock's state; a panicking test thread must not wedge the others.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
