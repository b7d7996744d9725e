//! Persistent [`KeyValueStore`](crate::providers::KeyValueStore) backends.

pub mod file;

pub use file::FileKeyValueStore;
