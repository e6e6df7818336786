//! Adapters behind the domain ports: order stores and payment providers.

pub mod in_memory;
pub mod providers;
#[cfg(feature = "storage-rocksdb")]
pub mod rocksdb;
