//! Registry actor
//!
//! One `RegistryStore` actor per process owns the on-disk registry and the
//! set of ids reserved by in-flight creates. Sessions talk to it through a
//! cloneable handle, so every read-modify-write is serialized.

mod manager;
mod messages;

pub use manager::RegistryStore;
pub use messages::{RegistryCommand, StoreError, StoreResponse};
