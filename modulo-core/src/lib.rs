pub mod cache;
pub mod config;
pub mod engine;
pub mod error;
pub mod patch;
pub mod position;
pub mod refresh;
pub mod remote;
pub mod tags;
pub mod tx;
pub mod types;
pub mod validate;

#[cfg(test)]
mod test_support;

pub use cache::{CacheEvent, CacheKey, CacheStore, Snapshot};
pub use config::EngineConfig;
pub use engine::SyncEngine;
pub use error::{EngineError, RemoteError, ValidationError};
pub use patch::Patch;
pub use remote::{MemoryService, RemoteService};
