//! Artifact cache that may sit in front of the generation pipeline.
//!
//! The pipeline itself never depends on this module. Hosts that want repeated
//! targets served from memory wrap it in a [`CachedGenerator`].
//!
//! ## Configuration
//!
//! ```toml
//! [cache]
//! enabled = true
//! capacity = 256
//! ```

mod config;
mod generator;
mod keys;
mod store;

pub use config::ArtifactCacheConfig;
pub use generator::CachedGenerator;
pub use keys::ArtifactKey;
pub use store::{ArtifactCache, CacheStats, LruArtifactCache};
