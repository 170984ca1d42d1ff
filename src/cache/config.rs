use std::num::NonZeroUsize;

use crate::config::CacheSettings;

const DEFAULT_CAPACITY: usize = 256;

#[derive(Debug, Clone)]
pub struct ArtifactCacheConfig {
    pub enabled: bool,
    /// Maximum number of generated documents kept in memory.
    pub capacity: usize,
}

impl Default for ArtifactCacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            capacity: DEFAULT_CAPACITY,
        }
    }
}

impl From<&CacheSettings> for ArtifactCacheConfig {
    fn from(settings: &CacheSettings) -> Self {
        Self {
            enabled: settings.enabled,
            capacity: settings.capacity.get() as usize,
        }
    }
}

impl ArtifactCacheConfig {
    /// Returns the capacity as NonZeroUsize, clamping to 1 if zero.
    pub fn capacity_non_zero(&self) -> NonZeroUsize {
        NonZeroUsize::new(self.capacity).unwrap_or(NonZeroUsize::MIN)
    }
}
