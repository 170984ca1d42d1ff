use std::time::Duration;

use tokio::time::Instant;
use uuid::Uuid;

/// Lifecycle metadata for one pooled renderer.
#[derive(Debug, Clone)]
pub struct RendererHandle {
    id: Uuid,
    created_at: Instant,
    last_used_at: Instant,
    use_count: u64,
    in_use: bool,
}

impl RendererHandle {
    pub(crate) fn new(now: Instant) -> Self {
        Self {
            id: Uuid::new_v4(),
            created_at: now,
            last_used_at: now,
            use_count: 0,
            in_use: false,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    pub fn last_used_at(&self) -> Instant {
        self.last_used_at
    }

    pub fn use_count(&self) -> u64 {
        self.use_count
    }

    pub fn is_in_use(&self) -> bool {
        self.in_use
    }

    /// Hold the handle while it is probed, without counting a use.
    pub(crate) fn reserve(&mut self) {
        self.in_use = true;
    }

    pub(crate) fn unreserve(&mut self) {
        self.in_use = false;
    }

    pub(crate) fn mark_acquired(&mut self, now: Instant) {
        self.in_use = true;
        self.use_count += 1;
        self.last_used_at = now;
    }

    pub(crate) fn mark_released(&mut self, now: Instant) {
        self.in_use = false;
        self.last_used_at = now;
    }

    pub(crate) fn idle_expired(&self, now: Instant, idle_timeout: Duration) -> bool {
        !self.in_use && now.saturating_duration_since(self.last_used_at) > idle_timeout
    }

    pub(crate) fn exceeds_use_threshold(&self, threshold: u64) -> bool {
        self.use_count > threshold
    }
}
