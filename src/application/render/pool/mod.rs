//! Capacity-bounded pool of live renderers.
//!
//! Structural changes (adding, removing, checking out and returning handles)
//! happen under a single mutex that is never held across an `.await`. Probes,
//! resets and closes run outside the lock on a handle that is already marked
//! in use, so no other caller can observe it mid-operation.

mod lease;

use std::{
    sync::{
        Arc, Mutex, Weak,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use folio_render_types::PoolStats;
use futures::future::join_all;
use metrics::{counter, gauge};
use thiserror::Error;
use tokio::{
    task::JoinHandle,
    time::{Instant, sleep, timeout},
};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{
    backend::{Renderer, RendererError, RendererFactory},
    config::PoolConfig,
    handle::RendererHandle,
    metrics as render_metrics,
};
use crate::util::lock::mutex_lock;

pub use lease::RendererLease;

const SOURCE: &str = "application::render::pool";

#[derive(Debug, Error)]
pub enum PoolError {
    #[error("renderer pool is shutting down")]
    ShuttingDown,
    #[error("no renderer became available within {waited:?}")]
    Timeout { waited: Duration },
    #[error("failed to create renderer: {0}")]
    Creation(#[source] RendererError),
}

/// Outcome of one idle sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SweepReport {
    pub evicted: usize,
    pub replenished: bool,
}

struct PooledRenderer {
    handle: RendererHandle,
    renderer: Arc<dyn Renderer>,
}

#[derive(Default)]
struct PoolState {
    items: Vec<PooledRenderer>,
    /// Creations in flight; they count against `max_size`.
    pending: usize,
}

impl PoolState {
    fn position(&self, id: Uuid) -> Option<usize> {
        self.items.iter().position(|slot| slot.handle.id() == id)
    }
}

pub(crate) struct PoolInner {
    config: PoolConfig,
    factory: Arc<dyn RendererFactory>,
    state: Mutex<PoolState>,
    shutting_down: AtomicBool,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

/// Shared renderer pool. Cloning is cheap and yields a handle to the same pool.
#[derive(Clone)]
pub struct RendererPool {
    inner: Arc<PoolInner>,
}

impl RendererPool {
    pub fn new(config: PoolConfig, factory: Arc<dyn RendererFactory>) -> Self {
        info!(
            target = SOURCE,
            backend = factory.backend(),
            max_size = config.max_size,
            "Renderer pool created"
        );
        Self {
            inner: Arc::new(PoolInner {
                config,
                factory,
                state: Mutex::new(PoolState::default()),
                shutting_down: AtomicBool::new(false),
                sweeper: Mutex::new(None),
            }),
        }
    }

    pub fn config(&self) -> &PoolConfig {
        &self.inner.config
    }

    pub fn is_shutting_down(&self) -> bool {
        self.inner.is_shutting_down()
    }

    /// Check out a healthy renderer, waiting up to `wait` for one to free up.
    ///
    /// `wait` bounds the whole call, including probes and renderer creation.
    /// Waiters poll on a fixed interval, so under contention callers are not
    /// served in arrival order.
    pub async fn acquire(&self, wait: Duration) -> Result<RendererLease, PoolError> {
        let started_at = Instant::now();
        let deadline = started_at + wait;

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            let checkout = match timeout(remaining, self.inner.try_checkout()).await {
                Ok(result) => result?,
                Err(_) => None,
            };
            if let Some(lease) = checkout {
                counter!(render_metrics::POOL_ACQUIRE_TOTAL).increment(1);
                debug!(
                    target = SOURCE,
                    op = "pool::acquire",
                    result = "ok",
                    handle_id = %lease.id(),
                    use_count = lease.use_count(),
                    waited_ms = started_at.elapsed().as_millis() as u64,
                    "Renderer checked out"
                );
                return Ok(lease);
            }

            let now = Instant::now();
            if now >= deadline {
                counter!(render_metrics::POOL_ACQUIRE_TIMEOUT_TOTAL).increment(1);
                let waited = now.duration_since(started_at);
                warn!(
                    target = SOURCE,
                    op = "pool::acquire",
                    result = "timeout",
                    waited_ms = waited.as_millis() as u64,
                    "No renderer became available before the acquire timeout"
                );
                return Err(PoolError::Timeout { waited });
            }

            let remaining = deadline.duration_since(now);
            sleep(self.inner.config.acquire_poll_interval.min(remaining)).await;
        }
    }

    /// Return a renderer to the pool.
    pub async fn release(&self, lease: RendererLease) {
        let (pool, id, renderer) = lease.into_parts();
        pool.release_handle(id, renderer).await;
    }

    /// Pre-create renderers so the first requests do not pay creation latency.
    ///
    /// Returns the number of renderers created. Creation failures are logged
    /// and skipped.
    pub async fn warm_up(&self) -> usize {
        let target = self.inner.config.warmup_count.min(self.inner.config.max_size);
        let missing = target.saturating_sub(self.stats().pool_size);
        if missing == 0 {
            return 0;
        }

        let started_at = Instant::now();
        let results = join_all((0..missing).map(|_| self.inner.create_idle())).await;
        let mut created = 0;
        for result in results {
            match result {
                Ok(true) => created += 1,
                Ok(false) => {}
                Err(err) => warn!(
                    target = SOURCE,
                    op = "pool::warm_up",
                    result = "error",
                    error = %err,
                    "Failed to pre-create renderer"
                ),
            }
        }

        info!(
            target = SOURCE,
            op = "pool::warm_up",
            created,
            requested = missing,
            elapsed_ms = started_at.elapsed().as_millis() as u64,
            "Renderer pool warmed"
        );
        created
    }

    /// Spawn the periodic idle sweep. Calling this again replaces the previous task.
    pub fn start_idle_sweep(&self) {
        let weak: Weak<PoolInner> = Arc::downgrade(&self.inner);
        let period = self.inner.config.sweep_interval;

        let task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.tick().await; // Skip the first immediate tick
            loop {
                interval.tick().await;
                let Some(inner) = weak.upgrade() else {
                    break;
                };
                if inner.is_shutting_down() {
                    break;
                }
                inner.sweep_idle().await;
            }
        });

        if let Some(previous) =
            mutex_lock(&self.inner.sweeper, SOURCE, "start_idle_sweep").replace(task)
        {
            previous.abort();
        }
    }

    /// Evict idle renderers past the idle timeout, keeping at least one alive.
    pub async fn sweep_idle(&self) -> SweepReport {
        self.inner.sweep_idle().await
    }

    /// Stop handing out renderers and close every one of them.
    pub async fn shutdown(&self) {
        if self.inner.shutting_down.swap(true, Ordering::SeqCst) {
            return;
        }

        if let Some(task) = mutex_lock(&self.inner.sweeper, SOURCE, "shutdown").take() {
            task.abort();
        }

        let items = {
            let mut state = mutex_lock(&self.inner.state, SOURCE, "shutdown");
            let items = std::mem::take(&mut state.items);
            record_size(&state);
            items
        };

        let started_at = Instant::now();
        let count = items.len();
        join_all(
            items
                .into_iter()
                .map(|slot| self.inner.close_renderer(slot.handle.id(), slot.renderer)),
        )
        .await;

        info!(
            target = SOURCE,
            op = "pool::shutdown",
            closed = count,
            elapsed_ms = started_at.elapsed().as_millis() as u64,
            "Renderer pool shut down"
        );
    }

    pub fn stats(&self) -> PoolStats {
        let state = mutex_lock(&self.inner.state, SOURCE, "stats");
        let pool_size = state.items.len();
        let in_use = state
            .items
            .iter()
            .filter(|slot| slot.handle.is_in_use())
            .count();
        let total_use_count = state.items.iter().map(|slot| slot.handle.use_count()).sum();

        PoolStats {
            pool_size,
            in_use,
            available: pool_size - in_use,
            max_size: self.inner.config.max_size,
            total_use_count,
        }
    }
}

enum Checkout {
    Probe(Uuid, Arc<dyn Renderer>),
    Create,
    Wait,
}

impl PoolInner {
    fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::SeqCst)
    }

    fn has_capacity(&self, state: &PoolState) -> bool {
        state.items.len() + state.pending < self.config.max_size
    }

    /// One non-blocking pass over the pool: reuse a healthy idle renderer,
    /// create one if there is room, or report that the caller must wait.
    async fn try_checkout(self: &Arc<Self>) -> Result<Option<RendererLease>, PoolError> {
        loop {
            if self.is_shutting_down() {
                return Err(PoolError::ShuttingDown);
            }

            let next = {
                let mut state = mutex_lock(&self.state, SOURCE, "try_checkout");
                if let Some(slot) = state
                    .items
                    .iter_mut()
                    .find(|slot| !slot.handle.is_in_use())
                {
                    slot.handle.reserve();
                    Checkout::Probe(slot.handle.id(), Arc::clone(&slot.renderer))
                } else if self.has_capacity(&state) {
                    state.pending += 1;
                    Checkout::Create
                } else {
                    Checkout::Wait
                }
            };

            match next {
                Checkout::Probe(id, renderer) => {
                    let reservation = Reservation::new(self, id);
                    if self.probe(renderer.as_ref()).await {
                        if let Some(lease) = reservation.complete(renderer) {
                            return Ok(Some(lease));
                        }
                        continue;
                    }

                    reservation.disarm();
                    counter!(render_metrics::POOL_UNHEALTHY_TOTAL).increment(1);
                    warn!(
                        target = SOURCE,
                        op = "pool::try_checkout",
                        result = "unhealthy",
                        handle_id = %id,
                        "Renderer failed liveness probe; removing"
                    );
                    self.discard(id, renderer).await;
                }
                Checkout::Create => {
                    let slot = PendingCreation::new(self);
                    return self.create_checked_out(slot).await.map(Some);
                }
                Checkout::Wait => return Ok(None),
            }
        }
    }

    async fn create_checked_out(
        self: &Arc<Self>,
        slot: PendingCreation<'_>,
    ) -> Result<RendererLease, PoolError> {
        let started_at = Instant::now();
        let renderer = self.factory.create().await.map_err(|err| {
            warn!(
                target = SOURCE,
                op = "pool::create",
                result = "error",
                backend = self.factory.backend(),
                elapsed_ms = started_at.elapsed().as_millis() as u64,
                error = %err,
                "Failed to create renderer"
            );
            PoolError::Creation(err)
        })?;

        let now = Instant::now();
        let checked_out = {
            let mut state = mutex_lock(&self.state, SOURCE, "create_checked_out");
            slot.complete(&mut state);
            if self.is_shutting_down() {
                None
            } else {
                let mut handle = RendererHandle::new(now);
                handle.mark_acquired(now);
                let entry = (handle.id(), handle.use_count());
                state.items.push(PooledRenderer {
                    handle,
                    renderer: Arc::clone(&renderer),
                });
                record_size(&state);
                Some(entry)
            }
        };

        let Some((id, use_count)) = checked_out else {
            self.close_renderer(Uuid::nil(), renderer).await;
            return Err(PoolError::ShuttingDown);
        };

        info!(
            target = SOURCE,
            op = "pool::create",
            result = "ok",
            backend = self.factory.backend(),
            handle_id = %id,
            elapsed_ms = started_at.elapsed().as_millis() as u64,
            "Renderer created"
        );
        Ok(RendererLease::new(Arc::clone(self), id, use_count, renderer))
    }

    /// Create an idle renderer if the pool has room. Returns whether one was added.
    async fn create_idle(self: &Arc<Self>) -> Result<bool, RendererError> {
        let slot = {
            let mut state = mutex_lock(&self.state, SOURCE, "create_idle");
            if self.is_shutting_down() || !self.has_capacity(&state) {
                return Ok(false);
            }
            state.pending += 1;
            PendingCreation::new(self)
        };

        let renderer = self.factory.create().await?;

        let added = {
            let mut state = mutex_lock(&self.state, SOURCE, "create_idle");
            slot.complete(&mut state);
            if self.is_shutting_down() {
                false
            } else {
                let handle = RendererHandle::new(Instant::now());
                debug!(
                    target = SOURCE,
                    op = "pool::create_idle",
                    handle_id = %handle.id(),
                    "Idle renderer created"
                );
                state.items.push(PooledRenderer {
                    handle,
                    renderer: Arc::clone(&renderer),
                });
                record_size(&state);
                true
            }
        };

        if !added {
            self.close_renderer(Uuid::nil(), renderer).await;
        }
        Ok(added)
    }

    async fn probe(&self, renderer: &dyn Renderer) -> bool {
        timeout(self.config.health_check_timeout, renderer.probe())
            .await
            .unwrap_or(false)
    }

    pub(crate) async fn release_handle(self: &Arc<Self>, id: Uuid, renderer: Arc<dyn Renderer>) {
        if !self.is_tracked(id) {
            debug!(
                target = SOURCE,
                op = "pool::release",
                handle_id = %id,
                "Released renderer is no longer tracked"
            );
            return;
        }

        let reset = timeout(self.config.health_check_timeout, renderer.reset()).await;
        let reset_error = match reset {
            Ok(Ok(())) => None,
            Ok(Err(err)) => Some(err),
            Err(_) => Some(RendererError::Timeout(self.config.health_check_timeout)),
        };
        if let Some(err) = reset_error {
            counter!(render_metrics::POOL_UNHEALTHY_TOTAL).increment(1);
            warn!(
                target = SOURCE,
                op = "pool::release",
                result = "reset_failed",
                handle_id = %id,
                error = %err,
                "Failed to reset renderer; removing"
            );
            self.discard(id, renderer).await;
            return;
        }

        let retired = {
            let mut state = mutex_lock(&self.state, SOURCE, "release");
            let Some(position) = state.position(id) else {
                return;
            };

            if state.items[position]
                .handle
                .exceeds_use_threshold(self.config.recycle_threshold)
            {
                let slot = state.items.remove(position);
                record_size(&state);
                Some(slot)
            } else {
                state.items[position].handle.mark_released(Instant::now());
                None
            }
        };

        if let Some(slot) = retired {
            counter!(render_metrics::POOL_RECYCLED_TOTAL).increment(1);
            info!(
                target = SOURCE,
                op = "pool::release",
                result = "recycled",
                handle_id = %id,
                use_count = slot.handle.use_count(),
                "Renderer retired after reaching the use threshold"
            );
            self.spawn_replacement(slot);
        }
    }

    /// Close a retired renderer and create its replacement without blocking the caller.
    fn spawn_replacement(self: &Arc<Self>, retired: PooledRenderer) {
        let inner = Arc::clone(self);
        tokio::spawn(async move {
            inner
                .close_renderer(retired.handle.id(), retired.renderer)
                .await;

            match inner.create_idle().await {
                Ok(true) => debug!(
                    target = SOURCE,
                    op = "pool::replace",
                    result = "ok",
                    "Replacement renderer created"
                ),
                Ok(false) => debug!(
                    target = SOURCE,
                    op = "pool::replace",
                    result = "skipped",
                    "Pool full or shutting down; replacement skipped"
                ),
                Err(err) => warn!(
                    target = SOURCE,
                    op = "pool::replace",
                    result = "error",
                    error = %err,
                    "Failed to create replacement renderer"
                ),
            }
        });
    }

    async fn sweep_idle(self: &Arc<Self>) -> SweepReport {
        let now = Instant::now();
        let expired: Vec<PooledRenderer> = {
            let mut state = mutex_lock(&self.state, SOURCE, "sweep_idle");
            let (expired, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut state.items)
                .into_iter()
                .partition(|slot| slot.handle.idle_expired(now, self.config.idle_timeout));
            state.items = kept;
            record_size(&state);
            expired
        };

        let evicted = expired.len();
        if evicted > 0 {
            counter!(render_metrics::POOL_EVICTED_TOTAL).increment(evicted as u64);
            join_all(
                expired
                    .into_iter()
                    .map(|slot| self.close_renderer(slot.handle.id(), slot.renderer)),
            )
            .await;
        }

        let empty = {
            let state = mutex_lock(&self.state, SOURCE, "sweep_idle");
            state.items.is_empty() && state.pending == 0
        };

        let replenished = if empty && !self.is_shutting_down() {
            match self.create_idle().await {
                Ok(created) => created,
                Err(err) => {
                    warn!(
                        target = SOURCE,
                        op = "pool::sweep_idle",
                        result = "error",
                        error = %err,
                        "Failed to keep a warm renderer after sweep"
                    );
                    false
                }
            }
        } else {
            false
        };

        if evicted > 0 || replenished {
            info!(
                target = SOURCE,
                op = "pool::sweep_idle",
                evicted,
                replenished,
                "Idle sweep finished"
            );
        }

        SweepReport {
            evicted,
            replenished,
        }
    }

    fn is_tracked(&self, id: Uuid) -> bool {
        mutex_lock(&self.state, SOURCE, "is_tracked")
            .position(id)
            .is_some()
    }

    /// Remove a handle without closing it; the renderer is dropped with its last reference.
    pub(crate) fn forget(&self, id: Uuid) {
        let mut state = mutex_lock(&self.state, SOURCE, "forget");
        state.items.retain(|slot| slot.handle.id() != id);
        record_size(&state);
    }

    async fn discard(&self, id: Uuid, renderer: Arc<dyn Renderer>) {
        self.forget(id);
        self.close_renderer(id, renderer).await;
    }

    async fn close_renderer(&self, id: Uuid, renderer: Arc<dyn Renderer>) {
        match timeout(self.config.close_timeout, renderer.close()).await {
            Ok(Ok(())) => debug!(
                target = SOURCE,
                op = "pool::close",
                result = "ok",
                handle_id = %id,
                "Renderer closed"
            ),
            Ok(Err(err)) => warn!(
                target = SOURCE,
                op = "pool::close",
                result = "error",
                handle_id = %id,
                error = %err,
                "Failed to close renderer"
            ),
            Err(_) => warn!(
                target = SOURCE,
                op = "pool::close",
                result = "timeout",
                handle_id = %id,
                timeout_ms = self.config.close_timeout.as_millis() as u64,
                "Renderer did not close in time; abandoning"
            ),
        }
    }
}

/// Holds a probed handle; dropping it without completing returns the handle to idle.
struct Reservation<'a> {
    pool: &'a Arc<PoolInner>,
    id: Uuid,
    armed: bool,
}

impl<'a> Reservation<'a> {
    fn new(pool: &'a Arc<PoolInner>, id: Uuid) -> Self {
        Self {
            pool,
            id,
            armed: true,
        }
    }

    fn complete(mut self, renderer: Arc<dyn Renderer>) -> Option<RendererLease> {
        self.armed = false;
        let mut state = mutex_lock(&self.pool.state, SOURCE, "complete_checkout");
        let position = state.position(self.id)?;
        let handle = &mut state.items[position].handle;
        handle.mark_acquired(Instant::now());
        let use_count = handle.use_count();
        Some(RendererLease::new(
            Arc::clone(self.pool),
            self.id,
            use_count,
            renderer,
        ))
    }

    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for Reservation<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let mut state = mutex_lock(&self.pool.state, SOURCE, "cancel_reservation");
        if let Some(position) = state.position(self.id) {
            state.items[position].handle.unreserve();
        }
    }
}

/// Accounts for a creation in flight; dropping it without completing frees the slot.
struct PendingCreation<'a> {
    pool: &'a PoolInner,
    armed: bool,
}

impl<'a> PendingCreation<'a> {
    /// The caller must already have incremented `pending` under the lock.
    fn new(pool: &'a PoolInner) -> Self {
        Self { pool, armed: true }
    }

    fn complete(mut self, state: &mut PoolState) {
        self.armed = false;
        state.pending -= 1;
    }
}

impl Drop for PendingCreation<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let mut state = mutex_lock(&self.pool.state, SOURCE, "cancel_creation");
        state.pending = state.pending.saturating_sub(1);
    }
}

fn record_size(state: &PoolState) {
    gauge!(render_metrics::POOL_SIZE).set(state.items.len() as f64);
}
