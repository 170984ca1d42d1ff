use std::{fmt, sync::Arc};

use tracing::warn;
use uuid::Uuid;

use super::PoolInner;
use crate::application::render::backend::Renderer;

/// Scoped checkout of one pooled renderer.
///
/// Hand it back with [`RendererPool::release`](super::RendererPool::release).
/// A lease dropped without being released is returned by a background task.
pub struct RendererLease {
    pool: Arc<PoolInner>,
    id: Uuid,
    use_count: u64,
    renderer: Arc<dyn Renderer>,
    released: bool,
}

impl RendererLease {
    pub(super) fn new(
        pool: Arc<PoolInner>,
        id: Uuid,
        use_count: u64,
        renderer: Arc<dyn Renderer>,
    ) -> Self {
        Self {
            pool,
            id,
            use_count,
            renderer,
            released: false,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Use count of the underlying handle including this checkout.
    pub fn use_count(&self) -> u64 {
        self.use_count
    }

    pub fn renderer(&self) -> &dyn Renderer {
        self.renderer.as_ref()
    }

    pub(super) fn into_parts(mut self) -> (Arc<PoolInner>, Uuid, Arc<dyn Renderer>) {
        self.released = true;
        (
            Arc::clone(&self.pool),
            self.id,
            Arc::clone(&self.renderer),
        )
    }
}

impl fmt::Debug for RendererLease {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RendererLease")
            .field("id", &self.id)
            .field("use_count", &self.use_count)
            .field("released", &self.released)
            .finish()
    }
}

impl Drop for RendererLease {
    fn drop(&mut self) {
        if self.released {
            return;
        }

        warn!(
            target = "application::render::pool",
            op = "pool::lease_drop",
            handle_id = %self.id,
            "Renderer lease dropped without release"
        );

        let pool = Arc::clone(&self.pool);
        let id = self.id;
        let renderer = Arc::clone(&self.renderer);
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn(async move {
                    pool.release_handle(id, renderer).await;
                });
            }
            Err(_) => pool.forget(id),
        }
    }
}
