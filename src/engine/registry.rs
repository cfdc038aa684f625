//! Process-wide holder for the active cache handle.
//!
//! Built once by the hosting process and passed by `Arc` to everything that
//! needs the cache. The handle is only handed out while the lifecycle that
//! published it reports `Running`, so callers must ask again for every
//! operation instead of keeping it.

use parking_lot::RwLock;
use std::sync::Arc;

use super::CacheHandle;
use crate::error::GridError;
use crate::lifecycle::types::{LifecycleState, StateCell};

struct Published {
    handle: Arc<dyn CacheHandle>,
    owner_state: Arc<StateCell>,
}

#[derive(Default)]
pub struct CacheHandleRegistry {
    current: RwLock<Option<Published>>,
}

impl CacheHandleRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Records `handle` as the active cache, gated by `owner_state`.
    pub fn publish(&self, handle: Arc<dyn CacheHandle>, owner_state: Arc<StateCell>) {
        tracing::debug!("Publishing cache handle {}", handle.name());
        *self.current.write() = Some(Published {
            handle,
            owner_state,
        });
    }

    pub fn get_active(&self) -> Option<Arc<dyn CacheHandle>> {
        let guard = self.current.read();
        let published = guard.as_ref()?;
        if published.owner_state.get() != LifecycleState::Running || published.handle.is_closed()
        {
            return None;
        }
        Some(published.handle.clone())
    }

    pub fn require_active(&self) -> Result<Arc<dyn CacheHandle>, GridError> {
        self.get_active().ok_or(GridError::CacheUnavailable)
    }

    /// Like `invalidate`, but only when the handle was published by `owner`.
    pub fn release(&self, owner: &Arc<StateCell>) -> bool {
        let taken = {
            let mut current = self.current.write();
            let owned = current
                .as_ref()
                .is_some_and(|published| Arc::ptr_eq(&published.owner_state, owner));
            if owned { current.take() } else { None }
        };
        Self::close_taken(taken)
    }

    /// Drops and closes the published handle. Returns whether one was held.
    pub fn invalidate(&self) -> bool {
        let taken = self.current.write().take();
        Self::close_taken(taken)
    }

    fn close_taken(taken: Option<Published>) -> bool {
        match taken {
            Some(published) => {
                tracing::debug!("Closing cache handle {}", published.handle.name());
                published.handle.close();
                true
            }
            None => false,
        }
    }
}
