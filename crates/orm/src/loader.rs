//! Per-relation lazy loading.
//!
//! Every relation field on an [`Entity`](crate::Entity) is backed by a
//! [`RelationAccessor`]: a small state machine that defers the underlying
//! fetch until first access, shares one in-flight fetch among any number of
//! concurrent callers, and memoizes the resolved value on the accessor
//! itself.
//!
//! States and transitions:
//!
//! - **Unloaded** (initial): the first `load` call issues the fetch and moves
//!   to *Loading*.
//! - **Loading**: every call while the fetch is pending awaits the same
//!   shared future; no duplicate fetch is ever issued.
//! - **Loaded** (terminal): calls return the memoized value without I/O.
//!
//! A failed fetch rejects all current waiters with the same error and falls
//! back to *Unloaded*: failures are surfaced, never memoized, and the next
//! call starts a fresh fetch.

use std::sync::Arc;

use futures_util::future::{BoxFuture, Shared};
use futures_util::FutureExt;
use parking_lot::Mutex;
use tracing::trace;

use crate::entity::Entity;
use crate::error::OrmResult;

/// Resolved relation data.
#[derive(Clone, Debug)]
pub enum RelationValue {
    One(Entity),
    Many(Vec<Entity>),
}

pub(crate) type LoadFuture = BoxFuture<'static, OrmResult<RelationValue>>;
pub(crate) type LoadFn = Arc<dyn Fn() -> LoadFuture + Send + Sync>;

type SharedLoad = Shared<LoadFuture>;

enum LoaderState {
    Unloaded,
    Loading(SharedLoad),
    Loaded(RelationValue),
}

/// Lazily-loading handle to one relation field of one entity instance.
///
/// Cloning the accessor clones the handle, not the state: all clones observe
/// the same loader state, which is what ties memoization to the entity
/// instance the accessor belongs to.
#[derive(Clone)]
pub struct RelationAccessor {
    inner: Arc<AccessorInner>,
}

struct AccessorInner {
    state: Mutex<LoaderState>,
    fetch: Option<LoadFn>,
}

impl RelationAccessor {
    /// Accessor that is already resolved; used for relation data the client
    /// eagerly inlined into the parent record.
    pub(crate) fn resolved(value: RelationValue) -> Self {
        Self {
            inner: Arc::new(AccessorInner {
                state: Mutex::new(LoaderState::Loaded(value)),
                fetch: None,
            }),
        }
    }

    /// Accessor that fetches on first access via `fetch`.
    pub(crate) fn lazy(fetch: LoadFn) -> Self {
        Self {
            inner: Arc::new(AccessorInner {
                state: Mutex::new(LoaderState::Unloaded),
                fetch: Some(fetch),
            }),
        }
    }

    /// Whether the relation has resolved. `false` while a fetch is pending.
    pub fn is_loaded(&self) -> bool {
        matches!(&*self.inner.state.lock(), LoaderState::Loaded(_))
    }

    /// Resolve the relation.
    ///
    /// Concurrent callers on the same accessor share a single underlying
    /// fetch; once resolved, the value is returned without further I/O.
    pub async fn load(&self) -> OrmResult<RelationValue> {
        let shared = {
            let mut state = self.inner.state.lock();

            match &*state {
                LoaderState::Loaded(value) => return Ok(value.clone()),
                LoaderState::Loading(shared) => {
                    trace!("joining in-flight relation fetch");
                    shared.clone()
                }
                LoaderState::Unloaded => {
                    let shared = self.begin_load();
                    *state = LoaderState::Loading(shared.clone());
                    shared
                }
            }
        };

        shared.await
    }

    fn begin_load(&self) -> SharedLoad {
        let fetch = match &self.inner.fetch {
            Some(fetch) => fetch.clone(),
            // resolved accessors never leave the Loaded state
            None => unreachable!("unloaded relation accessor without a fetch"),
        };
        let slot = Arc::downgrade(&self.inner);

        async move {
            let result = fetch().await;

            if let Some(inner) = slot.upgrade() {
                let mut state = inner.state.lock();
                match &result {
                    Ok(value) => *state = LoaderState::Loaded(value.clone()),
                    // surface the failure but do not memoize it
                    Err(_) => *state = LoaderState::Unloaded,
                }
            }

            result
        }
        .boxed()
        .shared()
    }
}

impl std::fmt::Debug for RelationAccessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = match &*self.inner.state.lock() {
            LoaderState::Unloaded => "unloaded",
            LoaderState::Loading(_) => "loading",
            LoaderState::Loaded(_) => "loaded",
        };

        f.debug_struct("RelationAccessor")
            .field("state", &state)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use pretty_assertions::assert_eq;

    use super::*;
    use crate::error::OrmError;

    fn counting_accessor(calls: Arc<AtomicUsize>) -> RelationAccessor {
        RelationAccessor::lazy(Arc::new(move || {
            let calls = calls.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(10)).await;
                Ok(RelationValue::Many(Vec::new()))
            }
            .boxed()
        }))
    }

    #[tokio::test]
    async fn concurrent_calls_share_one_fetch() {
        let calls = Arc::new(AtomicUsize::new(0));
        let accessor = counting_accessor(calls.clone());

        let (a, b) = tokio::join!(accessor.load(), accessor.load());

        assert!(matches!(a, Ok(RelationValue::Many(_))));
        assert!(matches!(b, Ok(RelationValue::Many(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn resolved_value_is_memoized() {
        let calls = Arc::new(AtomicUsize::new(0));
        let accessor = counting_accessor(calls.clone());

        assert!(!accessor.is_loaded());
        accessor.load().await.unwrap();
        assert!(accessor.is_loaded());

        accessor.load().await.unwrap();
        accessor.load().await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failures_are_not_memoized() {
        let calls = Arc::new(AtomicUsize::new(0));
        let accessor = {
            let calls = calls.clone();
            RelationAccessor::lazy(Arc::new(move || {
                let attempt = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if attempt == 0 {
                        Err(OrmError::client(anyhow::anyhow!("connection reset")))
                    } else {
                        Ok(RelationValue::Many(Vec::new()))
                    }
                }
                .boxed()
            }))
        };

        assert!(accessor.load().await.is_err());
        assert!(!accessor.is_loaded());

        // the next call starts over instead of replaying the failure
        assert!(accessor.load().await.is_ok());
        assert!(accessor.is_loaded());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn concurrent_waiters_see_the_same_failure() {
        let calls = Arc::new(AtomicUsize::new(0));
        let accessor = {
            let calls = calls.clone();
            RelationAccessor::lazy(Arc::new(move || {
                calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    Err(OrmError::client(anyhow::anyhow!("boom")))
                }
                .boxed()
            }))
        };

        let (a, b) = tokio::join!(accessor.load(), accessor.load());

        assert!(a.is_err());
        assert!(b.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn pre_resolved_accessor_never_fetches() {
        let accessor = RelationAccessor::resolved(RelationValue::Many(Vec::new()));

        assert!(accessor.is_loaded());
        assert!(matches!(
            accessor.load().await,
            Ok(RelationValue::Many(values)) if values.is_empty()
        ));
    }
}
