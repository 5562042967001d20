use crate::model::{Entity, Id};
use crate::store::EntityStore;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{oneshot, Notify};
use tokio::time::sleep;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LoadError {
    #[error("batch fetch failed: {0}")]
    Fetch(String),
    #[error("load canceled before the batch was flushed")]
    Canceled,
}

pub type LoadResult = Result<Option<Entity>, LoadError>;

struct PendingBatch {
    keys: Vec<Id>,
    flush_now: Arc<Notify>,
}

#[derive(Default)]
struct ScopeState {
    cache: HashMap<Id, Option<Entity>>,
    batch: Option<PendingBatch>,
    in_flight: HashMap<Id, Vec<oneshot::Sender<LoadResult>>>,
}

/// Request-scoped batching loader for entities of one organization.
///
/// Concurrent `load` calls within the collection window are coalesced into a
/// single `get_entities_by_ids` call. The first caller of a batch becomes its
/// leader: it waits out the window (or an early flush when the batch fills
/// up), performs the fetch and distributes results to every waiter. Results,
/// including misses, are cached for the lifetime of the scope, and a key that
/// is already being fetched is never requested again.
pub struct LoaderScope<S: EntityStore> {
    store: Arc<S>,
    organization_id: Id,
    window: Duration,
    max_batch: usize,
    state: Mutex<ScopeState>,
}

impl<S: EntityStore> LoaderScope<S> {
    pub fn new(store: Arc<S>, organization_id: Id, window: Duration, max_batch: usize) -> Self {
        Self {
            store,
            organization_id,
            window,
            max_batch: max_batch.max(1),
            state: Mutex::new(ScopeState::default()),
        }
    }

    pub fn organization_id(&self) -> &Id {
        &self.organization_id
    }

    /// Register an already-resolved entity so later loads hit the cache.
    pub fn prime(&self, entity: &Entity) {
        let mut state = self.state.lock();
        state
            .cache
            .entry(entity.id.clone())
            .or_insert_with(|| Some(entity.clone()));
    }

    pub async fn load(&self, key: &Id) -> LoadResult {
        let (rx, flush_duty) = {
            let mut state = self.state.lock();
            if let Some(cached) = state.cache.get(key) {
                return Ok(cached.clone());
            }

            let (tx, rx) = oneshot::channel();
            let already_in_flight = state.in_flight.contains_key(key);
            state.in_flight.entry(key.clone()).or_default().push(tx);

            let mut flush_duty = None;
            if !already_in_flight {
                match &mut state.batch {
                    Some(batch) => {
                        batch.keys.push(key.clone());
                        if batch.keys.len() >= self.max_batch {
                            batch.flush_now.notify_one();
                        }
                    }
                    None => {
                        let flush_now = Arc::new(Notify::new());
                        state.batch = Some(PendingBatch {
                            keys: vec![key.clone()],
                            flush_now: flush_now.clone(),
                        });
                        flush_duty = Some(flush_now);
                    }
                }
            }
            (rx, flush_duty)
        };

        if let Some(flush_now) = flush_duty {
            self.flush_as_leader(flush_now).await;
        }

        rx.await.unwrap_or(Err(LoadError::Canceled))
    }

    /// Load many keys, preserving input order in the result.
    pub async fn load_many(&self, keys: &[Id]) -> Vec<LoadResult> {
        futures::future::join_all(keys.iter().map(|key| self.load(key))).await
    }

    async fn flush_as_leader(&self, flush_now: Arc<Notify>) {
        let mut duty = FlushDuty {
            state: &self.state,
            keys: None,
            completed: false,
        };

        tokio::select! {
            _ = sleep(self.window) => {}
            _ = flush_now.notified() => {}
        }

        let keys = {
            let mut state = self.state.lock();
            match state.batch.take() {
                Some(batch) => batch.keys,
                None => {
                    duty.completed = true;
                    return;
                }
            }
        };
        duty.keys = Some(keys.clone());

        let fetched = self
            .store
            .get_entities_by_ids(&self.organization_id, &keys)
            .await;

        let mut state = self.state.lock();
        match fetched {
            Ok(entities) => {
                let mut by_id: HashMap<Id, Entity> =
                    entities.into_iter().map(|e| (e.id.clone(), e)).collect();
                for key in &keys {
                    let value = by_id.remove(key);
                    state.cache.insert(key.clone(), value.clone());
                    if let Some(senders) = state.in_flight.remove(key) {
                        for tx in senders {
                            let _ = tx.send(Ok(value.clone()));
                        }
                    }
                }
            }
            Err(err) => {
                let message = err.to_string();
                for key in &keys {
                    if let Some(senders) = state.in_flight.remove(key) {
                        for tx in senders {
                            let _ = tx.send(Err(LoadError::Fetch(message.clone())));
                        }
                    }
                }
            }
        }
        duty.completed = true;
    }
}

/// Fails the batch's waiters when a leader is dropped mid-flight, so nobody
/// waits on a batch that will never be fetched.
struct FlushDuty<'a> {
    state: &'a Mutex<ScopeState>,
    keys: Option<Vec<Id>>,
    completed: bool,
}

impl Drop for FlushDuty<'_> {
    fn drop(&mut self) {
        if self.completed {
            return;
        }
        let mut state = self.state.lock();
        let keys = match self.keys.take() {
            Some(keys) => keys,
            None => match state.batch.take() {
                Some(batch) => batch.keys,
                None => return,
            },
        };
        for key in keys {
            if let Some(senders) = state.in_flight.remove(&key) {
                for tx in senders {
                    let _ = tx.send(Err(LoadError::Canceled));
                }
            }
        }
    }
}
