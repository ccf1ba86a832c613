use std::{
    collections::{HashMap, HashSet, VecDeque},
    sync::{Arc, PoisonError, RwLock},
};

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{trace, warn};

use astra_model::{ConfigData, ConfigKey};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("subscription lagged behind by {0} updates")]
    Lagged(u64),
    #[error("state store unavailable: {0}")]
    Unavailable(String),
}

/// One published value of a state variable.
#[derive(Debug, Clone, PartialEq)]
pub struct StateUpdate {
    pub key: ConfigKey,
    pub data: ConfigData,
}

/// Last-value store for named state variables.
#[async_trait]
pub trait StateStore: Send + Sync + 'static {
    async fn publish(&self, key: &ConfigKey, data: ConfigData) -> Result<(), StoreError>;

    /// Subscribe to updates of `keys`.
    ///
    /// The stream first yields the last published value of each key (when one exists),
    /// then live updates in publication order.
    async fn subscribe(&self, keys: &[ConfigKey]) -> Result<StateSubscription, StoreError>;

    async fn get(&self, key: &ConfigKey) -> Result<Option<ConfigData>, StoreError>;
}

/// Cancellable stream of state updates.
///
/// Dropping the subscription cancels it. `recv` returns `None` once the source is gone,
/// and `Some(Err(_))` when updates were lost.
pub struct StateSubscription {
    rx: mpsc::Receiver<Result<StateUpdate, StoreError>>,
    token: CancellationToken,
    _guard: DropGuard,
}

impl StateSubscription {
    /// Wrap a channel fed by a store implementation.
    ///
    /// `token` is cancelled when the subscription is cancelled or dropped, so the feeding
    /// side can stop.
    pub fn new(rx: mpsc::Receiver<Result<StateUpdate, StoreError>>, token: CancellationToken) -> Self {
        let guard = token.clone().drop_guard();
        Self {
            rx,
            token,
            _guard: guard,
        }
    }

    pub async fn recv(&mut self) -> Option<Result<StateUpdate, StoreError>> {
        if self.token.is_cancelled() {
            return None;
        }
        self.rx.recv().await
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

const DEFAULT_CAPACITY: usize = 1024;

struct StoreInner {
    last: HashMap<ConfigKey, ConfigData>,
    tx: broadcast::Sender<StateUpdate>,
}

/// Process-local state store backed by a broadcast channel.
#[derive(Clone)]
pub struct InMemoryStateStore {
    inner: Arc<RwLock<StoreInner>>,
    capacity: usize,
}

impl InMemoryStateStore {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// `capacity` bounds how far a subscriber may fall behind before it sees `Lagged`.
    pub fn with_capacity(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self {
            inner: Arc::new(RwLock::new(StoreInner {
                last: HashMap::new(),
                tx,
            })),
            capacity: capacity.max(1),
        }
    }
}

impl Default for InMemoryStateStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StateStore for InMemoryStateStore {
    async fn publish(&self, key: &ConfigKey, data: ConfigData) -> Result<(), StoreError> {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        inner.last.insert(key.clone(), data.clone());
        // No receivers is fine: the value is still kept as last value.
        let _ = inner.tx.send(StateUpdate {
            key: key.clone(),
            data,
        });
        trace!(key = %key, "state published");
        Ok(())
    }

    async fn subscribe(&self, keys: &[ConfigKey]) -> Result<StateSubscription, StoreError> {
        let wanted: HashSet<ConfigKey> = keys.iter().cloned().collect();

        // Snapshot and receiver are taken under one lock so no update falls in between.
        let (mut initial, mut brx) = {
            let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
            let initial: VecDeque<StateUpdate> = keys
                .iter()
                .filter_map(|k| {
                    inner.last.get(k).map(|d| StateUpdate {
                        key: k.clone(),
                        data: d.clone(),
                    })
                })
                .collect();
            (initial, inner.tx.subscribe())
        };

        let (tx, rx) = mpsc::channel(self.capacity);
        let token = CancellationToken::new();
        let stop = token.clone();

        tokio::spawn(async move {
            while let Some(update) = initial.pop_front() {
                if tx.send(Ok(update)).await.is_err() {
                    return;
                }
            }
            loop {
                tokio::select! {
                    _ = stop.cancelled() => return,
                    received = brx.recv() => match received {
                        Ok(update) if wanted.contains(&update.key) => {
                            if tx.send(Ok(update)).await.is_err() {
                                return;
                            }
                        }
                        Ok(_) => {}
                        Err(broadcast::error::RecvError::Lagged(n)) => {
                            warn!(missed = n, "state subscription lagged");
                            let _ = tx.send(Err(StoreError::Lagged(n))).await;
                            return;
                        }
                        Err(broadcast::error::RecvError::Closed) => return,
                    }
                }
            }
        });

        Ok(StateSubscription::new(rx, token))
    }

    async fn get(&self, key: &ConfigKey) -> Result<Option<ConfigData>, StoreError> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        Ok(inner.last.get(key).cloned())
    }
}
