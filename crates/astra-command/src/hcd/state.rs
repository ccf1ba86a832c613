use std::sync::{Arc, OnceLock};

use tokio::sync::{Mutex, watch};

use astra_core::{HealthReporter, StateStore, StoreError};
use astra_model::{ConfigData, ConfigKey};

/// The current-state snapshot of one HCD.
///
/// Shared by command execution and periodic publication; every update replaces the whole
/// snapshot, so readers never observe a half-written state. Publications reach the store
/// in the order the snapshots were taken.
#[derive(Clone)]
pub struct CurrentState {
    cell: Arc<watch::Sender<ConfigData>>,
    store: Arc<dyn StateStore>,
    publishing: Arc<Mutex<()>>,
    health: Arc<OnceLock<HealthReporter>>,
}

impl CurrentState {
    pub fn new(initial: ConfigData, store: Arc<dyn StateStore>) -> Self {
        let (tx, _) = watch::channel(initial);
        Self {
            cell: Arc::new(tx),
            store,
            publishing: Arc::new(Mutex::new(())),
            health: Arc::new(OnceLock::new()),
        }
    }

    pub fn snapshot(&self) -> ConfigData {
        self.cell.borrow().clone()
    }

    pub fn key(&self) -> ConfigKey {
        self.cell.borrow().prefix().clone()
    }

    /// Replace the snapshot and publish it.
    pub async fn set(&self, data: ConfigData) -> Result<(), StoreError> {
        let _turn = self.publishing.lock().await;
        self.cell.send_replace(data.clone());
        self.store.publish(&data.prefix().clone(), data).await
    }

    /// Replace the snapshot with `f(current)` and publish it.
    pub async fn update(&self, f: impl FnOnce(&ConfigData) -> ConfigData) -> Result<(), StoreError> {
        let _turn = self.publishing.lock().await;
        let next = f(&*self.cell.borrow());
        self.cell.send_replace(next.clone());
        self.store.publish(&next.prefix().clone(), next).await
    }

    /// Publish the snapshot as it is.
    pub async fn publish(&self) -> Result<(), StoreError> {
        let _turn = self.publishing.lock().await;
        let data = self.snapshot();
        self.store.publish(&data.prefix().clone(), data).await
    }

    pub fn watch(&self) -> watch::Receiver<ConfigData> {
        self.cell.subscribe()
    }

    /// Report a hardware fault the driver cannot recover from.
    ///
    /// The owning component moves to `Error(reason)`. Returns false when the component is
    /// not supervised.
    pub fn report_failure(&self, reason: impl Into<String>) -> bool {
        match self.health.get() {
            Some(health) if health.is_attached() => {
                health.fail(reason);
                true
            }
            _ => false,
        }
    }

    pub(crate) fn attach_health(&self, health: HealthReporter) {
        let _ = self.health.set(health);
    }
}
