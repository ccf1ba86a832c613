//! Completion detection over published state.
//!
//! A [`StateMatcher`] subscribes to the state keys its demands address, and resolves as
//! soon as every demand holds on the latest value of its key. It is bounded by a deadline
//! and is single use.

use std::{collections::HashMap, sync::Arc, time::Duration};

use tokio::{
    sync::oneshot,
    time::{Instant, sleep_until, timeout_at},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, trace};

use astra_core::StateStore;
use astra_model::{CommandStatus, ConfigData, ConfigKey, RunId};

/// Predicate on one state key: the published value must contain every demanded item.
#[derive(Debug, Clone, PartialEq)]
pub struct DemandMatcher {
    demand: ConfigData,
    with_units: bool,
}

impl DemandMatcher {
    /// Compares values only.
    pub fn new(demand: ConfigData) -> Self {
        Self {
            demand,
            with_units: false,
        }
    }

    /// Compares values and units.
    pub fn with_units(demand: ConfigData) -> Self {
        Self {
            demand,
            with_units: true,
        }
    }

    pub fn key(&self) -> &ConfigKey {
        self.demand.prefix()
    }

    pub fn demand(&self) -> &ConfigData {
        &self.demand
    }

    pub fn check(&self, current: &ConfigData) -> bool {
        current.satisfies(&self.demand, self.with_units)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum MatchResult {
    Matched,
    /// Deadline passed first.
    NoMatch,
    Cancelled,
    /// The state subscription failed or ended.
    Failed(String),
}

impl MatchResult {
    pub fn into_status(self, run_id: RunId) -> CommandStatus {
        match self {
            MatchResult::Matched => CommandStatus::Completed(run_id),
            MatchResult::NoMatch => CommandStatus::NoMatch(run_id),
            MatchResult::Cancelled => CommandStatus::Cancelled(run_id),
            MatchResult::Failed(reason) => CommandStatus::Error(run_id, reason),
        }
    }
}

pub struct StateMatcher {
    store: Arc<dyn StateStore>,
    demands: Vec<DemandMatcher>,
    timeout: Duration,
}

impl StateMatcher {
    pub fn new(store: Arc<dyn StateStore>, demands: Vec<DemandMatcher>, timeout: Duration) -> Self {
        Self {
            store,
            demands,
            timeout,
        }
    }

    /// Watch state until every demand holds, the deadline passes, or `cancel` fires.
    #[instrument(level = "debug", skip_all, fields(demands = self.demands.len(), timeout_ms = self.timeout.as_millis() as u64))]
    pub async fn run(self, cancel: &CancellationToken) -> MatchResult {
        if self.demands.is_empty() {
            return MatchResult::Matched;
        }
        let deadline = Instant::now() + self.timeout;

        let mut keys: Vec<ConfigKey> = Vec::with_capacity(self.demands.len());
        for d in &self.demands {
            if !keys.contains(d.key()) {
                keys.push(d.key().clone());
            }
        }

        let mut subscription = tokio::select! {
            _ = cancel.cancelled() => return MatchResult::Cancelled,
            subscribed = timeout_at(deadline, self.store.subscribe(&keys)) => match subscribed {
                Ok(Ok(s)) => s,
                Ok(Err(e)) => return MatchResult::Failed(e.to_string()),
                Err(_) => return MatchResult::NoMatch,
            },
        };

        let mut latest: HashMap<ConfigKey, ConfigData> = HashMap::with_capacity(keys.len());
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return MatchResult::Cancelled,
                next = subscription.recv() => match next {
                    Some(Ok(update)) => {
                        trace!(key = %update.key, "state update");
                        latest.insert(update.key, update.data);
                        if self.holds(&latest) {
                            debug!("demands matched");
                            return MatchResult::Matched;
                        }
                    }
                    Some(Err(e)) => return MatchResult::Failed(format!("state subscription lost: {e}")),
                    None => return MatchResult::Failed("state subscription closed".into()),
                },
                _ = sleep_until(deadline) => {
                    debug!("deadline passed without a match");
                    return MatchResult::NoMatch;
                }
            }
        }
    }

    /// Run on its own task.
    pub fn spawn(self) -> MatcherHandle {
        let (tx, rx) = oneshot::channel();
        let token = CancellationToken::new();
        let cancel = token.clone();
        tokio::spawn(async move {
            let result = self.run(&cancel).await;
            let _ = tx.send(result);
        });
        MatcherHandle { rx, token }
    }

    fn holds(&self, latest: &HashMap<ConfigKey, ConfigData>) -> bool {
        self.demands
            .iter()
            .all(|d| latest.get(d.key()).is_some_and(|current| d.check(current)))
    }
}

/// A matcher running on its own task.
pub struct MatcherHandle {
    rx: oneshot::Receiver<MatchResult>,
    token: CancellationToken,
}

impl MatcherHandle {
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub async fn wait(self) -> MatchResult {
        self.rx
            .await
            .unwrap_or_else(|_| MatchResult::Failed("matcher task ended".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use astra_core::{InMemoryStateStore, StateSubscription, StoreError};
    use astra_model::Units;

    fn key(s: &str) -> ConfigKey {
        ConfigKey::new(s).unwrap()
    }

    fn pos(value: f64) -> ConfigData {
        ConfigData::new(key("nfiraos.trombone")).with("pos", value, Units::Millimeter)
    }

    /// Paused-clock timers fire on millisecond ticks.
    fn assert_at(started: Instant, expected: Duration) {
        let elapsed = started.elapsed();
        assert!(
            elapsed >= expected && elapsed < expected + Duration::from_millis(5),
            "resolved after {elapsed:?}, expected {expected:?}"
        );
    }

    fn publish_later(store: Arc<InMemoryStateStore>, after: Duration, data: ConfigData) {
        tokio::spawn(async move {
            tokio::time::sleep(after).await;
            store.publish(&data.prefix().clone(), data).await.unwrap();
        });
    }

    #[tokio::test(start_paused = true)]
    async fn completes_when_state_reaches_demand() {
        let store = Arc::new(InMemoryStateStore::new());
        publish_later(store.clone(), Duration::from_millis(100), pos(7.0));
        publish_later(store.clone(), Duration::from_millis(500), pos(10.0));

        let started = Instant::now();
        let matcher = StateMatcher::new(
            store,
            vec![DemandMatcher::new(pos(10.0))],
            Duration::from_secs(2),
        );
        assert_eq!(matcher.run(&CancellationToken::new()).await, MatchResult::Matched);
        assert_at(started, Duration::from_millis(500));
    }

    #[tokio::test(start_paused = true)]
    async fn times_out_exactly_at_deadline() {
        let store = Arc::new(InMemoryStateStore::new());
        publish_later(store.clone(), Duration::from_millis(100), pos(7.0));

        let started = Instant::now();
        let matcher = StateMatcher::new(
            store,
            vec![DemandMatcher::new(pos(10.0))],
            Duration::from_secs(2),
        );
        assert_eq!(matcher.run(&CancellationToken::new()).await, MatchResult::NoMatch);
        assert_at(started, Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn already_published_state_matches_immediately() {
        let store = Arc::new(InMemoryStateStore::new());
        store.publish(&key("nfiraos.trombone"), pos(10.0)).await.unwrap();

        let started = Instant::now();
        let matcher = StateMatcher::new(
            store,
            vec![DemandMatcher::new(pos(10.0))],
            Duration::from_secs(2),
        );
        assert_eq!(matcher.run(&CancellationToken::new()).await, MatchResult::Matched);
        assert_at(started, Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn units_are_compared_only_when_asked() {
        let store = Arc::new(InMemoryStateStore::new());
        let published = ConfigData::new(key("nfiraos.trombone")).with("pos", 10.0, Units::Meter);
        store.publish(&key("nfiraos.trombone"), published).await.unwrap();

        let loose = StateMatcher::new(
            store.clone(),
            vec![DemandMatcher::new(pos(10.0))],
            Duration::from_secs(1),
        );
        assert_eq!(loose.run(&CancellationToken::new()).await, MatchResult::Matched);

        let strict = StateMatcher::new(
            store,
            vec![DemandMatcher::with_units(pos(10.0))],
            Duration::from_secs(1),
        );
        assert_eq!(strict.run(&CancellationToken::new()).await, MatchResult::NoMatch);
    }

    #[tokio::test(start_paused = true)]
    async fn every_demand_must_hold_at_once() {
        let store = Arc::new(InMemoryStateStore::new());
        let filter = |name: &str| ConfigData::new(key("iris.filter")).with("name", name, Units::NoUnits);

        publish_later(store.clone(), Duration::from_millis(100), pos(10.0));
        publish_later(store.clone(), Duration::from_millis(300), filter("J"));

        let started = Instant::now();
        let matcher = StateMatcher::new(
            store,
            vec![DemandMatcher::new(pos(10.0)), DemandMatcher::new(filter("J"))],
            Duration::from_secs(2),
        );
        assert_eq!(matcher.spawn().wait().await, MatchResult::Matched);
        assert_at(started, Duration::from_millis(300));
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_stops_the_matcher() {
        let store = Arc::new(InMemoryStateStore::new());
        let handle = StateMatcher::new(
            store,
            vec![DemandMatcher::new(pos(10.0))],
            Duration::from_secs(2),
        )
        .spawn();

        handle.cancel();
        assert_eq!(handle.wait().await, MatchResult::Cancelled);
    }

    #[tokio::test]
    async fn lagging_subscription_fails_the_match() {
        let store = Arc::new(InMemoryStateStore::with_capacity(1));
        let handle = StateMatcher::new(
            store.clone(),
            vec![DemandMatcher::new(pos(10.0))],
            Duration::from_secs(2),
        )
        .spawn();
        for _ in 0..3 {
            tokio::task::yield_now().await;
        }

        for value in 1..=5 {
            store.publish(&key("nfiraos.trombone"), pos(value as f64)).await.unwrap();
        }
        let result = handle.wait().await;
        let MatchResult::Failed(reason) = &result else {
            panic!("expected a failure, got {result:?}");
        };
        assert!(reason.contains("lost"), "{reason}");

        let run = RunId::new();
        assert!(matches!(result.into_status(run), CommandStatus::Error(r, _) if r == run));
    }

    /// Hands out subscriptions whose source is already gone.
    struct Unplugged;

    #[async_trait::async_trait]
    impl StateStore for Unplugged {
        async fn publish(&self, _: &ConfigKey, _: ConfigData) -> Result<(), StoreError> {
            Ok(())
        }

        async fn subscribe(&self, _: &[ConfigKey]) -> Result<StateSubscription, StoreError> {
            let (_, rx) = tokio::sync::mpsc::channel(1);
            Ok(StateSubscription::new(rx, CancellationToken::new()))
        }

        async fn get(&self, _: &ConfigKey) -> Result<Option<ConfigData>, StoreError> {
            Ok(None)
        }
    }

    #[tokio::test(start_paused = true)]
    async fn closed_subscription_fails_before_the_deadline() {
        let started = Instant::now();
        let result = StateMatcher::new(
            Arc::new(Unplugged),
            vec![DemandMatcher::new(pos(10.0))],
            Duration::from_secs(2),
        )
        .run(&CancellationToken::new())
        .await;

        assert_eq!(result, MatchResult::Failed("state subscription closed".into()));
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[test]
    fn results_map_to_terminal_statuses() {
        let run = RunId::new();
        assert_eq!(MatchResult::Matched.into_status(run), CommandStatus::Completed(run));
        assert_eq!(MatchResult::NoMatch.into_status(run), CommandStatus::NoMatch(run));
        assert!(MatchResult::Failed("lagged".into()).into_status(run).is_terminal());
    }
}
