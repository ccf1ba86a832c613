use std::{fmt, time::Duration};

use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry, TextEncoder,
    proto::MetricFamily,
};

use astra_core::MetricsBackend;
use astra_model::{ComponentId, LifecycleState, Outcome};

/// [`MetricsBackend`] recording into a Prometheus [`Registry`].
#[derive(Clone)]
pub struct PrometheusMetrics {
    transitions: IntCounterVec,
    submitted: IntCounterVec,
    completed: IntCounterVec,
    duration: HistogramVec,
    registry: Registry,
}

impl PrometheusMetrics {
    /// Register every metric in a fresh registry.
    pub fn new() -> Result<Self, prometheus::Error> {
        Self::with_registry(Registry::new())
    }

    /// Register every metric in `registry`, e.g. one shared with the rest of the process.
    pub fn with_registry(registry: Registry) -> Result<Self, prometheus::Error> {
        let transitions = IntCounterVec::new(
            Opts::new(
                "astra_lifecycle_transitions_total",
                "Lifecycle states entered, per component",
            ),
            &["component", "state"],
        )?;
        registry.register(Box::new(transitions.clone()))?;

        let submitted = IntCounterVec::new(
            Opts::new(
                "astra_commands_submitted_total",
                "Commands accepted with a run id, per component",
            ),
            &["component"],
        )?;
        registry.register(Box::new(submitted.clone()))?;

        let completed = IntCounterVec::new(
            Opts::new(
                "astra_commands_completed_total",
                "Commands that reached a terminal status, per component and outcome",
            ),
            &["component", "outcome"],
        )?;
        registry.register(Box::new(completed.clone()))?;

        let opts = HistogramOpts::new(
            "astra_command_duration_seconds",
            "Time from acceptance to terminal status",
        )
        .buckets(prometheus::exponential_buckets(0.005, 2.0, 14)?);
        let duration = HistogramVec::new(opts, &["component"])?;
        registry.register(Box::new(duration.clone()))?;

        Ok(Self {
            transitions,
            submitted,
            completed,
            duration,
            registry,
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn gather(&self) -> Vec<MetricFamily> {
        self.registry.gather()
    }

    /// Text exposition format of every registered metric.
    pub fn render(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

impl MetricsBackend for PrometheusMetrics {
    fn record_transition(&self, component: &ComponentId, state: &LifecycleState) {
        self.transitions
            .with_label_values(&[component.to_string().as_str(), state.name()])
            .inc();
    }

    fn record_command_submitted(&self, component: &ComponentId) {
        self.submitted
            .with_label_values(&[component.to_string().as_str()])
            .inc();
    }

    fn record_command_finished(&self, component: &ComponentId, outcome: Outcome, elapsed: Duration) {
        let component = component.to_string();
        self.completed
            .with_label_values(&[component.as_str(), outcome.label()])
            .inc();
        self.duration
            .with_label_values(&[component.as_str()])
            .observe(elapsed.as_secs_f64());
    }
}

impl fmt::Debug for PrometheusMetrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PrometheusMetrics").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mount() -> ComponentId {
        ComponentId::new("tcs", "mount")
    }

    #[test]
    fn counts_transitions_per_state() {
        let metrics = PrometheusMetrics::new().unwrap();
        metrics.record_transition(&mount(), &LifecycleState::Initialized);
        metrics.record_transition(&mount(), &LifecycleState::Running);
        metrics.record_transition(&mount(), &LifecycleState::Running);

        let running = metrics
            .transitions
            .with_label_values(&["tcs.mount", LifecycleState::Running.name()])
            .get();
        assert_eq!(running, 2);
    }

    #[test]
    fn error_states_share_one_label() {
        let metrics = PrometheusMetrics::new().unwrap();
        metrics.record_transition(&mount(), &LifecycleState::Error("a".into()));
        metrics.record_transition(&mount(), &LifecycleState::Error("b".into()));

        let text = metrics.render().unwrap();
        let series: Vec<_> = text
            .lines()
            .filter(|l| l.starts_with("astra_lifecycle_transitions_total{"))
            .collect();
        assert_eq!(series.len(), 1);
        assert!(series[0].ends_with(" 2"), "{}", series[0]);
    }

    #[test]
    fn records_command_outcomes_and_durations() {
        let metrics = PrometheusMetrics::new().unwrap();
        metrics.record_command_submitted(&mount());
        metrics.record_command_submitted(&mount());
        metrics.record_command_finished(&mount(), Outcome::Completed, Duration::from_millis(120));
        metrics.record_command_finished(&mount(), Outcome::NoMatch, Duration::from_secs(2));

        assert_eq!(metrics.submitted.with_label_values(&["tcs.mount"]).get(), 2);
        assert_eq!(
            metrics
                .completed
                .with_label_values(&["tcs.mount", "noMatch"])
                .get(),
            1
        );
        let histogram = metrics.duration.with_label_values(&["tcs.mount"]);
        assert_eq!(histogram.get_sample_count(), 2);
    }

    #[test]
    fn renders_text_exposition() {
        let metrics = PrometheusMetrics::new().unwrap();
        metrics.record_command_submitted(&mount());

        let text = metrics.render().unwrap();
        assert!(text.contains("astra_commands_submitted_total{component=\"tcs.mount\"} 1"));
    }

    #[test]
    fn shared_registry_rejects_second_backend() {
        let registry = Registry::new();
        let _first = PrometheusMetrics::with_registry(registry.clone()).unwrap();
        assert!(PrometheusMetrics::with_registry(registry).is_err());
    }
}
