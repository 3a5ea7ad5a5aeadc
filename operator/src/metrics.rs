use crate::{orchestrator::PassReport, reconciler::Applied, Error};
use prometheus_client::{
    encoding::{text::encode, EncodeLabelSet},
    metrics::{counter::Counter, family::Family, histogram::Histogram},
    registry::{Registry, Unit},
};
use std::sync::Arc;
use tokio::time::Instant;

#[derive(Clone)]
pub struct Metrics {
    pub reconcile: ReconcileMetrics,
    pub registry: Arc<Registry>,
}

impl Default for Metrics {
    fn default() -> Self {
        let mut registry = Registry::with_prefix("jaeger_reconcile");
        let reconcile = ReconcileMetrics::default().register(&mut registry);
        Self {
            reconcile,
            registry: Arc::new(registry),
        }
    }
}

impl Metrics {
    /// Metrics getter, in the openmetrics text format
    pub fn encode(&self) -> String {
        let mut buffer = String::new();
        if let Err(e) = encode(&mut buffer, &self.registry) {
            tracing::warn!("Encoding metrics failed: {e}");
        }
        buffer
    }
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct ErrorLabels {
    pub instance: String,
    pub error: String,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct MutationLabels {
    pub kind: String,
    pub action: String,
}

#[derive(Clone)]
pub struct ReconcileMetrics {
    pub runs: Counter,
    pub failures: Family<ErrorLabels, Counter>,
    pub mutations: Family<MutationLabels, Counter>,
    pub duration: Histogram,
}

impl Default for ReconcileMetrics {
    fn default() -> Self {
        Self {
            runs: Counter::default(),
            failures: Family::<ErrorLabels, Counter>::default(),
            mutations: Family::<MutationLabels, Counter>::default(),
            duration: Histogram::new([0.01, 0.1, 0.25, 0.5, 1., 5., 15., 60.].into_iter()),
        }
    }
}

impl ReconcileMetrics {
    /// Register API metrics to start tracking them.
    pub fn register(self, r: &mut Registry) -> Self {
        r.register_with_unit(
            "duration",
            "reconcile duration",
            Unit::Seconds,
            self.duration.clone(),
        );
        r.register("failures", "reconciliation errors", self.failures.clone());
        r.register("mutations", "objects created, updated or deleted", self.mutations.clone());
        r.register("runs", "reconciliations", self.runs.clone());
        self
    }

    pub fn reconcile_failure(&self, instance: &str, e: &Error) {
        self.failures
            .get_or_create(&ErrorLabels {
                instance: instance.to_string(),
                error: e.metric_label(),
            })
            .inc();
    }

    pub fn record_pass(&self, report: &PassReport) {
        for kind in &report.kinds {
            for (applied, count) in [
                (Applied::Created, kind.created.len()),
                (Applied::Updated, kind.updated.len()),
                (Applied::Deleted, kind.deleted.len()),
            ] {
                if count > 0 {
                    self.mutations
                        .get_or_create(&MutationLabels {
                            kind: kind.kind.to_string(),
                            action: applied.as_str().to_string(),
                        })
                        .inc_by(count as u64);
                }
            }
        }
    }

    pub fn count_and_measure(&self) -> ReconcileMeasurer {
        self.runs.inc();
        ReconcileMeasurer {
            start: Instant::now(),
            metric: self.duration.clone(),
        }
    }
}

/// Smart function duration measurer
///
/// Relies on Drop to calculate duration and register the observation in the histogram
pub struct ReconcileMeasurer {
    start: Instant,
    metric: Histogram,
}

impl Drop for ReconcileMeasurer {
    fn drop(&mut self) {
        #[allow(clippy::cast_precision_loss)]
        let duration = self.start.elapsed().as_millis() as f64 / 1000.0;
        self.metric.observe(duration);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reconciler::KindReport;
    use common::{Kind, ObjectIdentity};

    #[test]
    fn test_pass_mutations_are_counted_per_kind() {
        let metrics = Metrics::default();
        let mut kind = KindReport::new(Kind::ConfigMap);
        kind.created.push(ObjectIdentity::new(Kind::ConfigMap, "ns", "a"));
        kind.created.push(ObjectIdentity::new(Kind::ConfigMap, "ns", "b"));
        kind.deleted.push(ObjectIdentity::new(Kind::ConfigMap, "ns", "c"));
        let report = PassReport {
            owner: "Jaeger ns/simplest".to_string(),
            kinds: vec![kind],
        };
        metrics.reconcile.record_pass(&report);
        drop(metrics.reconcile.count_and_measure());

        let created = MutationLabels {
            kind: "ConfigMap".to_string(),
            action: "created".to_string(),
        };
        assert_eq!(metrics.reconcile.mutations.get_or_create(&created).get(), 2);
        assert_eq!(metrics.reconcile.runs.get(), 1);
        let text = metrics.encode();
        assert!(text.contains("jaeger_reconcile_mutations_total"));
        assert!(text.contains("jaeger_reconcile_duration_seconds"));
    }
}
