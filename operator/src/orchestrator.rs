use crate::{
    reconciler::{KindReconciler, KindReport},
    Error, Result,
};
use common::{InstanceLoader, Kind, ObjectStore, OwnerTag, StrategyProvider};
use kube::runtime::controller::Action;
use std::{fmt, sync::Arc, time::Duration};
use tracing::instrument;

/// Reference to the Jaeger instance a pass is about
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReconcileRequest {
    pub namespace: String,
    pub name: String,
}

impl ReconcileRequest {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for ReconcileRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.namespace.is_empty() {
            f.write_str(&self.name)
        } else {
            write!(f, "{}/{}", self.namespace, self.name)
        }
    }
}

/// Order in which kinds are reconciled. Kinds given explicitly go first, in
/// the given order; every other supported kind follows in the default order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KindOrder(Vec<Kind>);

impl KindOrder {
    #[must_use]
    pub fn new(first: &[Kind]) -> Self {
        let mut kinds: Vec<Kind> = Vec::with_capacity(Kind::ALL.len());
        for kind in first.iter().chain(Kind::ALL.iter()) {
            if !kinds.contains(kind) {
                kinds.push(*kind);
            }
        }
        Self(kinds)
    }

    pub fn iter(&self) -> impl Iterator<Item = Kind> + '_ {
        self.0.iter().copied()
    }
}

impl Default for KindOrder {
    fn default() -> Self {
        Self::new(&[])
    }
}

/// Everything one pass did, kind by kind
#[derive(Debug, Default)]
pub struct PassReport {
    pub owner: String,
    pub kinds: Vec<KindReport>,
}

impl PassReport {
    #[must_use]
    pub fn new(owner: String) -> Self {
        Self {
            owner,
            kinds: Vec::new(),
        }
    }

    pub fn failures(&self) -> impl Iterator<Item = &Error> {
        self.kinds.iter().flat_map(|k| k.failures.iter())
    }

    #[must_use]
    pub fn has_failures(&self) -> bool {
        self.failures().next().is_some()
    }

    #[must_use]
    pub fn mutations(&self) -> usize {
        self.kinds.iter().map(KindReport::mutations).sum()
    }

    /// Label of the first failure, used as the metric error label
    #[must_use]
    pub fn metric_label(&self) -> String {
        self.failures()
            .next()
            .map(Error::metric_label)
            .unwrap_or_else(|| "incomplete".to_string())
    }
}

/// Human readable list of the failures of a pass
#[must_use]
pub fn describe(report: &PassReport) -> String {
    let failures: Vec<String> = report.failures().map(ToString::to_string).collect();
    format!(
        "Reconcile of {} failed for {} object(s): {}",
        report.owner,
        failures.len(),
        failures.join("; ")
    )
}

/// Result of a successful pass, as handed back to the controller runtime
#[derive(Debug)]
pub struct Completion {
    pub requeue: bool,
    pub requeue_after: Option<Duration>,
    pub report: PassReport,
}

impl Completion {
    /// The cluster matches the desired state: wait for the next watch event
    #[must_use]
    pub fn done(report: PassReport) -> Self {
        Self {
            requeue: false,
            requeue_after: None,
            report,
        }
    }

    #[must_use]
    pub fn action(&self) -> Action {
        match (self.requeue, self.requeue_after) {
            (_, Some(after)) => Action::requeue(after),
            (true, None) => Action::requeue(Duration::ZERO),
            (false, None) => Action::await_change(),
        }
    }
}

/// Drives a reconcile pass: load the instance, compute its desired bundle, then
/// reconcile every kind in order.
///
/// The orchestrator holds no state between passes; it expects at most one pass
/// in flight per instance, which the controller runtime guarantees.
#[derive(Clone)]
pub struct Orchestrator {
    store: Arc<dyn ObjectStore>,
    instances: Arc<dyn InstanceLoader>,
    strategy: Arc<dyn StrategyProvider>,
    order: KindOrder,
}

impl Orchestrator {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        instances: Arc<dyn InstanceLoader>,
        strategy: Arc<dyn StrategyProvider>,
    ) -> Self {
        Self {
            store,
            instances,
            strategy,
            order: KindOrder::default(),
        }
    }

    #[must_use]
    pub fn with_order(mut self, order: KindOrder) -> Self {
        self.order = order;
        self
    }

    #[instrument(skip(self), fields(jaeger = %request))]
    pub async fn reconcile(&self, request: &ReconcileRequest) -> Result<Completion> {
        let Some(jaeger) = self
            .instances
            .load(&request.namespace, &request.name)
            .await
            .map_err(|source| Error::LoadError {
                instance: request.to_string(),
                source,
            })?
        else {
            tracing::debug!("Jaeger {request} not found, assuming it was deleted");
            return Ok(Completion::done(PassReport::default()));
        };
        let owner = OwnerTag::for_instance(&jaeger);
        let bundle = self
            .strategy
            .compute_desired(&jaeger)
            .map_err(Error::ProviderError)?;

        let mut report = PassReport::new(owner.to_string());
        for kind in self.order.iter() {
            let kind_report = KindReconciler::new(self.store.as_ref(), &owner, kind)
                .reconcile(bundle.objects(kind))
                .await;
            let failed = !kind_report.is_ok();
            report.kinds.push(kind_report);
            if failed {
                // later kinds may reference objects of this one
                break;
            }
        }
        if report.has_failures() {
            return Err(Error::Incomplete(Box::new(report)));
        }
        tracing::debug!("Reconciled {owner} with {} mutation(s)", report.mutations());
        Ok(Completion::done(report))
    }
}
