use crate::{config::Config, Error, KubeStore, Metrics, Orchestrator, ReconcileRequest, Result};
use chrono::{DateTime, Utc};
use common::{strategy::DefaultStrategy, Jaeger};
use futures::{future::BoxFuture, FutureExt, StreamExt};
use k8s_openapi::api::{
    apps::v1::Deployment,
    core::v1::{ConfigMap, Service, ServiceAccount},
    networking::v1::Ingress,
};
use kube::{
    api::{Api, ListParams},
    client::Client,
    runtime::{
        controller::{Action, Controller},
        watcher,
    },
    ResourceExt,
};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{instrument, warn};

// Context for our reconciler
#[derive(Clone)]
pub struct Context {
    /// Reconcile engine
    pub orchestrator: Orchestrator,
    /// Diagnostics read by the web server
    pub diagnostics: Arc<RwLock<Diagnostics>>,
    /// Prometheus metrics
    pub metrics: Metrics,
    /// Requeue delays
    pub config: Config,
}

/// Diagnostics to be exposed by the web server
#[derive(Clone, Serialize)]
pub struct Diagnostics {
    pub last_event: DateTime<Utc>,
    /// Summary of the last completed pass
    pub last_pass: Option<String>,
    pub last_error: Option<String>,
}
impl Default for Diagnostics {
    fn default() -> Self {
        Self {
            last_event: Utc::now(),
            last_pass: None,
            last_error: None,
        }
    }
}

#[instrument(skip(jaeger, ctx), fields(jaeger = %jaeger.name_any()))]
async fn reconcile(jaeger: Arc<Jaeger>, ctx: Arc<Context>) -> Result<Action> {
    let _timer = ctx.metrics.reconcile.count_and_measure();
    let request = ReconcileRequest::new(jaeger.namespace().unwrap_or_default(), jaeger.name_any());
    ctx.diagnostics.write().await.last_event = Utc::now();

    let completion = ctx.orchestrator.reconcile(&request).await?;
    ctx.metrics.reconcile.record_pass(&completion.report);
    let mut diag = ctx.diagnostics.write().await;
    diag.last_pass = Some(format!(
        "{request}: {} mutation(s)",
        completion.report.mutations()
    ));
    diag.last_error = None;
    Ok(completion.action())
}

fn error_policy(jaeger: Arc<Jaeger>, error: &Error, ctx: Arc<Context>) -> Action {
    let instance = format!("{}/{}", jaeger.namespace().unwrap_or_default(), jaeger.name_any());
    warn!("reconcile of {instance} failed: {error}");
    ctx.metrics.reconcile.reconcile_failure(&instance, error);
    if let Error::Incomplete(report) = error {
        // the objects changed before the failure are still counted
        ctx.metrics.reconcile.record_pass(report);
    }
    match ctx.diagnostics.try_write() {
        Ok(mut diag) => diag.last_error = Some(error.to_string()),
        Err(_) => tracing::debug!("diagnostics busy, last error of {instance} not recorded"),
    }
    if error.is_retryable() {
        Action::requeue(ctx.config.conflict_requeue())
    } else {
        Action::requeue(ctx.config.error_requeue())
    }
}

/// Data owned by the Manager
#[derive(Clone, Default)]
pub struct Manager {
    /// Diagnostics populated by the reconciler
    diagnostics: Arc<RwLock<Diagnostics>>,
    metrics: Metrics,
}

/// Manager that owns a Controller for Jaeger
impl Manager {
    /// Lifecycle initialization interface for app
    ///
    /// This returns a `Manager` that drives a `Controller` + a future to be awaited
    /// It is up to `main` to wait for the controller stream.
    pub async fn new(config: Config) -> Result<(Self, BoxFuture<'static, ()>)> {
        let client = Client::try_default().await.map_err(Error::KubeError)?;
        let manager = Manager::default();
        let store = Arc::new(
            KubeStore::new(client.clone()).with_watch_namespace(config.watch_namespace().map(str::to_string)),
        );
        let orchestrator = Orchestrator::new(store.clone(), store, Arc::new(DefaultStrategy));

        let jaegers = match config.watch_namespace() {
            Some(ns) => Api::<Jaeger>::namespaced(client.clone(), ns),
            None => Api::<Jaeger>::all(client.clone()),
        };
        // Ensure CRD is installed before loop-watching
        if let Err(e) = jaegers.list(&ListParams::default().limit(1)).await {
            tracing::error!("is the crd installed? please run: cargo run --bin crdgen | kubectl apply -f -");
            return Err(Error::KubeError(e));
        }
        let owned = |client: &Client| match config.watch_namespace() {
            Some(ns) => (
                Api::<ConfigMap>::namespaced(client.clone(), ns),
                Api::<Deployment>::namespaced(client.clone(), ns),
                Api::<Service>::namespaced(client.clone(), ns),
                Api::<ServiceAccount>::namespaced(client.clone(), ns),
                Api::<Ingress>::namespaced(client.clone(), ns),
            ),
            None => (
                Api::all(client.clone()),
                Api::all(client.clone()),
                Api::all(client.clone()),
                Api::all(client.clone()),
                Api::all(client.clone()),
            ),
        };
        let (config_maps, deployments, services, accounts, ingresses) = owned(&client);

        let context = Arc::new(Context {
            orchestrator,
            diagnostics: manager.diagnostics.clone(),
            metrics: manager.metrics.clone(),
            config,
        });

        // All good. Start controller and return its future.
        let controller = Controller::new(jaegers, watcher::Config::default().any_semantic())
            .owns(config_maps, watcher::Config::default())
            .owns(deployments, watcher::Config::default())
            .owns(services, watcher::Config::default())
            .owns(accounts, watcher::Config::default())
            .owns(ingresses, watcher::Config::default())
            .shutdown_on_signal()
            .run(reconcile, error_policy, context)
            .filter_map(|x| async move { std::result::Result::ok(x) })
            .for_each(|_| futures::future::ready(()))
            .boxed();

        Ok((manager, controller))
    }

    /// Metrics getter
    #[must_use]
    pub fn metrics(&self) -> String {
        self.metrics.encode()
    }

    /// State getter
    pub async fn diagnostics(&self) -> Diagnostics {
        self.diagnostics.read().await.clone()
    }
}
