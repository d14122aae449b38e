use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use k8s_openapi::api::batch::v1::Job;
use kube::{
    api::Api,
    runtime::{controller::{Action, Controller}, watcher::Config},
    Client, ResourceExt,
};
use tracing::{debug, error, info};

use crate::{
    config::ControllerConfig,
    kubernetes::resources::managed_selector,
    workflow::{ReconcileEngine, ReconcileEvent},
    Error, Result,
};

/// Delivers status changes of dependent Jobs to the reconcile engine.
///
/// Only Jobs labelled as managed by this operator are watched.
pub struct JobController {
    client: Client,
    namespace: Option<String>,
    engine: Arc<ReconcileEngine>,
    resync_period: Duration,
    error_requeue: Duration,
}

impl JobController {
    pub fn new(
        client: Client,
        namespace: Option<String>,
        engine: Arc<ReconcileEngine>,
        config: &ControllerConfig,
    ) -> Self {
        Self {
            client,
            namespace,
            engine,
            resync_period: config.resync_period(),
            error_requeue: config.error_requeue(),
        }
    }

    pub async fn run(self: Arc<Self>) {
        info!("Starting Job controller");

        let jobs: Api<Job> = match &self.namespace {
            Some(ns) => Api::namespaced(self.client.clone(), ns),
            None => Api::all(self.client.clone()),
        };
        let watcher = Config::default().labels(&managed_selector());

        Controller::new(jobs, watcher)
            .shutdown_on_signal()
            .run(Self::reconcile, Self::error_policy, self)
            .for_each(|res| async move {
                match res {
                    Ok((_job, _action)) => {}
                    Err(e) => error!("Job reconciliation error: {}", e),
                }
            })
            .await;
    }

    async fn reconcile(job: Arc<Job>, ctx: Arc<Self>) -> Result<Action> {
        debug!(
            "Reconciling Job {}/{}",
            job.namespace().unwrap_or_default(),
            job.name_any()
        );
        ctx.engine.dispatch(ReconcileEvent::Job(job)).await?;
        Ok(Action::requeue(ctx.resync_period))
    }

    fn error_policy(job: Arc<Job>, error: &Error, ctx: Arc<Self>) -> Action {
        error!(
            "Failed to reconcile Job {}/{}: {}",
            job.namespace().unwrap_or_default(),
            job.name_any(),
            error
        );
        Action::requeue(ctx.error_requeue)
    }
}
