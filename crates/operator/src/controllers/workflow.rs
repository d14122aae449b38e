use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use kube::{
    api::Api,
    runtime::{controller::{Action, Controller}, watcher::Config},
    Client, ResourceExt,
};
use tracing::{debug, error, info};

use crate::{
    config::ControllerConfig,
    crd::Workflow,
    workflow::{ReconcileEngine, ReconcileEvent},
    Error, Result,
};

/// Delivers Workflow changes to the reconcile engine.
pub struct WorkflowController {
    client: Client,
    namespace: Option<String>,
    engine: Arc<ReconcileEngine>,
    resync_period: Duration,
    error_requeue: Duration,
}

impl WorkflowController {
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
        info!(
            "Starting Workflow controller in {}",
            self.namespace.as_deref().unwrap_or("all namespaces")
        );

        let workflows: Api<Workflow> = match &self.namespace {
            Some(ns) => Api::namespaced(self.client.clone(), ns),
            None => Api::all(self.client.clone()),
        };

        Controller::new(workflows, Config::default())
            .shutdown_on_signal()
            .run(Self::reconcile, Self::error_policy, self)
            .for_each(|res| async move {
                match res {
                    Ok((_workflow, _action)) => {}
                    Err(e) => error!("Workflow reconciliation error: {}", e),
                }
            })
            .await;
    }

    async fn reconcile(workflow: Arc<Workflow>, ctx: Arc<Self>) -> Result<Action> {
        debug!(
            "Reconciling Workflow {}/{} in status '{}'",
            workflow.namespace().unwrap_or_default(),
            workflow.name_any(),
            workflow.phase_str()
        );
        ctx.engine.dispatch(ReconcileEvent::Workflow(workflow)).await?;
        Ok(Action::requeue(ctx.resync_period))
    }

    fn error_policy(workflow: Arc<Workflow>, error: &Error, ctx: Arc<Self>) -> Action {
        error!(
            "Failed to reconcile Workflow {}/{}: {}",
            workflow.namespace().unwrap_or_default(),
            workflow.name_any(),
            error
        );
        Action::requeue(ctx.error_requeue)
    }
}
