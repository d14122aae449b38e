use std::collections::BTreeMap;
use std::sync::Arc;

use k8s_openapi::api::batch::v1::Job;
use kube::ResourceExt;
use tracing::{debug, error, info, warn};

use crate::{
    config::ControllerConfig,
    crd::{BatchReference, JobDescriptor, Workflow},
    kubernetes::{
        resources::{truncate_logs, workflow_owner},
        ClusterGateway, JobOutcome,
    },
    workflow::{
        builder::JobTemplateBuilder,
        state::{aggregate_phase, JobPhase, WorkflowPhase},
    },
    Error, Result,
};

/// A change notification, for either kind of object the operator watches.
#[derive(Debug, Clone)]
pub enum ReconcileEvent {
    Workflow(Arc<Workflow>),
    Job(Arc<Job>),
}

/// Changes to apply on top of a fetched Workflow snapshot.
///
/// Fields left as `None` keep the snapshot's value.
#[derive(Debug, Clone, Default)]
pub struct WorkflowUpdate {
    pub job_batch: Option<BTreeMap<String, BatchReference>>,
    pub job_status: Option<BTreeMap<String, JobPhase>>,
    pub phase: Option<WorkflowPhase>,
}

impl WorkflowUpdate {
    /// Produce the full object to write back. The snapshot is left untouched.
    pub fn apply(self, snapshot: &Workflow) -> Workflow {
        let mut next = snapshot.clone();
        if let Some(job_batch) = self.job_batch {
            next.spec.job_batch = job_batch;
        }

        let status = next.status.get_or_insert_with(Default::default);
        if let Some(job_status) = self.job_status {
            status.job_status = job_status;
        }
        if let Some(phase) = self.phase {
            let now = chrono::Utc::now().to_rfc3339();
            status.status = phase.to_string();
            if phase == WorkflowPhase::Working && status.start_time.is_none() {
                status.start_time = Some(now);
            } else if phase.is_terminal() {
                status.completion_time = Some(now);
            }
        }
        next
    }
}

pub struct ReconcileEngine {
    gateway: Arc<dyn ClusterGateway>,
    builder: JobTemplateBuilder,
    max_jobs: usize,
    max_log_bytes: usize,
}

impl ReconcileEngine {
    pub fn new(
        gateway: Arc<dyn ClusterGateway>,
        builder: JobTemplateBuilder,
        config: &ControllerConfig,
    ) -> Self {
        Self {
            gateway,
            builder,
            max_jobs: config.max_jobs,
            max_log_bytes: config.max_log_bytes,
        }
    }

    pub async fn dispatch(&self, event: ReconcileEvent) -> Result<()> {
        match event {
            ReconcileEvent::Workflow(workflow) => self.handle_workflow(&workflow).await,
            ReconcileEvent::Job(job) => self.handle_job(&job).await,
        }
    }

    pub async fn handle_workflow(&self, workflow: &Workflow) -> Result<()> {
        match workflow.phase_str().parse::<WorkflowPhase>() {
            Ok(WorkflowPhase::Pending) => self.handle_pending(workflow).await,
            Ok(WorkflowPhase::Working) => self.handle_working(workflow).await,
            Ok(WorkflowPhase::Ok) | Ok(WorkflowPhase::Failed) => self.cleanup(workflow).await,
            Err(unknown) => {
                warn!(
                    "Unknown workflow status '{}' for {}/{}, leaving it alone",
                    unknown,
                    workflow.namespace().unwrap_or_default(),
                    workflow.name_any()
                );
                Ok(())
            }
        }
    }

    async fn handle_pending(&self, workflow: &Workflow) -> Result<()> {
        let name = workflow.name_any();
        let namespace = workflow.namespace().unwrap_or_default();
        let inputs = &workflow.spec.inputs.jobs;

        let mut job_batch = workflow.spec.job_batch.clone();
        let mut job_status = workflow.job_statuses();
        let mut created = 0;

        for job in inputs {
            if job_batch.contains_key(&job.name) {
                debug!(
                    "{} job {} of {}/{} is {}",
                    job.job_type,
                    job.name,
                    namespace,
                    name,
                    job_status
                        .get(&job.name)
                        .map(|p| p.to_string())
                        .unwrap_or_else(|| "untracked".to_string())
                );
                continue;
            }

            match self.create_job(job, workflow).await {
                Ok(dependent) => {
                    job_batch.insert(job.name.clone(), BatchReference::job(dependent));
                    job_status.insert(job.name.clone(), JobPhase::Working);
                    created += 1;
                }
                Err(e) => {
                    error!(
                        "Failed to create job {} for workflow {}/{}: {}",
                        job.name, namespace, name, e
                    );
                }
            }
        }

        if created > 0 {
            let next = WorkflowUpdate {
                job_batch: Some(job_batch),
                job_status: Some(job_status),
                phase: None,
            }
            .apply(workflow);
            self.gateway.update_workflow(&next).await?;
            info!(
                "Recorded {} new job(s) for workflow {}/{} ({}/{} in place)",
                created,
                namespace,
                name,
                next.spec.job_batch.len(),
                inputs.len()
            );
        } else if inputs.iter().all(|job| job_batch.contains_key(&job.name)) {
            // Backfill jobs whose status entry was never written
            let next = WorkflowUpdate {
                job_status: Some(workflow.batched_job_phases()),
                phase: Some(WorkflowPhase::Working),
                ..Default::default()
            }
            .apply(workflow);
            self.gateway.update_workflow(&next).await?;
            info!("Workflow {}/{} is working", namespace, name);
        } else {
            debug!("Workflow {}/{} is still waiting for jobs to be created", namespace, name);
        }

        Ok(())
    }

    async fn handle_working(&self, workflow: &Workflow) -> Result<()> {
        let name = workflow.name_any();
        let namespace = workflow.namespace().unwrap_or_default();

        let phase = match aggregate_phase(&workflow.batched_job_phases()) {
            Some(phase) => phase,
            None => {
                debug!("Workflow {}/{} has jobs still working", namespace, name);
                return Ok(());
            }
        };

        let next = WorkflowUpdate {
            phase: Some(phase),
            ..Default::default()
        }
        .apply(workflow);
        self.gateway.update_workflow(&next).await?;
        info!("Workflow {}/{} finished: {}", namespace, name, phase);
        Ok(())
    }

    async fn cleanup(&self, workflow: &Workflow) -> Result<()> {
        let name = workflow.name_any();
        let namespace = workflow.namespace().unwrap_or_default();

        match self.gateway.delete_workflow(workflow).await {
            Ok(()) => {
                info!(
                    "Deleted {} workflow {}/{}",
                    workflow.phase_str(),
                    namespace,
                    name
                );
                Ok(())
            }
            Err(Error::NotFound(_)) => {
                debug!("Workflow {}/{} is already gone", namespace, name);
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    pub async fn handle_job(&self, job: &Job) -> Result<()> {
        let job_name = job.name_any();
        let namespace = job.namespace().unwrap_or_else(|| "default".to_string());

        let owner = match workflow_owner(job) {
            Some(owner) => owner,
            None => {
                debug!("Ignoring job {}/{}: not owned by a Workflow", namespace, job_name);
                return Ok(());
            }
        };

        let workflow = self.gateway.get_workflow(&owner.name, &namespace).await?;
        let input = match workflow.input_job_name(&job_name) {
            Some(input) => input.to_string(),
            None => {
                warn!(
                    "Job {}/{} does not follow the naming of workflow {}",
                    namespace, job_name, owner.name
                );
                return Ok(());
            }
        };

        if !workflow.spec.job_batch.contains_key(&input) {
            debug!(
                "Job {}/{} is not recorded on workflow {} yet",
                namespace, job_name, owner.name
            );
            return Ok(());
        }
        if let Some(phase) = workflow.job_phase(&input).filter(|p| p.is_terminal()) {
            debug!("Job {}/{} already recorded as {}", namespace, job_name, phase);
            return Ok(());
        }

        let phase = match JobOutcome::of(job) {
            JobOutcome::Running => {
                debug!("Job {}/{} is still running", namespace, job_name);
                return Ok(());
            }
            JobOutcome::Succeeded => JobPhase::Ok,
            JobOutcome::Failed => JobPhase::Failed,
        };

        let mut job_status = workflow.job_statuses();
        job_status.insert(input.clone(), phase);

        let mut job_batch = workflow.spec.job_batch.clone();
        if let Some(logs) = self.capture_logs(job).await {
            if let Some(batch) = job_batch.get_mut(&input) {
                batch.logs = logs;
            }
        }

        let next = WorkflowUpdate {
            job_batch: Some(job_batch),
            job_status: Some(job_status),
            phase: None,
        }
        .apply(&workflow);
        self.gateway.update_workflow(&next).await?;
        info!(
            "Job {} of workflow {}/{} finished: {}",
            input, namespace, owner.name, phase
        );
        Ok(())
    }

    /// Create the dependent job for `job`, returning its name.
    ///
    /// A job that already exists counts as created.
    async fn create_job(&self, job: &JobDescriptor, workflow: &Workflow) -> Result<String> {
        let manifest = self
            .builder
            .build(&job.job_type, &job.name, &job.data, workflow)?;
        let dependent = manifest.name_any();

        let existing = self.gateway.list_jobs().await?;
        if existing.iter().any(|j| {
            j.name_any() == dependent && j.namespace() == manifest.metadata.namespace
        }) {
            debug!("Job {} already exists", dependent);
            return Ok(dependent);
        }

        let outstanding = existing
            .iter()
            .filter(|j| !JobOutcome::of(j).is_finished())
            .count();
        debug!("{} dependent job(s) outstanding", outstanding);
        if outstanding >= self.max_jobs {
            return Err(Error::Capacity {
                outstanding,
                limit: self.max_jobs,
            });
        }

        match self.gateway.create_job(&manifest).await {
            Ok(()) => info!("Created {} job {}", job.job_type, dependent),
            Err(Error::AlreadyExists(_)) => debug!("Job {} already exists", dependent),
            Err(e) => return Err(e),
        }
        Ok(dependent)
    }

    async fn capture_logs(&self, job: &Job) -> Option<String> {
        match self.gateway.job_logs(job).await {
            Ok(logs) => Some(truncate_logs(&logs, self.max_log_bytes).to_string()),
            Err(e) => {
                warn!("Failed to capture logs of job {}: {}", job.name_any(), e);
                None
            }
        }
    }
}
