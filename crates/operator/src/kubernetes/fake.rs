//! In-memory cluster used by the engine tests.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Mutex;

use async_trait::async_trait;
use k8s_openapi::api::batch::v1::{Job, JobStatus};
use kube::ResourceExt;

use crate::{
    crd::{JobDescriptor, Workflow, WorkflowInputs, WorkflowSpec},
    kubernetes::ClusterGateway,
    Error, Result,
};

#[derive(Default)]
pub struct FakeCluster {
    pub workflows: Mutex<BTreeMap<String, Workflow>>,
    pub jobs: Mutex<BTreeMap<String, Job>>,
    pub logs: Mutex<BTreeMap<String, String>>,
    /// Dependent job names whose creation is rejected
    pub reject_create: Mutex<BTreeSet<String>>,
    pub creates: Mutex<Vec<String>>,
    pub updates: Mutex<usize>,
    pub deletes: Mutex<Vec<String>>,
}

impl FakeCluster {
    pub fn with_workflow(workflow: Workflow) -> Self {
        let cluster = Self::default();
        cluster.put_workflow(workflow);
        cluster
    }

    pub fn put_workflow(&self, workflow: Workflow) {
        self.workflows
            .lock()
            .unwrap()
            .insert(workflow.name_any(), workflow);
    }

    pub fn workflow(&self, name: &str) -> Workflow {
        self.workflows.lock().unwrap()[name].clone()
    }

    pub fn job(&self, name: &str) -> Job {
        self.jobs.lock().unwrap()[name].clone()
    }

    /// Mark a job finished the way the Job controller would.
    pub fn finish_job(&self, name: &str, succeeded: bool) -> Job {
        let mut jobs = self.jobs.lock().unwrap();
        let job = jobs.get_mut(name).expect("job exists");
        job.status = Some(JobStatus {
            succeeded: Some(if succeeded { 1 } else { 0 }),
            failed: Some(if succeeded { 0 } else { 1 }),
            ..Default::default()
        });
        job.clone()
    }

    pub fn update_count(&self) -> usize {
        *self.updates.lock().unwrap()
    }

    pub fn created(&self) -> Vec<String> {
        self.creates.lock().unwrap().clone()
    }
}

#[async_trait]
impl ClusterGateway for FakeCluster {
    async fn create_job(&self, job: &Job) -> Result<()> {
        let name = job.name_any();
        if self.reject_create.lock().unwrap().contains(&name) {
            return Err(Error::Kubernetes(format!("create job {} rejected", name)));
        }
        let mut jobs = self.jobs.lock().unwrap();
        if jobs.contains_key(&name) {
            return Err(Error::AlreadyExists(name));
        }
        jobs.insert(name.clone(), job.clone());
        self.creates.lock().unwrap().push(name);
        Ok(())
    }

    async fn list_jobs(&self) -> Result<Vec<Job>> {
        Ok(self.jobs.lock().unwrap().values().cloned().collect())
    }

    async fn job_logs(&self, job: &Job) -> Result<String> {
        self.logs
            .lock()
            .unwrap()
            .get(&job.name_any())
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("no pod for job {}", job.name_any())))
    }

    async fn get_workflow(&self, name: &str, _namespace: &str) -> Result<Workflow> {
        self.workflows
            .lock()
            .unwrap()
            .get(name)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("workflow {}", name)))
    }

    async fn update_workflow(&self, workflow: &Workflow) -> Result<()> {
        let name = workflow.name_any();
        let mut workflows = self.workflows.lock().unwrap();
        let stored = workflows
            .get(&name)
            .ok_or_else(|| Error::NotFound(format!("workflow {}", name)))?;
        if stored.metadata.resource_version != workflow.metadata.resource_version {
            return Err(Error::Conflict(format!("workflow {} was modified", name)));
        }

        let version = stored
            .metadata
            .resource_version
            .as_deref()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(0);
        let mut next = workflow.clone();
        next.metadata.resource_version = Some((version + 1).to_string());
        workflows.insert(name, next);
        *self.updates.lock().unwrap() += 1;
        Ok(())
    }

    async fn delete_workflow(&self, workflow: &Workflow) -> Result<()> {
        let name = workflow.name_any();
        self.workflows
            .lock()
            .unwrap()
            .remove(&name)
            .ok_or_else(|| Error::NotFound(format!("workflow {}", name)))?;
        self.deletes.lock().unwrap().push(name);
        Ok(())
    }
}

/// A namespaced Workflow with a uid, as the API server would return it.
pub fn workflow(name: &str, jobs: &[(&str, &str)]) -> Workflow {
    let mut wf = Workflow::new(
        name,
        WorkflowSpec {
            inputs: WorkflowInputs {
                jobs: jobs
                    .iter()
                    .map(|(job, job_type)| JobDescriptor {
                        name: job.to_string(),
                        job_type: job_type.to_string(),
                        data: format!("{}-payload", job),
                    })
                    .collect(),
            },
            job_batch: BTreeMap::new(),
        },
    );
    wf.metadata.namespace = Some("default".to_string());
    wf.metadata.uid = Some(format!("uid-{}", name));
    wf.metadata.resource_version = Some("1".to_string());
    wf
}
