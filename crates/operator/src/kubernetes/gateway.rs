use async_trait::async_trait;
use k8s_openapi::api::batch::v1::Job;
use k8s_openapi::api::core::v1::Pod;
use kube::{
    api::{Api, DeleteParams, ListParams, LogParams, PostParams},
    Client, ResourceExt,
};
use tracing::debug;

use crate::{
    crd::Workflow,
    kubernetes::resources::managed_selector,
    Error, Result,
};

/// Cluster operations the reconcile engine depends on.
///
/// Implemented over `kube::Client` in production and mocked in tests.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ClusterGateway: Send + Sync {
    /// Create a dependent job. Fails with `AlreadyExists` if the name is taken.
    async fn create_job(&self, job: &Job) -> Result<()>;

    /// All dependent jobs managed by this operator in the watch scope.
    async fn list_jobs(&self) -> Result<Vec<Job>>;

    /// Logs of the pod that ran the job.
    async fn job_logs(&self, job: &Job) -> Result<String>;

    /// Fetch a Workflow. Fails with `NotFound` if it does not exist.
    async fn get_workflow(&self, name: &str, namespace: &str) -> Result<Workflow>;

    /// Replace a Workflow, spec and status, as one logical write.
    ///
    /// The write is guarded by the object's `resourceVersion`; a stale
    /// snapshot fails with `Conflict`.
    async fn update_workflow(&self, workflow: &Workflow) -> Result<()>;

    async fn delete_workflow(&self, workflow: &Workflow) -> Result<()>;
}

pub struct KubeGateway {
    client: Client,
    namespace: Option<String>,
}

impl KubeGateway {
    pub fn new(client: Client, namespace: Option<String>) -> Self {
        Self { client, namespace }
    }

    fn jobs(&self, namespace: Option<&str>) -> Api<Job> {
        match namespace.or(self.namespace.as_deref()) {
            Some(ns) => Api::namespaced(self.client.clone(), ns),
            None => Api::all(self.client.clone()),
        }
    }

    fn workflows(&self, namespace: &str) -> Api<Workflow> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

fn namespace_of<K: ResourceExt>(obj: &K) -> String {
    obj.namespace().unwrap_or_else(|| "default".to_string())
}

/// Map API failures onto the error kinds the engine branches on.
fn map_kube_error(err: kube::Error, what: &str) -> Error {
    match err {
        kube::Error::Api(ae) if ae.code == 404 => Error::NotFound(format!("{}: {}", what, ae.message)),
        kube::Error::Api(ae) if ae.code == 409 && ae.reason == "AlreadyExists" => {
            Error::AlreadyExists(format!("{}: {}", what, ae.message))
        }
        kube::Error::Api(ae) if ae.code == 409 => Error::Conflict(format!("{}: {}", what, ae.message)),
        e => Error::Kubernetes(format!("{}: {}", what, e)),
    }
}

#[async_trait]
impl ClusterGateway for KubeGateway {
    async fn create_job(&self, job: &Job) -> Result<()> {
        let name = job.name_any();
        let ns = namespace_of(job);
        self.jobs(Some(&ns))
            .create(&PostParams::default(), job)
            .await
            .map_err(|e| map_kube_error(e, &format!("create job {}/{}", ns, name)))?;
        Ok(())
    }

    async fn list_jobs(&self) -> Result<Vec<Job>> {
        let params = ListParams::default().labels(&managed_selector());
        let list = self
            .jobs(None)
            .list(&params)
            .await
            .map_err(|e| map_kube_error(e, "list jobs"))?;
        Ok(list.items)
    }

    async fn job_logs(&self, job: &Job) -> Result<String> {
        let name = job.name_any();
        let ns = namespace_of(job);
        let pods: Api<Pod> = Api::namespaced(self.client.clone(), &ns);

        let params = ListParams::default().labels(&format!("job-name={}", name));
        let pod_list = pods
            .list(&params)
            .await
            .map_err(|e| map_kube_error(e, &format!("list pods of job {}/{}", ns, name)))?;
        let pod = pod_list
            .items
            .first()
            .ok_or_else(|| Error::NotFound(format!("no pod for job {}/{}", ns, name)))?;

        let pod_name = pod.name_any();
        debug!("Reading logs of pod {}/{} for job {}", ns, pod_name, name);
        pods.logs(&pod_name, &LogParams::default())
            .await
            .map_err(|e| map_kube_error(e, &format!("logs of pod {}/{}", ns, pod_name)))
    }

    async fn get_workflow(&self, name: &str, namespace: &str) -> Result<Workflow> {
        self.workflows(namespace)
            .get(name)
            .await
            .map_err(|e| map_kube_error(e, &format!("get workflow {}/{}", namespace, name)))
    }

    async fn update_workflow(&self, workflow: &Workflow) -> Result<()> {
        let name = workflow.name_any();
        let ns = namespace_of(workflow);
        let api = self.workflows(&ns);
        let what = format!("update workflow {}/{}", ns, name);

        // Status lives in a subresource: the main replace ignores it, so the
        // status is written second against the fresh resourceVersion.
        let mut replaced = api
            .replace(&name, &PostParams::default(), workflow)
            .await
            .map_err(|e| map_kube_error(e, &what))?;

        if replaced.status == workflow.status {
            return Ok(());
        }
        replaced.status = workflow.status.clone();
        let body = serde_json::to_vec(&replaced)?;
        api.replace_status(&name, &PostParams::default(), body)
            .await
            .map_err(|e| map_kube_error(e, &what))?;
        Ok(())
    }

    async fn delete_workflow(&self, workflow: &Workflow) -> Result<()> {
        let name = workflow.name_any();
        let ns = namespace_of(workflow);
        self.workflows(&ns)
            .delete(&name, &DeleteParams::background())
            .await
            .map_err(|e| map_kube_error(e, &format!("delete workflow {}/{}", ns, name)))?;
        Ok(())
    }
}
