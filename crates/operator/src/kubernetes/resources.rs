use k8s_openapi::api::batch::v1::Job;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;

pub const MANAGED_BY_LABEL: &str = "app.kubernetes.io/managed-by";
pub const MANAGED_BY_VALUE: &str = "workflow-operator";
pub const WORKFLOW_LABEL: &str = "workflowop.io/workflow";
pub const JOB_LABEL: &str = "workflowop.io/job";

/// Label selector matching every dependent job this operator created.
pub fn managed_selector() -> String {
    format!("{}={}", MANAGED_BY_LABEL, MANAGED_BY_VALUE)
}

/// Where a dependent job stands, judged from its completion counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
    Running,
    Succeeded,
    Failed,
}

impl JobOutcome {
    pub fn of(job: &Job) -> Self {
        let status = match &job.status {
            Some(status) => status,
            None => return JobOutcome::Running,
        };
        if status.succeeded == Some(1) {
            JobOutcome::Succeeded
        } else if status.failed == Some(1) {
            JobOutcome::Failed
        } else {
            JobOutcome::Running
        }
    }

    pub fn is_finished(&self) -> bool {
        !matches!(self, JobOutcome::Running)
    }
}

/// The first owner reference, if it points at a Workflow.
pub fn workflow_owner(job: &Job) -> Option<&OwnerReference> {
    job.metadata
        .owner_references
        .as_ref()
        .and_then(|refs| refs.first())
        .filter(|owner| owner.kind == "Workflow")
}

/// Keep at most `max_bytes` of the end of `logs`, on a char boundary.
pub fn truncate_logs(logs: &str, max_bytes: usize) -> &str {
    if logs.len() <= max_bytes {
        return logs;
    }
    let mut start = logs.len() - max_bytes;
    while !logs.is_char_boundary(start) {
        start += 1;
    }
    &logs[start..]
}
