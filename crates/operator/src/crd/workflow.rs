use kube::{CustomResource, ResourceExt};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::workflow::state::JobPhase;

#[derive(CustomResource, Debug, Serialize, Deserialize, Clone, Default, JsonSchema)]
#[kube(
    group = "workflowop.io",
    version = "v1alpha1",
    kind = "Workflow",
    namespaced,
    status = "WorkflowStatus",
    shortname = "wf",
    printcolumn = r#"{"name":"Status","type":"string","jsonPath":".status.status"}"#
)]
pub struct WorkflowSpec {
    /// Jobs to run, supplied once at creation
    pub inputs: WorkflowInputs,

    /// Dependent job created for each input job, keyed by job name
    #[serde(rename = "jobBatch", default)]
    pub job_batch: BTreeMap<String, BatchReference>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq, JsonSchema)]
pub struct WorkflowInputs {
    #[serde(default)]
    pub jobs: Vec<JobDescriptor>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, JsonSchema)]
pub struct JobDescriptor {
    /// Job name, unique within the workflow
    pub name: String,

    /// Job type, selects the container template
    #[serde(rename = "type")]
    pub job_type: String,

    /// Opaque payload handed to the job
    #[serde(default)]
    pub data: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, JsonSchema)]
pub struct BatchReference {
    /// Kind of the dependent resource (always `Job`)
    pub kind: String,

    /// Name of the dependent resource
    pub name: String,

    /// Captured output once the job has finished
    #[serde(default)]
    pub logs: String,
}

impl BatchReference {
    pub fn job(name: impl Into<String>) -> Self {
        Self {
            kind: "Job".to_string(),
            name: name.into(),
            logs: String::new(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq, JsonSchema)]
pub struct WorkflowStatus {
    /// Workflow phase: "", pending, working, ok, failed
    #[serde(default)]
    pub status: String,

    /// Outcome per input job that has a dependent job
    #[serde(rename = "jobStatus", default)]
    pub job_status: BTreeMap<String, JobPhase>,

    /// Time all dependent jobs were in place
    #[serde(rename = "startTime", skip_serializing_if = "Option::is_none")]
    pub start_time: Option<String>,

    /// Time the workflow reached ok or failed
    #[serde(rename = "completionTime", skip_serializing_if = "Option::is_none")]
    pub completion_time: Option<String>,
}

impl Workflow {
    /// Raw `status.status`, empty when the status block is absent.
    pub fn phase_str(&self) -> &str {
        self.status.as_ref().map(|s| s.status.as_str()).unwrap_or("")
    }

    pub fn job_statuses(&self) -> BTreeMap<String, JobPhase> {
        self.status
            .as_ref()
            .map(|s| s.job_status.clone())
            .unwrap_or_default()
    }

    /// Phase of every job recorded in `jobBatch`.
    ///
    /// A batched job without a `jobStatus` entry counts as working, so a
    /// partially written status never reads as finished.
    pub fn batched_job_phases(&self) -> BTreeMap<String, JobPhase> {
        self.spec
            .job_batch
            .keys()
            .map(|job| {
                let phase = self.job_phase(job).unwrap_or(JobPhase::Working);
                (job.clone(), phase)
            })
            .collect()
    }

    pub fn job_phase(&self, job: &str) -> Option<JobPhase> {
        self.status
            .as_ref()
            .and_then(|s| s.job_status.get(job).copied())
    }

    /// Name of the dependent job created for the given input job.
    pub fn dependent_job_name(&self, job: &str) -> String {
        format!("{}-{}", self.name_any(), job)
    }

    /// Inverse of [`Workflow::dependent_job_name`].
    pub fn input_job_name<'a>(&self, dependent: &'a str) -> Option<&'a str> {
        dependent
            .strip_prefix(self.name_any().as_str())
            .and_then(|rest| rest.strip_prefix('-'))
            .filter(|rest| !rest.is_empty())
    }
}
