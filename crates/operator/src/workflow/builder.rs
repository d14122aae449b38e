//! Dependent Job construction
//!
//! Every input job of a Workflow becomes one `batch/v1` Job named
//! `<workflow>-<job>`, owned by the Workflow so the garbage collector removes
//! it together with its owner.

use std::collections::BTreeMap;

use k8s_openapi::api::batch::v1::{Job, JobSpec};
use k8s_openapi::api::core::v1::{Container, EnvVar, PodSpec, PodTemplateSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::{Resource, ResourceExt};

use crate::{
    config::JobTemplates,
    crd::Workflow,
    kubernetes::resources::{JOB_LABEL, MANAGED_BY_LABEL, MANAGED_BY_VALUE, WORKFLOW_LABEL},
    template::{render_all, JobContext},
    Error, Result,
};

/// Kubernetes caps names that end up in label values at 63 characters.
const MAX_JOB_NAME_LEN: usize = 63;

#[derive(Debug, Clone, Default)]
pub struct JobTemplateBuilder {
    templates: JobTemplates,
}

impl JobTemplateBuilder {
    pub fn new(templates: JobTemplates) -> Self {
        Self { templates }
    }

    /// Build the dependent Job for input job `job_name` of `workflow`.
    ///
    /// The container comes from the template registered for `job_type`, or
    /// the default template when the type is unknown.
    pub fn build(
        &self,
        job_type: &str,
        job_name: &str,
        job_data: &str,
        workflow: &Workflow,
    ) -> Result<Job> {
        let workflow_name = workflow.name_any();
        let namespace = workflow.namespace().unwrap_or_else(|| "default".to_string());
        let dependent_name = workflow.dependent_job_name(job_name);
        validate_job_name(&dependent_name)?;

        let owner = workflow.controller_owner_ref(&()).ok_or_else(|| {
            Error::Validation(format!(
                "workflow {}/{} has no uid, cannot own jobs",
                namespace, workflow_name
            ))
        })?;

        let runtime = self.templates.runtime_for(job_type);
        let context = JobContext {
            name: job_name,
            job_type,
            data: job_data,
            workflow: &workflow_name,
            namespace: &namespace,
        };
        let command = render_all(&runtime.command, &context)?;
        let args = render_all(&runtime.args, &context)?;

        let mut env: Vec<EnvVar> = runtime
            .env
            .iter()
            .map(|(k, v)| EnvVar {
                name: k.clone(),
                value: Some(v.clone()),
                ..Default::default()
            })
            .collect();
        for (name, value) in [
            ("JOB_NAME", job_name),
            ("JOB_TYPE", job_type),
            ("JOB_DATA", job_data),
            ("WORKFLOW_NAME", workflow_name.as_str()),
        ] {
            env.push(EnvVar {
                name: name.to_string(),
                value: Some(value.to_string()),
                ..Default::default()
            });
        }

        let mut labels = BTreeMap::new();
        labels.insert(MANAGED_BY_LABEL.to_string(), MANAGED_BY_VALUE.to_string());
        labels.insert(WORKFLOW_LABEL.to_string(), workflow_name.clone());
        labels.insert(JOB_LABEL.to_string(), job_name.to_string());

        let container = Container {
            name: "job".to_string(),
            image: Some(runtime.image.clone()),
            command: (!command.is_empty()).then_some(command),
            args: (!args.is_empty()).then_some(args),
            env: Some(env),
            ..Default::default()
        };

        Ok(Job {
            metadata: ObjectMeta {
                name: Some(dependent_name),
                namespace: Some(namespace),
                labels: Some(labels.clone()),
                owner_references: Some(vec![owner]),
                ..Default::default()
            },
            spec: Some(JobSpec {
                // Failure is terminal and reported upwards, never retried here
                backoff_limit: Some(0),
                template: PodTemplateSpec {
                    metadata: Some(ObjectMeta {
                        labels: Some(labels),
                        ..Default::default()
                    }),
                    spec: Some(PodSpec {
                        containers: vec![container],
                        restart_policy: Some("Never".to_string()),
                        ..Default::default()
                    }),
                },
                ..Default::default()
            }),
            ..Default::default()
        })
    }
}

/// RFC 1123 label check, so bad input names fail before the API call.
fn validate_job_name(name: &str) -> Result<()> {
    let valid_chars = name
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-');
    let valid_ends = name
        .chars()
        .next()
        .zip(name.chars().last())
        .map(|(first, last)| first.is_ascii_alphanumeric() && last.is_ascii_alphanumeric())
        .unwrap_or(false);

    if name.len() > MAX_JOB_NAME_LEN || !valid_chars || !valid_ends {
        return Err(Error::Validation(format!(
            "job name '{}' must be at most {} lowercase alphanumeric characters or '-', \
             starting and ending with an alphanumeric character",
            name, MAX_JOB_NAME_LEN
        )));
    }
    Ok(())
}
