use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Lifecycle of a whole Workflow, as stored in `status.status`.
///
/// The empty string written by users who create a Workflow without a status
/// parses as `Pending`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkflowPhase {
    Pending,
    Working,
    Ok,
    Failed,
}

impl WorkflowPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkflowPhase::Pending => "pending",
            WorkflowPhase::Working => "working",
            WorkflowPhase::Ok => "ok",
            WorkflowPhase::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, WorkflowPhase::Ok | WorkflowPhase::Failed)
    }
}

impl fmt::Display for WorkflowPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WorkflowPhase {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "" | "pending" => Ok(WorkflowPhase::Pending),
            "working" => Ok(WorkflowPhase::Working),
            "ok" => Ok(WorkflowPhase::Ok),
            "failed" => Ok(WorkflowPhase::Failed),
            other => Err(other.to_string()),
        }
    }
}

/// Per-job outcome recorded in `status.jobStatus`.
///
/// Values written by anything other than this operator read as `Unknown`,
/// which is not terminal, so the next job event overwrites them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum JobPhase {
    Working,
    Ok,
    Failed,
    #[serde(other)]
    Unknown,
}

impl JobPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobPhase::Ok | JobPhase::Failed)
    }
}

impl fmt::Display for JobPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobPhase::Working => write!(f, "working"),
            JobPhase::Ok => write!(f, "ok"),
            JobPhase::Failed => write!(f, "failed"),
            JobPhase::Unknown => write!(f, "unknown"),
        }
    }
}

/// Rolls per-job outcomes up into a terminal workflow phase.
///
/// Returns `None` while any job is still working. An empty map is vacuously
/// finished and yields `Ok`.
pub fn aggregate_phase(statuses: &BTreeMap<String, JobPhase>) -> Option<WorkflowPhase> {
    if statuses.values().any(|phase| !phase.is_terminal()) {
        return None;
    }
    if statuses.values().any(|phase| *phase == JobPhase::Failed) {
        Some(WorkflowPhase::Failed)
    } else {
        Some(WorkflowPhase::Ok)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn statuses(entries: &[(&str, JobPhase)]) -> BTreeMap<String, JobPhase> {
        entries
            .iter()
            .map(|(name, phase)| (name.to_string(), *phase))
            .collect()
    }

    #[test]
    fn empty_status_parses_as_pending() {
        assert_eq!("".parse::<WorkflowPhase>(), Ok(WorkflowPhase::Pending));
        assert_eq!("pending".parse::<WorkflowPhase>(), Ok(WorkflowPhase::Pending));
        assert_eq!("working".parse::<WorkflowPhase>(), Ok(WorkflowPhase::Working));
        assert_eq!("Running".parse::<WorkflowPhase>(), Err("Running".to_string()));
    }

    #[test]
    fn aggregate_waits_for_working_jobs() {
        let s = statuses(&[("a", JobPhase::Ok), ("b", JobPhase::Working)]);
        assert_eq!(aggregate_phase(&s), None);
    }

    #[test]
    fn aggregate_fails_if_any_job_failed() {
        let s = statuses(&[("a", JobPhase::Ok), ("b", JobPhase::Failed)]);
        assert_eq!(aggregate_phase(&s), Some(WorkflowPhase::Failed));
    }

    #[test]
    fn aggregate_ok_when_all_ok() {
        let s = statuses(&[("a", JobPhase::Ok), ("b", JobPhase::Ok)]);
        assert_eq!(aggregate_phase(&s), Some(WorkflowPhase::Ok));
        assert_eq!(aggregate_phase(&BTreeMap::new()), Some(WorkflowPhase::Ok));
    }

    #[test]
    fn job_phase_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&JobPhase::Failed).unwrap(), "\"failed\"");
        let phase: JobPhase = serde_json::from_str("\"working\"").unwrap();
        assert_eq!(phase, JobPhase::Working);
    }

    #[test]
    fn foreign_job_phase_reads_as_unknown() {
        let phase: JobPhase = serde_json::from_str("\"pending\"").unwrap();
        assert_eq!(phase, JobPhase::Unknown);
        assert!(!phase.is_terminal());

        let s = statuses(&[("a", JobPhase::Ok), ("b", phase)]);
        assert_eq!(aggregate_phase(&s), None);
    }
}
