pub mod config;
pub mod controllers;
pub mod crd;
pub mod kubernetes;
pub mod template;
pub mod workflow;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Kubernetes error: {0}")]
    Kubernetes(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Already exists: {0}")]
    AlreadyExists(String),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Job capacity exceeded: {outstanding} outstanding jobs, limit is {limit}")]
    Capacity { outstanding: usize, limit: usize },
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Template error: {0}")]
    Template(String),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    SerdeJson(#[from] serde_json::Error),
    #[error("YAML error: {0}")]
    SerdeYaml(#[from] serde_yaml::Error),
    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capacity_error_names_both_counts() {
        let err = Error::Capacity {
            outstanding: 100,
            limit: 100,
        };
        assert_eq!(
            err.to_string(),
            "Job capacity exceeded: 100 outstanding jobs, limit is 100"
        );
    }
}
