pub mod job;
pub mod workflow;

pub use job::JobController;
pub use workflow::WorkflowController;
