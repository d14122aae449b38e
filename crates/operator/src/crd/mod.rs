pub mod workflow;

pub use workflow::{
    BatchReference, JobDescriptor, Workflow, WorkflowInputs, WorkflowSpec, WorkflowStatus,
};
