pub mod builder;
pub mod engine;
pub mod state;

pub use builder::JobTemplateBuilder;
pub use engine::{ReconcileEngine, ReconcileEvent, WorkflowUpdate};
pub use state::{JobPhase, WorkflowPhase};
