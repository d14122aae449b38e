pub mod gateway;
pub mod resources;

#[cfg(test)]
pub mod fake;

pub use gateway::{ClusterGateway, KubeGateway};
#[cfg(test)]
pub use gateway::MockClusterGateway;
pub use resources::JobOutcome;
