pub mod cloud_config;
mod context;
pub mod copy;
pub mod partitions;
pub mod safety_check;
pub mod selinux;

pub use context::DeploymentContext;
pub use partitions::DeploymentSlot;
