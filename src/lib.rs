//! Safety check, copy, cloud-config injection and SELinux relabeling steps
//! used when laying down an OS tree onto a target slot.
//!
//! Each step is a free function taking a [`DeploymentContext`], which carries
//! the installation parameters together with the filesystem and command runner
//! the step operates through. Steps do not depend on each other; callers
//! usually run them in the order safety check, copy, cloud-config, relabel.

pub mod engine;

pub use engine::{DeploymentContext, DeploymentSlot};
