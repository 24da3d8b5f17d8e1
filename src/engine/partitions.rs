use std::{fmt, path::PathBuf};

use log::trace;

use cosinstall_api::{config::InstallConfig, error::DeployerError};
use osutils::{blkid, dependencies::DependencyResultExt};

use super::DeploymentContext;

/// One of the two A/B deployment slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeploymentSlot {
    /// The slot holding the booted OS.
    Active,
    /// The alternate slot targeted by upgrades.
    Passive,
}

impl DeploymentSlot {
    /// Returns the filesystem label identifying this slot.
    pub fn label<'c>(&self, config: &'c InstallConfig) -> &'c str {
        match self {
            Self::Active => &config.active_label,
            Self::Passive => &config.passive_label,
        }
    }
}

impl fmt::Display for DeploymentSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Active => "active",
            Self::Passive => "passive",
        })
    }
}

/// Returns the device currently carrying the slot's label, if any.
///
/// The partition table is queried on every call.
pub fn find_slot_device(
    ctx: &DeploymentContext,
    slot: DeploymentSlot,
) -> Result<Option<PathBuf>, DeployerError> {
    let label = slot.label(&ctx.config);
    trace!("Looking up {slot} deployment partition labeled '{label}'");
    blkid::find_device_by_label(ctx.runner, label).message(format!(
        "Failed to look up {slot} deployment partition labeled '{label}'"
    ))
}
