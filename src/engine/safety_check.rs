use log::{debug, error, info, warn};

use cosinstall_api::error::{DeployerError, DeployerResultExt, SafetyCheckError};

use super::{
    partitions::{find_slot_device, DeploymentSlot},
    DeploymentContext,
};

/// Checks that installing onto the target will not silently overwrite an
/// existing deployment.
///
/// The check only applies when formatting is skipped, since formatting clears
/// the slots anyway. In that case a partition carrying either the active or
/// the passive label makes the check fail unless the force option is set.
///
/// | no-format | active or passive slot found | force | result |
/// |-----------|------------------------------|-------|--------|
/// | false     | not queried                  | any   | Ok     |
/// | true      | no                           | any   | Ok     |
/// | true      | yes                          | false | Err    |
/// | true      | yes                          | true  | Ok     |
#[tracing::instrument(skip_all)]
pub fn check_safe_to_format(ctx: &DeploymentContext) -> Result<(), DeployerError> {
    if !ctx.config.no_format {
        debug!("Partitions will be formatted, skipping existing deployment check");
        return Ok(());
    }

    let mut existing = None;
    for slot in [DeploymentSlot::Active, DeploymentSlot::Passive] {
        if let Some(device) = find_slot_device(ctx, slot)
            .message(format!("Failed to check for an existing {slot} deployment"))?
        {
            existing = Some((slot, device));
            break;
        }
    }

    let Some((slot, device)) = existing else {
        info!("No existing deployment found, proceeding without formatting");
        return Ok(());
    };

    if ctx.config.force {
        warn!(
            "Forcing overwrite of the {slot} deployment on '{}' due to the force option",
            device.display()
        );
        return Ok(());
    }

    error!(
        "Found a {slot} deployment on '{}' while formatting is disabled",
        device.display()
    );
    Err(DeployerError::new(SafetyCheckError::AlreadyDeployed {
        label: slot.label(&ctx.config).to_string(),
        device,
    }))
}
