use log::{debug, info};

use cosinstall_api::{
    constants::{CUSTOM_CLOUD_CONFIG_RELATIVE_PATH, OEM_DIRECTORY, OEM_DIRECTORY_MODE},
    error::{CloudConfigError, DeployerError, ReportError},
};
use osutils::path::join_relative;

use super::DeploymentContext;

/// Injects the user provided cloud-config into the target's OEM directory.
///
/// Does nothing when no cloud-config was given. The OEM directory is created
/// when missing and a previous custom cloud-config is overwritten.
#[tracing::instrument(skip_all)]
pub fn install_cloud_config(ctx: &DeploymentContext) -> Result<(), DeployerError> {
    let Some(source) = ctx.config.cloud_init_source() else {
        debug!("No cloud-config provided, skipping");
        return Ok(());
    };
    ctx.config.validate_target()?;

    let contents = ctx
        .fs
        .read(source)
        .structured(CloudConfigError::ReadSource {
            path: source.to_path_buf(),
        })?;

    let oem_directory = join_relative(&ctx.config.target, OEM_DIRECTORY);
    ctx.fs
        .create_dir_all(&oem_directory, OEM_DIRECTORY_MODE)
        .structured(CloudConfigError::CreateOemDirectory {
            path: oem_directory,
        })?;

    let destination = join_relative(&ctx.config.target, CUSTOM_CLOUD_CONFIG_RELATIVE_PATH);
    ctx.fs
        .write(&destination, &contents)
        .structured(CloudConfigError::WriteDestination {
            path: destination.clone(),
        })?;

    info!(
        "Installed cloud-config '{}' as '{}'",
        source.display(),
        destination.display()
    );
    Ok(())
}
