use std::path::PathBuf;

use log::{debug, warn};

use crate::dependencies::{Dependency, DependencyError, Runner};

/// Exit status used by blkid when no device matches the requested token.
const BLKID_NO_MATCH_EXIT_CODE: i32 = 2;

/// Looks up the block device carrying the given filesystem label.
///
/// Returns `Ok(None)` when blkid reports that no device matches. Any other
/// failure, including blkid not being available, is returned as an error.
pub fn find_device_by_label(
    runner: &dyn Runner,
    label: &str,
) -> Result<Option<PathBuf>, Box<DependencyError>> {
    let output = Dependency::Blkid
        .cmd()
        .with_arg("-t")
        .with_arg(format!("LABEL={label}"))
        .with_arg("-o")
        .with_arg("device")
        .output(runner)?;

    if output.code() == Some(BLKID_NO_MATCH_EXIT_CODE) {
        debug!("No device found with label '{label}'");
        return Ok(None);
    }

    let stdout = output.check_output()?;
    let mut devices = stdout.lines().map(str::trim).filter(|line| !line.is_empty());

    let Some(device) = devices.next() else {
        debug!("No device found with label '{label}'");
        return Ok(None);
    };

    let others: Vec<&str> = devices.collect();
    if !others.is_empty() {
        warn!(
            "Multiple devices carry label '{label}', using '{device}' and ignoring: {}",
            others.join(", ")
        );
    }

    debug!("Found device '{device}' with label '{label}'");
    Ok(Some(PathBuf::from(device)))
}
