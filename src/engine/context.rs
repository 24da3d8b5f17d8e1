use cosinstall_api::config::InstallConfig;
use osutils::{dependencies::Runner, filesystem::Filesystem};

/// Everything an engine step needs: the installation parameters and the
/// capabilities used to act on the system.
pub struct DeploymentContext<'a> {
    pub config: InstallConfig,

    /// Filesystem holding the source tree, the target and the cloud-config.
    pub fs: &'a dyn Filesystem,

    /// Runner used for external tools such as blkid and setfiles.
    pub runner: &'a dyn Runner,
}

impl<'a> DeploymentContext<'a> {
    pub fn new(config: InstallConfig, fs: &'a dyn Filesystem, runner: &'a dyn Runner) -> Self {
        Self { config, fs, runner }
    }
}
