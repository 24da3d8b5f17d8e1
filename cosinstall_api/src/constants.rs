use const_format::formatcp;

// Partition label constants

/// Filesystem label carried by the active (booted) deployment slot.
pub const ACTIVE_LABEL: &str = "COS_ACTIVE";

/// Filesystem label carried by the passive deployment slot used for A/B
/// upgrades.
pub const PASSIVE_LABEL: &str = "COS_PASSIVE";

// Cloud-config constants

/// Directory, relative to the target root, holding OEM configuration.
pub const OEM_DIRECTORY: &str = "oem";

/// Name given to the user supplied cloud-config. The numeric prefix makes it
/// sort after the stock configuration files.
pub const CUSTOM_CLOUD_CONFIG_FILENAME: &str = "99_custom.yaml";

/// Relative path of the injected cloud-config (oem/99_custom.yaml).
pub const CUSTOM_CLOUD_CONFIG_RELATIVE_PATH: &str =
    formatcp!("{OEM_DIRECTORY}/{CUSTOM_CLOUD_CONFIG_FILENAME}");

/// Mode used when creating the OEM directory.
pub const OEM_DIRECTORY_MODE: u32 = 0o755;

// SELinux constants

/// SELinux configuration directory, relative to a root.
pub const SELINUX_DIRECTORY: &str = "etc/selinux";

/// SELinux configuration file, relative to a root (etc/selinux/config).
pub const SELINUX_CONFIG_RELATIVE_PATH: &str = formatcp!("{SELINUX_DIRECTORY}/config");

/// Policy type assumed when the target does not declare one.
pub const SELINUX_DEFAULT_POLICY_TYPE: &str = "targeted";

/// Location of the file context database inside a policy directory.
pub const SELINUX_FILE_CONTEXTS_SUBPATH: &str = "contexts/files/file_contexts";

/// Path of setfiles inside a deployed OS, used when relabeling from within a
/// chroot.
pub const SETFILES_CHROOT_PATH: &str = "/usr/sbin/setfiles";

// Path constants

/// Root mount point path.
pub const ROOT_MOUNT_POINT_PATH: &str = "/";
