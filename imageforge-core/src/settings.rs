//! Clap-free settings for the reconcile pipeline.

use camino::Utf8PathBuf;

/// Settings for one reconciliation pass. Execution-mode flags come
/// from the host engine; binary paths default to the conventional
/// install locations.
#[derive(Debug, Clone)]
pub struct RunSettings {
    /// Report the intended change without mutating anything.
    pub check_mode: bool,

    /// Attach a structured before/after representation to the result.
    pub diff_mode: bool,

    pub packer_bin: Utf8PathBuf,
    pub openstack_bin: Utf8PathBuf,
    pub neutron_bin: Utf8PathBuf,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            check_mode: false,
            diff_mode: false,
            packer_bin: Utf8PathBuf::from("/usr/local/bin/packer"),
            openstack_bin: Utf8PathBuf::from("/usr/bin/openstack"),
            neutron_bin: Utf8PathBuf::from("/usr/bin/neutron"),
        }
    }
}
