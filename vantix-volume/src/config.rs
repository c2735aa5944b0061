//! Volume subsystem configuration.

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Tunables read by the volume drivers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VolumeConfig {
    /// Retry budget for the `/dev/disk/by-path` node wait.
    pub num_iscsi_scan_tries: u32,
    /// Fold iSCSI paths into a multipath device where possible.
    pub iscsi_use_multipath: bool,
    /// LVM volume group holding the local volume symlinks.
    pub volume_group: String,
    /// Template for local volume names; `{id}` is replaced with the
    /// numeric volume id.
    pub volume_name_template: String,
}

impl Default for VolumeConfig {
    fn default() -> Self {
        Self {
            num_iscsi_scan_tries: 3,
            iscsi_use_multipath: false,
            volume_group: "vantix-volumes".to_string(),
            volume_name_template: "volume-{id}".to_string(),
        }
    }
}

impl VolumeConfig {
    /// Load configuration from a YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: VolumeConfig =
            serde_yaml::from_str(&content).with_context(|| "Failed to parse config file")?;

        Ok(config)
    }

    /// Render the local volume name for a numeric volume id.
    pub fn volume_name(&self, volume_id: i64) -> String {
        self.volume_name_template
            .replace("{id}", &volume_id.to_string())
    }
}
