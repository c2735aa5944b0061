//! Local block device driver.
//!
//! Emits a block descriptor for a device-mapper LV already visible on the
//! host, preferring the LV symlinks derived from the volume id when they
//! exist. The iSCSI driver reuses this driver for its final descriptor
//! emission after materializing the host device.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::config::VolumeConfig;
use crate::error::{Result, VolumeError};
use crate::ids;
use crate::traits::{DiskDriverPolicy, VolumeDriver};
use crate::types::{ConnectionRequest, DiskDescriptor, DiskSourceKind};

/// Driver for block devices already present on the host.
pub struct LocalBlockDriver {
    policy: Arc<dyn DiskDriverPolicy>,
    config: Arc<VolumeConfig>,
    dev_root: PathBuf,
}

impl LocalBlockDriver {
    pub fn new(policy: Arc<dyn DiskDriverPolicy>, config: Arc<VolumeConfig>) -> Self {
        Self {
            policy,
            config,
            dev_root: PathBuf::from("/dev"),
        }
    }

    /// Use a different device tree root (testing).
    pub fn with_dev_root(mut self, dev_root: impl Into<PathBuf>) -> Self {
        self.dev_root = dev_root.into();
        self
    }

    fn is_symlink(path: &Path) -> bool {
        std::fs::symlink_metadata(path)
            .map(|meta| meta.file_type().is_symlink())
            .unwrap_or(false)
    }

    /// LV symlink preference chain: the templated volume name first, the
    /// EC2-encoded id second, the request's device path otherwise. Skipped
    /// entirely when the request carries no numeric volume id.
    fn preferred_source_path(
        &self,
        device_path: &str,
        volume_id: Option<i64>,
        target_dev: &str,
    ) -> String {
        let Some(volume_id) = volume_id else {
            debug!(
                device_path,
                "No numeric volume id in request, keeping device path"
            );
            return device_path.to_string();
        };

        let group_dir = self.dev_root.join(&self.config.volume_group);
        let by_name = group_dir.join(self.config.volume_name(volume_id));
        let by_ec2_id = group_dir.join(ids::id_to_ec2_vol_id(volume_id));

        if Self::is_symlink(&by_name) {
            by_name.to_string_lossy().into_owned()
        } else if Self::is_symlink(&by_ec2_id) {
            by_ec2_id.to_string_lossy().into_owned()
        } else {
            debug!(device_path, target_dev, "Attaching device by its original path");
            device_path.to_string()
        }
    }
}

#[async_trait]
impl VolumeDriver for LocalBlockDriver {
    async fn connect_volume(
        &self,
        request: &mut ConnectionRequest,
        target_dev: &str,
    ) -> Result<DiskDescriptor> {
        let device_path = request.data.device_path.clone().ok_or_else(|| {
            VolumeError::InvalidRequest("device_path is required for local block volumes".into())
        })?;

        let source_path =
            self.preferred_source_path(&device_path, request.data.volume_id, target_dev);

        Ok(DiskDescriptor {
            source_type: DiskSourceKind::Block,
            driver_name: self.policy.disk_driver_name(true),
            driver_format: "raw".to_string(),
            driver_cache: "none".to_string(),
            source_path: Some(source_path),
            source_protocol: None,
            source_host: None,
            target_dev: target_dev.to_string(),
            target_bus: "virtio".to_string(),
            serial: request.serial.clone(),
            auth: None,
        })
    }

    async fn disconnect_volume(
        &self,
        _request: &ConnectionRequest,
        _target_dev: &str,
    ) -> Result<()> {
        Ok(())
    }
}
