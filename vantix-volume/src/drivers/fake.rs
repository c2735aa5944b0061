//! Fake volume driver.
//!
//! Emits a fixed network descriptor and touches nothing on the host. Used
//! only by tests and development deployments.

use async_trait::async_trait;

use crate::error::Result;
use crate::traits::VolumeDriver;
use crate::types::{ConnectionRequest, DiskDescriptor, DiskSourceKind};

pub struct FakeVolumeDriver;

impl FakeVolumeDriver {
    pub fn new() -> Self {
        Self
    }
}

impl Default for FakeVolumeDriver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl VolumeDriver for FakeVolumeDriver {
    async fn connect_volume(
        &self,
        request: &mut ConnectionRequest,
        target_dev: &str,
    ) -> Result<DiskDescriptor> {
        Ok(DiskDescriptor {
            source_type: DiskSourceKind::Network,
            driver_name: "qemu".to_string(),
            driver_format: "raw".to_string(),
            driver_cache: "none".to_string(),
            source_path: None,
            source_protocol: Some("fake".to_string()),
            source_host: Some("fake".to_string()),
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
