//! Volume driver variants and routing.
//!
//! Four variants share the [`VolumeDriver`](crate::traits::VolumeDriver)
//! contract:
//! - **LocalBlock**: block descriptor for a device already visible on host
//! - **Fake**: fixed descriptor for tests and development
//! - **Net**: descriptor for qemu-native network protocols
//! - **iSCSI**: initiator session management + device materialization
//!
//! The registry routes a request to the driver registered for its
//! `driver_volume_type`.

mod fake;
mod iscsi;
mod local;
mod net;

pub use fake::FakeVolumeDriver;
pub use iscsi::IscsiVolumeDriver;
pub use local::LocalBlockDriver;
pub use net::NetVolumeDriver;

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use crate::config::VolumeConfig;
use crate::error::{Result, VolumeError};
use crate::exec::CommandExecutor;
use crate::traits::{DiskDriverPolicy, GuestInventory, VolumeDriver};
use crate::types::{ConnectionRequest, DiskDescriptor};

/// Routes connection requests to the driver registered for their
/// `driver_volume_type`.
pub struct VolumeDriverRegistry {
    drivers: HashMap<String, Arc<dyn VolumeDriver>>,
}

impl VolumeDriverRegistry {
    /// Empty registry; register drivers explicitly.
    pub fn new() -> Self {
        Self {
            drivers: HashMap::new(),
        }
    }

    /// Registry with the stock driver set: `local`, `fake`, `iscsi`, and
    /// the qemu-native network protocols `rbd` and `sheepdog`.
    pub fn with_defaults(
        executor: Arc<dyn CommandExecutor>,
        inventory: Arc<dyn GuestInventory>,
        policy: Arc<dyn DiskDriverPolicy>,
        config: Arc<VolumeConfig>,
    ) -> Self {
        let net: Arc<dyn VolumeDriver> = Arc::new(NetVolumeDriver::new(policy.clone()));

        let mut registry = Self::new();
        registry.register(
            "local",
            Arc::new(LocalBlockDriver::new(policy.clone(), config.clone())),
        );
        registry.register("fake", Arc::new(FakeVolumeDriver::new()));
        registry.register(
            "iscsi",
            Arc::new(IscsiVolumeDriver::new(executor, inventory, policy, config)),
        );
        registry.register("rbd", net.clone());
        registry.register("sheepdog", net);
        registry
    }

    pub fn register(&mut self, volume_type: impl Into<String>, driver: Arc<dyn VolumeDriver>) {
        let volume_type = volume_type.into();
        debug!(volume_type = %volume_type, "Registering volume driver");
        self.drivers.insert(volume_type, driver);
    }

    fn driver_for(&self, volume_type: &str) -> Result<Arc<dyn VolumeDriver>> {
        self.drivers
            .get(volume_type)
            .cloned()
            .ok_or_else(|| VolumeError::DriverNotFound(volume_type.to_string()))
    }

    /// Connect through the driver selected by the request.
    pub async fn connect_volume(
        &self,
        request: &mut ConnectionRequest,
        target_dev: &str,
    ) -> Result<DiskDescriptor> {
        let driver = self.driver_for(&request.driver_volume_type)?;
        driver.connect_volume(request, target_dev).await
    }

    /// Disconnect through the driver selected by the request.
    pub async fn disconnect_volume(
        &self,
        request: &ConnectionRequest,
        target_dev: &str,
    ) -> Result<()> {
        let driver = self.driver_for(&request.driver_volume_type)?;
        driver.disconnect_volume(request, target_dev).await
    }
}

impl Default for VolumeDriverRegistry {
    fn default() -> Self {
        Self::new()
    }
}
