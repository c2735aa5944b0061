//! Volume driver contract and host collaborator traits.

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{ConnectionRequest, DiskDescriptor};

/// Volume driver contract - one implementation per transport variant.
///
/// Drivers are stateless across calls; everything they need arrives in the
/// request or was injected at construction time.
#[async_trait]
pub trait VolumeDriver: Send + Sync {
    /// Make the volume visible on the host and return the disk descriptor
    /// the instance launcher attaches to the guest.
    ///
    /// `target_dev` is the guest-visible device name (e.g. `vdb`). On
    /// success, any descriptor with a block source names a device node that
    /// exists on the host at the moment of return.
    async fn connect_volume(
        &self,
        request: &mut ConnectionRequest,
        target_dev: &str,
    ) -> Result<DiskDescriptor>;

    /// Release exactly the host resources `connect_volume` acquired.
    ///
    /// Idempotent, and must not disturb other volumes sharing the same
    /// transport endpoint.
    async fn disconnect_volume(&self, request: &ConnectionRequest, target_dev: &str)
        -> Result<()>;
}

/// Chooses the hypervisor disk driver name for a source kind.
pub trait DiskDriverPolicy: Send + Sync {
    fn disk_driver_name(&self, is_block_dev: bool) -> String;
}

/// Policy for qemu/KVM hosts.
pub struct QemuDriverPolicy;

impl DiskDriverPolicy for QemuDriverPolicy {
    fn disk_driver_name(&self, _is_block_dev: bool) -> String {
        "qemu".to_string()
    }
}

/// Enumerates the block devices currently attached to guests on this host.
///
/// Reads are point-in-time snapshots; the process-wide connect lock keeps
/// them from racing with sibling connect/disconnect calls.
pub trait GuestInventory: Send + Sync {
    fn all_block_devices(&self) -> Vec<String>;
}
