//! # vantix-volume
//!
//! Block-storage attachment for the Vantix compute node.
//!
//! Translates a scheduler's volume connection request into the host-side
//! operations that make a remote block device appear locally, and into the
//! disk descriptor the instance launcher attaches to the guest. Detachment
//! reverses the process, aware that one iSCSI portal/target may back many
//! volumes on the same host.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                    VolumeDriverRegistry                          │
//! │  - Routes requests by driver_volume_type                         │
//! └─────────────┬──────────┬───────────┬──────────────┬─────────────┘
//!               ▼          ▼           ▼              ▼
//!        ┌──────────┐ ┌─────────┐ ┌─────────┐ ┌──────────────┐
//!        │  Local   │ │  Fake   │ │   Net   │ │    iSCSI     │
//!        │  Block   │ │         │ │ (rbd..) │ │ (iscsiadm +  │
//!        │          │ │         │ │         │ │  multipath)  │
//!        └──────────┘ └─────────┘ └─────────┘ └──────┬───────┘
//!                                                    │ delegates
//!                                                    ▼ descriptor
//!                                               LocalBlock
//! ```
//!
//! All host side effects run through the [`CommandExecutor`] seam; the
//! drivers contribute ordering, bounded retry, idempotence and
//! reference-counted teardown.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use vantix_volume::{
//!     ConnectionRequest, QemuDriverPolicy, SystemExecutor, VolumeConfig,
//!     VolumeDriverRegistry,
//! };
//!
//! let registry = VolumeDriverRegistry::with_defaults(
//!     Arc::new(SystemExecutor::with_root_helper("sudo")),
//!     inventory,
//!     Arc::new(QemuDriverPolicy),
//!     Arc::new(VolumeConfig::default()),
//! );
//!
//! let mut request: ConnectionRequest = serde_json::from_str(payload)?;
//! let descriptor = registry.connect_volume(&mut request, "vdb").await?;
//! launcher.attach(descriptor.to_xml());
//! ```

pub mod config;
pub mod drivers;
pub mod error;
pub mod exec;
pub mod ids;
pub mod mock;
pub mod retry;
pub mod traits;
pub mod types;

pub use config::VolumeConfig;
pub use drivers::{
    FakeVolumeDriver, IscsiVolumeDriver, LocalBlockDriver, NetVolumeDriver, VolumeDriverRegistry,
};
pub use error::{Result, VolumeError};
pub use exec::{CommandExecutor, ProcessExecutionError, ProcessOutput, SystemExecutor};
pub use mock::{MockExecutor, MockInventory};
pub use traits::{DiskDriverPolicy, GuestInventory, QemuDriverPolicy, VolumeDriver};
pub use types::{ConnectionRequest, DiskAuth, DiskDescriptor, DiskSourceKind, VolumeData};
