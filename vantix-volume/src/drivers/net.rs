//! Network protocol volume driver.
//!
//! Builds descriptors for qemu-native network transports (rbd, sheepdog).
//! The transport itself is managed by qemu; this driver only shapes the
//! descriptor and passes CHAP-style credentials through.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::{Result, VolumeError};
use crate::traits::{DiskDriverPolicy, VolumeDriver};
use crate::types::{ConnectionRequest, DiskAuth, DiskDescriptor, DiskSourceKind};

pub struct NetVolumeDriver {
    policy: Arc<dyn DiskDriverPolicy>,
}

impl NetVolumeDriver {
    pub fn new(policy: Arc<dyn DiskDriverPolicy>) -> Self {
        Self { policy }
    }
}

#[async_trait]
impl VolumeDriver for NetVolumeDriver {
    async fn connect_volume(
        &self,
        request: &mut ConnectionRequest,
        target_dev: &str,
    ) -> Result<DiskDescriptor> {
        let name = request.data.name.clone().ok_or_else(|| {
            VolumeError::InvalidRequest("name is required for network volumes".into())
        })?;

        let auth = if request.data.auth_is_enabled() {
            let missing = |field: &str| {
                VolumeError::InvalidRequest(format!("{field} is required when auth is enabled"))
            };
            Some(DiskAuth {
                username: request
                    .data
                    .auth_username
                    .clone()
                    .ok_or_else(|| missing("auth_username"))?,
                secret_type: request
                    .data
                    .secret_type
                    .clone()
                    .ok_or_else(|| missing("secret_type"))?,
                secret_uuid: request
                    .data
                    .secret_uuid
                    .clone()
                    .ok_or_else(|| missing("secret_uuid"))?,
            })
        } else {
            None
        };

        Ok(DiskDescriptor {
            source_type: DiskSourceKind::Network,
            driver_name: self.policy.disk_driver_name(false),
            driver_format: "raw".to_string(),
            driver_cache: "none".to_string(),
            source_path: None,
            source_protocol: Some(request.driver_volume_type.clone()),
            source_host: Some(name),
            target_dev: target_dev.to_string(),
            target_bus: "virtio".to_string(),
            serial: request.serial.clone(),
            auth,
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

#[cfg(test)]
mod tests {
    use serde_json::json;

    use crate::traits::QemuDriverPolicy;
    use crate::types::VolumeData;

    use super::*;

    fn rbd_request() -> ConnectionRequest {
        ConnectionRequest {
            driver_volume_type: "rbd".to_string(),
            data: VolumeData {
                name: Some("pool/volume-9".to_string()),
                ..Default::default()
            },
            serial: None,
        }
    }

    fn driver() -> NetVolumeDriver {
        NetVolumeDriver::new(Arc::new(QemuDriverPolicy))
    }

    #[tokio::test]
    async fn protocol_follows_volume_type() {
        let mut request = rbd_request();
        let descriptor = driver().connect_volume(&mut request, "vdb").await.unwrap();

        assert_eq!(descriptor.source_type, DiskSourceKind::Network);
        assert_eq!(descriptor.source_protocol.as_deref(), Some("rbd"));
        assert_eq!(descriptor.source_host.as_deref(), Some("pool/volume-9"));
        assert!(descriptor.auth.is_none());
    }

    #[tokio::test]
    async fn truthy_marker_enables_auth() {
        let mut request = rbd_request();
        request.data.auth_enabled = Some(json!("true"));
        request.data.auth_username = Some("admin".to_string());
        request.data.secret_type = Some("ceph".to_string());
        request.data.secret_uuid = Some("uuid-1".to_string());

        let descriptor = driver().connect_volume(&mut request, "vdb").await.unwrap();
        let auth = descriptor.auth.unwrap();
        assert_eq!(auth.username, "admin");
        assert_eq!(auth.secret_type, "ceph");
        assert_eq!(auth.secret_uuid, "uuid-1");
    }

    #[tokio::test]
    async fn falsey_marker_skips_auth() {
        let mut request = rbd_request();
        request.data.auth_enabled = Some(json!(0));
        request.data.auth_username = Some("admin".to_string());

        let descriptor = driver().connect_volume(&mut request, "vdb").await.unwrap();
        assert!(descriptor.auth.is_none());
    }

    #[tokio::test]
    async fn enabled_auth_with_missing_secret_is_an_error() {
        let mut request = rbd_request();
        request.data.auth_enabled = Some(json!(true));
        request.data.auth_username = Some("admin".to_string());

        let err = driver().connect_volume(&mut request, "vdb").await.unwrap_err();
        assert!(matches!(err, VolumeError::InvalidRequest(_)));
    }

    #[tokio::test]
    async fn missing_name_is_an_error() {
        let mut request = rbd_request();
        request.data.name = None;

        let err = driver().connect_volume(&mut request, "vdb").await.unwrap_err();
        assert!(matches!(err, VolumeError::InvalidRequest(_)));
    }
}
