//! Connection request and hypervisor disk descriptor types.

use serde::{Deserialize, Serialize};

/// Volume connection request handed down by the scheduler.
///
/// `driver_volume_type` selects the driver variant; `data` carries the
/// variant-specific parameters. `serial` is opaque and surfaced into the
/// descriptor unchanged.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionRequest {
    pub driver_volume_type: String,
    #[serde(default)]
    pub data: VolumeData,
    #[serde(default)]
    pub serial: Option<String>,
}

/// Keyed record with the variant-specific connection parameters.
///
/// Every field is optional; each driver validates the subset it needs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct VolumeData {
    /// Host block device path. The iSCSI driver writes the materialized
    /// device back into this field before emitting the descriptor.
    pub device_path: Option<String>,
    /// Numeric volume id consulted by the local LV preference chain.
    pub volume_id: Option<i64>,
    /// Volume name for network protocols (e.g. `pool/image` for rbd).
    pub name: Option<String>,
    /// iSCSI portal, `host:port` with an optional `,tag` suffix.
    pub target_portal: Option<String>,
    pub target_iqn: Option<String>,
    pub target_lun: Option<u32>,
    pub auth_method: Option<String>,
    pub auth_username: Option<String>,
    pub auth_password: Option<String>,
    /// Marker enabling auth on network volumes. Any JSON value is accepted;
    /// `null`, `false`, `0`, `""` and empty containers read as disabled,
    /// everything else as enabled.
    pub auth_enabled: Option<serde_json::Value>,
    pub secret_type: Option<String>,
    pub secret_uuid: Option<String>,
}

impl VolumeData {
    /// Truthiness of the `auth_enabled` marker (see the field docs).
    pub fn auth_is_enabled(&self) -> bool {
        match &self.auth_enabled {
            None | Some(serde_json::Value::Null) => false,
            Some(serde_json::Value::Bool(b)) => *b,
            Some(serde_json::Value::Number(n)) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
            Some(serde_json::Value::String(s)) => !s.is_empty(),
            Some(serde_json::Value::Array(a)) => !a.is_empty(),
            Some(serde_json::Value::Object(o)) => !o.is_empty(),
        }
    }
}

/// Where a guest disk source lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiskSourceKind {
    /// A block device node on the host.
    Block,
    /// A qemu-native network protocol.
    Network,
}

/// Authentication triple for network disk sources.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiskAuth {
    pub username: String,
    pub secret_type: String,
    pub secret_uuid: String,
}

/// Hypervisor disk descriptor consumed by the instance launcher.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiskDescriptor {
    pub source_type: DiskSourceKind,
    pub driver_name: String,
    /// Always `raw` for attached volumes.
    pub driver_format: String,
    /// Always `none`; the guest owns its own caching.
    pub driver_cache: String,
    /// Device node path for block sources.
    pub source_path: Option<String>,
    /// Protocol for network sources (e.g. `rbd`).
    pub source_protocol: Option<String>,
    /// Volume name/host for network sources.
    pub source_host: Option<String>,
    /// Guest-visible device name (e.g. `vdb`).
    pub target_dev: String,
    pub target_bus: String,
    pub serial: Option<String>,
    pub auth: Option<DiskAuth>,
}

impl DiskDescriptor {
    /// Render the libvirt `<disk>` element for this descriptor.
    pub fn to_xml(&self) -> String {
        let mut xml = String::new();

        let disk_type = match self.source_type {
            DiskSourceKind::Block => "block",
            DiskSourceKind::Network => "network",
        };

        xml.push_str(&format!("<disk type='{}' device='disk'>\n", disk_type));
        xml.push_str(&format!(
            "  <driver name='{}' type='{}' cache='{}'/>\n",
            self.driver_name, self.driver_format, self.driver_cache
        ));

        match self.source_type {
            DiskSourceKind::Block => {
                xml.push_str(&format!(
                    "  <source dev='{}'/>\n",
                    self.source_path.as_deref().unwrap_or_default()
                ));
            }
            DiskSourceKind::Network => {
                xml.push_str(&format!(
                    "  <source protocol='{}' name='{}'/>\n",
                    self.source_protocol.as_deref().unwrap_or_default(),
                    self.source_host.as_deref().unwrap_or_default()
                ));
            }
        }

        xml.push_str(&format!(
            "  <target dev='{}' bus='{}'/>\n",
            self.target_dev, self.target_bus
        ));

        if let Some(serial) = &self.serial {
            xml.push_str(&format!("  <serial>{}</serial>\n", serial));
        }

        if let Some(auth) = &self.auth {
            xml.push_str(&format!(
                "  <auth username='{}'>\n    <secret type='{}' uuid='{}'/>\n  </auth>\n",
                auth.username, auth.secret_type, auth.secret_uuid
            ));
        }

        xml.push_str("</disk>\n");
        xml
    }
}
