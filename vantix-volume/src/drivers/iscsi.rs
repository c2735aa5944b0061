//! iSCSI transport driver.
//!
//! A thin orchestrator around `iscsiadm` and `multipath`: portal session
//! lifecycle, device node materialization with bounded retry, optional
//! multipath aggregation, and reference-counted teardown. All host side
//! effects happen through the external tools; the value here is ordering,
//! retry, idempotence and cleanup. Descriptor emission is delegated to
//! [`LocalBlockDriver`] once the host device exists.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use crate::config::VolumeConfig;
use crate::drivers::local::LocalBlockDriver;
use crate::error::{Result, VolumeError};
use crate::exec::{CommandExecutor, ProcessOutput};
use crate::retry;
use crate::traits::{DiskDriverPolicy, GuestInventory, VolumeDriver};
use crate::types::{ConnectionRequest, DiskDescriptor, VolumeData};

/// Serializes connect and disconnect across every driver instance in the
/// process. `iscsiadm` and the device-mapper tools are not safe against
/// concurrent session or map mutation, and session listings are only
/// meaningful while nothing else is mutating them.
static CONNECT_VOLUME_LOCK: Mutex<()> = Mutex::const_new(());

/// One iSCSI target endpoint as named by the scheduler.
#[derive(Debug, Clone)]
struct IscsiTarget {
    portal: String,
    iqn: String,
    lun: u32,
    auth_method: Option<String>,
    auth_username: Option<String>,
    auth_password: Option<String>,
}

impl IscsiTarget {
    fn from_data(data: &VolumeData) -> Result<Self> {
        let portal = data.target_portal.clone().ok_or_else(|| {
            VolumeError::InvalidRequest("target_portal is required for iSCSI volumes".into())
        })?;
        let iqn = data.target_iqn.clone().ok_or_else(|| {
            VolumeError::InvalidRequest("target_iqn is required for iSCSI volumes".into())
        })?;

        Ok(Self {
            portal,
            iqn,
            lun: data.target_lun.unwrap_or(0),
            auth_method: data.auth_method.clone(),
            auth_username: data.auth_username.clone(),
            auth_password: data.auth_password.clone(),
        })
    }

    /// Portal with any `,tag` suffix stripped.
    fn stripped_portal(&self) -> &str {
        self.portal.split(',').next().unwrap_or(&self.portal)
    }
}

/// Driver for volumes exported over iSCSI.
pub struct IscsiVolumeDriver {
    base: LocalBlockDriver,
    executor: Arc<dyn CommandExecutor>,
    inventory: Arc<dyn GuestInventory>,
    config: Arc<VolumeConfig>,
    dev_root: PathBuf,
}

impl IscsiVolumeDriver {
    pub fn new(
        executor: Arc<dyn CommandExecutor>,
        inventory: Arc<dyn GuestInventory>,
        policy: Arc<dyn DiskDriverPolicy>,
        config: Arc<VolumeConfig>,
    ) -> Self {
        Self {
            base: LocalBlockDriver::new(policy, config.clone()),
            executor,
            inventory,
            config,
            dev_root: PathBuf::from("/dev"),
        }
    }

    /// Use a different device tree root (testing).
    pub fn with_dev_root(mut self, dev_root: impl Into<PathBuf>) -> Self {
        let dev_root = dev_root.into();
        self.base = self.base.with_dev_root(dev_root.clone());
        self.dev_root = dev_root;
        self
    }

    fn by_path_dir(&self) -> PathBuf {
        self.dev_root.join("disk/by-path")
    }

    /// Per-path device node the initiator materializes for this target.
    fn host_device_path(&self, target: &IscsiTarget) -> PathBuf {
        self.by_path_dir().join(format!(
            "ip-{}-iscsi-{}-lun-{}",
            target.portal, target.iqn, target.lun
        ))
    }

    fn run_iscsiadm(
        &self,
        target: &IscsiTarget,
        extra: &[&str],
        accept: &[i32],
    ) -> Result<ProcessOutput> {
        let mut argv = vec![
            "iscsiadm",
            "-m",
            "node",
            "-T",
            target.iqn.as_str(),
            "-p",
            target.portal.as_str(),
        ];
        argv.extend_from_slice(extra);

        let out = self.executor.execute(&argv, true, accept)?;
        debug!(args = ?extra, stdout = %out.stdout, stderr = %out.stderr, "iscsiadm");
        Ok(out)
    }

    fn iscsiadm_update(
        &self,
        target: &IscsiTarget,
        key: &str,
        value: &str,
        accept: &[i32],
    ) -> Result<ProcessOutput> {
        self.run_iscsiadm(target, &["--op", "update", "-n", key, "-v", value], accept)
    }

    fn run_iscsiadm_bare(&self, args: &[&str], accept: &[i32]) -> Result<ProcessOutput> {
        let mut argv = vec!["iscsiadm"];
        argv.extend_from_slice(args);

        let out = self.executor.execute(&argv, true, accept)?;
        debug!(args = ?args, stdout = %out.stdout, stderr = %out.stderr, "iscsiadm");
        Ok(out)
    }

    fn run_multipath(&self, args: &[&str], accept: &[i32]) -> Result<ProcessOutput> {
        let mut argv = vec!["multipath"];
        argv.extend_from_slice(args);

        let out = self.executor.execute(&argv, true, accept)?;
        debug!(args = ?args, stdout = %out.stdout, stderr = %out.stderr, "multipath");
        Ok(out)
    }

    fn rescan_iscsi(&self) -> Result<()> {
        self.run_iscsiadm_bare(&["-m", "node", "--rescan"], &[0, 1, 21, 255])?;
        self.run_iscsiadm_bare(&["-m", "session", "--rescan"], &[0, 1, 21, 255])?;
        Ok(())
    }

    fn rescan_multipath(&self) -> Result<()> {
        self.run_multipath(&["-r"], &[0, 1, 21])?;
        Ok(())
    }

    /// Portal addresses are the first whitespace field of each discovery
    /// output line.
    fn target_portals_from_discovery(output: &str) -> Vec<String> {
        output
            .lines()
            .filter_map(|line| line.split_whitespace().next())
            .map(str::to_string)
            .collect()
    }

    /// `(portal, iqn)` pairs from `iscsiadm -m session` output. Only `tcp:`
    /// lines count; fields 2 and 3 are positional.
    fn session_endpoints(output: &str) -> Vec<(String, String)> {
        output
            .lines()
            .filter(|line| line.starts_with("tcp:"))
            .filter_map(|line| {
                let fields: Vec<&str> = line.split_whitespace().collect();
                match (fields.get(2), fields.get(3)) {
                    (Some(portal), Some(iqn)) => Some((portal.to_string(), iqn.to_string())),
                    _ => None,
                }
            })
            .collect()
    }

    /// Whether an active session already exists for this portal/iqn pair.
    /// Portals are compared with the `,tag` suffix stripped on both sides;
    /// iqns must match exactly.
    fn has_active_session(&self, target: &IscsiTarget) -> Result<bool> {
        let out = self.run_iscsiadm_bare(&["-m", "session"], &[0, 21, 1])?;
        Ok(Self::session_endpoints(&out.stdout)
            .iter()
            .any(|(portal, iqn)| {
                portal.split(',').next().unwrap_or(portal) == target.stripped_portal()
                    && iqn == &target.iqn
            }))
    }

    /// Ensure the node record exists, carries the auth settings, and has a
    /// logged-in session with `node.startup=automatic`.
    fn connect_to_iscsi_portal(&self, target: &IscsiTarget) -> Result<()> {
        // A probe failing with "no records found" (21 since iscsiadm
        // 2.0-871, 255 before that) means the record must be created.
        match self.run_iscsiadm(target, &[], &[0]) {
            Ok(_) => {}
            Err(err) if matches!(err.exit_code(), Some(21) | Some(255)) => {
                self.run_iscsiadm(target, &["--op", "new"], &[0])?;
            }
            Err(err) => return Err(err),
        }

        if let Some(auth_method) = &target.auth_method {
            self.iscsiadm_update(target, "node.session.auth.authmethod", auth_method, &[0])?;
            self.iscsiadm_update(
                target,
                "node.session.auth.username",
                target.auth_username.as_deref().unwrap_or_default(),
                &[0],
            )?;
            self.iscsiadm_update(
                target,
                "node.session.auth.password",
                target.auth_password.as_deref().unwrap_or_default(),
                &[0],
            )?;
        }

        // Logging in twice can crash iscsiadm under load, so consult the
        // active session list first.
        if self.has_active_session(target)? {
            return Ok(());
        }

        match self.run_iscsiadm(target, &["--login"], &[0, 255]) {
            Err(err) if err.exit_code() == Some(15) => {
                // Duplicate session; another path already logged us in.
                self.iscsiadm_update(target, "node.startup", "automatic", &[0])?;
                return Ok(());
            }
            // Other login failures fall through: this may be one of many
            // paths, and the device wait decides the overall outcome.
            _ => {}
        }

        self.iscsiadm_update(target, "node.startup", "automatic", &[0])?;
        Ok(())
    }

    /// Tear down the node record for one portal: startup back to manual,
    /// log out, delete the record. "Already gone" exit codes are accepted
    /// so disconnect stays idempotent.
    fn disconnect_from_iscsi_portal(&self, target: &IscsiTarget) -> Result<()> {
        self.iscsiadm_update(target, "node.startup", "manual", &[0, 21, 255])?;
        self.run_iscsiadm(target, &["--logout"], &[0, 21, 255])?;
        self.run_iscsiadm(target, &["--op", "delete"], &[0, 21, 255])?;
        Ok(())
    }

    /// Resolve a single-path device to its device-mapper aggregate.
    /// `multipath -ll` lines mentioning `scsi_id` are udev noise; the dm
    /// name is the first field of the first remaining line.
    fn multipath_device_name(&self, single_path_device: &Path) -> Result<Option<String>> {
        let device = std::fs::canonicalize(single_path_device)
            .unwrap_or_else(|_| single_path_device.to_path_buf());
        let device = device.to_string_lossy();

        let out = self.run_multipath(&["-ll", device.as_ref()], &[0, 1])?;

        Ok(out
            .stdout
            .lines()
            .find(|line| !line.contains("scsi_id"))
            .and_then(|line| line.split_whitespace().next())
            .map(|name| {
                self.dev_root
                    .join("mapper")
                    .join(name)
                    .to_string_lossy()
                    .into_owned()
            }))
    }

    /// Non-recursive listing of `ip-` entries under `disk/by-path`, sorted
    /// by name for determinism.
    fn iscsi_device_entries(&self) -> Vec<String> {
        let mut entries: Vec<String> = std::fs::read_dir(self.by_path_dir())
            .map(|dir| {
                dir.filter_map(|entry| entry.ok())
                    .filter_map(|entry| entry.file_name().into_string().ok())
                    .filter(|name| name.starts_with("ip-"))
                    .collect()
            })
            .unwrap_or_default();
        entries.sort();
        entries
    }

    /// Reverse-map a multipath device to the iqn embedded in the by-path
    /// entry it aggregates. `None` when no entry maps to it.
    fn multipath_iqn(&self, multipath_device: &str) -> Result<Option<String>> {
        for entry in self.iscsi_device_entries() {
            let entry_path = self.by_path_dir().join(&entry);
            let real = std::fs::canonicalize(&entry_path).unwrap_or(entry_path);
            if self.multipath_device_name(&real)?.as_deref() == Some(multipath_device) {
                return Ok(entry
                    .split("iscsi-")
                    .nth(1)
                    .and_then(|rest| rest.split("-lun").next())
                    .map(str::to_string));
            }
        }
        Ok(None)
    }

    /// Multipath-aware full teardown: every portal under `disk/by-path`
    /// carrying this iqn is logged out and deleted.
    fn disconnect_multipath_portals(&self, target: &IscsiTarget) -> Result<()> {
        let portals: Vec<String> = self
            .iscsi_device_entries()
            .iter()
            .filter(|entry| entry.contains(&target.iqn))
            .filter_map(|entry| entry.split('-').nth(1).map(str::to_string))
            .collect();

        for portal in portals {
            let mut portal_target = target.clone();
            portal_target.portal = portal;
            self.disconnect_from_iscsi_portal(&portal_target)?;
        }

        self.rescan_multipath()
    }

    /// Remove only the device-mapper map descriptor; the sessions stay up
    /// for the other LUNs on the same target.
    fn remove_multipath_descriptor(&self, multipath_device: &str) {
        let name = Path::new(multipath_device)
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| multipath_device.to_string());

        // Some storage back-ends never create the map descriptor; failing
        // to remove what does not exist must not break disconnect.
        if let Err(err) = self.run_multipath(&["-f", &name], &[0, 1]) {
            warn!(
                multipath_device = %multipath_device,
                error = %err,
                "Failed to remove multipath device descriptor"
            );
        }
    }

    /// Disconnect when the volume was folded into a multipath device.
    /// Sessions are shared per-iqn, so teardown only happens once no guest
    /// still uses a multipath device backed by the same iqn.
    fn disconnect_volume_multipath_iscsi(
        &self,
        target: &IscsiTarget,
        multipath_device: &str,
    ) -> Result<()> {
        self.rescan_iscsi()?;
        self.rescan_multipath()?;

        let mut devices = Vec::new();
        for dev in self.inventory.all_block_devices() {
            if dev.contains("/mapper/") {
                devices.push(dev);
            } else if let Some(mpdev) = self.multipath_device_name(Path::new(&dev))? {
                devices.push(mpdev);
            }
        }

        if devices.is_empty() {
            return self.disconnect_multipath_portals(target);
        }

        let mut in_use_iqns = Vec::new();
        for device in &devices {
            if let Some(iqn) = self.multipath_iqn(device)? {
                in_use_iqns.push(iqn);
            }
        }

        if !in_use_iqns.iter().any(|iqn| iqn == &target.iqn) {
            return self.disconnect_multipath_portals(target);
        }

        // Other LUNs on the same target still need the sessions; only the
        // map for this volume goes away.
        self.remove_multipath_descriptor(multipath_device);
        Ok(())
    }
}

#[async_trait]
impl VolumeDriver for IscsiVolumeDriver {
    #[instrument(skip(self, request))]
    async fn connect_volume(
        &self,
        request: &mut ConnectionRequest,
        target_dev: &str,
    ) -> Result<DiskDescriptor> {
        let _guard = CONNECT_VOLUME_LOCK.lock().await;

        let target = IscsiTarget::from_data(&request.data)?;
        let use_multipath = self.config.iscsi_use_multipath;

        if use_multipath {
            // Multipath is expected to be configured on the compute node;
            // discovery surfaces the sibling portals of the same target.
            // Exit 255 means no record yet and reads as empty output.
            let out = self.run_iscsiadm_bare(
                &[
                    "-m",
                    "discovery",
                    "-t",
                    "sendtargets",
                    "-p",
                    target.portal.as_str(),
                ],
                &[0, 255],
            )?;

            for portal in Self::target_portals_from_discovery(&out.stdout) {
                let mut portal_target = target.clone();
                portal_target.portal = portal;
                self.connect_to_iscsi_portal(&portal_target)?;
            }

            self.rescan_iscsi()?;
        } else {
            self.connect_to_iscsi_portal(&target)?;
        }

        let host_device = self.host_device_path(&target);

        // The by-path node is not always present immediately after login.
        let rescans = retry::poll_with_backoff(
            self.config.num_iscsi_scan_tries,
            || host_device.exists(),
            || {
                warn!(
                    host_device = %host_device.display(),
                    target_dev,
                    "iSCSI volume not yet found, rescanning"
                );
                self.run_iscsiadm(&target, &["--rescan"], &[0]).map(|_| ())
            },
        )
        .await?
        .ok_or_else(|| VolumeError::DeviceNotFound(host_device.display().to_string()))?;

        if rescans != 0 {
            debug!(
                host_device = %host_device.display(),
                rescans,
                "Found iSCSI node after rescans"
            );
        }

        let mut host_device = host_device.to_string_lossy().into_owned();

        if use_multipath {
            // Prefer the device-mapper aggregate over the single path.
            self.rescan_multipath()?;
            if let Some(multipath_device) = self.multipath_device_name(Path::new(&host_device))? {
                host_device = multipath_device;
            }
        }

        info!(host_device = %host_device, target_dev, "iSCSI volume connected");

        request.data.device_path = Some(host_device);
        self.base.connect_volume(request, target_dev).await
    }

    #[instrument(skip(self, request))]
    async fn disconnect_volume(
        &self,
        request: &ConnectionRequest,
        target_dev: &str,
    ) -> Result<()> {
        let _guard = CONNECT_VOLUME_LOCK.lock().await;

        let target = IscsiTarget::from_data(&request.data)?;
        let use_multipath = self.config.iscsi_use_multipath;

        let multipath_device = if use_multipath {
            self.multipath_device_name(&self.host_device_path(&target))?
        } else {
            None
        };

        self.base.disconnect_volume(request, target_dev).await?;

        if use_multipath {
            if let Some(multipath_device) = multipath_device {
                return self.disconnect_volume_multipath_iscsi(&target, &multipath_device);
            }
        }

        // Only tear the portal down when no other LUN on it is attached.
        let device_prefix = format!(
            "{}/ip-{}-iscsi-{}-lun-",
            self.by_path_dir().display(),
            target.portal,
            target.iqn
        );
        let still_in_use = self
            .inventory
            .all_block_devices()
            .iter()
            .any(|dev| dev.starts_with(&device_prefix));

        if !still_in_use {
            self.disconnect_from_iscsi_portal(&target)?;
        } else {
            debug!(
                iqn = %target.iqn,
                portal = %target.portal,
                "Other LUNs still attached, keeping the session"
            );
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::os::unix::fs::symlink;

    use crate::mock::{MockExecutor, MockInventory};
    use crate::traits::QemuDriverPolicy;

    use super::*;

    const PORTAL: &str = "10.0.0.1:3260";
    const IQN: &str = "iqn.test:1";

    fn target() -> IscsiTarget {
        IscsiTarget {
            portal: PORTAL.to_string(),
            iqn: IQN.to_string(),
            lun: 0,
            auth_method: None,
            auth_username: None,
            auth_password: None,
        }
    }

    fn driver_with(
        executor: Arc<MockExecutor>,
        inventory: Arc<MockInventory>,
        config: VolumeConfig,
        dev_root: &Path,
    ) -> IscsiVolumeDriver {
        IscsiVolumeDriver::new(
            executor,
            inventory,
            Arc::new(QemuDriverPolicy),
            Arc::new(config),
        )
        .with_dev_root(dev_root)
    }

    fn node_cmd(extra: &str) -> String {
        if extra.is_empty() {
            format!("iscsiadm -m node -T {} -p {}", IQN, PORTAL)
        } else {
            format!("iscsiadm -m node -T {} -p {} {}", IQN, PORTAL, extra)
        }
    }

    #[test]
    fn parses_discovery_output_positionally() {
        let out = "10.0.0.1:3260,1 iqn.test:1\n10.0.0.2:3260,1 iqn.test:1\n";
        assert_eq!(
            IscsiVolumeDriver::target_portals_from_discovery(out),
            vec!["10.0.0.1:3260,1", "10.0.0.2:3260,1"]
        );
        assert!(IscsiVolumeDriver::target_portals_from_discovery("\n").is_empty());
    }

    #[test]
    fn parses_session_output_positionally() {
        let out = "tcp: [1] 10.0.0.1:3260,1 iqn.test:1\n\
                   tcp: [2] 10.0.0.2:3260,1 iqn.test:2\n\
                   iser: [3] 10.0.0.3:3260,1 iqn.test:3\n";
        let endpoints = IscsiVolumeDriver::session_endpoints(out);
        assert_eq!(
            endpoints,
            vec![
                ("10.0.0.1:3260,1".to_string(), "iqn.test:1".to_string()),
                ("10.0.0.2:3260,1".to_string(), "iqn.test:2".to_string()),
            ]
        );
    }

    #[test]
    fn session_match_strips_portal_tags() {
        let dev = tempfile::tempdir().unwrap();
        let executor = Arc::new(MockExecutor::new());
        executor.script(
            "iscsiadm -m session",
            0,
            "tcp: [1] 10.0.0.1:3260,1 iqn.test:1\n",
        );

        let driver = driver_with(
            executor,
            Arc::new(MockInventory::new()),
            VolumeConfig::default(),
            dev.path(),
        );

        assert!(driver.has_active_session(&target()).unwrap());

        let mut other = target();
        other.iqn = "iqn.test:2".to_string();
        assert!(!driver.has_active_session(&other).unwrap());
    }

    #[test]
    fn probe_miss_creates_node_record() {
        let dev = tempfile::tempdir().unwrap();
        let executor = Arc::new(MockExecutor::new());
        executor.script(&node_cmd(""), 21, "");

        let driver = driver_with(
            executor.clone(),
            Arc::new(MockInventory::new()),
            VolumeConfig::default(),
            dev.path(),
        );

        driver.connect_to_iscsi_portal(&target()).unwrap();

        let calls = executor.calls();
        assert!(calls.contains(&node_cmd("--op new")));
        assert!(calls.contains(&node_cmd("--login")));
        assert!(calls.contains(&node_cmd("--op update -n node.startup -v automatic")));
    }

    #[test]
    fn probe_failure_with_other_code_propagates() {
        let dev = tempfile::tempdir().unwrap();
        let executor = Arc::new(MockExecutor::new());
        executor.script(&node_cmd(""), 7, "");

        let driver = driver_with(
            executor.clone(),
            Arc::new(MockInventory::new()),
            VolumeConfig::default(),
            dev.path(),
        );

        let err = driver.connect_to_iscsi_portal(&target()).unwrap_err();
        assert_eq!(err.exit_code(), Some(7));
        assert!(!executor.calls().contains(&node_cmd("--op new")));
    }

    #[test]
    fn existing_session_suppresses_login() {
        let dev = tempfile::tempdir().unwrap();
        let executor = Arc::new(MockExecutor::new());
        executor.script(
            "iscsiadm -m session",
            0,
            "tcp: [1] 10.0.0.1:3260,1 iqn.test:1\n",
        );

        let driver = driver_with(
            executor.clone(),
            Arc::new(MockInventory::new()),
            VolumeConfig::default(),
            dev.path(),
        );

        driver.connect_to_iscsi_portal(&target()).unwrap();
        assert_eq!(executor.count_calls("--login"), 0);
    }

    #[test]
    fn duplicate_login_still_marks_automatic_startup() {
        let dev = tempfile::tempdir().unwrap();
        let executor = Arc::new(MockExecutor::new());
        executor.script(&node_cmd("--login"), 15, "");

        let driver = driver_with(
            executor.clone(),
            Arc::new(MockInventory::new()),
            VolumeConfig::default(),
            dev.path(),
        );

        driver.connect_to_iscsi_portal(&target()).unwrap();
        assert!(executor
            .calls()
            .contains(&node_cmd("--op update -n node.startup -v automatic")));
    }

    #[test]
    fn chap_settings_are_pushed_onto_the_record() {
        let dev = tempfile::tempdir().unwrap();
        let executor = Arc::new(MockExecutor::new());

        let driver = driver_with(
            executor.clone(),
            Arc::new(MockInventory::new()),
            VolumeConfig::default(),
            dev.path(),
        );

        let mut chap = target();
        chap.auth_method = Some("CHAP".to_string());
        chap.auth_username = Some("user".to_string());
        chap.auth_password = Some("pass".to_string());
        driver.connect_to_iscsi_portal(&chap).unwrap();

        let calls = executor.calls();
        assert!(calls.contains(&node_cmd(
            "--op update -n node.session.auth.authmethod -v CHAP"
        )));
        assert!(calls.contains(&node_cmd("--op update -n node.session.auth.username -v user")));
        assert!(calls.contains(&node_cmd("--op update -n node.session.auth.password -v pass")));
    }

    #[test]
    fn multipath_name_skips_udev_noise() {
        let dev = tempfile::tempdir().unwrap();
        let sda = dev.path().join("sda");
        std::fs::write(&sda, []).unwrap();
        let real = std::fs::canonicalize(&sda).unwrap();

        let executor = Arc::new(MockExecutor::new());
        executor.script(
            &format!("multipath -ll {}", real.display()),
            0,
            "error calling out scsi_id\nmpatha (3600d02310000) dm-0\n",
        );

        let driver = driver_with(
            executor,
            Arc::new(MockInventory::new()),
            VolumeConfig::default(),
            dev.path(),
        );

        assert_eq!(
            driver.multipath_device_name(&sda).unwrap().as_deref(),
            Some(dev.path().join("mapper/mpatha").to_str().unwrap())
        );
    }

    #[test]
    fn multipath_name_absent_on_empty_output() {
        let dev = tempfile::tempdir().unwrap();
        let sda = dev.path().join("sda");
        std::fs::write(&sda, []).unwrap();

        let driver = driver_with(
            Arc::new(MockExecutor::new()),
            Arc::new(MockInventory::new()),
            VolumeConfig::default(),
            dev.path(),
        );

        assert!(driver.multipath_device_name(&sda).unwrap().is_none());
    }

    #[test]
    fn reverse_iqn_lookup_walks_by_path_entries() {
        let dev = tempfile::tempdir().unwrap();
        let by_path = dev.path().join("disk/by-path");
        std::fs::create_dir_all(&by_path).unwrap();

        let sda = dev.path().join("sda");
        std::fs::write(&sda, []).unwrap();
        let entry = format!("ip-{}-iscsi-{}-lun-0", PORTAL, IQN);
        symlink(&sda, by_path.join(&entry)).unwrap();

        let real = std::fs::canonicalize(&sda).unwrap();
        let executor = Arc::new(MockExecutor::new());
        executor.script(&format!("multipath -ll {}", real.display()), 0, "mpatha dm-0\n");

        let driver = driver_with(
            executor,
            Arc::new(MockInventory::new()),
            VolumeConfig::default(),
            dev.path(),
        );

        let mapper = dev.path().join("mapper/mpatha");
        assert_eq!(
            driver.multipath_iqn(mapper.to_str().unwrap()).unwrap().as_deref(),
            Some(IQN)
        );
        assert!(driver.multipath_iqn("/dev/mapper/other").unwrap().is_none());
    }

    #[test]
    fn portal_teardown_tolerates_already_gone_records() {
        let dev = tempfile::tempdir().unwrap();
        let executor = Arc::new(MockExecutor::new());
        executor.script(&node_cmd("--op update -n node.startup -v manual"), 21, "");
        executor.script(&node_cmd("--logout"), 255, "");
        executor.script(&node_cmd("--op delete"), 21, "");

        let driver = driver_with(
            executor.clone(),
            Arc::new(MockInventory::new()),
            VolumeConfig::default(),
            dev.path(),
        );

        driver.disconnect_from_iscsi_portal(&target()).unwrap();
        assert_eq!(executor.calls().len(), 3);
    }

    #[test]
    fn descriptor_removal_failure_is_only_a_warning() {
        let dev = tempfile::tempdir().unwrap();
        let executor = Arc::new(MockExecutor::new());
        executor.script("multipath -f mpatha", 2, "");

        let driver = driver_with(
            executor.clone(),
            Arc::new(MockInventory::new()),
            VolumeConfig::default(),
            dev.path(),
        );

        // Exit 2 is outside the accept-set; must not panic or propagate.
        driver.remove_multipath_descriptor("/dev/mapper/mpatha");
        assert_eq!(executor.count_calls("multipath -f mpatha"), 1);
    }
}
