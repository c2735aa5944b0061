//! Error types for the volume attachment layer.

use thiserror::Error;

use crate::exec::ProcessExecutionError;

/// Errors that can occur while connecting or disconnecting volumes.
#[derive(Error, Debug)]
pub enum VolumeError {
    /// An external tool exited outside its accept-set or could not be run.
    #[error(transparent)]
    Process(#[from] ProcessExecutionError),

    /// The expected device node never appeared on the host.
    #[error("iSCSI device not found at {0}")]
    DeviceNotFound(String),

    /// The connection request is missing a field the selected driver needs.
    #[error("Invalid connection request: {0}")]
    InvalidRequest(String),

    /// No driver is registered for the requested volume type.
    #[error("No volume driver registered for type: {0}")]
    DriverNotFound(String),
}

impl VolumeError {
    /// Exit code of the failed external tool, if that is what went wrong.
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            VolumeError::Process(err) => err.exit_code,
            _ => None,
        }
    }
}

/// Result type alias for volume operations.
pub type Result<T> = std::result::Result<T, VolumeError>;
