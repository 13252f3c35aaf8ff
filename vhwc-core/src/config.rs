//! Settings for a nested display instance.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::HwcError;
use crate::flags::Rotation;

/// Deployment parameters of one [`NestedDisplay`](crate::nested::NestedDisplay).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NestedDisplayConfig {
    /// Endpoint the remote viewer connects to.
    pub listen_address: String,
    /// Domain id buffers are exported to.
    pub remote_domain: u32,
    /// How long the remote side keeps a buffer after it is unexported.
    pub unexport_delay_ms: u64,
    /// Longest a frame may spend writing to the viewer before the viewer
    /// is dropped.
    pub send_timeout_ms: u64,
    /// Upper bound on records per frame; sizes the staging buffer.
    pub max_buffers: usize,
    pub width: u32,
    pub height: u32,
    /// In Hz.
    pub refresh_rate: u32,
    pub dpi: u32,
    /// Name stamped into every buffer record.
    pub surface_name: String,
    /// Output rotation applied to every plane transform.
    pub rotation: Rotation,
    /// Trim layer geometry at the display edge instead of only hiding
    /// layers that start below it.
    pub honor_constraints: bool,
}

// ── Defaults ─────────────────────────────────────────────────────

impl Default for NestedDisplayConfig {
    fn default() -> Self {
        Self {
            listen_address: "0.0.0.0:2345".into(),
            remote_domain: 0,
            unexport_delay_ms: 1000,
            send_timeout_ms: 100,
            max_buffers: 64,
            width: 1920,
            height: 1080,
            refresh_rate: 60,
            dpi: 1,
            surface_name: "Cluster".into(),
            rotation: Rotation::None,
            honor_constraints: false,
        }
    }
}

impl NestedDisplayConfig {
    pub fn unexport_delay(&self) -> Duration {
        Duration::from_millis(self.unexport_delay_ms)
    }

    pub fn send_timeout(&self) -> Duration {
        Duration::from_millis(self.send_timeout_ms)
    }

    pub fn validate(&self) -> Result<(), HwcError> {
        if self.width == 0 || self.height == 0 {
            return Err(HwcError::InvalidConfig(format!(
                "display size {}x{} must be non-zero",
                self.width, self.height
            )));
        }
        if self.width > i32::MAX as u32 || self.height > i32::MAX as u32 {
            return Err(HwcError::InvalidConfig("display size exceeds i32 range".into()));
        }
        if self.max_buffers == 0 || self.max_buffers > i32::MAX as usize {
            return Err(HwcError::InvalidConfig(format!(
                "max_buffers {} out of range",
                self.max_buffers
            )));
        }
        if self.send_timeout_ms == 0 {
            return Err(HwcError::InvalidConfig("send_timeout_ms must be non-zero".into()));
        }
        if self.refresh_rate == 0 {
            return Err(HwcError::InvalidConfig("refresh_rate must be non-zero".into()));
        }
        if self.listen_address.is_empty() {
            return Err(HwcError::InvalidConfig("listen_address is empty".into()));
        }
        Ok(())
    }
}
