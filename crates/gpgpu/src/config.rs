//! Device selection configuration.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Graphics backend to request an adapter from.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendSelection {
    #[default]
    All,
    Vulkan,
    Metal,
    Dx12,
    Gl,
}

impl BackendSelection {
    pub fn backends(self) -> wgpu::Backends {
        match self {
            BackendSelection::All => wgpu::Backends::all(),
            BackendSelection::Vulkan => wgpu::Backends::VULKAN,
            BackendSelection::Metal => wgpu::Backends::METAL,
            BackendSelection::Dx12 => wgpu::Backends::DX12,
            BackendSelection::Gl => wgpu::Backends::GL,
        }
    }
}

impl FromStr for BackendSelection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "all" => Ok(BackendSelection::All),
            "vulkan" => Ok(BackendSelection::Vulkan),
            "metal" => Ok(BackendSelection::Metal),
            "dx12" => Ok(BackendSelection::Dx12),
            "gl" => Ok(BackendSelection::Gl),
            other => Err(format!("unknown backend `{other}`")),
        }
    }
}

impl fmt::Display for BackendSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BackendSelection::All => "all",
            BackendSelection::Vulkan => "vulkan",
            BackendSelection::Metal => "metal",
            BackendSelection::Dx12 => "dx12",
            BackendSelection::Gl => "gl",
        };
        f.write_str(name)
    }
}

/// Configuration for the device kernels run on.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ComputeConfig {
    /// Backend to request an adapter from.
    pub backend: BackendSelection,
    /// Prefer an integrated, low-power adapter.
    pub low_power: bool,
    /// Cap on texture width and height, below the device limit.
    pub max_texture_dimension: Option<u32>,
}

impl ComputeConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_backend(mut self, backend: BackendSelection) -> Self {
        self.backend = backend;
        self
    }

    pub fn with_low_power(mut self, low_power: bool) -> Self {
        self.low_power = low_power;
        self
    }

    pub fn with_max_texture_dimension(mut self, max: u32) -> Self {
        self.max_texture_dimension = Some(max);
        self
    }

    pub fn power_preference(&self) -> wgpu::PowerPreference {
        if self.low_power {
            wgpu::PowerPreference::LowPower
        } else {
            wgpu::PowerPreference::HighPerformance
        }
    }
}
