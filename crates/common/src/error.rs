//! Common error types.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Programmable stage of the raster pipeline.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ShaderStage {
    Vertex,
    Fragment,
}

impl fmt::Display for ShaderStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShaderStage::Vertex => f.write_str("vertex"),
            ShaderStage::Fragment => f.write_str("fragment"),
        }
    }
}

/// Main error type for kernel execution.
///
/// Every variant is terminal for the `compute()` call that produced it.
#[derive(Error, Debug)]
pub enum GpgpuError {
    #[error("{stage} shader failed to compile: {log}")]
    ShaderCompile { stage: ShaderStage, log: String },

    #[error("Program failed to link: {log}")]
    ProgramLink { log: String },

    #[error("Framebuffer is not complete")]
    IncompleteFramebuffer,

    #[error("{count} elements cannot be laid out within a maximum texture dimension of {max_dimension}")]
    DimensionOverflow { count: usize, max_dimension: u32 },

    #[error("Buffer has no elements")]
    EmptyBuffer,

    #[error("Buffer holds {expected} elements, got {actual}")]
    LengthMismatch { expected: usize, actual: usize },

    #[error("Invalid kernel: {0}")]
    InvalidKernel(String),

    #[error("Device error: {0}")]
    Device(String),
}

pub type GpgpuResult<T> = Result<T, GpgpuError>;

impl GpgpuError {
    pub fn compile(stage: ShaderStage, log: impl Into<String>) -> Self {
        Self::ShaderCompile {
            stage,
            log: log.into(),
        }
    }

    pub fn link(log: impl Into<String>) -> Self {
        Self::ProgramLink { log: log.into() }
    }

    pub fn invalid_kernel(msg: impl Into<String>) -> Self {
        Self::InvalidKernel(msg.into())
    }

    pub fn device(msg: impl Into<String>) -> Self {
        Self::Device(msg.into())
    }
}
