//! General-purpose computation on a rasterization pipeline.
//!
//! Linear `f32` buffers are laid out as single-channel float textures, a
//! user kernel is wrapped into a fragment stage, and one full-screen draw
//! runs it once per output element. No compute pipeline is ever created.

pub mod buffer;
pub mod compute;
pub mod config;
pub mod context;
pub mod device;
pub mod dispatch;
pub mod pipeline;
pub mod shaders;
pub mod texture;

#[cfg(test)]
mod testing;

pub use buffer::GpuBuffer;
pub use common::{GpgpuError, GpgpuResult, ShaderStage, TexelFormat, TextureShape};
pub use compute::compute;
pub use config::{BackendSelection, ComputeConfig};
pub use context::{GpuContext, GpuContextBuilder, GpuError};
pub use device::RasterDevice;
pub use shaders::{KernelAssembler, KernelSource, ProgramSource};
