//! Common types shared by the fragment-shader compute crates.

pub mod error;
pub mod format;
pub mod geometry;

pub use error::{GpgpuError, GpgpuResult, ShaderStage};
pub use format::TexelFormat;
pub use geometry::TextureShape;
