//! The raster device capability consumed by the compute pipeline.
//!
//! Kernels only need a small slice of a rasterizing GPU API: float
//! textures, a vertex/fragment program, a framebuffer to render into and a
//! way to read pixels back. [`RasterDevice`] names exactly that slice so the
//! encoder, compiler and dispatcher never touch a global context.
//!
//! Handles are owned values. Dropping a texture, shader, program or
//! framebuffer releases the device resource behind it, so every exit path of
//! a `compute()` call cleans up after itself.

use crate::pipeline::KernelUniforms;
use common::{GpgpuResult, ShaderStage, TexelFormat, TextureShape};

/// Completeness of a framebuffer as a render and readback target.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FramebufferStatus {
    Complete,
    /// The attached texture cannot be rendered into.
    IncompleteAttachment,
    /// The attachment format is not renderable on this device.
    Unsupported,
}

impl FramebufferStatus {
    #[inline]
    pub fn is_complete(self) -> bool {
        self == FramebufferStatus::Complete
    }
}

/// Resource interface a program is linked against.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ProgramInterface {
    /// Number of input textures, bound to units `0..input_count`.
    pub input_count: usize,
    /// Format of the color attachment the program renders into.
    pub target_format: TexelFormat,
}

/// An input texture bound to a texture unit for one draw.
pub struct TextureUnit<'a, T> {
    pub unit: u32,
    /// Name of the sampler uniform set to `unit`.
    pub sampler: String,
    pub texture: &'a T,
}

/// Everything a single full-screen quad draw needs.
pub struct DrawCall<'a, D: RasterDevice + ?Sized> {
    pub program: &'a D::Program,
    pub framebuffer: &'a D::Framebuffer,
    pub units: Vec<TextureUnit<'a, D::Texture>>,
    pub uniforms: KernelUniforms,
    pub viewport: TextureShape,
}

/// Texture, program and framebuffer primitives of a rasterizing GPU.
pub trait RasterDevice {
    type Texture;
    type Shader;
    type Program;
    type Framebuffer;

    /// Largest width or height a 2D texture may have.
    fn max_texture_dimension(&self) -> u32;

    /// Allocate a single-channel texture and upload `texels` into it.
    ///
    /// `texels` holds `shape.area()` texels of `format`, row-major.
    fn create_texture(
        &self,
        shape: TextureShape,
        format: TexelFormat,
        texels: &[u8],
    ) -> GpgpuResult<Self::Texture>;

    /// Overwrite every texel of `texture` with `texels` (same layout as
    /// [`RasterDevice::create_texture`]).
    fn write_texture(&self, texture: &Self::Texture, texels: &[u8]) -> GpgpuResult<()>;

    /// Compile one stage. The error carries the compiler's diagnostic log.
    fn compile_shader(&self, stage: ShaderStage, source: &str) -> Result<Self::Shader, String>;

    /// Link compiled stages. The error carries the linker's diagnostic log.
    fn link_program(
        &self,
        vertex: &Self::Shader,
        fragment: &Self::Shader,
        interface: &ProgramInterface,
    ) -> Result<Self::Program, String>;

    /// Framebuffer with `color` as its only color attachment.
    fn create_framebuffer(&self, color: &Self::Texture) -> Self::Framebuffer;

    fn framebuffer_status(&self, framebuffer: &Self::Framebuffer) -> FramebufferStatus;

    /// Issue one full-screen quad draw into `call.framebuffer`.
    fn draw(&self, call: &DrawCall<'_, Self>) -> GpgpuResult<()>;

    /// Read the red channel of every pixel of `framebuffer` as f32, row by
    /// row. Blocks until all prior work on the attachment has finished.
    fn read_pixels(&self, framebuffer: &Self::Framebuffer) -> GpgpuResult<Vec<f32>>;
}
