//! Linear buffers stored as single-channel float textures.

use crate::device::RasterDevice;
use common::format::{f16_texels, f32_texels};
use common::{GpgpuError, GpgpuResult, TexelFormat, TextureShape};
use half::f16;

/// A linear buffer encoded as a texture on `D`.
///
/// The shape always comes from [`TextureShape::factorize`] with the device's
/// maximum texture dimension. Dropping the buffer releases the texture.
pub struct GpuBuffer<D: RasterDevice> {
    texture: D::Texture,
    shape: TextureShape,
    len: usize,
    format: TexelFormat,
}

impl<D: RasterDevice> GpuBuffer<D> {
    /// Upload `data` as 32-bit float texels.
    pub fn encode(device: &D, data: &[f32]) -> GpgpuResult<Self> {
        Self::allocate(device, data.len(), TexelFormat::R32Float, Some(f32_texels(data)))
    }

    /// Allocate `len` zeroed 32-bit float texels.
    pub fn encode_zeroed(device: &D, len: usize) -> GpgpuResult<Self> {
        Self::allocate(device, len, TexelFormat::R32Float, None)
    }

    /// Upload packed half floats, for static weight-style inputs.
    pub fn encode_half(device: &D, data: &[f16]) -> GpgpuResult<Self> {
        Self::allocate(device, data.len(), TexelFormat::R16Float, Some(f16_texels(data)))
    }

    fn allocate(
        device: &D,
        len: usize,
        format: TexelFormat,
        texels: Option<&[u8]>,
    ) -> GpgpuResult<Self> {
        let shape = TextureShape::factorize(len, device.max_texture_dimension())?;

        // Exact factorization: the grid holds exactly `len` texels.
        let zeroed;
        let texels = match texels {
            Some(texels) => texels,
            None => {
                zeroed = format.zeroed(shape.area());
                &zeroed
            }
        };

        let texture = device.create_texture(shape, format, texels)?;
        tracing::trace!("Encoded {} elements as {}x{} {:?}", len, shape.width, shape.height, format);

        Ok(Self {
            texture,
            shape,
            len,
            format,
        })
    }

    /// Re-upload `data` into the existing texture, converting to the
    /// buffer's format. The shape never changes, so `data` must have exactly
    /// `len()` elements.
    pub fn update(&self, device: &D, data: &[f32]) -> GpgpuResult<()> {
        self.check_len(data.len())?;
        device.write_texture(&self.texture, &self.format.encode(data))
    }

    /// Re-upload packed halves into the existing texture.
    pub fn update_half(&self, device: &D, data: &[f16]) -> GpgpuResult<()> {
        self.check_len(data.len())?;
        device.write_texture(&self.texture, &self.format.encode_half(data))
    }

    fn check_len(&self, actual: usize) -> GpgpuResult<()> {
        if actual != self.len {
            return Err(GpgpuError::LengthMismatch {
                expected: self.len,
                actual,
            });
        }
        Ok(())
    }

    /// Read every texel back, row by row, widened to f32.
    pub fn readback(&self, device: &D) -> GpgpuResult<Vec<f32>> {
        let framebuffer = device.create_framebuffer(&self.texture);
        if !device.framebuffer_status(&framebuffer).is_complete() {
            return Err(GpgpuError::IncompleteFramebuffer);
        }

        device.read_pixels(&framebuffer)
    }

    pub fn texture(&self) -> &D::Texture {
        &self.texture
    }

    pub fn shape(&self) -> TextureShape {
        self.shape
    }

    /// Number of logical elements.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Always false: zero-length buffers are rejected with `EmptyBuffer`.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn format(&self) -> TexelFormat {
        self.format
    }
}
