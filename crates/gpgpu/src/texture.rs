//! wgpu textures backing encoded buffers.

use crate::context::GpuContext;
use common::{TexelFormat, TextureShape};
use std::sync::Arc;
use wgpu::{
    AddressMode, Extent3d, FilterMode, Sampler, SamplerDescriptor, Texture, TextureDescriptor,
    TextureDimension, TextureFormat, TextureUsages, TextureView, TextureViewDescriptor,
};

/// wgpu format storing `format` texels.
pub fn wgpu_format(format: TexelFormat) -> TextureFormat {
    match format {
        TexelFormat::R32Float => TextureFormat::R32Float,
        TexelFormat::R16Float => TextureFormat::R16Float,
    }
}

/// A single-channel float texture that can be sampled and copied back to
/// the host, and rendered into where the adapter allows it.
pub struct GpuTexture {
    pub texture: Arc<Texture>,
    pub view: TextureView,
    pub shape: TextureShape,
    pub format: TexelFormat,
}

/// Usages requested for a buffer texture.
///
/// Every buffer may be sampled as a kernel input; only formats the adapter
/// can render into get `RENDER_ATTACHMENT`.
pub fn texture_usages(renderable: bool) -> TextureUsages {
    let usages = TextureUsages::TEXTURE_BINDING | TextureUsages::COPY_DST | TextureUsages::COPY_SRC;
    if renderable {
        usages | TextureUsages::RENDER_ATTACHMENT
    } else {
        usages
    }
}

impl GpuTexture {
    /// Create a texture and upload `texels` (`shape.area()` texels, row-major).
    pub fn new(context: &GpuContext, shape: TextureShape, format: TexelFormat, texels: &[u8]) -> Self {
        let texture = context.device.create_texture(&TextureDescriptor {
            label: Some("Kernel Buffer Texture"),
            size: extent(shape),
            mip_level_count: 1,
            sample_count: 1,
            dimension: TextureDimension::D2,
            format: wgpu_format(format),
            usage: texture_usages(context.renders_to(format)),
            view_formats: &[],
        });
        let view = texture.create_view(&TextureViewDescriptor::default());

        let texture = Self {
            texture: Arc::new(texture),
            view,
            shape,
            format,
        };
        texture.write(context, texels);
        texture
    }

    /// Replace the whole contents of the texture with `texels`.
    pub fn write(&self, context: &GpuContext, texels: &[u8]) {
        context.queue.write_texture(
            wgpu::ImageCopyTexture {
                texture: &self.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            texels,
            wgpu::ImageDataLayout {
                offset: 0,
                bytes_per_row: Some(self.shape.width * self.format.bytes_per_texel() as u32),
                rows_per_image: Some(self.shape.height),
            },
            extent(self.shape),
        );
    }
}

fn extent(shape: TextureShape) -> Extent3d {
    Extent3d {
        width: shape.width,
        height: shape.height,
        depth_or_array_layers: 1,
    }
}

/// A texture attached as the only color target of a render pass.
pub struct RenderTarget {
    pub texture: Arc<Texture>,
    pub view: TextureView,
    pub shape: TextureShape,
    pub format: TexelFormat,
}

impl RenderTarget {
    pub fn new(color: &GpuTexture) -> Self {
        Self {
            texture: color.texture.clone(),
            view: color.texture.create_view(&TextureViewDescriptor::default()),
            shape: color.shape,
            format: color.format,
        }
    }
}

/// Sampler every kernel input is read through.
///
/// Interpolating between cells would mix neighbouring elements, so only
/// nearest filtering is meaningful.
pub fn data_sampler(context: &GpuContext) -> Sampler {
    context.device.create_sampler(&SamplerDescriptor {
        label: Some("Kernel Data Sampler"),
        address_mode_u: AddressMode::ClampToEdge,
        address_mode_v: AddressMode::ClampToEdge,
        address_mode_w: AddressMode::ClampToEdge,
        mag_filter: FilterMode::Nearest,
        min_filter: FilterMode::Nearest,
        mipmap_filter: FilterMode::Nearest,
        lod_min_clamp: 0.0,
        lod_max_clamp: 0.0,
        compare: None,
        anisotropy_clamp: 1,
        border_color: None,
    })
}
