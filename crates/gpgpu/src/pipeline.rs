//! Program compilation and the fixed vertex data every kernel draws with.

use crate::device::{ProgramInterface, RasterDevice};
use crate::shaders::ProgramSource;
use common::{GpgpuError, GpgpuResult, ShaderStage};

/// Compile both stages of `source` and link them for `interface`.
///
/// Shader objects are dropped before returning, on success and on every
/// failure path.
pub fn compile<D: RasterDevice>(
    device: &D,
    source: &ProgramSource,
    interface: &ProgramInterface,
) -> GpgpuResult<D::Program> {
    let vertex = compile_stage(device, ShaderStage::Vertex, source.vertex)?;
    let fragment = compile_stage(device, ShaderStage::Fragment, &source.fragment)?;

    device
        .link_program(&vertex, &fragment, interface)
        .map_err(|log| {
            tracing::error!("Unable to link kernel program: {}", log);
            GpgpuError::link(log)
        })
}

fn compile_stage<D: RasterDevice>(
    device: &D,
    stage: ShaderStage,
    source: &str,
) -> GpgpuResult<D::Shader> {
    device.compile_shader(stage, source).map_err(|log| {
        tracing::error!("Error compiling {} shader: {}", stage, log);
        tracing::debug!("{} shader source:\n{}", stage, source);
        GpgpuError::compile(stage, log)
    })
}

/// Vertex of the full-screen quad.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct QuadVertex {
    pub position: [f32; 2],
    pub uv: [f32; 2],
}

impl QuadVertex {
    pub fn layout() -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<QuadVertex>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &[
                wgpu::VertexAttribute {
                    offset: 0,
                    shader_location: 0,
                    format: wgpu::VertexFormat::Float32x2,
                },
                wgpu::VertexAttribute {
                    offset: std::mem::size_of::<[f32; 2]>() as wgpu::BufferAddress,
                    shader_location: 1,
                    format: wgpu::VertexFormat::Float32x2,
                },
            ],
        }
    }
}

/// Two triangles covering clip space, drawn as a 4-vertex strip.
pub const FULL_SCREEN_QUAD: [QuadVertex; 4] = [
    QuadVertex { position: [-1.0, 1.0], uv: [0.0, 1.0] },
    QuadVertex { position: [-1.0, -1.0], uv: [0.0, 0.0] },
    QuadVertex { position: [1.0, 1.0], uv: [1.0, 1.0] },
    QuadVertex { position: [1.0, -1.0], uv: [1.0, 0.0] },
];

/// Uniform block of the generated fragment stage.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct KernelUniforms {
    /// Width of the output texture, in texels.
    pub w: i32,
    _padding: [i32; 3],
}

impl KernelUniforms {
    pub fn new(output_width: u32) -> Self {
        Self {
            w: output_width as i32,
            _padding: [0; 3],
        }
    }
}
