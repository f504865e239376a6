//! Full-screen quad dispatch of a linked kernel program.

use crate::buffer::GpuBuffer;
use crate::device::{DrawCall, RasterDevice, TextureUnit};
use crate::pipeline::KernelUniforms;
use crate::shaders::KernelAssembler;
use common::{GpgpuError, GpgpuResult};

/// Run `program` once per element of `output`.
///
/// Input `i` is bound to texture unit `i` and sampler `data{i}`. Every
/// output index is written exactly once, in no particular order, so the
/// kernel must be a pure function of its inputs and the index. The scratch
/// framebuffer and all bindings are released before returning.
pub fn dispatch<D: RasterDevice>(
    device: &D,
    program: &D::Program,
    inputs: &[&GpuBuffer<D>],
    output: &GpuBuffer<D>,
) -> GpgpuResult<()> {
    let framebuffer = device.create_framebuffer(output.texture());
    let status = device.framebuffer_status(&framebuffer);
    if !status.is_complete() {
        tracing::warn!("Kernel output framebuffer is not complete: {:?}", status);
        return Err(GpgpuError::IncompleteFramebuffer);
    }

    let units = inputs
        .iter()
        .enumerate()
        .map(|(index, buffer)| TextureUnit {
            unit: index as u32,
            sampler: KernelAssembler::sampler_name(index),
            texture: buffer.texture(),
        })
        .collect();

    let shape = output.shape();
    let call = DrawCall {
        program,
        framebuffer: &framebuffer,
        units,
        uniforms: KernelUniforms::new(shape.width),
        viewport: shape,
    };
    device.draw(&call)?;

    tracing::debug!(
        "Dispatched {} fragments over a {}x{} target with {} inputs",
        shape.area(),
        shape.width,
        shape.height,
        inputs.len()
    );
    Ok(())
}
