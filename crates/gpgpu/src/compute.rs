//! One-shot kernel execution.
//!
//! [`compute`] performs exactly one encode, compile, dispatch and readback
//! cycle. Nothing is cached between calls: every call reallocates its
//! textures and recompiles its program. The call blocks until the result
//! is back in host memory.

use crate::buffer::GpuBuffer;
use crate::device::{ProgramInterface, RasterDevice};
use crate::dispatch::dispatch;
use crate::pipeline::compile;
use crate::shaders::{KernelAssembler, KernelSource};
use common::{GpgpuError, GpgpuResult};

/// Run `kernel` once per element of `output` and overwrite `output` with
/// the results.
///
/// `inputs[i]` is visible to the kernel as `data{i}`. The current contents
/// of `output` are not read; only its length matters. On any error `output`
/// is left untouched and every device resource created by the call has
/// been released.
///
/// Calls sharing a device must not overlap.
pub fn compute<D: RasterDevice>(
    device: &D,
    kernel: &KernelSource,
    inputs: &[&[f32]],
    output: &mut [f32],
) -> GpgpuResult<()> {
    tracing::debug!(
        "Running kernel `{}` with {} inputs into {} outputs",
        kernel.entry,
        inputs.len(),
        output.len()
    );

    let encoded = inputs
        .iter()
        .map(|data| GpuBuffer::encode(device, data))
        .collect::<GpgpuResult<Vec<_>>>()?;
    let destination = GpuBuffer::encode_zeroed(device, output.len())?;

    let source = KernelAssembler::new(inputs.len()).assemble(kernel)?;
    let interface = ProgramInterface {
        input_count: inputs.len(),
        target_format: destination.format(),
    };
    let program = compile(device, &source, &interface)?;

    let bound: Vec<&GpuBuffer<D>> = encoded.iter().collect();
    dispatch(device, &program, &bound, &destination)?;
    drop(program);

    let values = destination.readback(device)?;
    if values.len() < output.len() {
        return Err(GpgpuError::device(format!(
            "read back {} values for {} outputs",
            values.len(),
            output.len()
        )));
    }
    let len = output.len();
    output.copy_from_slice(&values[..len]);

    tracing::info!("Finished running: {}", kernel.entry);
    Ok(())
}
