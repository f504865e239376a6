//! Software raster device for unit tests.
//!
//! Executes "kernels" registered as Rust closures, one call per fragment,
//! using the same fragment-to-index and index-to-texel mapping as the
//! generated WGSL. Shader compilation is a shallow check: balanced braces
//! and a definition for the function the epilogue calls.

use crate::device::{DrawCall, FramebufferStatus, ProgramInterface, RasterDevice};
use common::{GpgpuError, GpgpuResult, ShaderStage, TexelFormat, TextureShape};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

type KernelFn = Box<dyn Fn(&Inputs<'_>, i32) -> f32>;

#[derive(Default)]
struct Counters {
    live: usize,
    draws: usize,
    reads: usize,
}

struct LiveToken(Arc<Mutex<Counters>>);

impl LiveToken {
    fn new(counters: &Arc<Mutex<Counters>>) -> Self {
        counters.lock().live += 1;
        Self(counters.clone())
    }
}

impl Drop for LiveToken {
    fn drop(&mut self) {
        self.0.lock().live -= 1;
    }
}

pub struct SoftwareTexture {
    shape: TextureShape,
    format: TexelFormat,
    texels: Arc<Mutex<Vec<f32>>>,
    renderable: bool,
    _live: LiveToken,
}

pub struct SoftwareShader {
    stage: ShaderStage,
    source: String,
    _live: LiveToken,
}

pub struct SoftwareProgram {
    entry: String,
    input_count: usize,
    _live: LiveToken,
}

pub struct SoftwareFramebuffer {
    shape: TextureShape,
    texels: Arc<Mutex<Vec<f32>>>,
    renderable: bool,
    _live: LiveToken,
}

/// Input textures visible to a software kernel.
pub struct Inputs<'a> {
    textures: Vec<(TextureShape, &'a [f32])>,
}

impl Inputs<'_> {
    /// Sample input `input` at linear index `idx` the way `read()` does.
    pub fn read(&self, input: usize, idx: i32) -> f32 {
        let (shape, texels) = &self.textures[input];
        let (u, v) = shape.texel_center(idx.max(0) as usize);
        texels[shape.index_at(u, v)]
    }
}

pub struct SoftwareDevice {
    max_dimension: u32,
    max_texture_units: usize,
    unrenderable: Vec<TexelFormat>,
    kernels: HashMap<String, KernelFn>,
    counters: Arc<Mutex<Counters>>,
}

impl SoftwareDevice {
    pub fn new(max_dimension: u32) -> Self {
        Self {
            max_dimension,
            max_texture_units: 16,
            unrenderable: Vec::new(),
            kernels: HashMap::new(),
            counters: Arc::new(Mutex::new(Counters::default())),
        }
    }

    pub fn with_max_texture_units(mut self, units: usize) -> Self {
        self.max_texture_units = units;
        self
    }

    /// Textures of `format` can be sampled but not rendered into.
    pub fn without_render_format(mut self, format: TexelFormat) -> Self {
        self.unrenderable.push(format);
        self
    }

    /// Register the host behaviour of the WGSL function named `entry`.
    pub fn with_kernel<F>(mut self, entry: &str, kernel: F) -> Self
    where
        F: Fn(&Inputs<'_>, i32) -> f32 + 'static,
    {
        self.kernels.insert(entry.to_string(), Box::new(kernel));
        self
    }

    /// Textures, shaders, programs and framebuffers currently alive.
    pub fn live_resources(&self) -> usize {
        self.counters.lock().live
    }

    pub fn draw_count(&self) -> usize {
        self.counters.lock().draws
    }

    pub fn read_count(&self) -> usize {
        self.counters.lock().reads
    }
}

/// Name of the function the generated epilogue calls.
fn called_entry(fragment: &str) -> Option<&str> {
    let start = fragment.find("return vec4<f32>(")? + "return vec4<f32>(".len();
    let rest = &fragment[start..];
    rest.find('(').map(|end| &rest[..end])
}

impl RasterDevice for SoftwareDevice {
    type Texture = SoftwareTexture;
    type Shader = SoftwareShader;
    type Program = SoftwareProgram;
    type Framebuffer = SoftwareFramebuffer;

    fn max_texture_dimension(&self) -> u32 {
        self.max_dimension
    }

    fn create_texture(
        &self,
        shape: TextureShape,
        format: TexelFormat,
        texels: &[u8],
    ) -> GpgpuResult<SoftwareTexture> {
        if !shape.fits_within(self.max_dimension) || shape.area() == 0 {
            return Err(GpgpuError::device(format!("invalid texture size {shape:?}")));
        }
        if texels.len() != shape.area() * format.bytes_per_texel() {
            return Err(GpgpuError::device("texel data does not match texture size"));
        }

        Ok(SoftwareTexture {
            shape,
            format,
            texels: Arc::new(Mutex::new(format.decode(texels))),
            renderable: !self.unrenderable.contains(&format),
            _live: LiveToken::new(&self.counters),
        })
    }

    fn write_texture(&self, texture: &SoftwareTexture, texels: &[u8]) -> GpgpuResult<()> {
        if texels.len() != texture.shape.area() * texture.format.bytes_per_texel() {
            return Err(GpgpuError::device("texel data does not match texture size"));
        }
        *texture.texels.lock() = texture.format.decode(texels);
        Ok(())
    }

    fn compile_shader(&self, stage: ShaderStage, source: &str) -> Result<SoftwareShader, String> {
        let opened = source.matches('{').count();
        let closed = source.matches('}').count();
        if opened != closed {
            return Err(format!(
                "expected `}}`: {opened} braces opened, {closed} closed"
            ));
        }

        if stage == ShaderStage::Fragment {
            let entry = called_entry(source).ok_or("fragment stage has no output")?;
            if !source.contains(&format!("fn {entry}(")) {
                return Err(format!("no definition in scope for identifier: `{entry}`"));
            }
        }

        Ok(SoftwareShader {
            stage,
            source: source.to_string(),
            _live: LiveToken::new(&self.counters),
        })
    }

    fn link_program(
        &self,
        vertex: &SoftwareShader,
        fragment: &SoftwareShader,
        interface: &ProgramInterface,
    ) -> Result<SoftwareProgram, String> {
        if vertex.stage != ShaderStage::Vertex || fragment.stage != ShaderStage::Fragment {
            return Err("stages attached in the wrong slots".to_string());
        }
        if interface.input_count > self.max_texture_units {
            return Err(format!(
                "{} samplers exceed the {} available texture units",
                interface.input_count, self.max_texture_units
            ));
        }

        let entry = called_entry(&fragment.source)
            .ok_or("fragment stage has no output")?
            .to_string();
        Ok(SoftwareProgram {
            entry,
            input_count: interface.input_count,
            _live: LiveToken::new(&self.counters),
        })
    }

    fn create_framebuffer(&self, color: &SoftwareTexture) -> SoftwareFramebuffer {
        SoftwareFramebuffer {
            shape: color.shape,
            texels: color.texels.clone(),
            renderable: color.renderable,
            _live: LiveToken::new(&self.counters),
        }
    }

    fn framebuffer_status(&self, framebuffer: &SoftwareFramebuffer) -> FramebufferStatus {
        if framebuffer.renderable {
            FramebufferStatus::Complete
        } else {
            FramebufferStatus::Unsupported
        }
    }

    fn draw(&self, call: &DrawCall<'_, Self>) -> GpgpuResult<()> {
        let kernel = self
            .kernels
            .get(&call.program.entry)
            .ok_or_else(|| GpgpuError::device(format!("no software kernel `{}`", call.program.entry)))?;
        if call.units.len() != call.program.input_count {
            return Err(GpgpuError::device("texture units do not match the program"));
        }
        if call.viewport != call.framebuffer.shape || call.uniforms.w != call.viewport.width as i32 {
            return Err(GpgpuError::device("viewport does not cover the framebuffer"));
        }

        let mut units: Vec<_> = call.units.iter().collect();
        units.sort_by_key(|unit| unit.unit);
        let snapshots: Vec<(TextureShape, Vec<f32>)> = units
            .iter()
            .map(|unit| (unit.texture.shape, unit.texture.texels.lock().clone()))
            .collect();
        let inputs = Inputs {
            textures: snapshots
                .iter()
                .map(|(shape, texels)| (*shape, texels.as_slice()))
                .collect(),
        };

        let shape = call.viewport;
        let mut target = call.framebuffer.texels.lock();
        for y in 0..shape.height {
            for x in 0..shape.width {
                let idx = shape.fragment_index(x as f32 + 0.5, y as f32 + 0.5);
                target[y as usize * shape.width as usize + x as usize] = kernel(&inputs, idx as i32);
            }
        }

        self.counters.lock().draws += 1;
        Ok(())
    }

    fn read_pixels(&self, framebuffer: &SoftwareFramebuffer) -> GpgpuResult<Vec<f32>> {
        self.counters.lock().reads += 1;
        Ok(framebuffer.texels.lock().clone())
    }
}
