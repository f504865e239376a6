//! WGSL program assembly for fragment-stage kernels.
//!
//! A kernel is a plain WGSL function. The assembler wraps it in a fixed
//! pass-through vertex stage and a generated fragment stage:
//!
//! ```text
//! preamble(inputs)   uniform block, sampler, data0..dataN, read()
//! kernel body        user code defining `entry`
//! epilogue(entry)    fs_main: fragment position -> linear index -> entry()
//! ```

use common::{GpgpuError, GpgpuResult};
use serde::{Deserialize, Serialize};

/// Binding of the kernel uniform block.
pub const UNIFORM_BINDING: u32 = 0;
/// Binding of the nearest, clamp-to-edge sampler shared by all inputs.
pub const SAMPLER_BINDING: u32 = 1;
/// Binding of `data0`; input `i` lives at `FIRST_TEXTURE_BINDING + i`.
pub const FIRST_TEXTURE_BINDING: u32 = 2;

pub const VERTEX_ENTRY: &str = "vs_main";
pub const FRAGMENT_ENTRY: &str = "fs_main";

/// Pass-through vertex stage for the full-screen quad.
pub const VERTEX_SHADER: &str = r#"
struct VertexOutput {
    @builtin(position) position: vec4<f32>,
    @location(0) uv: vec2<f32>,
}

@vertex
fn vs_main(@location(0) in_position: vec2<f32>, @location(1) in_uv: vec2<f32>) -> VertexOutput {
    var output: VertexOutput;
    output.position = vec4<f32>(in_position, 0.0, 1.0);
    output.uv = in_uv;
    return output;
}
"#;

const PREAMBLE_HEADER: &str = r#"
struct KernelUniforms {
    w: i32,
}

@group(0) @binding(0)
var<uniform> uniforms: KernelUniforms;

@group(0) @binding(1)
var data_sampler: sampler;
"#;

// Each input keeps its own shape, so the index is resolved against the
// dimensions of the texture being read.
const READ_HELPER: &str = r#"
fn read(data: texture_2d<f32>, idx: i32) -> f32 {
    let size = vec2<i32>(textureDimensions(data));
    let x = (f32(idx % size.x) + 0.5) / f32(size.x);
    let y = (f32(idx / size.x) + 0.5) / f32(size.y);
    return textureSampleLevel(data, data_sampler, vec2<f32>(x, y), 0.0).r;
}
"#;

/// Names the generated stages already define.
const GENERATED_NAMES: &[&str] = &[
    "KernelUniforms",
    "VertexOutput",
    "data_sampler",
    "fs_main",
    "read",
    "uniforms",
    "vs_main",
];

const WGSL_KEYWORDS: &[&str] = &[
    "alias", "array", "atomic", "bitcast", "bool", "break", "case", "const", "const_assert",
    "continue", "continuing", "default", "diagnostic", "discard", "else", "enable", "f16", "f32",
    "false", "fn", "for", "i32", "if", "let", "loop", "mat2x2", "mat3x3", "mat4x4", "override",
    "ptr", "requires", "return", "sampler", "struct", "switch", "true", "u32", "var", "vec2",
    "vec3", "vec4", "while",
];

/// A user kernel: WGSL source plus the name of its per-element function.
///
/// The function must have the signature
/// `fn entry(data0: texture_2d<f32>, ..., idx: i32) -> f32`
/// with one texture parameter per input buffer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct KernelSource {
    pub body: String,
    pub entry: String,
}

impl KernelSource {
    pub fn new(body: impl Into<String>, entry: impl Into<String>) -> Self {
        Self {
            body: body.into(),
            entry: entry.into(),
        }
    }
}

/// Vertex and fragment sources of one assembled program.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProgramSource {
    pub vertex: &'static str,
    pub fragment: String,
}

/// Builds the fragment stage around a kernel for a fixed input count.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct KernelAssembler {
    input_count: usize,
}

impl KernelAssembler {
    pub fn new(input_count: usize) -> Self {
        Self { input_count }
    }

    pub fn input_count(&self) -> usize {
        self.input_count
    }

    /// Name of the texture uniform for input `index`.
    pub fn sampler_name(index: usize) -> String {
        format!("data{index}")
    }

    /// Uniform block, sampler, one texture per input and the `read` helper.
    pub fn preamble(&self) -> String {
        let mut source = String::from(PREAMBLE_HEADER);
        for index in 0..self.input_count {
            source.push_str(&format!(
                "\n@group(0) @binding({})\nvar {}: texture_2d<f32>;\n",
                FIRST_TEXTURE_BINDING as usize + index,
                Self::sampler_name(index),
            ));
        }
        source.push_str(READ_HELPER);
        source
    }

    /// Fragment entry point mapping the fragment position to a linear
    /// index and calling `entry` with every input.
    pub fn epilogue(&self, entry: &str) -> String {
        let mut args: Vec<String> = (0..self.input_count).map(Self::sampler_name).collect();
        args.push("idx".to_string());

        format!(
            r#"
@fragment
fn fs_main(@builtin(position) frag_coord: vec4<f32>) -> @location(0) vec4<f32> {{
    let idx = i32(frag_coord.y - 0.5) * uniforms.w + i32(frag_coord.x - 0.5);
    return vec4<f32>({entry}({args}), 0.0, 0.0, 1.0);
}}
"#,
            args = args.join(", "),
        )
    }

    /// Assemble the full program for `kernel`.
    ///
    /// Only the entry name is checked here; whether the body actually
    /// defines it is left to the shader compiler.
    pub fn assemble(&self, kernel: &KernelSource) -> GpgpuResult<ProgramSource> {
        validate_entry(&kernel.entry)?;

        let preamble = self.preamble();
        let epilogue = self.epilogue(&kernel.entry);
        let mut fragment =
            String::with_capacity(preamble.len() + kernel.body.len() + epilogue.len() + 2);
        fragment.push_str(&preamble);
        fragment.push('\n');
        fragment.push_str(&kernel.body);
        fragment.push('\n');
        fragment.push_str(&epilogue);

        Ok(ProgramSource {
            vertex: VERTEX_SHADER,
            fragment,
        })
    }
}

fn validate_entry(entry: &str) -> GpgpuResult<()> {
    let mut chars = entry.chars();
    let starts_well = matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_');
    if !starts_well
        || entry == "_"
        || entry.starts_with("__")
        || !entry.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
    {
        return Err(GpgpuError::invalid_kernel(format!(
            "`{entry}` is not a valid entry point name"
        )));
    }

    let is_data_name = entry
        .strip_prefix("data")
        .is_some_and(|rest| !rest.is_empty() && rest.chars().all(|c| c.is_ascii_digit()));
    if GENERATED_NAMES.contains(&entry) || is_data_name {
        return Err(GpgpuError::invalid_kernel(format!(
            "`{entry}` collides with a generated name"
        )));
    }

    if WGSL_KEYWORDS.contains(&entry) {
        return Err(GpgpuError::invalid_kernel(format!(
            "`{entry}` is a reserved word"
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const ADD: &str = r#"
fn add(a: texture_2d<f32>, b: texture_2d<f32>, idx: i32) -> f32 {
    return read(a, idx) + read(b, idx);
}
"#;

    #[test]
    fn test_preamble_declares_each_input() {
        let preamble = KernelAssembler::new(3).preamble();
        assert!(preamble.contains("@group(0) @binding(2)\nvar data0: texture_2d<f32>;"));
        assert!(preamble.contains("@group(0) @binding(3)\nvar data1: texture_2d<f32>;"));
        assert!(preamble.contains("@group(0) @binding(4)\nvar data2: texture_2d<f32>;"));
        assert!(!preamble.contains("data3"));
        assert!(preamble.contains("fn read(data: texture_2d<f32>, idx: i32) -> f32"));
    }

    #[test]
    fn test_epilogue_calls_entry_with_all_inputs() {
        let epilogue = KernelAssembler::new(2).epilogue("add");
        assert!(epilogue.contains("add(data0, data1, idx)"));
        assert!(epilogue.contains("uniforms.w"));

        let epilogue = KernelAssembler::new(0).epilogue("iota");
        assert!(epilogue.contains("iota(idx)"));
    }

    #[test]
    fn test_assemble_orders_sections() {
        let program = KernelAssembler::new(2)
            .assemble(&KernelSource::new(ADD, "add"))
            .unwrap();

        let fragment = &program.fragment;
        let helper = fragment.find("fn read(").unwrap();
        let body = fragment.find("fn add(").unwrap();
        let main = fragment.find("fn fs_main(").unwrap();
        assert!(helper < body && body < main);
        assert_eq!(program.vertex, VERTEX_SHADER);
    }

    #[test]
    fn test_missing_entry_is_not_checked() {
        // Surfaces later as a compile error.
        let program = KernelAssembler::new(1).assemble(&KernelSource::new("", "missing"));
        assert!(program.is_ok());
    }

    #[test]
    fn test_rejects_bad_entry_names() {
        let assembler = KernelAssembler::new(1);
        for entry in ["", "1st", "has space", "add()", "__hidden", "_", "fs_main", "read", "data0", "fn", "f32"] {
            let result = assembler.assemble(&KernelSource::new(ADD, entry));
            assert!(
                matches!(result, Err(GpgpuError::InvalidKernel(_))),
                "`{entry}` accepted"
            );
        }
    }

    #[test]
    fn test_accepts_ordinary_names() {
        let assembler = KernelAssembler::new(1);
        for entry in ["add", "_scale", "kernel2", "data", "dataset", "readout"] {
            assert!(assembler.assemble(&KernelSource::new(ADD, entry)).is_ok(), "{entry}");
        }
    }

    #[test]
    fn test_kernel_source_from_json() {
        let kernel: KernelSource =
            serde_json::from_str(r#"{"body": "fn k(idx: i32) -> f32 { return 1.0; }", "entry": "k"}"#)
                .unwrap();
        assert_eq!(kernel.entry, "k");
    }
}
