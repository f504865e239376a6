//! fragcompute - run a WGSL kernel over JSON arrays on the GPU.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::Parser;
use tracing::{debug, info, Level};
use tracing_subscriber::FmtSubscriber;

use gpgpu::{compute, BackendSelection, ComputeConfig, GpuContext, KernelAssembler, KernelSource};

/// Run one kernel invocation per output element through a fragment shader
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// WGSL file defining the kernel function
    #[arg(long)]
    kernel: PathBuf,

    /// Name of the kernel function
    #[arg(long)]
    entry: String,

    /// JSON array of numbers; repeat for every input, in parameter order
    #[arg(long = "input")]
    inputs: Vec<PathBuf>,

    /// Number of output elements (defaults to the first input's length)
    #[arg(long)]
    output_len: Option<usize>,

    /// Graphics backend
    #[arg(long, default_value = "all")]
    backend: BackendSelection,

    /// Prefer a low-power adapter
    #[arg(long)]
    low_power: bool,

    /// Cap the texture size used to lay out buffers
    #[arg(long)]
    max_texture_dimension: Option<u32>,

    /// Print the assembled shader stages and exit
    #[arg(long)]
    print_source: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn read_input(path: &Path) -> Result<Vec<f32>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read input {}", path.display()))?;
    serde_json::from_str(&text)
        .with_context(|| format!("{} is not a JSON array of numbers", path.display()))
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Logs go to stderr so stdout stays valid JSON.
    let log_level = if args.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let body = std::fs::read_to_string(&args.kernel)
        .with_context(|| format!("failed to read kernel {}", args.kernel.display()))?;
    let kernel = KernelSource::new(body, args.entry.clone());

    if args.print_source {
        let program = KernelAssembler::new(args.inputs.len()).assemble(&kernel)?;
        println!("// vertex stage\n{}", program.vertex);
        println!("// fragment stage\n{}", program.fragment);
        return Ok(());
    }

    let inputs = args
        .inputs
        .iter()
        .map(|path| read_input(path))
        .collect::<Result<Vec<_>>>()?;

    let output_len = match (args.output_len, inputs.first()) {
        (Some(len), _) => len,
        (None, Some(first)) => first.len(),
        (None, None) => bail!("--output-len is required when there are no inputs"),
    };

    let mut config = ComputeConfig::new()
        .with_backend(args.backend)
        .with_low_power(args.low_power);
    if let Some(max) = args.max_texture_dimension {
        config = config.with_max_texture_dimension(max);
    }
    debug!("Config: {:?}", config);

    let context = GpuContext::from_config(&config).await?;
    info!("Adapter: {}", context.adapter_info().name);

    let input_refs: Vec<&[f32]> = inputs.iter().map(Vec::as_slice).collect();
    let mut output = vec![0.0f32; output_len];
    compute(&context, &kernel, &input_refs, &mut output)?;

    println!("{}", serde_json::to_string(&output)?);

    Ok(())
}
