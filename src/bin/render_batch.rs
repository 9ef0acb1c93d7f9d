//! Headless batch renderer: STEP files in, `rendered_results.zip` out.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use step_render::{
    BatchConfig, BatchOrchestrator, FailurePolicy, FileOutcome, LogProgress, RenderSettings,
    SoftwareBackend, Upload,
};

#[derive(Parser, Debug)]
#[command(version, about = "Render STEP files from a sphere of viewpoints into a zip of PNGs")]
struct Args {
    /// STEP files to render (.step / .stp)
    #[arg(required = true)]
    files: Vec<PathBuf>,

    /// Image width in pixels (100-3840)
    #[arg(long)]
    width: Option<u32>,

    /// Image height in pixels (100-2160)
    #[arg(long)]
    height: Option<u32>,

    /// Angle between views in degrees
    #[arg(long)]
    step: Option<u32>,

    /// Directory for rendered_results.zip
    #[arg(short, long)]
    out_dir: Option<PathBuf>,

    /// Settings file (defaults to $STEP_RENDER_CONFIG or ./step-render.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Keep going when a file fails and archive what rendered
    #[arg(long)]
    skip_failed: bool,

    /// Tessellation density factor (smaller = finer mesh)
    #[arg(long)]
    tessellation: Option<f64>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let mut settings = match &args.config {
        Some(path) => RenderSettings::from_file(path),
        None => RenderSettings::load(),
    }
    .context("Failed to load settings")?;

    if let Some(width) = args.width {
        settings.width = width;
    }
    if let Some(height) = args.height {
        settings.height = height;
    }
    if let Some(step) = args.step {
        settings.view_step = step;
    }
    if let Some(dir) = args.out_dir {
        settings.output_dir = dir;
    }
    if let Some(factor) = args.tessellation {
        settings.tessellation_factor = factor;
    }
    if args.skip_failed {
        settings.on_failure = FailurePolicy::Skip;
    }

    let uploads = args
        .files
        .iter()
        .map(|path| Upload::from_path(path))
        .collect::<Result<Vec<_>, _>>()
        .context("Failed to read input files")?;

    std::fs::create_dir_all(&settings.output_dir).with_context(|| {
        format!("Failed to create output directory {}", settings.output_dir.display())
    })?;

    let config = BatchConfig::from_settings(&settings)?;
    let orchestrator = BatchOrchestrator::new(SoftwareBackend::from_settings(&settings), config);
    let mut progress = LogProgress::new("Rendering");
    let report = orchestrator
        .run(&uploads, Some(&mut progress))
        .context("Batch failed")?;

    for file in &report.files {
        match &file.outcome {
            FileOutcome::Rendered { images } => {
                log::info!("{}: {} images in {}/", file.name, images, file.folder)
            }
            FileOutcome::Skipped { error } => log::warn!("{}: skipped ({error})", file.name),
        }
    }
    println!("{}", report.archive.display());
    Ok(())
}
