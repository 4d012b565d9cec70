use crate::config::{Config, MapDocument, load_config, parse_map};
use crate::placement::PlacedLabel;
use crate::placement_dump::{PlacementDump, write_placement_dump};
use crate::render::{SvgLabelRenderer, place_labels, write_output_svg};
use crate::text_metrics::{ApproximateMetrics, FontMetrics, StringMetrics};
use anyhow::Result;
use clap::{Parser, ValueEnum};
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "mlp", version, about = "Map label placement: collision-free text and shield labels")]
pub struct Args {
    /// Input map file (.json/.json5) or '-' for stdin
    #[arg(short = 'i', long = "input")]
    pub input: Option<PathBuf>,

    /// Output file. Defaults to stdout for SVG and JSON if omitted.
    #[arg(short = 'o', long = "output")]
    pub output: Option<PathBuf>,

    /// Output format
    #[arg(short = 'e', long = "outputFormat", value_enum, default_value = "svg")]
    pub output_format: OutputFormat,

    /// Config JSON file (canvas, fonts)
    #[arg(short = 'c', long = "configFile")]
    pub config: Option<PathBuf>,

    /// Canvas width, overriding config and map
    #[arg(short = 'w', long = "width")]
    pub width: Option<f64>,

    /// Canvas height, overriding config and map
    #[arg(short = 'H', long = "height")]
    pub height: Option<f64>,

    /// Scale factor applied to sizes and spacings
    #[arg(short = 's', long = "scale")]
    pub scale: Option<f64>,

    /// Use approximate glyph widths instead of system fonts
    #[arg(long = "fastMetrics")]
    pub fast_metrics: bool,

    /// More log output (-v debug, -vv trace). RUST_LOG takes precedence.
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    pub verbose: u8,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Svg,
    Png,
    Json,
}

pub fn run() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);

    let mut config = load_config(args.config.as_deref())?;
    let input = read_input(args.input.as_deref())?;
    let mut map = parse_map(&input)?;
    config.merge_map(&map);
    apply_overrides(&mut config, &args);
    map.resolve_fonts(&config.fonts)?;
    tracing::debug!(
        layers = map.layers.len(),
        features = map.feature_count(),
        "map loaded"
    );

    let mut metrics = build_metrics(&config, args.fast_metrics);
    let mut renderer = SvgLabelRenderer::new(config.render.scale_factor);
    let labels = place_labels(&map, &config, metrics.as_mut(), &mut renderer)?;
    tracing::info!(placed = labels.len(), "labelling finished");

    match args.output_format {
        OutputFormat::Svg => {
            let svg = renderer.into_svg(&map, &config.render);
            write_output_svg(&svg, args.output.as_deref())?;
        }
        OutputFormat::Json => write_json(&labels, &config, args.output.as_deref())?,
        OutputFormat::Png => {
            let output = ensure_output(&args.output, "png")?;
            write_png(renderer, &map, &config, &output)?;
        }
    }
    Ok(())
}

fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    // A subscriber may already be installed when embedded.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();
}

fn apply_overrides(config: &mut Config, args: &Args) {
    if let Some(width) = args.width {
        config.render.width = width;
    }
    if let Some(height) = args.height {
        config.render.height = height;
    }
    if let Some(scale) = args.scale {
        config.render.scale_factor = scale;
    }
}

fn build_metrics(config: &Config, fast: bool) -> Box<dyn StringMetrics> {
    if fast || config.render.fast_text_metrics {
        return Box::new(ApproximateMetrics);
    }
    let fontsets = config.fonts.fontsets.clone();
    if config.fonts.font_dirs.is_empty() {
        return Box::new(FontMetrics::system(fontsets));
    }
    let mut db = fontdb::Database::new();
    db.load_system_fonts();
    for dir in &config.fonts.font_dirs {
        db.load_fonts_dir(dir);
    }
    Box::new(FontMetrics::with_database(db, fontsets))
}

fn write_json(labels: &[PlacedLabel], config: &Config, output: Option<&Path>) -> Result<()> {
    let (width, height) = (config.render.width, config.render.height);
    match output {
        Some(path) => write_placement_dump(path, labels, width, height)?,
        None => println!("{}", PlacementDump::from_labels(labels, width, height).to_json()?),
    }
    Ok(())
}

#[cfg(feature = "png")]
fn write_png(
    renderer: SvgLabelRenderer,
    map: &MapDocument,
    config: &Config,
    output: &Path,
) -> Result<()> {
    let svg = renderer.into_svg(map, &config.render);
    crate::render::write_output_png(&svg, output, &config.render)
}

#[cfg(not(feature = "png"))]
fn write_png(
    _renderer: SvgLabelRenderer,
    _map: &MapDocument,
    _config: &Config,
    _output: &Path,
) -> Result<()> {
    Err(anyhow::anyhow!("PNG output requires the 'png' feature"))
}

fn read_input(path: Option<&Path>) -> Result<String> {
    if let Some(path) = path
        && path != Path::new("-")
    {
        return Ok(std::fs::read_to_string(path)?);
    }
    let mut buf = String::new();
    io::stdin().read_to_string(&mut buf)?;
    Ok(buf)
}

fn ensure_output(output: &Option<PathBuf>, ext: &str) -> Result<PathBuf> {
    if let Some(path) = output {
        return Ok(path.clone());
    }
    Err(anyhow::anyhow!("Output path required for {} output", ext))
}
