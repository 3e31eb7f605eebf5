use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use starstreak::batch::{run_batch, BatchConfig};
use starstreak::convert::convert_directory;
use starstreak::padding::pad_directory;
use starstreak::tiling::{run_patching, run_tiling, PatchConfig, TileConfig};
use starstreak::{DetectionParams, DetectionPipeline, ObjectType, OutputLayout};

#[derive(Parser)]
#[command(name = "starstreak")]
#[command(about = "Build a star/streak dataset from raw astronomical frames")]
struct Cli {
    /// Enable verbose (debug level) logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Detect, classify and crop objects in every image of a directory
    Detect(DetectArgs),
    /// Slice frames into tiles and re-project annotation boxes
    Tile(TileArgs),
    /// Zero-pad frames to a multiple of the patch size and split them into patches
    Patch(PatchArgs),
    /// Centre images on a fixed-size black canvas
    Pad(PadArgs),
    /// Re-encode TIFF frames as PNG
    Convert(ConvertArgs),
}

#[derive(Args)]
struct DetectArgs {
    /// Directory of raw frames
    #[arg(value_name = "INPUT_DIR")]
    input_dir: PathBuf,

    /// Root directory for crops and tables
    #[arg(short, long, value_name = "DIR", default_value = ".")]
    output: PathBuf,

    /// Also write a bounding-box table for the tiler
    #[arg(long, value_name = "CSV")]
    annotations: Option<PathBuf>,

    /// Crop image format extension
    #[arg(long, default_value = "png")]
    crop_ext: String,

    /// Minimum region area in pixels
    #[arg(long, default_value_t = 50)]
    min_area: u32,

    /// Eccentricity at or above which a region is a streak
    #[arg(long, default_value_t = 0.85)]
    eccentricity_threshold: f64,

    /// Minimum centroid distance between accepted regions
    #[arg(long, default_value_t = 10.0)]
    min_distance: f64,

    /// Binarisation threshold after equalisation (0-255)
    #[arg(long, default_value_t = 10)]
    threshold: u8,

    /// CLAHE clip limit
    #[arg(long, default_value_t = 2.0)]
    clip_limit: f32,

    /// CLAHE tile grid size
    #[arg(long, default_value_t = 8)]
    grid: u32,

    /// Number of worker threads
    #[arg(short, long, default_value_t = 1)]
    jobs: usize,

    /// Save intermediate images to directory (must be empty)
    #[arg(long, value_name = "DIR")]
    debug_out: Option<PathBuf>,
}

#[derive(Args)]
struct TileArgs {
    /// Directory holding the full frames
    #[arg(value_name = "INPUT_DIR")]
    input_dir: PathBuf,

    /// Annotation table with bbox_x/bbox_y/bbox_width/bbox_height columns
    #[arg(long, value_name = "CSV")]
    annotations: PathBuf,

    #[arg(long, default_value_t = 128)]
    tile_size: u32,

    /// Defaults to the tile size
    #[arg(long)]
    stride: Option<u32>,

    /// Suffix added to the frame stem when locating the source file (e.g. "_binary")
    #[arg(long, default_value = "")]
    image_suffix: String,

    /// Tile image format extension
    #[arg(long, default_value = "tiff")]
    tile_ext: String,

    /// Output directory for tiles (default: TiledImages_<size>)
    #[arg(short, long, value_name = "DIR")]
    output: Option<PathBuf>,

    /// Output annotation table (default: tiled_annotations_<size>.csv)
    #[arg(long, value_name = "CSV")]
    output_csv: Option<PathBuf>,
}

#[derive(Args)]
struct PatchArgs {
    #[arg(value_name = "INPUT_DIR")]
    input_dir: PathBuf,

    /// Output directory; each frame gets its own subdirectory
    #[arg(short, long, value_name = "DIR", default_value = "patches")]
    output: PathBuf,

    #[arg(long, default_value_t = 64)]
    patch_size: u32,

    /// Patch image format extension
    #[arg(long, default_value = "tiff")]
    patch_ext: String,
}

#[derive(Args)]
struct ConvertArgs {
    #[arg(value_name = "INPUT_DIR")]
    input_dir: PathBuf,

    #[arg(short, long, value_name = "DIR")]
    output: PathBuf,
}

#[derive(Args)]
struct PadArgs {
    #[arg(value_name = "INPUT_DIR")]
    input_dir: PathBuf,

    /// Output directory (defaults to padding in place)
    #[arg(short, long, value_name = "DIR")]
    output: Option<PathBuf>,

    #[arg(long, default_value_t = 128)]
    width: u32,

    #[arg(long, default_value_t = 128)]
    height: u32,
}

fn main() -> anyhow::Result<()> {
    let args = Cli::parse();

    let level = if args.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    match args.command {
        Command::Detect(detect) => run_detect(detect),
        Command::Tile(tile) => run_tile(tile),
        Command::Patch(patch) => run_patch(patch),
        Command::Pad(pad) => run_pad(pad),
        Command::Convert(convert) => run_convert(convert),
    }
}

fn run_detect(args: DetectArgs) -> anyhow::Result<()> {
    let params = DetectionParams {
        min_area: args.min_area,
        eccentricity_threshold: args.eccentricity_threshold,
        min_centroid_distance: args.min_distance,
        binary_threshold: args.threshold,
        clahe_grid: args.grid,
        clahe_clip_limit: args.clip_limit,
        ..DetectionParams::default()
    };

    let mut pipeline = DetectionPipeline::new(params);
    if let Some(debug_dir) = args.debug_out {
        pipeline = pipeline.with_debug(debug_dir)?;
    }

    let mut layout = OutputLayout::under(&args.output).with_extension(args.crop_ext);
    if let Some(path) = args.annotations {
        layout = layout.with_annotations(path);
    }

    let config = BatchConfig {
        input_dir: args.input_dir,
        layout,
        jobs: args.jobs,
    };
    let report = run_batch(&config, &pipeline)?;

    println!("\n=== Detection Results ===");
    println!("Images processed: {}", report.processed());
    println!("Stars:   {}", report.results.total(ObjectType::Star));
    println!("Streaks: {}", report.results.total(ObjectType::Streak));
    if !report.skipped.is_empty() {
        println!("Skipped {} unreadable file(s):", report.skipped.len());
        for (path, reason) in &report.skipped {
            println!("  {}: {}", path.display(), reason);
        }
    }

    Ok(())
}

fn run_tile(args: TileArgs) -> anyhow::Result<()> {
    let config = TileConfig {
        input_dir: args.input_dir,
        annotations_csv: args.annotations,
        output_dir: args
            .output
            .unwrap_or_else(|| PathBuf::from(format!("TiledImages_{}", args.tile_size))),
        output_csv: args
            .output_csv
            .unwrap_or_else(|| PathBuf::from(format!("tiled_annotations_{}.csv", args.tile_size))),
        tile_size: args.tile_size,
        stride: args.stride.unwrap_or(args.tile_size),
        image_suffix: args.image_suffix,
        extension: args.tile_ext,
    };
    let report = run_tiling(&config)?;

    println!(
        "Done. {} tiles saved to {}, {} annotations to {}",
        report.tiles_written,
        config.output_dir.display(),
        report.annotations.len(),
        config.output_csv.display()
    );
    Ok(())
}

fn run_pad(args: PadArgs) -> anyhow::Result<()> {
    let output = args.output.unwrap_or_else(|| args.input_dir.clone());
    let report = pad_directory(&args.input_dir, &output, args.width, args.height)?;
    println!("Padded {} images into {}", report.padded.len(), output.display());
    Ok(())
}

fn run_patch(args: PatchArgs) -> anyhow::Result<()> {
    let config = PatchConfig {
        input_dir: args.input_dir,
        output_dir: args.output,
        patch_size: args.patch_size,
        extension: args.patch_ext,
    };
    let report = run_patching(&config)?;
    println!(
        "Saved {} patches from {} images into {}",
        report.patches_written,
        report.images,
        config.output_dir.display()
    );
    Ok(())
}

fn run_convert(args: ConvertArgs) -> anyhow::Result<()> {
    let report = convert_directory(&args.input_dir, &args.output)?;
    println!("Converted {} images into {}", report.converted.len(), args.output.display());
    if !report.skipped.is_empty() {
        println!("Failed to convert {} file(s)", report.skipped.len());
    }
    Ok(())
}
