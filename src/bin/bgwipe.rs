use std::path::PathBuf;
use std::process;

use clap::builder::BoolishValueParser;
use clap::{ArgAction, Args, Parser, Subcommand};

use bgwipe::composite::DEFAULT_FILL_COLOR;
use bgwipe::detection::DEFAULT_STRENGTH;
use bgwipe::refine::DEFAULT_EDGE_SHRINK;
use bgwipe::segment::{DEFAULT_ALPHA_THRESHOLD, DEFAULT_BG_THRESHOLD};
use bgwipe::video::DEFAULT_SAMPLE_FRAMES;
use bgwipe::{
    default_video_output_path, parse_fill_color, remove_background_batch, remove_watermark_batch,
    remove_watermark_video, BackgroundOptions, BatchJob, BatchResult, CompositeMode,
    SegmentParams, VideoMode, VideoOptions, DEFAULT_BACKGROUND_LIMIT, DEFAULT_WATERMARK_LIMIT,
};

#[derive(Parser)]
#[command(
    name = "bgwipe",
    about = "Remove flat backgrounds from sprite frames and border watermarks from images and video",
    version,
    after_help = "Logging honours RUST_LOG; otherwise --verbose/--quiet pick the level."
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Only log errors and skip the summary line
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Make the background of every image in a directory transparent (or filled)
    Bg(BgArgs),
    /// Inpaint border watermarks in every image in a directory
    Watermark(WatermarkArgs),
    /// Inpaint border watermarks in a video
    Video(VideoArgs),
}

#[derive(Args)]
struct BatchArgs {
    /// Source directory
    src: PathBuf,

    /// Destination directory (created if missing)
    dst: PathBuf,

    /// Maximum number of files to process
    #[arg(long)]
    limit: Option<usize>,

    /// Only process the top level of the source directory
    #[arg(long)]
    no_recursive: bool,
}

#[derive(Args)]
struct BgArgs {
    #[command(flatten)]
    batch: BatchArgs,

    /// Per-channel distance to the background colour still treated as background
    #[arg(long, env = "BG_THRESHOLD", default_value_t = DEFAULT_BG_THRESHOLD)]
    bg_threshold: u8,

    /// Foreground alpha below this becomes transparent
    #[arg(long, env = "ALPHA_THRESHOLD", default_value_t = DEFAULT_ALPHA_THRESHOLD)]
    alpha_threshold: u8,

    /// Erosion rounds applied to the background mask
    #[arg(long, default_value_t = DEFAULT_EDGE_SHRINK)]
    edge_shrink: u32,

    /// Paint the background with --fill-color instead of making it transparent
    #[arg(long)]
    opaque: bool,

    /// Make the background transparent; false behaves like --opaque
    #[arg(
        long,
        env = "USE_TRANSPARENT",
        value_name = "BOOL",
        default_value_t = true,
        action = ArgAction::Set,
        value_parser = BoolishValueParser::new()
    )]
    transparent: bool,

    /// Background colour used when the output is opaque (#rrggbb)
    #[arg(long, env = "BG_FILL_COLOR")]
    fill_color: Option<String>,
}

#[derive(Args)]
struct WatermarkArgs {
    #[command(flatten)]
    batch: BatchArgs,

    /// Mask closing radius; inpaint radius is 3 + strength
    #[arg(long, default_value_t = DEFAULT_STRENGTH)]
    strength: u32,
}

#[derive(Args)]
struct VideoArgs {
    /// Input video
    input: PathBuf,

    /// Output directory (default: next to the input)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Mask policy: auto, fixed or moving
    #[arg(long, default_value_t = VideoMode::Auto)]
    mode: VideoMode,

    /// Leading frames sampled to build the fixed mask
    #[arg(long, default_value_t = DEFAULT_SAMPLE_FRAMES)]
    sample: usize,

    /// Mask closing radius; inpaint radius is 3 + strength
    #[arg(long, default_value_t = DEFAULT_STRENGTH)]
    strength: u32,
}

fn init_logging(verbose: bool, quiet: bool) {
    let level = if verbose {
        log::LevelFilter::Debug
    } else if quiet {
        log::LevelFilter::Error
    } else {
        log::LevelFilter::Info
    };
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .format_timestamp(None)
        .init();
}

fn batch_job(args: &BatchArgs, default_limit: usize) -> BatchJob {
    let mut job = BatchJob::new(&args.src, &args.dst);
    job.limit = args.limit.unwrap_or(default_limit);
    job.recursive = !args.no_recursive;
    job
}

fn background_options(args: &BgArgs) -> BackgroundOptions {
    let mode = if args.opaque || !args.transparent {
        CompositeMode::Fill(
            args.fill_color
                .as_deref()
                .map_or(DEFAULT_FILL_COLOR, parse_fill_color),
        )
    } else {
        CompositeMode::Transparent
    };
    BackgroundOptions {
        segment: SegmentParams {
            bg_threshold: args.bg_threshold,
            alpha_threshold: args.alpha_threshold,
        },
        edge_shrink: args.edge_shrink,
        mode,
    }
}

fn run_bg(args: &BgArgs) -> BatchResult {
    let mut job = batch_job(&args.batch, DEFAULT_BACKGROUND_LIMIT);
    job.background = background_options(args);
    remove_background_batch(&job)
}

fn run_watermark(args: &WatermarkArgs) -> BatchResult {
    let mut job = batch_job(&args.batch, DEFAULT_WATERMARK_LIMIT);
    job.strength = args.strength;
    remove_watermark_batch(&job)
}

fn run_video(args: &VideoArgs) -> bool {
    if !args.input.is_file() {
        eprintln!("Error: Input video does not exist: {}", args.input.display());
        return false;
    }
    let out_dir = match &args.output {
        Some(dir) => dir.clone(),
        None => args
            .input
            .parent()
            .map(PathBuf::from)
            .unwrap_or_default(),
    };
    let output = default_video_output_path(&args.input, &out_dir);
    let options = VideoOptions {
        mode: args.mode,
        sample_frames: args.sample,
        strength: args.strength,
    };
    let outcome = remove_watermark_video(&args.input, &output, &options);
    if outcome.success {
        println!("{}", outcome.output.display());
    }
    outcome.success
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);

    let result = match &cli.command {
        Command::Bg(args) => run_bg(args),
        Command::Watermark(args) => run_watermark(args),
        Command::Video(args) => {
            if !run_video(args) {
                process::exit(1);
            }
            return;
        }
    };

    if !cli.quiet {
        eprintln!(
            "[Summary] Processed: {}, Failed: {} (Total: {})",
            result.succeeded,
            result.failed,
            result.attempted()
        );
    }
    if result.failed > 0 {
        process::exit(1);
    }
}
