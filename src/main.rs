use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

use boardscan::config::AppConfig;
use boardscan::detection::{DetectionPipeline, MarkerBoardDetector};
use boardscan::facade::{write_annotated, FullResult, ProcessingFacade};
use boardscan::source::{
    DriveSource, GoogleDriveClient, LocalSource, ServerSource, SourceAdapter, StaticToken, UploadedFile,
};

#[derive(Parser)]
#[command(name = "boardscan")]
#[command(about = "Detect calibration boards and decode QR payloads in image batches")]
struct Cli {
    /// TOML configuration file
    #[arg(short, long, env = "BOARDSCAN_CONFIG", value_name = "FILE")]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Batch index to process
    #[arg(long, global = true, default_value_t = 0)]
    index: usize,

    /// Process every image in the batch
    #[arg(long, global = true, conflicts_with = "index")]
    all: bool,

    /// Save annotated images under this directory
    #[arg(long, global = true, value_name = "DIR")]
    save_dir: Option<PathBuf>,

    /// Save intermediate board-detection images to directory (must be empty)
    #[arg(long, global = true, value_name = "DIR")]
    debug_out: Option<PathBuf>,

    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Process image files from local disk, in the given order
    Local {
        #[arg(value_name = "FILES", required = true)]
        files: Vec<PathBuf>,
    },
    /// Process every image under the server image directory
    Server {
        #[arg(long, env = "BOARDSCAN_SERVER_DIR", value_name = "DIR")]
        dir: Option<PathBuf>,
    },
    /// Process the images in a Google Drive folder
    Drive {
        /// Share link or bare folder id
        link: String,

        /// OAuth access token
        #[arg(long, env = "GOOGLE_DRIVE_TOKEN", hide_env_values = true)]
        token: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Cli::parse();

    let default_level = if args.verbose { "boardscan=debug" } else { "boardscan=info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .with_writer(std::io::stderr)
        .init();

    let config = match &args.config {
        Some(path) => AppConfig::from_file(path)?,
        None => AppConfig::default(),
    };
    debug!(?config, "Loaded configuration");

    let mut pipeline = DetectionPipeline::new(config.board.clone(), config.output);
    if let Some(dir) = &args.debug_out {
        let detector = MarkerBoardDetector::new(config.board.clone()).with_debug(dir.clone())?;
        pipeline = pipeline.with_board_detector(detector);
    }

    let source = build_source(&args.command, &config)?;
    let mut facade = ProcessingFacade::new(Arc::new(pipeline));
    let total = facade.select_source(source).await?;

    if total == 0 {
        println!("No images found.");
        return Ok(());
    }

    let indices: Vec<usize> = if args.all { (0..total).collect() } else { vec![args.index] };

    let mut failures = 0;
    for index in indices {
        let result = facade.open(index).await?;
        if !result.is_ok() {
            failures += 1;
        }

        if args.json {
            println!("{}", serde_json::to_string_pretty(&result.summary())?);
        } else {
            print_report(&result);
        }

        if let (Some(root), Ok(frame)) = (&args.save_dir, &result.outcome) {
            let path = write_annotated(root, &config.processed_subdir, &result.filename, frame).await?;
            if !args.json {
                println!("  Saved: {}", path.display());
            }
        }
    }

    if failures > 0 {
        warn!(failures, "Some images could not be processed");
    }

    Ok(())
}

fn build_source(command: &Command, config: &AppConfig) -> anyhow::Result<SourceAdapter> {
    let source = match command {
        Command::Local { files } => {
            let uploads = files
                .iter()
                .map(|path| {
                    let name = path
                        .file_name()
                        .map(|n| n.to_string_lossy().into_owned())
                        .unwrap_or_default();
                    UploadedFile::new(path, name)
                })
                .collect();
            SourceAdapter::from(LocalSource::new(uploads))
        }
        Command::Server { dir } => {
            let root = dir.clone().unwrap_or_else(|| config.server_images_dir.clone());
            SourceAdapter::from(ServerSource::new(root))
        }
        Command::Drive { link, token } => {
            let client = GoogleDriveClient::new(&config.drive, Arc::new(StaticToken::new(token.clone())))?;
            let mut source = DriveSource::from_link(Arc::new(client), link)?;
            if config.drive.cache_downloads {
                source = source
                    .with_download_cache()
                    .context("Failed to create Drive download cache")?;
            }
            SourceAdapter::from(source)
        }
    };
    Ok(source)
}

fn print_report(result: &FullResult) {
    println!(
        "\n=== [{}/{}] {} ({}) ===",
        result.current_index + 1,
        result.total_images,
        result.filename,
        result.source
    );

    match &result.outcome {
        Ok(frame) => {
            let board = match frame.detection.board_detected() {
                Some(true) => "detected",
                Some(false) => "not detected",
                None => "unknown",
            };
            println!("Board: {} ({} markers)", board, frame.detection.board_markers);

            if frame.detection.decoded_payloads.is_empty() {
                println!("No barcodes decoded.");
            } else {
                println!("Decoded barcodes: {}", frame.detection.decoded_payloads.len());
                for (raw, parsed) in frame
                    .detection
                    .decoded_payloads
                    .iter()
                    .zip(&frame.detection.parsed_payloads)
                {
                    match parsed {
                        Some(value) => println!("  {}", value),
                        None => println!("  {}", raw),
                    }
                }
            }
        }
        Err(e) => println!("Error: {}", e),
    }
}
