use std::process;

use clap::Parser;
use m3u8_mirror::{cli::Args, error::AppError, run};
use mirror_engine::TraversalResult;
use tracing::{Level, error};
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[tokio::main]
async fn main() {
    let args = Args::parse();

    if let Err(e) = init_logging(args.verbose, args.quiet) {
        eprintln!("Error: {e}");
        process::exit(e.exit_code());
    }

    match run(&args).await {
        Ok(result) => print_summary(&result),
        Err(e) => {
            error!("Mirror failed: {e}");
            eprintln!("Error: {e}");
            process::exit(e.exit_code());
        }
    }
}

fn print_summary(result: &TraversalResult) {
    for manifest in &result.manifests {
        println!("{manifest}");
    }

    let stats = &result.stats;
    println!(
        "{} manifests, {} keys, {} segments downloaded ({} already present)",
        stats.manifests_written, stats.keys_fetched, stats.segments_fetched, stats.segments_skipped
    );
    if stats.files_uploaded > 0 || stats.upload_failures > 0 {
        println!(
            "{} files uploaded, {} uploads failed",
            stats.files_uploaded, stats.upload_failures
        );
    }
    println!("DONE!");
}

fn init_logging(verbose: bool, quiet: bool) -> Result<(), AppError> {
    let filter = if quiet {
        EnvFilter::new("error")
    } else if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env().add_directive(Level::INFO.into())
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).with_level(verbose))
        .try_init()
        .map_err(|e| AppError::Logging(e.to_string()))
}
