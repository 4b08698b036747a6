use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use shard_merge::{Coordinator, MergeOptions};
use tracing::error;
use tracing_subscriber::EnvFilter;

/// Status for wrong arguments; distinct from merge (1) and output I/O (2) failures.
const USAGE_EXIT: u8 = 255;

/// Merge every sorted shard under INPUT_PATH into one sorted shard in OUTPUT_PATH.
///
/// An existing OUTPUT_PATH is deleted first. On success it holds
/// `part-r-00000` and a `_SUCCESS` marker.
#[derive(Debug, Parser)]
#[command(name = "merge", version, about, long_about = None)]
struct Args {
    /// Directory (searched recursively) or single file holding input shards
    input_path: PathBuf,

    /// Output directory; replaced if it already exists
    output_path: PathBuf,

    /// Maximum threads reading shards ahead of the merge (1 = read inline)
    #[arg(short = 'j', long)]
    read_concurrency: Option<usize>,

    /// Read buffer per input shard, in bytes
    #[arg(long)]
    read_buffer_size: Option<usize>,

    /// Skip fsync of the output before reporting success
    #[arg(long)]
    no_sync: bool,

    /// Do not write the _SUCCESS marker
    #[arg(long)]
    no_success_marker: bool,
}

impl Args {
    fn options(&self) -> MergeOptions {
        let mut options = MergeOptions::default();
        if let Some(n) = self.read_concurrency {
            options.read_concurrency = n;
        }
        if let Some(size) = self.read_buffer_size {
            options.read_buffer_size = size;
        }
        options.sync = !self.no_sync;
        options.write_success_marker = !self.no_success_marker;
        options
    }
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> ExitCode {
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(e) => {
            let _ = e.print();
            return if e.use_stderr() {
                ExitCode::from(USAGE_EXIT)
            } else {
                // --help / --version
                ExitCode::SUCCESS
            };
        }
    };

    init_logging();

    let coordinator = Coordinator::local(args.options());
    match coordinator.run(&args.input_path, &args.output_path) {
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "merge failed");
            ExitCode::from(e.exit_code() as u8)
        }
    }
}
