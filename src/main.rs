use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod analyzer;
mod xex;

use analyzer::AnalyzeOptions;

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// XEX File Analysis Tool
///
/// A command-line tool to inspect Xbox 360 executable (XEX2) containers.
/// Reports header structure, optional header entries, and encryption and
/// compression details. Strictly read-only: the input file is never modified.
#[derive(Parser)]
#[command(name = "xextool")]
#[command(version = VERSION)]
#[command(about = "XEX File Analysis Tool - Inspect XEX2 headers and structure")]
struct Cli {
	/// Path to the XEX file to analyze
	file: PathBuf,

	/// Enable verbose output (shows all optional headers)
	#[arg(short, long)]
	verbose: bool,

	/// Display detailed encryption information
	#[arg(short, long)]
	encryption: bool,
}

fn main() {
	let cli = Cli::parse();

	tracing_subscriber::fmt()
		.with_env_filter(
			EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
		)
		.with_writer(std::io::stderr)
		.with_target(false)
		.init();

	let opts = AnalyzeOptions {
		verbose: cli.verbose,
		show_encryption: cli.encryption,
	};

	if let Err(e) = analyzer::analyze_file(&cli.file, &opts) {
		eprintln!("Error: {:#}", e);
		std::process::exit(1);
	}
}
