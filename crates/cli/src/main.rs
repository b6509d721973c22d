// cellsync-replay - drive mounted cells from a JSONL script, headless
//
// Logs go to stderr (RUST_LOG, default warn). Results go to stdout.

mod exit_codes;

use std::fs;
use std::io;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use cellsync_cli::{parse_script, Replay, ReplayError, ReplayOutput};
use cellsync_config::Settings;

use exit_codes::{EXIT_ERROR, EXIT_SUCCESS};

#[derive(Parser, Debug)]
#[command(name = "cellsync-replay")]
#[command(about = "Replay cell session events against in-memory cells")]
#[command(version)]
#[command(after_help = "\
Examples:
  cellsync-replay session.jsonl --cells c1,c2
  cellsync-replay session.jsonl --cells c1 --markdown m1 --json
  RUST_LOG=cellsync_engine=debug cellsync-replay session.jsonl --cells c1")]
struct Args {
    /// Script file, one JSON step per line
    script: PathBuf,

    /// Code cells to mount (comma-separated or repeated)
    #[arg(long, value_delimiter = ',', required = true)]
    cells: Vec<String>,

    /// Cells to mount as markdown cells (comma-separated or repeated)
    #[arg(long, value_delimiter = ',')]
    markdown: Vec<String>,

    /// Settings file (defaults when omitted)
    #[arg(long, env = "CELLSYNC_SETTINGS")]
    settings: Option<PathBuf>,

    /// Print calls as JSONL instead of text
    #[arg(long)]
    json: bool,
}

fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(io::stderr)
        .init();
}

fn run(args: Args) -> Result<(), ReplayError> {
    let settings = match &args.settings {
        Some(path) => Settings::load_from(path)?,
        None => Settings::default(),
    };

    let contents = fs::read_to_string(&args.script).map_err(|source| ReplayError::Read {
        path: args.script.clone(),
        source,
    })?;
    let script = parse_script(&contents)?;
    log::info!("Loaded {} step(s) from {}", script.len(), args.script.display());

    let output = if args.json { ReplayOutput::Json } else { ReplayOutput::Human };
    let mut replay = Replay::new(settings, &args.cells, &args.markdown)?;
    let stdout = io::stdout();
    let mut out = stdout.lock();
    replay.run(&script, output, &mut out)?;
    Ok(())
}

fn main() -> ExitCode {
    let args = Args::parse();
    init_logging();

    match run(args) {
        Ok(()) => ExitCode::from(EXIT_SUCCESS),
        Err(err) => {
            eprintln!("error: {}", err);
            ExitCode::from(EXIT_ERROR)
        }
    }
}
