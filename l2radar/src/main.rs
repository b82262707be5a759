//! l2radar: passive L2 neighbour monitor.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use l2radar::config::{RunConfig, parse_interval};
use l2radar::ebpf_loader::{DEFAULT_PIN_PATH, DEFAULT_PROGRAM_PATH, pin_path};
use l2radar::{dump, export, runner};
use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "l2radar")]
#[command(about = "Passive L2 neighbour monitor using eBPF", long_about = None)]
#[command(args_conflicts_with_subcommands = true)]
struct Cli {
    #[command(flatten)]
    run: RunArgs,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Attach probes and optionally export JSON (default)
    Run(RunArgs),

    /// Print the neighbour table of one interface
    Dump(DumpArgs),
}

#[derive(Args)]
struct RunArgs {
    /// Interface to monitor (repeatable; "any" for all, "external" to skip virtual ones)
    #[arg(long = "iface")]
    interfaces: Vec<String>,

    /// Base path for pinned maps
    #[arg(long, default_value = DEFAULT_PIN_PATH)]
    pin_path: PathBuf,

    /// Compiled eBPF program
    #[arg(long, default_value = DEFAULT_PROGRAM_PATH)]
    program: PathBuf,

    /// Directory for JSON exports (disabled if absent)
    #[arg(long)]
    export_dir: Option<PathBuf>,

    /// Export interval, e.g. 5s or 1m30s
    #[arg(long, value_parser = parse_interval_arg, default_value = "5s")]
    export_interval: Duration,
}

#[derive(Args)]
struct DumpArgs {
    /// Interface to dump
    #[arg(long)]
    iface: String,

    /// Base path for pinned maps
    #[arg(long, default_value = DEFAULT_PIN_PATH)]
    pin_path: PathBuf,

    /// Output format
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Table)]
    output: OutputFormat,
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    Table,
    Json,
}

fn parse_interval_arg(s: &str) -> Result<Duration, String> {
    parse_interval(s).map_err(|e| e.to_string())
}

impl From<RunArgs> for RunConfig {
    fn from(args: RunArgs) -> Self {
        Self {
            interfaces: args.interfaces,
            pin_path: args.pin_path,
            program_path: args.program,
            export_dir: args.export_dir,
            export_interval: args.export_interval,
        }
    }
}

fn dump_table(args: &DumpArgs) -> Result<()> {
    let path = pin_path(&args.pin_path, &args.iface);
    let mut neighbours =
        dump::read_table(&path).with_context(|| format!("Failed to read map for {}", args.iface))?;
    dump::sort_by_last_seen_descending(&mut neighbours);

    let mut stdout = std::io::stdout().lock();
    match args.output {
        OutputFormat::Table => {
            writeln!(stdout, "{}", dump::format_table(&neighbours))?;
        }
        OutputFormat::Json => {
            let doc = export::dump_document(&args.iface, &neighbours)?;
            stdout.write_all(&doc.to_json()?)?;
        }
    }
    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Some(Commands::Dump(args)) => dump_table(&args),
        Some(Commands::Run(args)) => runner::run(args.into()).await,
        None => runner::run(cli.run.into()).await,
    }
}
