use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

const HELP_TEMPLATE: &str = "\
{before-help}{name} {version}
{author-with-newline}{about-with-newline}
{usage-heading} {usage}

{all-args}{after-help}
";

#[derive(Parser, Debug)]
#[command(
    author = "posegrad developers",
    version,
    about = "posegrad CLI - gradient-driven optimization of scoring-network input grids and docking conformations.",
    help_template = HELP_TEMPLATE,
)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity level (-v for INFO, -vv for DEBUG, -vvv for TRACE)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all log output except for errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Write logs to a specified file in addition to the console output
    #[arg(long, global = true, value_name = "PATH")]
    pub log_file: Option<PathBuf>,

    /// Set the number of threads for parallel computation.
    /// Defaults to the number of available logical cores.
    #[arg(short = 'j', long, global = true, value_name = "NUM")]
    pub threads: Option<usize>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Optimize an input grid against a target density by gradient descent on the input.
    Optimize(OptimizeArgs),
    /// Print the contents of a solver checkpoint (binary or structured).
    Inspect(InspectArgs),
    /// Project a conformation (or change) file onto its flat vector and write the index table.
    Flatten(FlattenArgs),
}

/// Arguments for the `optimize` subcommand.
#[derive(Args, Debug)]
pub struct OptimizeArgs {
    // --- Core Arguments ---
    /// Path to the target grid (TOML tensor record with `shape` and `data`).
    #[arg(short, long, required = true, value_name = "PATH")]
    pub target: PathBuf,

    /// Path to the starting grid. Starts from zeros when omitted.
    #[arg(short, long, value_name = "PATH")]
    pub init: Option<PathBuf>,

    /// Where to write the optimized grid as a TOML tensor record.
    #[arg(short, long, value_name = "PATH")]
    pub output: Option<PathBuf>,

    /// Path to a TOML solver configuration file.
    #[arg(short, long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Resume from a solver state written by an earlier run.
    #[arg(short, long, value_name = "PATH")]
    pub resume: Option<PathBuf>,

    // --- Solver Overrides ---
    /// Override the maximum number of iterations.
    #[arg(long, value_name = "INT")]
    pub max_iter: Option<usize>,

    /// Override the base learning rate.
    #[arg(long, value_name = "FLOAT")]
    pub base_lr: Option<f64>,

    /// Override the snapshot file prefix.
    #[arg(long, value_name = "PATH")]
    pub snapshot_prefix: Option<PathBuf>,

    /// Clamp negative values outside the protected channel prefix after every update.
    #[arg(long)]
    pub threshold: bool,

    /// Set any configuration value from the file, e.g. `-S solver.momentum=0.9`.
    #[arg(short = 'S', long = "set", value_name = "KEY=VALUE")]
    pub set_values: Vec<String>,
}

/// Arguments for the `inspect` subcommand.
#[derive(Args, Debug)]
pub struct InspectArgs {
    /// Solver state file (`.solverstate` or `.solverstate.toml`).
    #[arg(value_name = "STATE")]
    pub state: PathBuf,
}

/// Arguments for the `flatten` subcommand.
#[derive(Args, Debug)]
pub struct FlattenArgs {
    /// Conformation file in TOML.
    #[arg(value_name = "PATH")]
    pub input: PathBuf,

    /// Write the flat table to this CSV file instead of standard output.
    #[arg(short, long, value_name = "PATH")]
    pub output: Option<PathBuf>,

    /// Treat the file as a change (3-component rotation vectors) rather than a pose.
    #[arg(long)]
    pub change: bool,
}
