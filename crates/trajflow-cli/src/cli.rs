use clap::Parser;
use std::path::PathBuf;

const HELP_TEMPLATE: &str = "\
{before-help}{name} {version}
{author-with-newline}{about-with-newline}
{usage-heading} {usage}

{all-args}{after-help}
";

#[derive(Parser, Debug)]
#[command(
    author = "The trajflow developers",
    version,
    about = "trajflow - process molecular-dynamics trajectories with a script of trajin, trajout, reference and action commands.",
    help_template = HELP_TEMPLATE,
)]
pub struct Cli {
    /// Topology file to load before the script is read
    #[arg(value_name = "TOPOLOGY")]
    pub topology: Option<PathBuf>,

    /// Input script; read from standard input when omitted
    #[arg(value_name = "INPUT")]
    pub input_positional: Option<PathBuf>,

    /// Load a topology file (may be given several times)
    #[arg(short = 'p', long = "parm", value_name = "PATH")]
    pub parm: Vec<PathBuf>,

    /// Read the input script from a file
    #[arg(short, long, value_name = "PATH", conflicts_with = "input_positional")]
    pub input: Option<PathBuf>,

    /// Engine debug level
    #[arg(short, long, value_name = "LEVEL")]
    pub debug: Option<u32>,

    /// Number of ranks, each processing its own share of every trajectory
    #[arg(short = 'n', long, value_name = "NUM")]
    pub ranks: Option<usize>,

    /// Path to a configuration file in TOML format
    #[arg(short, long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Do not show the progress bar
    #[arg(long)]
    pub no_progress: bool,

    /// Maximum length of one script instruction
    #[arg(long, value_name = "NUM")]
    pub max_line_length: Option<usize>,

    /// Decimal places written to data files
    #[arg(long, value_name = "NUM")]
    pub precision: Option<usize>,

    /// Set a configuration value, overriding the config file.
    /// Can be used multiple times. Example: -S run.ranks=4
    #[arg(short = 'S', long = "set", value_name = "KEY=VALUE")]
    pub set_values: Vec<String>,

    /// Increase verbosity level (-v for DEBUG, -vv for TRACE)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Only show warnings and errors
    #[arg(short, long, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Write logs to a specified file in addition to the console output
    #[arg(long, value_name = "PATH")]
    pub log_file: Option<PathBuf>,
}

impl Cli {
    /// The script file, whether given by flag or position.
    pub fn script_path(&self) -> Option<&PathBuf> {
        self.input.as_ref().or(self.input_positional.as_ref())
    }

    /// Topologies in load order: the positional one first, then every `-p`.
    pub fn topologies(&self) -> Vec<PathBuf> {
        self.topology.iter().chain(&self.parm).cloned().collect()
    }
}
