//! CLI definitions using clap.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use clap_complete::Shell;

/// espurna-build - extra firmware build steps for ESPurna
#[derive(Parser)]
#[command(name = "espurna-build")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(flatten)]
    pub project: ProjectArgs,

    #[command(subcommand)]
    pub command: Commands,
}

/// Where the project is and which environment to use.
#[derive(Args, Clone, Debug)]
pub struct ProjectArgs {
    /// Project directory
    #[arg(short = 'C', long, global = true, default_value = ".")]
    pub project_dir: PathBuf,

    /// Environment name
    #[arg(short, long = "env", global = true, env = "PIOENV")]
    pub env_name: Option<String>,

    /// Name used in release file names instead of the environment name
    #[arg(long, global = true, env = "ESPURNA_BUILD_NAME")]
    pub build_name: Option<String>,

    /// Directory release files are installed to
    #[arg(long, global = true, env = "ESPURNA_BUILD_DESTINATION")]
    pub destination: Option<String>,

    /// Firmware version used in release file names
    #[arg(long, global = true, env = "ESPURNA_VERSION")]
    pub firmware_version: Option<String>,

    /// How cache keys identify a target
    #[arg(long, global = true, value_enum, default_value_t = SignatureMode::BuildDir)]
    pub signatures: SignatureMode,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum SignatureMode {
    /// Relative to the environment's build directory (shared between environments)
    BuildDir,
    /// Relative to the project root (one cache per environment)
    Project,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Build targets, or the default post-processing targets
    Build(BuildArgs),

    /// Generate the single-source unit
    Merge(MergeArgs),

    /// Show how the environment is set up
    Info(InfoArgs),

    /// Print the cache signature of a target
    Signature(SignatureArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

#[derive(Args)]
pub struct BuildArgs {
    /// Targets to build: paths, `*.re.ipp` grammars, `install` or `build-and-copy`
    pub targets: Vec<String>,

    /// Do not read from or write to the cache directory
    #[arg(long)]
    pub no_cache: bool,
}

#[derive(Args)]
pub struct MergeArgs {
    /// Print the unit instead of writing it
    #[arg(long)]
    pub print: bool,
}

#[derive(Args)]
pub struct InfoArgs {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Args)]
pub struct SignatureArgs {
    /// Target path, relative to the project directory
    pub target: String,
}

#[derive(Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    #[arg(value_enum)]
    pub shell: Shell,
}
