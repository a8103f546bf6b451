use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "driftless")]
#[command(author = "Alberto Cavalcante")]
#[command(version)]
#[command(about = "Detect and correct drift in your packages and dotfiles", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Directory holding driftless.yaml, driftless.lock and dotfile sources
    #[arg(long, global = true, value_name = "DIR")]
    pub config_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Install missing packages and deploy missing dotfiles
    Apply(ApplyArgs),

    /// Show managed, missing and untracked items
    Status(StatusArgs),

    /// Show content differences of drifted dotfiles
    Diff(DiffArgs),

    /// Run health checks on package managers and dotfiles
    Doctor(DoctorArgs),

    /// Search package registries
    Search(SearchArgs),

    /// Show details about a package
    Info(InfoArgs),

    /// Upgrade packages recorded in the lock file
    Upgrade(UpgradeArgs),

    /// Uninstall packages and drop them from the lock file
    Uninstall(UninstallArgs),

    /// Inspect or upgrade the lock file
    #[command(subcommand)]
    Lock(LockCommand),

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// Restrict a command to one domain
#[derive(Args, Debug, Clone, Copy, Default)]
#[group(multiple = false)]
pub struct DomainArgs {
    /// Only packages
    #[arg(long)]
    pub packages: bool,

    /// Only dotfiles
    #[arg(long)]
    pub dotfiles: bool,
}

#[derive(Args, Debug)]
pub struct ApplyArgs {
    /// Show what would change without changing anything
    #[arg(long, short = 'n')]
    pub dry_run: bool,

    #[command(flatten)]
    pub domains: DomainArgs,
}

#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,

    #[command(flatten)]
    pub domains: DomainArgs,

    /// Only list missing items
    #[arg(long, conflicts_with = "untracked")]
    pub missing: bool,

    /// Only list untracked items
    #[arg(long)]
    pub untracked: bool,
}

#[derive(Args, Debug)]
pub struct DiffArgs {
    /// Dotfile to diff (e.g. .zshrc); all drifted dotfiles when omitted
    pub name: Option<String>,
}

#[derive(Args, Debug)]
pub struct DoctorArgs {
    /// Install configured package managers that are missing
    #[arg(long)]
    pub fix: bool,
}

#[derive(Args, Debug)]
pub struct SearchArgs {
    /// Text to search for
    pub query: String,

    /// Only search this manager (e.g. brew, npm)
    #[arg(long, short)]
    pub manager: Option<String>,
}

#[derive(Args, Debug)]
pub struct InfoArgs {
    /// Package name, optionally as manager:name
    pub package: String,
}

#[derive(Args, Debug)]
pub struct UpgradeArgs {
    /// Packages (name or manager:name) or managers; every recorded package
    /// when omitted
    pub targets: Vec<String>,

    /// Upgrade everything the involved managers have installed, recorded or not
    #[arg(long, conflicts_with = "targets")]
    pub all: bool,

    /// Show what would be upgraded without running anything
    #[arg(long, short = 'n')]
    pub dry_run: bool,
}

#[derive(Args, Debug)]
pub struct UninstallArgs {
    /// Packages to remove (name or manager:name)
    #[arg(required = true)]
    pub packages: Vec<String>,

    /// Show what would be removed without changing anything
    #[arg(long, short = 'n')]
    pub dry_run: bool,
}

#[derive(Subcommand, Debug)]
pub enum LockCommand {
    /// Print the recorded resources
    Show {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Rewrite a v1 lock file in the current format
    Migrate {
        /// Report without writing
        #[arg(long)]
        dry_run: bool,
    },
}
