use std::path::PathBuf;

use clap::{ArgAction, Parser, Subcommand};

#[derive(Parser)]
#[command(
    author,
    version,
    about = "Resolve and fetch packages from RPM repositories",
    arg_required_else_help = true
)]
pub struct Args {
    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Only show errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Log as JSON
    #[arg(short, long, global = true)]
    pub json: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Disable progress bars
    #[arg(long, global = true)]
    pub no_progress: bool,

    /// Path to the config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Target architecture, overriding the configured one
    #[arg(short, long, global = true)]
    pub arch: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Fetch repository metadata and show what was loaded
    #[clap(name = "sync", alias = "S")]
    Sync,

    /// Resolve packages and download them into the package cache
    #[clap(name = "fetch", alias = "f")]
    Fetch {
        #[arg(required = true)]
        packages: Vec<String>,

        /// Copy the fetched packages into this directory
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Collect the source packages of the given packages
    #[clap(name = "sources")]
    Sources {
        #[arg(required = true)]
        packages: Vec<String>,

        /// Destination directory
        #[arg(short, long, default_value = ".")]
        output: PathBuf,
    },

    /// Show the minimal set of arches covering the configured repositories
    #[clap(name = "arches")]
    Arches,

    /// List the packages of a pattern or comps group
    #[clap(name = "group")]
    Group { name: String },

    /// Show the rpm version shipped by the first repository
    #[clap(name = "rpm-version")]
    RpmVersion,

    /// Show the host's canonical and base architecture
    #[clap(name = "host-arch")]
    HostArch,

    /// Find a statically linked qemu emulator for an architecture
    #[clap(name = "emulator")]
    Emulator {
        arch: String,

        #[arg(long, default_value = "/usr/bin")]
        bin_dir: PathBuf,
    },

    /// Print the effective configuration
    #[clap(name = "config")]
    Config,

    /// Print environment paths
    #[clap(name = "env")]
    Env,
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn test_cli_definition() {
        Args::command().debug_assert();
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let args = Args::parse_from(["repokit", "fetch", "vim", "--arch", "i686", "-vv"]);
        assert_eq!(args.verbose, 2);
        assert_eq!(args.arch.as_deref(), Some("i686"));
        assert!(matches!(
            args.command,
            Commands::Fetch { ref packages, output: None } if packages == &["vim"]
        ));
    }
}
