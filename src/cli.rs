//! Command-line interface for the Trellis compiler.

use std::path::PathBuf;

use clap::{ArgAction, Args, Parser, Subcommand};

#[derive(Parser)]
#[command(name = "trellis")]
#[command(about = "Trellis template compiler", long_about = None)]
pub struct Cli {
    /// Configuration file (defaults to ./trellis.toml when present)
    #[arg(short = 'c', long, global = true)]
    pub config: Option<PathBuf>,

    /// Raise log verbosity; repeat for more
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Overrides for the `[compiler]` table.
#[derive(Args, Clone, Debug, Default)]
pub struct SourceArgs {
    /// Template source directory; repeatable, first match wins
    #[arg(short, long = "source", value_name = "DIR")]
    pub sources: Vec<PathBuf>,

    /// Namespace compiled units are stored under
    #[arg(short, long)]
    pub namespace: Option<String>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Compile templates and write units to the output directory
    Build {
        #[command(flatten)]
        sources: SourceArgs,

        /// Recompile even when nothing changed
        #[arg(short, long)]
        force: bool,

        #[arg(short, long, value_name = "DIR")]
        out: Option<PathBuf>,

        /// Templates to compile (all when omitted)
        templates: Vec<String>,
    },
    /// Report diagnostics without writing units
    Check {
        #[command(flatten)]
        sources: SourceArgs,

        templates: Vec<String>,
    },
    /// Compile and invoke a template, printing its output
    Run {
        #[command(flatten)]
        sources: SourceArgs,

        template: String,

        /// Arguments as JSON values; anything that is not JSON is a string
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },
    /// Print the instruction listing of a compiled template
    Disasm {
        #[command(flatten)]
        sources: SourceArgs,

        template: String,
    },
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn test_cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_build_flags() {
        let cli = Cli::try_parse_from([
            "trellis", "-vv", "build", "--force", "-s", "a", "-s", "b", "index",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 2);
        let Command::Build {
            sources,
            force,
            out,
            templates,
        } = cli.command
        else {
            panic!("expected build");
        };
        assert!(force);
        assert_eq!(out, None);
        assert_eq!(sources.sources, vec![PathBuf::from("a"), PathBuf::from("b")]);
        assert_eq!(templates, vec!["index"]);
    }

    #[test]
    fn test_run_takes_trailing_arguments() {
        let cli = Cli::try_parse_from(["trellis", "run", "greet", "\"Ada\"", "-3"]).unwrap();
        let Command::Run { template, args, .. } = cli.command else {
            panic!("expected run");
        };
        assert_eq!(template, "greet");
        assert_eq!(args, vec!["\"Ada\"", "-3"]);
    }
}
