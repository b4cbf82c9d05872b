//! CLI definitions and entry point.

use crate::scheduler::ExecutionMode;
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

pub mod commands;

/// Scheduled network-performance scenarios judged against expectations
#[derive(Parser, Debug)]
#[command(name = "sg", author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Scenario document (JSON, or YAML by extension)
    #[arg(
        long,
        short = 'c',
        global = true,
        env = "SG_CONFIG",
        default_value = "scenarios.json"
    )]
    pub config: PathBuf,

    /// Output as JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// Increase logging verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Quiet mode (no output except errors)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Also write logs to this file
    #[arg(long, global = true)]
    pub log_file: Option<PathBuf>,

    /// Log level (overrides global_settings.log_level and SG_LOG_LEVEL)
    #[arg(long, global = true)]
    pub log_level: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the scheduler until every bounded job completes or a signal arrives
    Run(RunArgs),

    /// Schedule enabled scenarios without running them and show job status
    Status,

    /// Evaluate one scenario's expectations against a measurements file
    Evaluate(EvaluateArgs),

    /// Validate the scenario document
    Check,

    /// List aggregation methods, operators and scopes
    Methods,

    /// Print the JSON Schema of the scenario document
    Schema,

    /// Generate shell completions
    Completions(CompletionsArgs),

    /// Show version information
    Version,
}

impl Commands {
    /// Commands that read the scenario document.
    #[must_use]
    pub const fn needs_document(&self) -> bool {
        matches!(
            self,
            Self::Run(_) | Self::Status | Self::Evaluate(_) | Self::Check
        )
    }
}

#[derive(Args, Debug, Clone, Default)]
pub struct RunArgs {
    /// Replay measurements from a JSON or JSON Lines file
    #[arg(long, short = 'm')]
    pub measurements: Option<PathBuf>,

    /// Append results as JSON Lines to this file
    #[arg(long, short = 'o')]
    pub results: Option<PathBuf>,

    /// Only run these scenario ids (repeatable)
    #[arg(long = "scenario", short = 's')]
    pub scenarios: Vec<String>,

    /// sequential or concurrent (overrides settings)
    #[arg(long)]
    pub execution: Option<ExecutionMode>,

    /// Scheduler poll quantum in milliseconds (overrides settings)
    #[arg(long)]
    pub poll_interval_ms: Option<u64>,
}

#[derive(Args, Debug, Clone)]
pub struct EvaluateArgs {
    /// Scenario id
    pub scenario: String,

    /// Measurements file (JSON array or JSON Lines)
    #[arg(long, short = 'm')]
    pub measurements: PathBuf,

    /// What to print
    #[arg(long, value_enum, default_value_t = EvaluateOutput::Results)]
    pub output: EvaluateOutput,
}

/// Output shape of `sg evaluate`.
#[derive(ValueEnum, Debug, Clone, Copy, Eq, PartialEq, Default)]
pub enum EvaluateOutput {
    /// One line per evaluation
    #[default]
    Results,
    /// Per-metric statistics and pass counts
    Summary,
    /// Series, evaluations and summary
    Export,
}

#[derive(Args, Debug, Clone)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    #[arg(value_enum)]
    pub shell: ShellType,

    /// Output file (default: stdout)
    #[arg(long, short = 'o')]
    pub output: Option<PathBuf>,
}

/// Supported shells for completion generation.
#[derive(ValueEnum, Debug, Clone, Copy, Eq, PartialEq)]
pub enum ShellType {
    /// Bash shell
    Bash,
    /// Zsh shell
    Zsh,
    /// Fish shell
    Fish,
    #[value(name = "powershell")]
    #[value(alias = "pwsh")]
    /// `PowerShell`
    PowerShell,
    /// Elvish
    Elvish,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_run_overrides() {
        let cli = Cli::try_parse_from([
            "sg",
            "--config",
            "doc.yaml",
            "run",
            "--measurements",
            "m.jsonl",
            "--execution",
            "concurrent",
            "-s",
            "a",
            "-s",
            "b",
        ])
        .expect("parse");
        assert_eq!(cli.config, PathBuf::from("doc.yaml"));
        let Commands::Run(args) = cli.command else {
            panic!("expected run");
        };
        assert_eq!(args.execution, Some(ExecutionMode::Concurrent));
        assert_eq!(args.scenarios, vec!["a", "b"]);
    }

    #[test]
    fn rejects_unknown_execution_mode() {
        let result = Cli::try_parse_from(["sg", "run", "--execution", "parallel"]);
        assert!(result.is_err());
    }

    #[test]
    fn document_commands() {
        let cli = Cli::try_parse_from(["sg", "methods"]).expect("parse");
        assert!(!cli.command.needs_document());
        let cli = Cli::try_parse_from(["sg", "check"]).expect("parse");
        assert!(cli.command.needs_document());
    }
}
