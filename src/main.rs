use clap::Parser;
use speedgate::cli::commands;
use speedgate::cli::{Cli, Commands};
use speedgate::config::{self, ScenarioDocument, Settings, SettingsLayer};
use speedgate::logging::init_logging;
use speedgate::{Result, SpeedgateError, StructuredError};
use std::io::{self, IsTerminal};

fn main() {
    let cli = Cli::parse();

    let document = if cli.command.needs_document() {
        config::load_document(&cli.config).map(Some)
    } else {
        Ok(None)
    };
    let globals = document
        .as_ref()
        .ok()
        .and_then(Option::as_ref)
        .map(|doc| doc.global_settings.clone())
        .unwrap_or_default();
    let settings = config::resolve_settings(
        &globals,
        &SettingsLayer::from_env(),
        &build_cli_overrides(&cli),
    );

    // Initialize logging
    let level = settings.as_ref().ok().and_then(|s| s.log_level.clone());
    if let Err(e) = init_logging(
        cli.verbose,
        cli.quiet,
        cli.log_file.as_deref(),
        level.as_deref(),
    ) {
        eprintln!("Failed to initialize logging: {e}");
    }

    let result = document.and_then(|document| {
        let settings = settings?;
        dispatch(&cli, document.as_ref(), &settings)
    });

    if let Err(e) = result {
        handle_error(&e, cli.json);
    }
}

fn dispatch(cli: &Cli, document: Option<&ScenarioDocument>, settings: &Settings) -> Result<()> {
    let document = || {
        document.ok_or_else(|| SpeedgateError::Config("no scenario document loaded".to_string()))
    };
    match &cli.command {
        Commands::Run(args) => commands::run::execute(args, document()?, settings, cli.json),
        Commands::Status => commands::status::execute(document()?, settings, cli.json),
        Commands::Evaluate(args) => commands::evaluate::execute(args, document()?, cli.json),
        Commands::Check => commands::check::execute(document()?, cli.json),
        Commands::Methods => commands::methods::execute(cli.json),
        Commands::Schema => commands::schema::execute(),
        Commands::Completions(args) => commands::completions::execute(args),
        Commands::Version => commands::version::execute(cli.json),
    }
}

/// Handle errors with structured output support.
///
/// When --json is set or stdout is not a TTY, outputs structured JSON to stderr.
/// Otherwise, outputs human-readable error with optional color.
fn handle_error(err: &SpeedgateError, json_mode: bool) -> ! {
    let structured = StructuredError::from_error(err);
    let exit_code = structured.code.exit_code();

    let use_json = json_mode || !io::stdout().is_terminal();

    if use_json {
        let json = structured.to_json();
        eprintln!(
            "{}",
            serde_json::to_string_pretty(&json).unwrap_or_else(|_| json.to_string())
        );
    } else {
        let use_color = io::stderr().is_terminal();
        eprintln!("{}", structured.to_human(use_color));
    }

    std::process::exit(exit_code);
}

fn build_cli_overrides(cli: &Cli) -> config::CliOverrides {
    let (execution, poll_interval_ms) = match &cli.command {
        Commands::Run(args) => (args.execution, args.poll_interval_ms),
        _ => (None, None),
    };
    config::CliOverrides {
        log_level: cli.log_level.clone(),
        poll_interval_ms,
        execution,
    }
}
