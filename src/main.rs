//! hookguard CLI.
//!
//! Hook subcommands read one request from stdin and write the decision body
//! to stdout. Logs go to stderr.

use std::io::{Read, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use hookguard::{Decision, Gatekeeper, HookInput, HookOutput, PreGates, Settings};

#[derive(Parser, Debug)]
#[command(name = "hookguard", version)]
#[command(about = "Policy gates for coding agents")]
struct Cli {
    /// Settings file (overrides project and user settings)
    #[arg(long, global = true, env = "HOOKGUARD_CONFIG")]
    config: Option<PathBuf>,

    /// Project directory (defaults to the current directory)
    #[arg(long, global = true)]
    project_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Validator then safety engine (PreToolUse)
    PreBash,
    /// Command validator only (PreToolUse)
    ValidateBash,
    /// Safety engine only (PreToolUse)
    SafetyCheck,
    /// Output classifier (PostToolUse)
    PostBash,
    /// Lint relay (PostToolUse on file writes)
    Lint,
    /// Completion gate (Stop)
    Stop,
    /// Evaluate a command without the hook protocol
    Check {
        /// Command text to evaluate
        command: String,
    },
    /// Inspect settings
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// List all settings
    List,
    /// Show one setting by dotted path
    Get { key: String },
    /// Show which settings file applies
    Path,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_env("HOOKGUARD_LOG")
                .unwrap_or_else(|_| EnvFilter::new("hookguard=warn")),
        )
        .init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("hookguard: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    let project_dir = match cli.project_dir {
        Some(dir) => dir,
        None => std::env::current_dir().context("Cannot determine current directory")?,
    };
    let settings = Settings::load(cli.config.as_deref(), &project_dir);

    if let Command::Config { action } = &cli.command {
        config_command(action, &settings, cli.config.as_deref(), &project_dir)?;
        return Ok(ExitCode::SUCCESS);
    }

    let gatekeeper = Gatekeeper::new(settings, project_dir.clone());

    if let Command::Check { command } = &cli.command {
        return check_command(&gatekeeper, command, &project_dir);
    }

    let input = read_request();
    let output = match cli.command {
        Command::PreBash => gatekeeper.pre_bash(&input),
        Command::ValidateBash => gatekeeper.validate_bash(&input),
        Command::SafetyCheck => gatekeeper.safety_check(&input),
        Command::PostBash => gatekeeper.post_bash(&input),
        Command::Lint => gatekeeper.lint(&input).await,
        Command::Stop => gatekeeper.stop(&input).await,
        Command::Check { .. } | Command::Config { .. } => HookOutput::Allow,
    };

    write_response(&output)?;
    Ok(ExitCode::SUCCESS)
}

/// Read the hook request. Anything unreadable becomes an empty request.
fn read_request() -> HookInput {
    let mut body = String::new();
    if let Err(e) = std::io::stdin().read_to_string(&mut body) {
        tracing::warn!("Failed to read hook request, allowing: {}", e);
        return HookInput::default();
    }
    HookInput::parse(&body).unwrap_or_else(|e| {
        tracing::warn!("{}, allowing", e);
        HookInput::default()
    })
}

fn write_response(output: &HookOutput) -> anyhow::Result<()> {
    let Some(body) = output.to_json() else {
        return Ok(());
    };
    let mut stdout = std::io::stdout().lock();
    writeln!(stdout, "{}", serde_json::to_string(&body)?).context("Failed to write decision")?;
    stdout.flush().context("Failed to write decision")?;
    Ok(())
}

fn check_command(
    gatekeeper: &Gatekeeper,
    command: &str,
    cwd: &std::path::Path,
) -> anyhow::Result<ExitCode> {
    let decision = gatekeeper
        .check_command(command, cwd, PreGates::Both)
        .context("Gate evaluation failed")?;
    match decision {
        Decision::Allow => {
            println!("allow");
            Ok(ExitCode::SUCCESS)
        }
        Decision::Deny(veto) => {
            println!("deny: {}", veto.message());
            // Unlike the hook subcommands, `check` reports a veto through its status.
            Ok(ExitCode::from(2))
        }
    }
}

fn config_command(
    action: &ConfigAction,
    settings: &Settings,
    explicit: Option<&std::path::Path>,
    project_dir: &std::path::Path,
) -> anyhow::Result<()> {
    match action {
        ConfigAction::List => {
            for (key, value) in settings.list() {
                println!("{} = {}", key, value);
            }
        }
        ConfigAction::Get { key } => match settings.get(key) {
            Some(value) => println!("{}", value),
            None => anyhow::bail!("Unknown setting: {}", key),
        },
        ConfigAction::Path => match Settings::resolve_path(explicit, project_dir) {
            Some(path) => println!("{}", path.display()),
            None => println!("(defaults, no settings file)"),
        },
    }
    Ok(())
}
