//! Agent Delegate - run external coding agents as supervised subprocesses.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use agent_delegate::agents::AgentKind;
use agent_delegate::config::{ConfigLoader, DelegateConfig};
use agent_delegate::display::{self, ProgressPrinter};
use agent_delegate::run::{Coordinator, RunOptions, RunStatus};

#[derive(Parser)]
#[command(
    name = "agent-delegate",
    about = "Run external coding agents as supervised subprocesses",
    version
)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short = 'v', long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Path to a config file, instead of the default search locations.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Delegate a task to an agent and stream its progress.
    Run {
        /// The task to execute.
        task: String,
        /// Which agent CLI to run.
        #[arg(short, long, value_enum)]
        agent: AgentKind,
        /// Working directory for the agent.
        #[arg(long)]
        cwd: Option<PathBuf>,
        /// Model override passed to the agent.
        #[arg(short, long)]
        model: Option<String>,
        /// Session id to resume.
        #[arg(long)]
        resume: Option<String>,
        /// Extra argument passed through to the agent (repeatable).
        #[arg(long = "arg", allow_hyphen_values = true)]
        extra_args: Vec<String>,
        /// Print the final run state as JSON instead of a summary.
        #[arg(long)]
        json: bool,
        /// Do not truncate long values in progress output.
        #[arg(long)]
        raw: bool,
    },
    /// Show which config file would be used and its effective values.
    Config,
}

fn init_tracing(verbosity: u8) {
    let level = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

fn loader(path: Option<PathBuf>) -> ConfigLoader {
    path.map_or_else(ConfigLoader::new, ConfigLoader::with_path)
}

fn exit_code_for(status: RunStatus) -> ExitCode {
    match status {
        RunStatus::Done => ExitCode::SUCCESS,
        RunStatus::Aborted => ExitCode::from(130),
        RunStatus::Error | RunStatus::Running => ExitCode::FAILURE,
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let loader = loader(cli.config);
    let config = match loader.load() {
        Ok(config) => config,
        Err(e) => {
            display::print_error(&e.to_string());
            return ExitCode::FAILURE;
        }
    };

    match cli.command {
        Commands::Config => {
            show_config(&loader, &config);
            ExitCode::SUCCESS
        }
        Commands::Run {
            task,
            agent,
            cwd,
            model,
            resume,
            extra_args,
            json,
            raw,
        } => {
            let adapter = match agent.build(&config.agents) {
                Ok(adapter) => adapter,
                Err(e) => {
                    display::print_error(&e.to_string());
                    return ExitCode::FAILURE;
                }
            };
            let coordinator =
                Coordinator::from_boxed(adapter).with_settings(config.run.settings());

            let cancel = CancellationToken::new();
            let ctrl_c = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    tracing::info!("Interrupt received, cancelling run");
                    ctrl_c.cancel();
                }
            });

            let mut options = RunOptions::new(task).cancellation(cancel);
            if let Some(cwd) = cwd {
                options = options.working_dir(cwd);
            }
            if let Some(model) = model {
                options = options.model(model);
            }
            if let Some(resume) = resume {
                options = options.resume(resume);
            }
            for arg in extra_args {
                options = options.extra_arg(arg);
            }
            if !json {
                let mut printer = ProgressPrinter::new(raw);
                options = options.on_update(move |state| printer.update(&state));
            }

            tracing::info!(agent = %agent, "Starting agent run");
            let state = match coordinator.run(options).await {
                Ok(state) => state,
                Err(e) => {
                    display::print_error(&e.to_string());
                    return ExitCode::FAILURE;
                }
            };

            if json {
                match serde_json::to_string_pretty(&state) {
                    Ok(out) => println!("{out}"),
                    Err(e) => {
                        display::print_error(&format!("Failed to serialize run state: {e}"));
                        return ExitCode::FAILURE;
                    }
                }
            } else {
                display::print_summary(&state);
            }
            exit_code_for(state.status)
        }
    }
}

fn show_config(loader: &ConfigLoader, config: &DelegateConfig) {
    match loader.find_config_file() {
        Some(path) => println!("Config file: {}", path.display()),
        None => {
            println!("Config file: none (using defaults)");
            for path in loader.search_paths() {
                println!("  searched: {}", path.display());
            }
        }
    }
    match toml::to_string_pretty(config) {
        Ok(out) => println!("\n{out}"),
        Err(e) => display::print_error(&format!("Failed to render config: {e}")),
    }
}
