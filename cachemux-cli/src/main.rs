mod commands;

use anyhow::{Context, Result};
use cachemux_core::{AppConfig, CacheRegistry, LoggingConfig};
use clap::Parser;
use colored::Colorize;
use commands::Session;
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use std::path::{Path, PathBuf};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "cachemux-cli")]
#[command(about = "cachemux CLI - run cache commands against a configured topology", long_about = None)]
struct Args {
    /// Topology file (YAML)
    #[arg(short = 'c', long, default_value = "cachemux.yml")]
    config: PathBuf,

    /// Command to execute (interactive mode when omitted)
    #[arg(trailing_var_arg = true)]
    command: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = load_config(&args.config)?;
    init_tracing(&config.logging);

    let session = Session::build(&CacheRegistry::with_builtin(), config.cache)?;

    if !args.command.is_empty() {
        let cmd = &args.command[0];
        let cmd_args = &args.command[1..];

        match session.execute_command(cmd, cmd_args).await {
            Ok(output) => {
                println!("{}", output);
                Ok(())
            }
            Err(e) => {
                error!(error = %e, "Command failed");
                eprintln!("{}", format!("Error: {}", e).red());
                std::process::exit(1);
            }
        }
    } else {
        run_interactive(&session, &args.config).await
    }
}

fn load_config(path: &Path) -> Result<AppConfig> {
    AppConfig::from_file(path)
        .with_context(|| format!("Failed to load topology from {}", path.display()))
}

/// `RUST_LOG` wins over the configured level. Logs go to stderr so command
/// output stays clean.
fn init_tracing(logging: &LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));

    if logging.format == "json" {
        tracing_subscriber::fmt()
            .json()
            .with_writer(std::io::stderr)
            .with_env_filter(filter)
            .with_target(true)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_writer(std::io::stderr)
            .with_env_filter(filter)
            .with_target(false)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false)
            .init();
    }
}

async fn run_interactive(session: &Session, config_path: &Path) -> Result<()> {
    println!(
        "{}",
        format!("cachemux CLI v{}", env!("CARGO_PKG_VERSION"))
            .bold()
            .cyan()
    );
    info!(
        "Loaded '{}' topology from {}",
        session.cache_type(),
        config_path.display()
    );
    println!("Type {} for available commands\n", "HELP".bold());

    let mut rl = DefaultEditor::new()?;
    let prompt = format!("{}> ", format!("cachemux {}", session.cache_type()).green());

    loop {
        match rl.readline(&prompt) {
            Ok(line) => {
                let parts: Vec<String> = line.split_whitespace().map(String::from).collect();
                let Some((cmd, cmd_args)) = parts.split_first() else {
                    continue;
                };

                rl.add_history_entry(line.as_str())?;

                if cmd.eq_ignore_ascii_case("QUIT") || cmd.eq_ignore_ascii_case("EXIT") {
                    println!("Goodbye!");
                    break;
                }

                match session.execute_command(cmd, cmd_args).await {
                    Ok(output) => println!("{}", output),
                    Err(e) => eprintln!("{}", format!("Error: {}", e).red()),
                }
            }
            Err(ReadlineError::Interrupted) => {
                println!("^C");
                continue;
            }
            Err(ReadlineError::Eof) => {
                println!("Goodbye!");
                break;
            }
            Err(err) => {
                error!(error = ?err, "Readline error");
                break;
            }
        }
    }

    Ok(())
}
