mod config;
mod daemon;
mod highlight;
mod scheduler;

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tokio::io::AsyncBufReadExt;
use tracing_subscriber::EnvFilter;

use crate::config::Config;
use crate::daemon::simulate::{Script, Simulation};
use crate::daemon::{Daemon, DaemonHandle};
use crate::highlight::{style_rule, LogSink};

#[derive(Parser)]
#[command(name = "heywake")]
#[command(version)]
#[command(about = "Flashes the screen when you have been idle for too long")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Watch for inactivity, reading host events from stdin
    Run,
    /// Replay a timed event script and print the highlight timeline
    Simulate {
        /// Script file with `<ms> <event>` lines
        script: PathBuf,

        /// Print every highlight call instead of only state changes
        #[arg(long)]
        all: bool,
    },
    /// Inspect or create the configuration file
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the effective configuration
    Show,
    /// Write the default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config = Config::load(cli.config.as_deref())?;

    // Initialize logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.general.log_level.to_ascii_lowercase()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let config_path = cli.config.clone().or_else(Config::default_config_path);
    tracing::debug!(
        "Config path: {}",
        config_path
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "(none, using defaults)".to_string())
    );

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => run(config, cli.config.as_deref()).await,
        Commands::Simulate { script, all } => simulate(&config, &script, all),
        Commands::Config { action } => match action {
            ConfigAction::Show => {
                print!("{}", toml::to_string_pretty(&config)?);
                println!("# {}", style_rule(&config.flash.color));
                Ok(())
            }
            ConfigAction::Init { force } => {
                let path = config_path.context("No config path available")?;
                if path.exists() && !force {
                    anyhow::bail!("{} already exists (use --force to overwrite)", path.display());
                }
                Config::default().save(Some(&path))?;
                println!("Wrote {}", path.display());
                Ok(())
            }
        },
    }
}

/// Run the daemon with stdin standing in for the host's event stream
async fn run(config: Config, config_path: Option<&Path>) -> anyhow::Result<()> {
    let sink = LogSink::new(config.flash.color.clone());
    let mut daemon = Daemon::new(config.settings(), sink);
    let handle = daemon.handle();
    let daemon_task = tokio::spawn(async move { daemon.run().await });

    tracing::info!(
        "heywake is running. Enter activity, hide, show, focus, reload or quit (empty line = activity)"
    );

    let mut lines = tokio::io::BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                match line? {
                    Some(line) => {
                        if !dispatch_line(line.trim(), &handle, config_path) {
                            break;
                        }
                    }
                    None => break,
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    handle.shutdown();
    daemon_task.await??;
    Ok(())
}

/// Translate one stdin line into a host event. Returns false to quit.
fn dispatch_line(line: &str, handle: &DaemonHandle, config_path: Option<&Path>) -> bool {
    match line {
        "" | "activity" => handle.activity(),
        "hide" => handle.visibility_lost(),
        "show" => handle.visibility_restored(),
        "focus" => handle.focus(),
        "reload" => match Config::load(config_path) {
            Ok(config) => {
                tracing::info!("Configuration reloaded");
                handle.update_settings(config.settings());
            }
            Err(e) => tracing::warn!("Failed to reload config: {:#}", e),
        },
        "quit" | "exit" => return false,
        other => tracing::warn!("Unknown command: {}", other),
    }
    true
}

fn simulate(config: &Config, script_path: &Path, all: bool) -> anyhow::Result<()> {
    let source = std::fs::read_to_string(script_path)
        .with_context(|| format!("Failed to read script from {:?}", script_path))?;
    let script = Script::parse(&source)
        .with_context(|| format!("Failed to parse script {:?}", script_path))?;

    let mut sim = Simulation::new(config.settings());
    sim.start();
    sim.run_script(&script);

    let entries = if all {
        sim.timeline().to_vec()
    } else {
        sim.transitions()
    };
    for entry in &entries {
        println!("{}", entry);
    }
    if let Some(at) = sim.stalled_at() {
        println!(
            "zero cadence: timers stopped at {} ms, later steps only moved the clock",
            at.as_millis()
        );
    }
    println!(
        "{} highlight changes, {} cycles, flashing at end: {}",
        entries.len(),
        sim.watcher().flash().cycle_count(),
        sim.watcher().is_flashing()
    );
    Ok(())
}
