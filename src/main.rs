use clap::{Parser, Subcommand};
use std::fs::File;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::{Arc, Mutex};
use tracing_subscriber::EnvFilter;

mod application;
mod domain;
mod infrastructure;
mod plugins;
#[cfg(test)]
mod test_support;

use application::errors::BotError;
use infrastructure::adapters::ConsoleAdapter;
use infrastructure::config::Config;
use infrastructure::database::Storage;
use plugins::builtin::builtins;
use plugins::PluginManager;

#[derive(Parser)]
#[command(name = "keel-bot")]
#[command(about = "An event-driven chat bot with a plugin runtime", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file path
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,

    /// Log at debug level
    #[arg(short, long)]
    debug: bool,

    /// Write the log to this file instead of stderr
    #[arg(long)]
    logfile: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the bot on the console transport
    Run,
    /// Show version
    Version,
    /// Generate default config
    InitConfig,
    /// Show the registered plugins in start order
    Plugins,
}

fn init_logging(level: &str, debug: bool, logfile: Option<&Path>) -> Result<(), BotError> {
    let filter = if debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
    };
    let builder = tracing_subscriber::fmt().with_target(false).with_env_filter(filter);
    match logfile {
        Some(path) => {
            let file = File::create(path)
                .map_err(|e| BotError::Internal(format!("cannot open log file {}: {}", path.display(), e)))?;
            builder.with_ansi(false).with_writer(Mutex::new(file)).init();
        }
        None => builder.with_writer(std::io::stderr).init(),
    }
    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Version => {
            println!("keel-bot v{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        Commands::InitConfig => init_config(),
        Commands::Plugins => list_plugins(&cli),
        Commands::Run => run_bot(&cli),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "Exiting");
            eprintln!("keel-bot: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run_bot(cli: &Cli) -> Result<(), BotError> {
    let config = Config::load_or_default(&cli.config)?;
    init_logging(&config.logging.level, cli.debug, cli.logfile.as_deref())?;
    tracing::info!(name = %config.bot.name, config = %cli.config.display(), "Starting keel-bot");

    let manager = PluginManager::new(builtins(), &config.plugins.disabled)?;
    let storage = Storage::new(&config.storage.path);
    let transport = Arc::new(ConsoleAdapter::new(&config.bot.name, config.adapters.console.clone()));

    let rt = tokio::runtime::Runtime::new().map_err(|e| BotError::Internal(e.to_string()))?;
    rt.block_on(manager.run(transport, storage, &config.runtime))
}

fn list_plugins(cli: &Cli) -> Result<(), BotError> {
    let config = Config::load_or_default(&cli.config)?;
    let manager = PluginManager::new(builtins(), &config.plugins.disabled)?;
    for plugin in manager.list_plugins() {
        let state = if plugin.running { "running" } else { "stopped" };
        let dependencies = if plugin.dependencies.is_empty() {
            String::new()
        } else {
            format!(" (after {})", plugin.dependencies.join(", "))
        };
        println!(
            "{:<12} {:<18} {:<8} {}{}",
            plugin.name,
            plugin.mode.to_string(),
            state,
            plugin.description,
            dependencies
        );
    }
    Ok(())
}

fn init_config() -> Result<(), BotError> {
    let yaml = Config::default().to_yaml()?;
    println!("{}", yaml);
    println!("# Save this to config.yaml and adjust as needed.");
    Ok(())
}
