mod commands;

use anyhow::{Context, Result};
use clap::Parser;
use commands::Console;
use guildhall_core::config::GuildhallConfig;
use guildhall_core::core_guild::GuildServices;
use guildhall_core::core_session::{SessionEvent, SessionHandle};
use guildhall_core::logging::{init_logging_with_config, LogConfig};
use guildhall_core::metrics::init_metrics;
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "guildhall")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Set the log level (trace, debug, info, warn, error)
    #[arg(short, long)]
    log_level: Option<String>,

    /// Enable JSON formatted logging
    #[arg(long)]
    json_logs: bool,

    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Subcommand to execute
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Parser, Debug)]
enum Command {
    /// Read `<player> <text>` lines from stdin (default)
    Console,

    /// Print the effective configuration as TOML
    PrintConfig,
}

fn load_config(args: &Args) -> Result<GuildhallConfig> {
    let mut config = match &args.config {
        Some(path) => GuildhallConfig::from_file(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => GuildhallConfig::default(),
    };
    config.apply_env()?;
    if let Some(level) = &args.log_level {
        config.logging.level = level.clone();
    }
    if args.json_logs {
        config.logging.json_format = true;
    }
    config.validate()?;
    Ok(config)
}

fn print_event(event: SessionEvent) {
    match event {
        SessionEvent::ScreenShown { player, view } => {
            println!("== {} | {} ==", player, view.title);
            print!("{}", view.grid);
        }
        SessionEvent::ScreenClosed { player, title } => println!("[{}] closed {}", player, title),
        SessionEvent::Message { player, text } => println!("[{}] {}", player, text),
        SessionEvent::InputRequested {
            player,
            prompt,
            cancel_keyword,
        } => println!("[{}] {} (type '{}' to cancel)", player, prompt, cancel_keyword),
        SessionEvent::SessionEnded { player } => println!("[{}] session ended", player),
    }
}

async fn run_console(config: GuildhallConfig) -> Result<()> {
    let sessions = config.sessions.clone();
    let services = GuildServices::from_config(config)?;
    let (handle, session_task) = SessionHandle::new(services.clone(), sessions);

    let printer = {
        let handle = handle.clone();
        tokio::spawn(async move {
            while let Some(event) = handle.next_event().await {
                print_event(event);
            }
        })
    };

    let console = Console::new(services, handle.clone());
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    info!("Console ready; enter `<player> <text>` lines");

    while let Some(line) = lines.next_line().await? {
        if let Err(e) = console.handle_line(&line).await {
            warn!(error = %e, "Session loop unavailable");
            break;
        }
    }

    handle.shutdown().await?;
    session_task.await?;
    printer.abort();
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = load_config(&args)?;

    if let Some(Command::PrintConfig) = args.command {
        print!("{}", config.to_toml()?);
        return Ok(());
    }

    init_logging_with_config(LogConfig::from_section(&config.logging)?)?;
    init_metrics();

    info!("Guildhall started");
    run_console(config).await?;
    info!("Guildhall finished");

    Ok(())
}
