//! voicenav console host
//!
//! Runs the navigation controller against the simulated engine. Each stdin
//! line is one engine event (`final search`, `partial one`, `speech-ended`,
//! `timeout`, `error <cause>`); `status` prints the controller status and
//! `quit` exits.

use anyhow::{Context, Result};
use clap::Parser;
use std::io::BufRead;
use std::path::PathBuf;
use voicenav::assets::{AssetSync, ExistingDirectory};
use voicenav::engine::{event_channel, EngineEvent, SimulatedEngine};
use voicenav::navigation::{Lifecycle, NavigationRuntime, VoiceNavigationController};
use voicenav::output::{ChannelSink, PresentationOutput};
use voicenav::{config, logging};

#[derive(Parser)]
#[command(name = "voicenav")]
#[command(version)]
#[command(about = "Voice navigation over a speech recognition engine", long_about = None)]
struct Cli {
    /// Path to config file (default: ~/.voicenav/config.json)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Bundled asset directory to synchronise from
    #[arg(long)]
    assets: Option<PathBuf>,

    /// Working asset directory
    #[arg(long)]
    target: Option<PathBuf>,

    /// Directory for voicenav.log
    #[arg(long)]
    log_dir: Option<PathBuf>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = config::load_or_default(cli.config.as_deref());
    if let Some(source) = cli.assets {
        config.assets.source_dir = Some(source);
    }
    if let Some(target) = cli.target {
        config.assets.target_dir = target;
    }
    let log_dir = cli.log_dir.or_else(|| config.logging.log_dir.clone());
    logging::init(log_dir.as_deref(), &config.logging.filter);

    let (registry, table) = config
        .navigation
        .build()
        .context("Invalid navigation configuration")?;

    let (events_tx, events_rx) = event_channel();
    let engine = SimulatedEngine::new(events_tx);
    let injector = engine.handle();
    let (sink, outputs) = ChannelSink::new();
    let controller = VoiceNavigationController::new(
        registry,
        table,
        engine,
        sink,
        config.navigation.controller_options(),
    )?;

    let printer = std::thread::spawn(move || {
        for output in outputs {
            match output {
                PresentationOutput::Prompt(text) => println!("> {}", text),
                PresentationOutput::Notification(text) => println!("* {}", text),
                PresentationOutput::Fatal(cause) => println!("! {}", cause),
            }
        }
    });

    let target = config.assets.target_dir.clone();
    let runtime = match config.assets.source_dir.clone() {
        Some(source) => {
            NavigationRuntime::spawn(controller, events_rx, AssetSync::new(source, target))
        }
        None => NavigationRuntime::spawn(controller, events_rx, ExistingDirectory(target)),
    };

    for line in std::io::stdin().lock().lines() {
        let line = line.context("Failed to read stdin")?;
        let line = line.trim();
        match line {
            "" => continue,
            "quit" | "exit" => break,
            "status" => println!("{}", serde_json::to_string_pretty(&runtime.status())?),
            _ => match line.parse::<EngineEvent>() {
                Ok(event) => {
                    injector.emit(event);
                }
                Err(e) => eprintln!("{}", e),
            },
        }
    }

    let status = runtime.shutdown();
    if printer.join().is_err() {
        tracing::warn!("Output printer thread panicked");
    }

    if let Lifecycle::Failed(cause) = status.lifecycle {
        anyhow::bail!(cause);
    }
    Ok(())
}
