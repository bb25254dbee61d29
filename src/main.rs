use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::{info, level_filters::LevelFilter, warn};
use tracing_subscriber::EnvFilter;

use saykey::asr::{HttpEngine, NullEngine, SpeechEngine};
use saykey::backend::{EnigoBackend, InputMethod, KeyBackend, NullBackend};
use saykey::config::Config;
use saykey::devices;
use saykey::pipeline::Listener;
use saykey::table::CommandTable;

#[derive(Parser)]
#[command(name = "saykey", about = "Voice-driven command keyboard")]
struct Cli {
    /// Config file (default: config.toml next to the binary)
    #[arg(long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Listen to the microphone and dispatch voice commands (default)
    Run {
        /// Input device id, overrides the config
        #[arg(long)]
        device: Option<usize>,
    },
    /// List audio input devices
    Devices,
    /// Print the command table
    Commands,
    /// Add or update a shortcut
    Set {
        command: String,
        /// "+"-joined key names, e.g. ctrl+shift+s
        keys: String,
        #[arg(long, default_value = "")]
        description: String,
        #[arg(long, default_value = "")]
        category: String,
    },
    /// Remove a shortcut
    Remove { command: String },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_env_filter(EnvFilter::from_default_env().add_directive(LevelFilter::INFO.into()))
        .init();

    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref());

    match cli.command.unwrap_or(Command::Run { device: None }) {
        Command::Run { device } => run(config, device),
        Command::Devices => list_devices(),
        Command::Commands => {
            print_table(&CommandTable::load(&config.table.path));
            Ok(())
        }
        Command::Set {
            command,
            keys,
            description,
            category,
        } => {
            let mut table = CommandTable::load(&config.table.path);
            let updated = table.set(&command, &keys, &description, &category);
            table.save(&config.table.path)?;
            println!(
                "{} '{}' -> {}",
                if updated { "Updated" } else { "Added" },
                command,
                keys
            );
            Ok(())
        }
        Command::Remove { command } => {
            let mut table = CommandTable::load(&config.table.path);
            if table.remove(&command) {
                table.save(&config.table.path)?;
                println!("Removed '{}'", command);
            } else {
                println!("No such command '{}'", command);
            }
            Ok(())
        }
    }
}

fn run(mut config: Config, device: Option<usize>) -> Result<()> {
    if device.is_some() {
        config.audio.device = device;
    }

    let table = CommandTable::load(&config.table.path);
    if table.shortcuts.is_empty() {
        warn!("command table is empty; only builtin controls will resolve");
    }

    let method = InputMethod::parse(&config.dictation.method);
    let backend: Box<dyn KeyBackend> = match EnigoBackend::new(method) {
        Ok(backend) => Box::new(backend),
        Err(e) => {
            warn!("keyboard backend unavailable ({e}); dispatches will fail closed");
            Box::new(NullBackend)
        }
    };

    let engine: Box<dyn SpeechEngine> = match config.asr.url.as_deref() {
        Some(url) => {
            info!(url, "using recognition sidecar");
            Box::new(HttpEngine::new(
                url,
                Duration::from_secs(config.asr.timeout_secs),
            ))
        }
        None => {
            warn!("no [asr].url configured; audio will be segmented but never recognized");
            Box::new(NullEngine)
        }
    };

    let mut listener = Listener::start(&config, &table, engine, backend)?;

    let running = listener.running();
    ctrlc::set_handler(move || running.store(false, Ordering::SeqCst))?;

    info!("listening; press Ctrl+C to stop");
    while listener.is_running() {
        std::thread::sleep(Duration::from_millis(100));
    }
    listener.stop();
    info!("stopped");
    Ok(())
}

fn list_devices() -> Result<()> {
    let devices = devices::list()?;
    if devices.is_empty() {
        println!("No input devices found.");
        return Ok(());
    }
    for device in devices {
        println!(
            "{:3}  {}  ({}ch @ {}Hz, {})",
            device.id, device.name, device.channels, device.sample_rate, device.host_api
        );
    }
    Ok(())
}

fn print_table(table: &CommandTable) {
    if table.shortcuts.is_empty() {
        println!("Command table is empty.");
        return;
    }

    let mut categories: Vec<&str> = Vec::new();
    for entry in &table.shortcuts {
        if !categories.contains(&entry.category.as_str()) {
            categories.push(&entry.category);
        }
    }

    for category in categories {
        let label = if category.is_empty() { "uncategorized" } else { category };
        println!("[{}]", label);
        for entry in table.shortcuts.iter().filter(|e| e.category == category) {
            if entry.description.is_empty() {
                println!("  {:<16} {}", entry.command, entry.keys);
            } else {
                println!("  {:<16} {}  - {}", entry.command, entry.keys, entry.description);
            }
        }
        println!();
    }

    if !table.synonyms.is_empty() {
        println!("[synonyms]");
        for synonym in &table.synonyms {
            println!("  {:<16} -> {}", synonym.phrase, synonym.command);
        }
    }
}
