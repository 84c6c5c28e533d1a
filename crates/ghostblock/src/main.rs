//! `ghostblock` - CLI for the ghost-touch filter
//!
//! This binary manages blocked regions and settings, records ghost touches
//! and runs the filter over a stream of touch events read from stdin.

#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tokio::io::{AsyncWriteExt, BufReader};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use ghostblock::cli::{
    Cli, Command, ConfigCommand, RecordCommand, RegionsCommand, SettingsCommand,
};
use ghostblock::settings::{check_range, DURATION_RANGE};
use ghostblock::touch::LineTouchSource;
use ghostblock::{
    init_logging, BlockedRegion, Config, Decision, GhostBlock, GuardEvent, KeyValueStore, Point,
    Scheduler, SqliteStore, TokioScheduler, TouchEvent, TouchSource,
};

/// How often `filter` refreshes regions and settings from the database.
const RELOAD_INTERVAL: Duration = Duration::from_secs(2);

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging based on verbosity
    init_logging(cli.verbosity());

    // Load configuration
    let config = Config::load_from(cli.config.clone())?;

    match cli.command {
        Command::Config(config_cmd) => handle_config(&config, config_cmd),
        command => {
            let runtime = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()
                .context("failed to start async runtime")?;

            let store = SqliteStore::open(config.database_path())?;
            let kv: Arc<dyn KeyValueStore> = Arc::new(store);
            let scheduler: Arc<dyn Scheduler> =
                Arc::new(TokioScheduler::new(runtime.handle().clone()));
            let engine = GhostBlock::open(kv, scheduler, &config);

            let result = run(&engine, &runtime, &config, command);

            engine.shutdown();
            drop(engine);
            // A stdin read may still be parked on a blocking thread.
            runtime.shutdown_background();
            result
        }
    }
}

fn run(
    engine: &GhostBlock,
    runtime: &tokio::runtime::Runtime,
    config: &Config,
    command: Command,
) -> anyhow::Result<()> {
    match command {
        Command::Status(status_cmd) => handle_status(engine, config, status_cmd.json),
        Command::Regions(regions_cmd) => handle_regions(engine, regions_cmd),
        Command::Check(check_cmd) => {
            handle_check(engine, Point::new(check_cmd.x, check_cmd.y));
            Ok(())
        }
        Command::Record(record_cmd) => runtime.block_on(handle_record(engine, &record_cmd)),
        Command::Filter => runtime.block_on(handle_filter(engine)),
        Command::Settings(settings_cmd) => handle_settings(engine, settings_cmd),
        Command::Config(config_cmd) => handle_config(config, config_cmd),
    }
}

fn handle_status(engine: &GhostBlock, config: &Config, json: bool) -> anyhow::Result<()> {
    let status = engine.status();
    if json {
        println!("{}", serde_json::to_string_pretty(&status)?);
    } else {
        println!("ghostblock status");
        println!("-----------------");
        println!(
            "Filtering:     {}",
            if status.enabled { "enabled" } else { "disabled" }
        );
        println!("Regions:       {}", status.region_count);
        println!("Block radius:  {} px", status.block_radius_pixels);
        println!("Record length: {} s", status.record_duration_seconds);
        println!("Database:      {}", config.database_path().display());
        if let Some(pid) = status.recording_elsewhere {
            println!("Recording:     in process {pid}");
        }
        if engine.recovered_stale_session() {
            println!();
            println!("Note: an interrupted recording session was discarded.");
        }
    }
    Ok(())
}

fn handle_regions(engine: &GhostBlock, cmd: RegionsCommand) -> anyhow::Result<()> {
    match cmd {
        RegionsCommand::List { json } => {
            let regions = engine.regions();
            if json {
                println!("{}", serde_json::to_string_pretty(&regions)?);
            } else if regions.is_empty() {
                println!("No blocked regions.");
            } else {
                for (index, region) in regions.iter().enumerate() {
                    println!("{index:>3}  {region}");
                }
            }
        }
        RegionsCommand::Add { x, y, radius } => {
            let radius = radius.unwrap_or_else(|| engine.settings().block_radius());
            let region = BlockedRegion::new(x, y, radius);
            engine.add_region(region)?;
            println!("Blocked {region}");
        }
        RegionsCommand::Remove { index } => {
            let removed = engine.remove_region(index)?;
            println!("Removed {removed}");
        }
        RegionsCommand::Clear { yes } => {
            if yes {
                let count = engine.regions().len();
                engine.clear_regions()?;
                println!("Removed {count} region(s).");
            } else {
                println!("This will remove every blocked region.");
                println!("Use --yes to confirm.");
            }
        }
    }
    Ok(())
}

fn handle_check(engine: &GhostBlock, point: Point) {
    let decision = engine.decide(&TouchEvent::at(point));
    println!("{point}: {decision}");
}

async fn handle_record(engine: &GhostBlock, cmd: &RecordCommand) -> anyhow::Result<()> {
    let mut events = engine.subscribe();
    match cmd.duration {
        Some(seconds) => {
            check_range("duration", seconds, &DURATION_RANGE)?;
            engine.start_recording_for(Duration::from_secs(u64::from(seconds)))?;
        }
        None => engine.start_recording()?,
    }

    let remaining = engine.status().remaining_seconds.unwrap_or_default();
    println!("Recording for {remaining} s. Touch the ghost spots; end input to stop early.");

    let mut source = LineTouchSource::new(BufReader::new(tokio::io::stdin()));
    debug!(source = source.name(), "Reading touches");

    loop {
        tokio::select! {
            touch = source.next_event() => {
                if let Some(touch) = touch {
                    engine.decide(&touch);
                } else {
                    if let Some(summary) = engine.stop_recording() {
                        println!("{summary}");
                    }
                    break;
                }
            }
            Some(event) = events.recv() => match event {
                GuardEvent::PointCaptured(point) => println!("Captured {point}"),
                GuardEvent::SessionFinished(summary) => {
                    println!("{summary}");
                    break;
                }
            },
        }
    }
    Ok(())
}

async fn handle_filter(engine: &GhostBlock) -> anyhow::Result<()> {
    let mut source = LineTouchSource::new(BufReader::new(tokio::io::stdin()));
    let mut stdout = tokio::io::stdout();
    let (mut forwarded, mut suppressed) = (0_usize, 0_usize);

    // Pick up regions and settings changed by other invocations.
    let mut refresh = tokio::time::interval(RELOAD_INTERVAL);
    refresh.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            touch = source.next_event() => {
                let Some(touch) = touch else { break };
                match engine.decide(&touch) {
                    Decision::Forward => {
                        forwarded += 1;
                        let line = format!("{} {}\n", touch.point.x, touch.point.y);
                        stdout.write_all(line.as_bytes()).await?;
                        stdout.flush().await?;
                    }
                    Decision::Suppress => suppressed += 1,
                    Decision::Capture => {}
                }
            }
            _ = refresh.tick() => {
                if let Err(e) = engine.reload() {
                    warn!(error = %e, "Could not reload blocked regions");
                }
            }
        }
    }

    info!(forwarded, suppressed, "Touch input ended");
    Ok(())
}

fn handle_settings(engine: &GhostBlock, cmd: SettingsCommand) -> anyhow::Result<()> {
    match cmd {
        SettingsCommand::Show { json } => {
            let settings = engine.settings();
            if json {
                println!("{}", serde_json::to_string_pretty(&settings)?);
            } else {
                println!("Enabled:         {}", settings.enabled);
                println!("Block radius:    {} px", settings.block_radius_pixels);
                println!("Record duration: {} s", settings.record_duration_seconds);
            }
        }
        SettingsCommand::Radius { pixels } => {
            engine.set_block_radius(pixels)?;
            println!("Block radius set to {pixels} px.");
        }
        SettingsCommand::Duration { seconds } => {
            engine.set_record_duration(seconds)?;
            println!("Record duration set to {seconds} s.");
        }
        SettingsCommand::Enable => {
            engine.set_enabled(true)?;
            println!("Filtering enabled.");
        }
        SettingsCommand::Disable => {
            engine.set_enabled(false)?;
            println!("Filtering disabled.");
        }
    }
    Ok(())
}

fn handle_config(config: &Config, cmd: ConfigCommand) -> anyhow::Result<()> {
    match cmd {
        ConfigCommand::Show { json } => {
            if json {
                println!("{}", serde_json::to_string_pretty(config)?);
            } else {
                println!("Current Configuration");
                println!("=====================");
                println!();
                println!("[Storage]");
                println!("  Database path:      {}", config.database_path().display());
                println!();
                println!("[Filter]");
                println!("  Enabled:            {}", config.filter.enabled);
                println!("  Block radius:       {}", config.filter.block_radius_pixels);
                println!(
                    "  Record duration:    {}",
                    config.filter.record_duration_seconds
                );
                println!();
                println!("[Session]");
                println!("  Summary points:     {}", config.session.summary_points);
            }
        }
        ConfigCommand::Path => {
            println!("{}", Config::default_config_path().display());
        }
        ConfigCommand::Validate { file } => {
            let path = file.unwrap_or_else(Config::default_config_path);
            println!("Validating configuration: {}", path.display());
            match Config::load_from(Some(path)) {
                Ok(_) => println!("Configuration is valid."),
                Err(e) => println!("Configuration error: {e}"),
            }
        }
    }
    Ok(())
}
