use anyhow::{Context, Result};
use prayerbell::cli::{self, Command, Invocation};
use prayerbell::config::Config;
use prayerbell::context::{AppContext, SharedContext, StandardContext};
use prayerbell::controller::{ReminderEngine, provider_from_config};
use prayerbell::model::CountdownDisplay;
use prayerbell::sink::RecordingSink;
use prayerbell::system::spawn_engine;
use simplelog::{
    ColorChoice, CombinedLogger, ConfigBuilder, LevelFilter, SharedLogger, TermLogger,
    TerminalMode, WriteLogger,
};
use std::env;
use std::fs::OpenOptions;
use std::sync::Arc;
use std::time::Duration;

fn init_logging(ctx: &dyn AppContext, verbose: bool) {
    let log_config = ConfigBuilder::new()
        .set_target_level(LevelFilter::Error)
        .build();
    let term_level = if verbose {
        LevelFilter::Info
    } else {
        LevelFilter::Warn
    };

    let mut loggers: Vec<Box<dyn SharedLogger>> = vec![TermLogger::new(
        term_level,
        log_config.clone(),
        TerminalMode::Stderr,
        ColorChoice::Auto,
    )];

    if let Some(path) = ctx.get_log_path() {
        let file = path
            .parent()
            .map(std::fs::create_dir_all)
            .transpose()
            .and_then(|_| OpenOptions::new().create(true).append(true).open(&path));
        match file {
            Ok(f) => loggers.push(WriteLogger::new(LevelFilter::Debug, log_config, f)),
            Err(e) => eprintln!("Warning: cannot open log file {}: {}", path.display(), e),
        }
    }

    // Only fails when a logger is already set.
    let _ = CombinedLogger::init(loggers);
}

fn build_engine(ctx: SharedContext, config: &Config, dry_run: bool) -> ReminderEngine {
    if dry_run {
        ReminderEngine::new(
            ctx,
            config,
            provider_from_config(config),
            Box::new(RecordingSink::granted()),
        )
    } else {
        ReminderEngine::from_config(ctx, config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = env::args().skip(1).collect();
    let Invocation {
        root,
        dry_run,
        command,
    } = match cli::parse_args(args) {
        Ok(inv) => inv,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            eprintln!();
            cli::print_help("prayerbell");
            std::process::exit(2);
        }
    };

    if command == Command::Help {
        cli::print_help("prayerbell");
        return Ok(());
    }

    let ctx: SharedContext = Arc::new(StandardContext::new(root));
    init_logging(ctx.as_ref(), command == Command::Run);

    let config = Config::load_or_default(ctx.as_ref()).context("Failed to load config.toml")?;
    // Leave an editable config behind on first start.
    if let Ok(path) = ctx.get_config_file_path()
        && !path.exists()
    {
        match config.save(ctx.as_ref()) {
            Ok(()) => log::info!("Wrote default config to {}", path.display()),
            Err(e) => log::warn!("Could not write default config: {:#}", e),
        }
    }
    let mut engine = build_engine(ctx.clone(), &config, dry_run);

    match command {
        Command::Run => run(engine, &config).await,
        Command::Next => {
            let now = chrono::Local::now().naive_local();
            let next = engine.preview_at(now);
            if let Some(schedule) = engine.schedule() {
                println!("{} ({:?})", schedule.date(), schedule.source());
                for event in schedule.events() {
                    println!("  {:<8} {}", event.label, event.time.format("%H:%M"));
                }
            }
            if let Some(next) = next {
                println!();
                println!("{}", next.countdown_text());
            }
            Ok(())
        }
        Command::Policy => {
            println!("{}", serde_json::to_string_pretty(&engine.policy())?);
            Ok(())
        }
        Command::Set(pairs) => {
            let patch = cli::parse_set(&pairs, &engine.policy())?;
            let policy = engine.update_policy(&patch)?;
            if engine.snapshot().persist_pending {
                eprintln!("Warning: settings apply to this session only, saving failed.");
            }
            println!("{}", serde_json::to_string_pretty(&policy)?);
            Ok(())
        }
        Command::Test => {
            let outcome = engine.trigger_test_notification();
            println!("{:?}", outcome);
            // The desktop sink hands the notice to a thread; let it reach the daemon.
            tokio::time::sleep(Duration::from_millis(500)).await;
            Ok(())
        }
        Command::Permission => {
            println!("{:?}", engine.request_permission());
            Ok(())
        }
        Command::Help => Ok(()),
    }
}

async fn run(engine: ReminderEngine, config: &Config) -> Result<()> {
    let tick = Duration::from_secs(config.tick_seconds.max(1));
    let (handle, task) = spawn_engine(engine, tick, config.precise_wakeups);
    log::info!(
        "Reminder loop started (tick {}s, at {:.2}, {:.2})",
        tick.as_secs(),
        config.latitude,
        config.longitude
    );

    let mut updates = handle.subscribe();
    let mut last_countdown = String::new();
    loop {
        tokio::select! {
            changed = updates.changed() => {
                if changed.is_err() {
                    break;
                }
                let countdown = updates.borrow_and_update().countdown.clone();
                if !countdown.is_empty() && countdown != last_countdown {
                    println!("{}", countdown);
                    last_countdown = countdown;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                handle.stop().await;
                break;
            }
        }
    }

    task.await.context("Reminder engine task failed")?;
    Ok(())
}
