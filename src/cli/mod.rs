use anyhow::{Context, Result};
use console::style;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{Level, info};
use tracing_subscriber::FmtSubscriber;

use crate::core::auth::AuthorizationGate;
use crate::core::config::{Config, ConfigHandle};
use crate::core::executor::CommandExecutor;
use crate::core::gpio::{GpioController, SysfsGpio};
use crate::core::guard::WhitelistGuard;
use crate::core::lifecycle::LifecycleManager;
use crate::core::motion::MotionGate;
use crate::core::scheduler::Scheduler;
use crate::core::store::EventStore;
use crate::core::store::types::EventType;
use crate::core::terminal;
use crate::interfaces::camera::{Camera, MotionSpool, MotionWatcher, motion_channel};
use crate::interfaces::telegram::TelegramInterface;
use crate::logging::TeeMakeWriter;
use crate::platform::{NativePlatform, Platform};

const DEFAULT_CONFIG_PATH: &str = "vigil.toml";

pub(crate) async fn run_main() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();
    match args.get(1).map(String::as_str) {
        Some("help") | Some("--help") | Some("-h") => {
            print_help();
            Ok(())
        }
        Some("run") => run(parse_config_flag(&args, 2)).await,
        Some(flag) if flag.starts_with('-') => run(parse_config_flag(&args, 1)).await,
        None => run(None).await,
        Some(other) => {
            terminal::print_error(&format!("Unknown command: {other}"));
            print_help();
            Ok(())
        }
    }
}

fn parse_config_flag(args: &[String], start: usize) -> Option<PathBuf> {
    let mut i = start;
    while i < args.len() {
        match args[i].as_str() {
            "--config" | "-c" => {
                if i + 1 < args.len() {
                    return Some(PathBuf::from(&args[i + 1]));
                }
                i += 1;
            }
            _ => i += 1,
        }
    }
    None
}

fn print_help() {
    terminal::print_banner();
    println!(" {}", style("Usage:").bold());
    println!(
        "   {} {}",
        style("vigil").green(),
        style("[run] [--config <path>]").dim()
    );
    println!();
    println!(" {}", style("Commands:").bold());
    println!("   run        Start the controller (default)");
    println!("   help       Show this help");
    println!();
    println!(
        " The config file defaults to ./{DEFAULT_CONFIG_PATH} — see vigil.example.toml"
    );
}

async fn run(config_path: Option<PathBuf>) -> Result<()> {
    let config_path = config_path.unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));
    let config = Config::load(&config_path).await?;

    let data_dir = config.paths.data_dir.clone();
    let media_dir = config.media_dir();
    for dir in [&data_dir, &media_dir, &media_dir.join("motion"), &config.logs_dir()] {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("failed to create {}", dir.display()))?;
    }
    NativePlatform::restrict_dir_permissions(&data_dir);

    let make_writer = TeeMakeWriter::open(&config.logs_dir().join("vigil.log"))
        .context("failed to open log file")?;
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_writer(make_writer)
        .finish();
    tracing::subscriber::set_global_default(subscriber).ok();

    terminal::print_banner();
    info!("starting vigil with config {}", config_path.display());

    let db_path = config.db_path();
    let config = ConfigHandle::new(config);

    let store = Arc::new(EventStore::open(&db_path)?);
    let guard = WhitelistGuard::new(config.clone());
    let executor = Arc::new(CommandExecutor::new(
        guard.clone(),
        config.clone(),
        store.clone(),
    ));
    let scheduler = Arc::new(Scheduler::new(store.clone(), executor.clone(), guard));
    let auth = Arc::new(AuthorizationGate::new(config.clone(), store.clone()));
    let motion = Arc::new(MotionGate::new(config.clone(), store.clone()));
    let gpio = Arc::new(GpioController::new(
        Arc::new(SysfsGpio::new()),
        config.clone(),
        store.clone(),
    ));
    let camera = Arc::new(Camera::new(media_dir.clone()));

    let telegram = TelegramInterface::new(
        config.clone(),
        store.clone(),
        auth,
        executor,
        scheduler.clone(),
        motion.clone(),
        gpio,
        camera,
    );
    let notifier = Arc::new(telegram.notifier());

    // External detectors drop frames into media/motion; each new file is one
    // raw motion signal.
    let (motion_tx, motion_rx) = motion_channel();
    let watcher = MotionWatcher::new(motion_rx, motion, notifier);
    MotionSpool::new(media_dir.join("motion"), motion_tx).spawn();

    let mut lifecycle = LifecycleManager::new(scheduler);
    lifecycle.attach(Arc::new(Mutex::new(watcher)));
    lifecycle.attach(Arc::new(Mutex::new(telegram)));

    spawn_config_reloader(config.clone(), config_path.clone());

    store
        .record_event(EventType::SystemStarted, "controller started", None)
        .await?;
    lifecycle.start().await?;
    terminal::print_success("vigil is running. Press Ctrl-C to stop.");

    tokio::signal::ctrl_c().await?;
    lifecycle.shutdown().await?;
    Ok(())
}

/// SIGHUP swaps in a freshly parsed config snapshot: whitelist, operator and
/// pin edits apply immediately, no restart. A bad file keeps the old snapshot.
#[cfg(unix)]
fn spawn_config_reloader(config: ConfigHandle, config_path: PathBuf) {
    tokio::spawn(async move {
        let Ok(mut hangup) =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::hangup())
        else {
            return;
        };
        while hangup.recv().await.is_some() {
            match config.reload_from(&config_path).await {
                Ok(()) => info!("config reloaded from {}", config_path.display()),
                Err(e) => tracing::error!("config reload failed, keeping old snapshot: {e:#}"),
            }
        }
    });
}
