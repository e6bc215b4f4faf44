use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use modhost_core::{BinaryCache, HostSettings, ModManager};

#[derive(Parser, Debug)]
#[command(name = "modhost")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Modhost - native mod loader and lifecycle host")]
struct Args {
    /// Directory containing mod folders (overrides settings)
    #[arg(long)]
    mods_dir: Option<PathBuf>,

    /// Load settings from a specific file
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Number of update ticks to drive after startup
    #[arg(long, default_value_t = 0)]
    ticks: u64,
}

fn main() -> Result<()> {
    setup_tracing();

    let args = Args::parse();

    let mut settings = HostSettings::load_or_default(args.config.as_deref())?;
    if let Some(mods_dir) = args.mods_dir {
        settings.mods_dir = mods_dir;
    }

    info!(
        "host startup: mods_dir={}, cache_dir={}, ticks={}",
        settings.mods_dir.display(),
        settings.cache_dir.display(),
        args.ticks
    );

    let cache = BinaryCache::new(settings.cache_dir.clone());
    let mut manager = ModManager::new(cache);
    manager.scan(&settings.mods_dir)?;

    // One full host session: activate, announce the runtime, tick, tear down.
    manager.start_all();
    info!(
        "started {}/{} mods",
        manager.started_count(),
        manager.count()
    );

    manager.fire_engine_init();
    manager.fire_program_start();

    for _ in 0..args.ticks {
        manager.fire_update();
    }

    manager.uninstall_all();

    Ok(())
}

fn setup_tracing() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
}
