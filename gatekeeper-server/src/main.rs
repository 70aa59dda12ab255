// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Gatekeeper — edge API gateway
//
//  Architecture: monoio thread-per-core + shared-nothing data plane
//  Pipeline:     authentication → authorization → trace enrichment
//  Routing:      /<service>/<backend-path> via the instance table
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

use clap::Parser;
use gatekeeper_core::GatewayConfig;
use gatekeeper_discovery::TableRegistry;
use gatekeeper_filter::FilterRegistry;
use gatekeeper_observability::GatewayMetrics;
use gatekeeper_proxy::{SharedState, spawn_workers};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::info;

/// Global shutdown flag — checked by signal handler.
static SHUTDOWN: AtomicBool = AtomicBool::new(false);

#[derive(Parser, Debug)]
#[command(name = "gatekeeper", version, about = "Gatekeeper — edge API gateway")]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "/etc/gatekeeper/gatekeeper.yaml")]
    config: PathBuf,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // ── Tracing ──
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cli.log_level)),
        )
        .with_target(false)
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "Gatekeeper starting");

    // ── Config ──
    let mut config = if cli.config.exists() {
        info!(path = %cli.config.display(), "Loading config file");
        GatewayConfig::load(&cli.config)?
    } else {
        info!("No config file found, using defaults");
        GatewayConfig::default()
    };
    config.prepare();

    let num_workers = config.effective_workers();
    info!(workers = num_workers, "Worker count");

    // ── Service instance table ──
    let registry = Arc::new(TableRegistry::from_seed(&config.discovery.services));
    info!(services = registry.len(), "Instance table seeded");

    // ── Filters, in pipeline order ──
    let filters = Arc::new(FilterRegistry::new());
    gatekeeper_filters::register_builtins(&filters, &config)
        .map_err(|e| anyhow::anyhow!("filter registration failed: {e}"))?;
    info!(filters = filters.len(), "Filters registered");

    // ── Metrics ──
    let metrics = GatewayMetrics::new()?;

    // ── Shared state + workers ──
    let proxy_addr = config.server.http_addr;
    let shared = SharedState::new(config, filters, registry, metrics);
    let worker_handles = spawn_workers(Arc::clone(&shared), num_workers);

    info!(
        workers = num_workers,
        proxy_addr = %proxy_addr,
        "Gatekeeper is ready — serving traffic"
    );

    // ── Graceful shutdown: wait for SIGTERM/SIGINT ──
    setup_signal_handler();

    while !SHUTDOWN.load(Ordering::Relaxed) {
        std::thread::sleep(std::time::Duration::from_millis(100));
    }

    info!("Shutdown signal received, stopping...");

    // Workers run an infinite accept loop; on process exit all threads
    // are cleaned up by the OS.
    drop(worker_handles);

    info!("Gatekeeper stopped");
    Ok(())
}

fn setup_signal_handler() {
    // SIGTERM (docker stop) + SIGINT (Ctrl+C)
    for sig in [libc::SIGTERM, libc::SIGINT] {
        unsafe {
            libc::signal(sig, signal_handler as libc::sighandler_t);
        }
    }
}

extern "C" fn signal_handler(_sig: libc::c_int) {
    SHUTDOWN.store(true, Ordering::Relaxed);
}
