use clap::{Parser, Subcommand};
use region_grid::api::{browser_router, server_router};
use region_grid::config::{BROWSER_HTTP_PORT, LoggingSettings, SERVER_HTTP_PORT, Settings};
use region_grid::engine::embedded::EmbeddedEngine;
use region_grid::engine::registry::CacheHandleRegistry;
use region_grid::lifecycle::client::ClientConnection;
use region_grid::lifecycle::member::ClusterMemberLifecycle;
use region_grid::lifecycle::supervisor::LifecycleSupervisor;
use region_grid::region::data::DataService;
use region_grid::region::management::HttpManagementClient;
use region_grid::region::reconciler::RegionProxyReconciler;
use region_grid::region::service::{ClientRegionService, ServerRegionService};
use std::sync::Arc;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "region-grid", about = "In-memory data grid with a REST surface")]
struct Cli {
    /// YAML settings file layered over the defaults.
    #[arg(long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run a standalone locator.
    Locator,
    /// Run a server member (plus an embedded locator when `locator.enabled`).
    Server,
    /// Run the data browser: a client cache behind the REST API.
    Browser,
}

fn init_tracing(logging: &LoggingSettings) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if logging.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn shutdown_channel() -> (watch::Sender<bool>, watch::Receiver<bool>) {
    let (tx, rx) = watch::channel(false);
    let signal_tx = tx.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Shutdown requested");
            let _ = signal_tx.send(true);
        }
    });
    (tx, rx)
}

async fn wait_for_shutdown(mut shutdown: watch::Receiver<bool>) {
    while !*shutdown.borrow() {
        if shutdown.changed().await.is_err() {
            return;
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let settings = Settings::load(cli.config.as_deref())?;
    init_tracing(&settings.logging);

    let (_shutdown_tx, shutdown_rx) = shutdown_channel();

    match cli.command {
        Command::Locator => run_locator(settings, shutdown_rx).await,
        Command::Server => run_server(settings, shutdown_rx).await,
        Command::Browser => run_browser(settings, shutdown_rx).await,
    }
}

async fn run_locator(settings: Settings, shutdown: watch::Receiver<bool>) -> anyhow::Result<()> {
    if !settings.locator.enabled {
        tracing::warn!("locator.enabled is false; nothing to run");
        return Ok(());
    }

    let mut supervisor = LifecycleSupervisor::new();
    supervisor.register(Arc::new(ClusterMemberLifecycle::locator(
        &settings,
        EmbeddedEngine::new(),
        CacheHandleRegistry::new(),
    )));
    start_or_abort(&supervisor, &shutdown).await?;

    tracing::info!(
        "Locator {} running at {}[{}]",
        settings.locator.member_name,
        settings.locator.host,
        settings.locator.port
    );
    tracing::info!("Press Ctrl+C to shutdown");
    wait_for_shutdown(shutdown).await;

    report_stop_failures(&supervisor).await;
    Ok(())
}

async fn run_server(settings: Settings, shutdown: watch::Receiver<bool>) -> anyhow::Result<()> {
    // bound first so the member can advertise the real data address
    let listener =
        tokio::net::TcpListener::bind(settings.http.bind_addr(SERVER_HTTP_PORT)).await?;
    let http_addr = listener.local_addr()?;

    let registry = CacheHandleRegistry::new();
    let mut supervisor = LifecycleSupervisor::new();
    supervisor
        .register(Arc::new(ClusterMemberLifecycle::locator(
            &settings,
            EmbeddedEngine::new(),
            CacheHandleRegistry::new(),
        )))
        .register(Arc::new(ClusterMemberLifecycle::server(
            &settings,
            Some(http_addr),
            EmbeddedEngine::new(),
            registry.clone(),
        )));
    start_or_abort(&supervisor, &shutdown).await?;

    let app = server_router(
        registry.clone(),
        Arc::new(ServerRegionService::new(registry.clone())),
        Arc::new(DataService::hosted(registry)),
    );

    tracing::info!("HTTP server listening on {}", http_addr);
    tracing::info!("Press Ctrl+C to shutdown");
    axum::serve(listener, app)
        .with_graceful_shutdown(wait_for_shutdown(shutdown))
        .await?;

    report_stop_failures(&supervisor).await;
    Ok(())
}

async fn run_browser(settings: Settings, shutdown: watch::Receiver<bool>) -> anyhow::Result<()> {
    let registry = CacheHandleRegistry::new();
    let mut supervisor = LifecycleSupervisor::new();
    supervisor.register(Arc::new(ClientConnection::new(
        settings.browser.clone(),
        registry.clone(),
    )));
    start_or_abort(&supervisor, &shutdown).await?;

    let reconciler = Arc::new(RegionProxyReconciler::new(
        registry.clone(),
        settings.browser.settle_delay(),
    ));
    let catalog = Arc::new(ClientRegionService::new(
        registry.clone(),
        reconciler.clone(),
        Arc::new(HttpManagementClient::from_settings(&settings.browser)),
    ));
    let app = browser_router(
        registry.clone(),
        catalog,
        Arc::new(DataService::proxied(registry, reconciler)),
    );

    let listener =
        tokio::net::TcpListener::bind(settings.http.bind_addr(BROWSER_HTTP_PORT)).await?;
    tracing::info!(
        "Data browser {} listening on {}",
        settings.browser.member_name,
        listener.local_addr()?
    );
    axum::serve(listener, app)
        .with_graceful_shutdown(wait_for_shutdown(shutdown))
        .await?;

    report_stop_failures(&supervisor).await;
    Ok(())
}

/// Exit code when bootstrap aborts on `GridError::is_fatal_startup`.
const EXIT_FATAL_STARTUP: i32 = 2;

async fn start_or_abort(
    supervisor: &LifecycleSupervisor,
    shutdown: &watch::Receiver<bool>,
) -> anyhow::Result<()> {
    match supervisor.start_all(shutdown).await {
        Ok(()) => Ok(()),
        Err(e) if e.is_fatal_startup() => {
            tracing::error!("Startup aborted: {}", e);
            std::process::exit(EXIT_FATAL_STARTUP);
        }
        Err(e) => Err(anyhow::Error::new(e).context("failed to start cluster members")),
    }
}

async fn report_stop_failures(supervisor: &LifecycleSupervisor) {
    for (name, e) in supervisor.stop_all().await {
        tracing::error!("{} did not stop cleanly: {}", name, e);
    }
}
