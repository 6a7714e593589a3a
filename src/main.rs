use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use traffic_lens::artifacts::ArtifactStore;
use traffic_lens::config::Config;
use traffic_lens::orchestrator::AnalysisOrchestrator;
use traffic_lens::server::{router, AppState};
use traffic_lens::session::SessionSettings;
use traffic_lens::webdriver::WebDriverContext;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .compact()
        .init();

    let config = Config::load()?;
    let thread_count = config.thread_count.unwrap_or_else(num_cpus::get);

    info!("starting server with {} threads", thread_count);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(thread_count)
        .enable_all()
        .build()?;

    runtime.block_on(async_main(config))
}

async fn async_main(config: Config) -> anyhow::Result<()> {
    let orchestrator = match WebDriverContext::connect(&config).await {
        Ok(browser) => {
            let artifacts = ArtifactStore::new(config.screenshots_dir.clone(), config.static_dir.clone())?;
            info!("browser context ready with {} concurrent tabs", config.concurrent_tabs);
            Some(
                AnalysisOrchestrator::new(browser, config.concurrent_tabs, SessionSettings::from(&config))
                    .with_artifacts(artifacts),
            )
        }
        Err(e) => {
            error!("failed to start browser context at {}: {}", config.webdriver_url, e);
            None
        }
    };

    let addr = config.listen_addr.clone();
    let state = Arc::new(AppState {
        concurrent_tabs: config.concurrent_tabs,
        orchestrator,
    });
    let app = router(state.clone());

    info!("listening on {}", addr);
    let listener = TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Some(orchestrator) = &state.orchestrator {
        let errors = orchestrator.shutdown().await;
        for e in errors {
            warn!("teardown: {}", e);
        }
    }
    info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("failed to listen for shutdown signal: {}", e);
    }
    info!("shutdown signal received");
}
