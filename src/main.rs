use std::net::SocketAddr;
use std::sync::Arc;

use sqlx::postgres::PgPoolOptions;
use tokio::net::TcpListener;
use tokio::sync::watch;

use portfolio_fetcher::config::FetcherConfig;
use portfolio_fetcher::external::HttpPriceProvider;
use portfolio_fetcher::logging::{init_logging, LoggingConfig};
use portfolio_fetcher::services::scheduler::Scheduler;
use portfolio_fetcher::state::AppState;
use portfolio_fetcher::app;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    init_logging(LoggingConfig::from_env())?;

    let config = FetcherConfig::from_env()?;

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&config.database_url)
        .await?;

    sqlx::migrate!("./migrations").run(&pool).await?;

    let provider = Arc::new(HttpPriceProvider::new(
        config.price_provider_base_url.clone(),
        config.price_provider_api_key.clone(),
        "fetcher",
    )?);

    let scheduler = Arc::new(Scheduler::new(pool.clone(), config.clone(), provider));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let scheduler_task = {
        let scheduler = scheduler.clone();
        let shutdown_rx = shutdown_rx.clone();
        tokio::spawn(async move {
            if let Err(e) = scheduler.run(shutdown_rx).await {
                tracing::error!(error = %e, "scheduler exited with an error");
            }
        })
    };

    let state = AppState { pool, scheduler };
    let app = app::create_app(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], 3000));
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("portfolio fetcher listening at http://{}/", addr);

    let signal_task = tokio::spawn(async move {
        wait_for_shutdown_signal().await;
        let _ = shutdown_tx.send(true);
    });

    let server_shutdown_rx = shutdown_rx.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let mut rx = server_shutdown_rx;
            rx.changed().await.ok();
        })
        .await?;

    signal_task.await.ok();
    scheduler_task.await.ok();

    Ok(())
}

async fn wait_for_shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
