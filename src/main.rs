mod config;

use clap::Parser as _;
use config::Config;
use tokio::net::TcpListener;
use tracing::{error, info, instrument};
use tradal_coach::{
    AppState, build_metrics_layer_and_handle, build_metrics_router, build_router,
    chain::ChainConfig, client::create_hyper_client, coach::Coach, prompt::SystemPrompt,
    router::Router,
};

#[tokio::main]
#[instrument]
pub async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = Config::parse().validate()?;
    info!("Starting Tradal Coach with config: {:?}", config);

    let chain = match &config.providers {
        Some(path) => ChainConfig::from_file(path)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to load provider chain: {}", e))?,
        None => {
            info!("No providers file given, using the built-in chain");
            ChainConfig::builtin()?
        }
    };

    let client = create_hyper_client(config.pool());
    let providers = chain.build(client, |var| std::env::var(var).ok())?;
    let router = Router::new(providers, SystemPrompt::trading_coach())
        .with_timeout(config.request_timeout());
    let app = build_router(AppState::new(Coach::new(router)));

    let app = if config.metrics {
        let (prometheus_layer, handle) = build_metrics_layer_and_handle(config.metrics_prefix.clone());
        let metrics_addr = format!("0.0.0.0:{}", config.metrics_port);
        let metrics_listener = TcpListener::bind(&metrics_addr).await?;
        info!("Metrics server listening on {}", metrics_addr);
        tokio::spawn(async move {
            if let Err(e) = axum::serve(metrics_listener, build_metrics_router(handle)).await {
                error!("Metrics server stopped: {}", e);
            }
        });
        app.layer(prometheus_layer)
    } else {
        app
    };

    let bind_addr = format!("0.0.0.0:{}", config.port);
    let listener = TcpListener::bind(&bind_addr).await?;
    info!("Tradal Coach listening on {}", bind_addr);

    axum::serve(listener, app).await?;

    Ok(())
}
