use clap::Parser;
use local_sns::handlers::router;
use local_sns::{AppState, Config, bootstrap};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::parse();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_directive()));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let shared_state = AppState::from_config(&config);

    if let Some(path) = &config.subscriptions {
        let boot = bootstrap::load(path)?;
        let report = bootstrap::apply(&shared_state.registry, &boot);
        tracing::info!(
            topics = report.topic_arns.len(),
            subscriptions = report.subscription_arns.len(),
            problems = report.problems.len(),
            "applied boot subscriptions"
        );
    }

    let app = router(shared_state);

    let addr = config.bind_address();
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("listening on {}", addr);
    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    tracing::info!("halting local-sns server");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
