mod platform;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use engine_logging::{engine_info, engine_warn};
use pagewatch_core::ServiceSettings;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let env = |key: &str| std::env::var(key).ok();
    let settings = ServiceSettings::from_lookup(env).context("invalid service settings")?;
    platform::initialize_logging(&settings);

    let context = Arc::new(platform::build_context(&settings, env)?);
    let app = platform::router(context, platform::exit_on_fatal());

    let addr = SocketAddr::from(([0, 0, 0, 0], settings.port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("could not listen on {addr}"))?;
    engine_info!("Listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;
    engine_info!("Shut down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        engine_warn!("Could not listen for shutdown signal: {}", err);
        std::future::pending::<()>().await;
    }
}
