//! HTTP server lifecycle: bind, serve until shutdown, then stop every job.

use std::future::Future;
use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::info;

use crate::config::ServerConfig;
use crate::error::Result;
use crate::jobs::{JobController, JobRegistry};
use crate::routes::job_routes;

/// Bind the configured address and serve until `shutdown` resolves.
pub async fn run<S>(config: &ServerConfig, shutdown: S) -> Result<()>
where
    S: Future<Output = ()> + Send + 'static,
{
    let listener = TcpListener::bind(config.bind_addr()).await?;
    serve(listener, config, shutdown).await
}

/// Serve on an already bound listener.
pub async fn serve<S>(listener: TcpListener, config: &ServerConfig, shutdown: S) -> Result<()>
where
    S: Future<Output = ()> + Send + 'static,
{
    let registry = Arc::new(JobRegistry::new(config.jobs.clone(), config.max_jobs));
    let controller = JobController::new(registry);
    let app = job_routes(controller.clone());

    info!(addr = %listener.local_addr()?, "Job control server started");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    info!("Shutting down, stopping live jobs");
    controller.shutdown().await;
    Ok(())
}
