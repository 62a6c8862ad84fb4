use anyhow::Context;
use tracing_appender::non_blocking::WorkerGuard;

use job_control::config::ServerConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ServerConfig::from_env().context("Failed to load configuration")?;

    // Held for the life of the process so buffered log lines are flushed.
    let _log_guard = init_tracing(&config);

    eprintln!("⚙️  Job control v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   API: http://{}", config.bind_addr());
    eprintln!("   Tick: {:?}", config.jobs.tick_interval);
    if config.max_jobs > 0 {
        eprintln!("   Max jobs: {}", config.max_jobs);
    }
    if let Some(dir) = &config.log_dir {
        eprintln!("   Logs: {}", dir.display());
    }

    job_control::server::run(&config, shutdown_signal())
        .await
        .with_context(|| format!("Server on {} failed", config.bind_addr()))?;

    Ok(())
}

fn init_tracing(config: &ServerConfig) -> Option<WorkerGuard> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    match &config.log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "job-control.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(writer)
                .with_ansi(false)
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_target(false)
                .init();
            None
        }
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "Failed to listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
}
