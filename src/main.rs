use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::net::TcpListener;
use tracing::info;

use skillbench::config::Cli;
use skillbench::server::{create_router, AppState, RateLimiter};
use skillbench::tracing::{init_tracing, shutdown_tracing};
use skillbench::{
    AgentController, AnthropicClient, EnvironmentPool, FileStore, RemoteSandboxClient, SkillsSource,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // a missing .env is fine
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    init_tracing("skillbench", &cli.tracing_config())
        .map_err(|e| anyhow::anyhow!("failed to initialize tracing: {}", e))?;

    let skills = Arc::new(SkillsSource::new(cli.skills_config()));
    let backend = Arc::new(RemoteSandboxClient::new(
        cli.sandbox_url.clone(),
        cli.sandbox_api_key.clone(),
    ));
    let pool = Arc::new(EnvironmentPool::new(backend, skills.clone(), cli.pool_config()));
    let reaper = EnvironmentPool::start_reaper(pool.clone(), cli.idle_timeout(), cli.reap_interval());

    let model = Arc::new(AnthropicClient::new(
        cli.anthropic_base_url.clone(),
        cli.anthropic_api_key.clone(),
        cli.model.clone(),
        cli.max_tokens,
    ));
    let controller = Arc::new(AgentController::new(
        model,
        pool.clone(),
        skills,
        cli.agent_config(),
    ));

    let store = FileStore::open(&cli.data_dir)
        .await
        .with_context(|| format!("failed to open data dir {}", cli.data_dir.display()))?;

    let state = AppState {
        controller,
        pool: pool.clone(),
        store: Arc::new(store),
        rate_limiter: Arc::new(RateLimiter::new(cli.rate_limit_burst, cli.rate_limit_per_sec)),
    };

    let listener = TcpListener::bind(cli.bind)
        .await
        .with_context(|| format!("failed to bind {}", cli.bind))?;
    info!(
        addr = %cli.bind,
        model = %cli.model,
        max_iterations = cli.max_iterations,
        "skillbench listening"
    );

    axum::serve(listener, create_router(state))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutdown signal received");
        })
        .await
        .context("server error")?;

    reaper.abort();
    pool.shutdown().await;
    shutdown_tracing();
    Ok(())
}
