use clap::Parser;
use pot_node::{app, config::Args, AppState};
use std::net::SocketAddr;
use tracing::{info, Level};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(Level::DEBUG)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let state = AppState::from_args(&args)?;
    info!(
        pot = %args.pot_name,
        backend = ?args.backend,
        goal = args.goal,
        currency = %args.currency,
        coach = args.coach.enabled,
        "pot ledger ready"
    );

    let addr: SocketAddr = args.listen.parse()?;
    info!("pot-node listening on http://{addr}");
    axum::serve(tokio::net::TcpListener::bind(addr).await?, app(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!("pot-node stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %err, "could not listen for ctrl-c");
        std::future::pending::<()>().await;
    }
}
