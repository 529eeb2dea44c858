use anyhow::Context;
use clap::Parser;
use simulith::cli::CoordinatorArgs;
use simulith::TickCoordinator;

// Single-threaded runtime: the coordinator's core loop never spawns a
// per-client task and touches its client registry from exactly one place,
// so it has no use for tokio's multi-threaded scheduler.
#[tokio::main(flavor = "current_thread")]
async fn main() {
    let _log_guard = simulith::logging::init();
    let args = CoordinatorArgs::parse();

    if let Err(err) = run(args).await {
        tracing::error!(error = %err, "coordinator exited with an error");
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}

async fn run(args: CoordinatorArgs) -> anyhow::Result<()> {
    tracing::info!("starting simulith coordinator...");

    let mut coordinator = TickCoordinator::initialize(
        args.pub_addr.as_str(),
        args.rep_addr.as_str(),
        args.client_count as usize,
        args.interval.as_nanos() as u64,
    )
    .await
    .context("failed to initialize coordinator")?;
    coordinator.set_speed(args.speed);

    let result = coordinator.run().await;
    coordinator
        .shutdown()
        .await
        .context("failed to shut down coordinator cleanly")?;
    result.context("coordinator run loop failed")?;
    Ok(())
}
