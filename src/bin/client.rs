use anyhow::Context;
use clap::Parser;
use simulith::cli::ClientArgs;
use simulith::TickClient;

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let _log_guard = simulith::logging::init();
    let args = ClientArgs::parse();

    if let Err(err) = run(args).await {
        tracing::error!(error = %err, "client exited with an error");
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}

async fn run(args: ClientArgs) -> anyhow::Result<()> {
    let mut client = TickClient::initialize(
        args.pub_addr.as_str(),
        args.rep_addr.as_str(),
        args.id.clone(),
        10_000_000,
    )
    .await
    .context("failed to connect to coordinator")?;

    client
        .handshake()
        .await
        .context("handshake with coordinator failed")?;
    tracing::info!(id = args.id, "handshake complete, awaiting ticks");

    if args.ticks == Some(0) {
        client.shutdown().await.context("client shutdown failed")?;
        return Ok(());
    }

    let mut remaining = args.ticks;
    loop {
        let tick_ns = client.wait_for_tick().await.context("wait_for_tick failed")?;
        tracing::info!(id = args.id, tick_ns, "tick");

        if let Some(count) = remaining.as_mut() {
            *count -= 1;
            if *count == 0 {
                break;
            }
        }
    }

    client.shutdown().await.context("client shutdown failed")?;
    Ok(())
}
