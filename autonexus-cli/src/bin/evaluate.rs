//! Evaluate the trained model on the processed hold-out set and track the
//! result locally and on the remote tracking server.

use autonexus_cli::{CommonArgs, bootstrap, report};
use autonexus_ml::{LocalTracker, RemoteTracker, run_evaluation};
use clap::Parser;

/// Score the current model and record the MAE
#[derive(Parser, Debug)]
#[command(name = "autonexus-evaluate", version, about, long_about = None)]
struct Cli {
    #[command(flatten)]
    common: CommonArgs,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let (config, _guard) = bootstrap(&cli.common)?;

    let local = LocalTracker::new(&config.paths.local_store);
    let remote = RemoteTracker::from_config(&config.tracking).map_err(|e| report("main", e))?;

    let outcome = run_evaluation(&config, &local, &remote)
        .await
        .map_err(|e| report("main", e))?;

    tracing::info!(
        mae = outcome.mae,
        local_run = %outcome.local_run_id,
        remote_run = %outcome.remote_run_id,
        "main function executed"
    );
    Ok(())
}
