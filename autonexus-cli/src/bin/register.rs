//! Register a finished training run's model artifact as a new model version.

use autonexus_cli::{CommonArgs, bootstrap, report};
use autonexus_ml::{MlflowClient, register_model};
use clap::Parser;

/// Publish the configured run artifact to the model registry
#[derive(Parser, Debug)]
#[command(name = "autonexus-register", version, about, long_about = None)]
struct Cli {
    #[command(flatten)]
    common: CommonArgs,

    /// Run id to register (overrides registry.run_id)
    #[arg(long)]
    run_id: Option<String>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let (mut config, _guard) = bootstrap(&cli.common)?;
    if let Some(run_id) = cli.run_id {
        config.registry.run_id = run_id;
    }

    let client = MlflowClient::from_config(&config.tracking).map_err(|e| report("register", e))?;
    let version = register_model(&config, &client)
        .await
        .map_err(|e| report("register", e))?;

    println!("{} version {}", version.name, version.version);
    Ok(())
}
