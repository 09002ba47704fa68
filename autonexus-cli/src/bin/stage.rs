//! Point a registry alias at a model version.

use autonexus_cli::{CommonArgs, bootstrap, report};
use autonexus_ml::{MlflowClient, transition_stage};
use clap::Parser;

/// Move a model alias (e.g. champion) to a registered version
#[derive(Parser, Debug)]
#[command(name = "autonexus-stage", version, about, long_about = None)]
struct Cli {
    #[command(flatten)]
    common: CommonArgs,

    /// Alias to assign (overrides stage.alias)
    #[arg(long)]
    alias: Option<String>,

    /// Version to bind the alias to (overrides stage.version)
    #[arg(long = "model-version")]
    model_version: Option<u64>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let (mut config, _guard) = bootstrap(&cli.common)?;
    if let Some(alias) = cli.alias {
        config.stage.alias = alias;
    }
    if let Some(version) = cli.model_version {
        config.stage.version = version;
    }

    let client = MlflowClient::from_config(&config.tracking).map_err(|e| report("stage", e))?;
    transition_stage(&config, &client)
        .await
        .map_err(|e| report("stage", e))?;

    println!(
        "{}@{} -> version {}",
        config.registry.model_name, config.stage.alias, config.stage.version
    );
    Ok(())
}
