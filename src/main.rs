use std::{env, path::PathBuf};

use anyhow::Context;
use log::info;
use tokio::signal;

use trainer::{TrainingConfig, TrainingSession};

const CONFIG_ENV: &str = "EZGAN_CONFIG";

fn load_config() -> anyhow::Result<TrainingConfig> {
    let path = env::args()
        .nth(1)
        .or_else(|| env::var(CONFIG_ENV).ok())
        .map(PathBuf::from);

    match path {
        Some(path) => {
            info!("loading configuration from {}", path.display());
            TrainingConfig::load(&path)
                .with_context(|| format!("failed to load {}", path.display()))
        }
        None => {
            info!("no configuration given, using the defaults");
            Ok(TrainingConfig::default())
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();

    let cfg = load_config()?;
    info!("{}", serde_json::to_string(&cfg)?);

    let session = TrainingSession::new(cfg)?;

    tokio::select! {
        ret = session.run() => {
            let summary = ret?;
            info!("done, final losses: {}", summary.final_losses);
        }
        _ = signal::ctrl_c() => {
            info!("received ctrl-c, stopping");
        }
    }

    Ok(())
}
