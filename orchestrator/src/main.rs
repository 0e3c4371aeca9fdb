use std::{env, path::PathBuf};

use anyhow::Context;
use log::info;
use orchestrator::{configs::RunConfig, logging};

fn main() -> anyhow::Result<()> {
    let config_path = env::args_os().nth(1).map(PathBuf::from);
    let config = RunConfig::load(config_path.as_deref()).context("loading the hyper-parameters")?;

    logging::init(&config.training.log_file).context("setting up logging")?;
    info!("hyper-parameters: {config:?}");

    let history = orchestrator::run(config)?;
    if let Some(last) = history.last() {
        info!("last epoch: {last:?}");
    }

    Ok(())
}
