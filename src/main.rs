use anyhow::{bail, Result};
use log::{debug, error, info};
use std::time::Instant;
use vidcap::common::logging_setup;
use vidcap::{cli, config_loader, operations};

const DEFAULT_CONFIG_PATH: &str = "config/vidcap.yaml";

#[tokio::main]
async fn main() -> Result<()> {
    let main_start_time = Instant::now();
    let matches = cli::build_cli().get_matches();

    let config_path = matches
        .get_one::<String>("config")
        .map(|s| s.as_str())
        .unwrap_or(DEFAULT_CONFIG_PATH);

    let config_load_start_time = Instant::now();
    let master_config = match config_loader::load_config(config_path) {
        Ok(cfg) => {
            logging_setup::initialize_logging(Some(&cfg), &matches);
            info!("✅ Configuration loaded from: {} in {:?}", config_path, config_load_start_time.elapsed());
            cfg
        }
        Err(e) => {
            logging_setup::initialize_logging(None, &matches);
            error!("❌ Failed to load configuration from '{}': {:#}. Exiting.", config_path, e);
            return Err(e.context(format!("Failed to load configuration from '{}'", config_path)));
        }
    };

    info!("🚀 vidcap starting with source {:?}.", master_config.capture.backend);

    let Some((operation_name, sub_matches)) = matches.subcommand() else {
        info!("🤔 No subcommand provided. Try `vidcap capture` or `vidcap probe`.");
        return Ok(());
    };
    debug!("🎬 Dispatching to subcommand: {}", operation_name);
    let op_start_time = Instant::now();

    let op_result: Result<()> = match operation_name {
        "capture" => operations::capture_session_op::handle_capture_cli(&master_config, sub_matches).await,
        "probe" => operations::diagnostic_op::handle_probe_cli(&master_config).await,
        other => bail!("Subcommand '{}' not implemented.", other),
    };

    if let Err(e) = op_result {
        error!("❌ Operation '{}' failed after {:?}: {:#}", operation_name, op_start_time.elapsed(), e);
        return Err(e);
    }
    info!("✅ Operation '{}' completed successfully in {:?}.", operation_name, op_start_time.elapsed());
    info!("🏁 vidcap finished in {:?}.", main_start_time.elapsed());
    Ok(())
}
