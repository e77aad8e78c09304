// cctdi: adaptive CCTDI critical-thinking assessment
// Main entry point for the cctdi binary

use clap::Parser;
use cctdi_engine::cli::{Cli, Command, ConfigAction};
use cctdi_engine::config::Config;
use cctdi_engine::handlers::{
    handle_batch, handle_config_show, handle_config_validate, handle_history, handle_interview,
    handle_replay, handle_run, handle_status, OutputFormat,
};
use cctdi_engine::telemetry::{init_telemetry, init_telemetry_with_level};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let format = if cli.json {
        OutputFormat::Json
    } else {
        OutputFormat::Text
    };

    // Validation must report a broken file rather than fail to load it
    if let Command::Config {
        action: ConfigAction::Validate,
    } = &cli.command
    {
        init_telemetry();
        let path = match &cli.config {
            Some(path) => path.clone(),
            None => Config::default_config_path()?,
        };
        return handle_config_validate(&path, format);
    }

    let config = if let Some(config_path) = &cli.config {
        Config::load_from_path(config_path)?
    } else {
        Config::load_or_create()?
    };

    // --log wins over the config file; RUST_LOG wins over both
    init_telemetry_with_level(cli.log.as_deref().unwrap_or(&config.core.log_level));

    tracing::debug!(
        "cctdi v{} ({} - {})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_COMMIT_HASH"),
        env!("BUILD_TIMESTAMP")
    );

    match cli.command {
        Command::Run { persona } => handle_run(persona, &config, format).await,
        Command::Interview { subject_id } => handle_interview(subject_id, &config, format).await,
        Command::Batch { personas, workers } => handle_batch(personas, workers, &config, format).await,
        Command::History { limit } => handle_history(limit, &config, format).await,
        Command::Replay { session_id } => handle_replay(session_id, &config, format).await,
        Command::Status => handle_status(&config, format).await,
        Command::Config { action } => match action {
            ConfigAction::Show => handle_config_show(&config, format),
            ConfigAction::Validate => handle_config_validate(
                &cli.config.unwrap_or(Config::default_config_path()?),
                format,
            ),
        },
    }
}
