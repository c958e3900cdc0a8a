use clap::Parser;
use color_eyre::Result;
use serial_tether::{cli, config::Config, logging, server::App};
use tracing::{debug, error, info, Level};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = cli::Cli::parse();

    if let Some(command) = cli.command {
        cli::handle_command(command);

        return Ok(());
    }

    let config = if let Some(config_path) = cli.config {
        Config::new_from_path(config_path)
    } else {
        Config::default()
    };

    logging::init(
        Level::INFO,
        config.log_dir.clone().map(|dir| (Level::DEBUG, dir)),
    )
    .await;

    debug!(?config, "Configuration");

    let app = App::new(config)?;

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Ctrl-C, quitting")
        }
        result = app.run() => {
            error!("Server returned");
            result?;
            return Err(color_eyre::eyre::eyre!("Server stopped unexpectedly"));
        }
    }

    Ok(())
}
