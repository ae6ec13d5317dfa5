use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use config::Config;
use logger::LoggerLoop;
use simplelog::{ColorChoice, ConfigBuilder, TermLogger, TerminalMode};

mod auth;
mod config;
mod logger;
mod reading;
mod serial;
mod sheets;

/// Append sensor readings received over a serial port to a Google Sheet.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Cli {
    /// Config file (defaults to ./sheet-logger.toml when present)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Serial port, overrides the config file
    #[arg(short, long)]
    port: Option<PathBuf>,

    /// Baud rate, overrides the config file
    #[arg(short, long)]
    baud: Option<u32>,
}

impl Cli {
    fn load_config(&self) -> Result<Config, anyhow::Error> {
        let mut config = Config::load_or_default(self.config.as_deref())?;
        if let Some(port) = &self.port {
            config.serial.port = port.clone();
        }
        if let Some(baud) = self.baud {
            config.serial.baud_rate = baud;
        }
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    let cli = Cli::parse();
    let config = cli.load_config()?;

    TermLogger::init(
        config.log.level,
        ConfigBuilder::new()
            .set_time_format_rfc3339()
            .set_time_offset_to_local()
            .map_err(|_| anyhow::anyhow!("Failed to set time offset to local"))?
            .build(),
        TerminalMode::Mixed,
        ColorChoice::Auto,
    )
    .context("Failed to initialize logger")?;

    if let Err(e) = run(&config).await {
        log::error!("{e:#}");
        std::process::exit(1);
    }

    Ok(())
}

pub async fn run(config: &Config) -> Result<(), anyhow::Error> {
    let mut logger = tokio::select! {
        logger = LoggerLoop::connect(config) => logger?,
        signal = tokio::signal::ctrl_c() => {
            signal.context("Failed to wait for Ctrl+C signal")?;
            log::info!("Exiting...");
            return Ok(());
        }
    };

    tokio::select! {
        _ = logger.run() => {}
        signal = tokio::signal::ctrl_c() => {
            signal.context("Failed to wait for Ctrl+C signal")?;
            log::info!("Exiting...");
        }
    }

    logger.close();
    Ok(())
}
