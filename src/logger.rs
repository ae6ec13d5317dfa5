use std::time::Duration;

use anyhow::Context;
use backon::{ConstantBuilder, Retryable};
use chrono::Local;
use serde_json::Value;

use crate::auth::{ServiceAccountKey, TokenProvider};
use crate::config::Config;
use crate::reading::{ParseError, Reading, RowLayout, parse_line};
use crate::serial::{ByteSource, LineReader, SerialPort, decode_line};
use crate::sheets::SheetsClient;

/// Destination for appended rows.
pub(crate) trait RowSink {
    async fn append(&mut self, row: Vec<Value>) -> Result<(), anyhow::Error>;
}

impl RowSink for SheetsClient {
    async fn append(&mut self, row: Vec<Value>) -> Result<(), anyhow::Error> {
        self.append_row(&row).await
    }
}

/// What a single pass over the serial input produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// No complete line was waiting.
    Idle,
    /// A line arrived but was not a record.
    Ignored,
    /// A record arrived but could not be parsed.
    Rejected,
    /// A row was appended.
    Logged,
}

pub(crate) struct LoggerLoop<S, K> {
    lines: LineReader<S>,
    sink: K,
    layout: RowLayout,
    poll_interval: Duration,
}

impl LoggerLoop<SerialPort, SheetsClient> {
    /// Opens the serial port and the spreadsheet.
    pub async fn connect(config: &Config) -> Result<Self, anyhow::Error> {
        let retry_builder = ConstantBuilder::default()
            .with_delay(Duration::from_millis(500))
            .with_max_times(10);

        let port = (|| async { SerialPort::open(&config.serial.port, config.serial.baud_rate) })
            .retry(retry_builder)
            .sleep(tokio::time::sleep)
            .notify(|e, dur| {
                log::error!("{e:#}");
                log::info!("Retrying in {:?}", dur);
            })
            .await?;
        log::info!(
            "Opened {} at {} baud",
            config.serial.port.display(),
            config.serial.baud_rate
        );
        tokio::time::sleep(config.serial.settle_delay()).await;

        let sink = open_sheet(config)
            .await
            .context("Failed to connect to Google Sheets")?;
        log::info!("Connected to Google Sheets");

        Ok(Self::new(
            port,
            sink,
            config.sheet.layout,
            config.serial.poll_interval(),
        ))
    }
}

async fn open_sheet(config: &Config) -> Result<SheetsClient, anyhow::Error> {
    let key = ServiceAccountKey::from_file(&config.sheet.credentials)?;
    let http = reqwest::Client::new();
    let auth = TokenProvider::new(http.clone(), key)?;
    SheetsClient::open(http, auth, &config.sheet.name).await
}

impl<S: ByteSource, K: RowSink> LoggerLoop<S, K> {
    pub fn new(source: S, sink: K, layout: RowLayout, poll_interval: Duration) -> Self {
        Self {
            lines: LineReader::new(source),
            sink,
            layout,
            poll_interval,
        }
    }

    /// Reads at most one line and forwards it if it is a valid record.
    pub async fn step(&mut self) -> Result<Outcome, anyhow::Error> {
        let Some(bytes) = self.lines.poll_line()? else {
            return Ok(Outcome::Idle);
        };

        let line = match decode_line(&bytes) {
            Ok(line) => line,
            Err(e) => {
                log::warn!("Dropping line that is not valid UTF-8: {e}");
                return Ok(Outcome::Rejected);
            }
        };
        if line.is_empty() {
            return Ok(Outcome::Ignored);
        }
        log::info!("Received: {line}");

        let values = match parse_line(line) {
            Ok(values) => values,
            Err(ParseError::NotFramed) => {
                log::debug!("Ignoring line without braces");
                return Ok(Outcome::Ignored);
            }
            Err(e) => {
                log::warn!("Failed to parse data: {e}");
                return Ok(Outcome::Rejected);
            }
        };

        let reading = Reading::new(Local::now(), values);
        self.sink
            .append(reading.to_row(self.layout))
            .await
            .context("Failed to append row")?;
        log::info!("Data logged to Google Sheets");

        Ok(Outcome::Logged)
    }

    /// Runs until the future is dropped. Errors are logged and the loop
    /// carries on with the next line.
    pub async fn run(&mut self) {
        log::info!("Listening for data...");
        loop {
            match self.step().await {
                Ok(Outcome::Idle) => tokio::time::sleep(self.poll_interval).await,
                Ok(_) => {}
                Err(e) => {
                    log::error!("Error: {e:#}");
                    tokio::time::sleep(self.poll_interval).await;
                }
            }
        }
    }

    /// Releases the serial port.
    pub fn close(self) {
        drop(self.lines.into_inner());
        log::info!("Serial port closed");
    }
}
