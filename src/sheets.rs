use anyhow::Context;
use reqwest::Url;
use serde::Deserialize;
use serde_json::{Value, json};

use crate::auth::TokenProvider;

pub const DRIVE_FILES_URL: &str = "https://www.googleapis.com/drive/v3/files";
pub const SHEETS_API_URL: &str = "https://sheets.googleapis.com/v4/spreadsheets";
pub const SPREADSHEET_MIME_TYPE: &str = "application/vnd.google-apps.spreadsheet";

#[derive(Debug, Deserialize)]
struct FileList {
    #[serde(default)]
    files: Vec<DriveFile>,
}

#[derive(Debug, Deserialize)]
struct DriveFile {
    id: String,
}

#[derive(Debug, Deserialize)]
struct Spreadsheet {
    #[serde(default)]
    sheets: Vec<Sheet>,
}

#[derive(Debug, Deserialize)]
struct Sheet {
    properties: SheetProperties,
}

#[derive(Debug, Deserialize)]
struct SheetProperties {
    title: String,
}

/// Handle to the first worksheet of a spreadsheet.
pub struct SheetsClient {
    http: reqwest::Client,
    auth: TokenProvider,
    spreadsheet_id: String,
    worksheet: String,
}

impl SheetsClient {
    /// Authenticates and resolves the spreadsheet called `name` and its first
    /// worksheet.
    pub async fn open(
        http: reqwest::Client,
        mut auth: TokenProvider,
        name: &str,
    ) -> Result<Self, anyhow::Error> {
        let token = auth.token().await.context("Failed to authenticate")?;

        let files: FileList = check(
            http.get(DRIVE_FILES_URL)
                .bearer_auth(&token)
                .query(&[
                    ("q", drive_query(name).as_str()),
                    ("fields", "files(id,name)"),
                    ("pageSize", "1"),
                    ("supportsAllDrives", "true"),
                    ("includeItemsFromAllDrives", "true"),
                ])
                .send()
                .await
                .context("Failed to search for spreadsheet")?,
        )
        .await?
        .json()
        .await
        .context("Failed to decode spreadsheet search result")?;

        let spreadsheet_id = files
            .files
            .into_iter()
            .next()
            .map(|f| f.id)
            .ok_or_else(|| anyhow::anyhow!("Spreadsheet {name:?} not found"))?;

        let spreadsheet: Spreadsheet = check(
            http.get(format!("{SHEETS_API_URL}/{spreadsheet_id}"))
                .bearer_auth(&token)
                .query(&[("fields", "sheets.properties.title")])
                .send()
                .await
                .context("Failed to fetch spreadsheet metadata")?,
        )
        .await?
        .json()
        .await
        .context("Failed to decode spreadsheet metadata")?;

        let worksheet = spreadsheet
            .sheets
            .into_iter()
            .next()
            .map(|s| s.properties.title)
            .ok_or_else(|| anyhow::anyhow!("Spreadsheet {name:?} has no worksheets"))?;

        log::debug!("Opened spreadsheet {spreadsheet_id}, worksheet {worksheet:?}");

        Ok(Self {
            http,
            auth,
            spreadsheet_id,
            worksheet,
        })
    }

    pub async fn append_row(&mut self, row: &[Value]) -> Result<(), anyhow::Error> {
        let token = self.auth.token().await?;
        let url = append_url(&self.spreadsheet_id, &self.worksheet)?;

        check(
            self.http
                .post(url)
                .bearer_auth(&token)
                .query(&[
                    ("valueInputOption", "RAW"),
                    ("insertDataOption", "INSERT_ROWS"),
                ])
                .json(&append_body(row))
                .send()
                .await
                .context("Failed to send append request")?,
        )
        .await?;

        Ok(())
    }
}

async fn check(response: reqwest::Response) -> Result<reqwest::Response, anyhow::Error> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let url = response.url().clone();
    let body = response.text().await.unwrap_or_default();
    Err(anyhow::anyhow!("{} returned {}: {}", url, status, body))
}

fn drive_query(name: &str) -> String {
    let escaped = name.replace('\\', "\\\\").replace('\'', "\\'");
    format!("name = '{escaped}' and mimeType = '{SPREADSHEET_MIME_TYPE}' and trashed = false")
}

fn append_url(spreadsheet_id: &str, worksheet: &str) -> Result<Url, anyhow::Error> {
    let mut url = Url::parse(SHEETS_API_URL).context("Invalid Sheets API URL")?;
    let range = format!("'{}'", worksheet.replace('\'', "''"));
    url.path_segments_mut()
        .map_err(|_| anyhow::anyhow!("Sheets API URL cannot be a base"))?
        .extend([spreadsheet_id, "values", &format!("{range}:append")]);
    Ok(url)
}

fn append_body(row: &[Value]) -> Value {
    json!({
        "majorDimension": "ROWS",
        "values": [row],
    })
}
