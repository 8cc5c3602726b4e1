//! Google Sheets v4 REST client.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, Url};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

use super::auth::TokenSource;
use super::{cell_text, A1Range, SheetStore, StoreError, StoreResult, TableInfo};

pub const SHEETS_API: &str = "https://sheets.googleapis.com/v4/spreadsheets";

const RAW: &str = "RAW";
const INSERT_ROWS: &str = "INSERT_ROWS";
const TABLE_FIELDS: &str = "sheets.properties(sheetId,title)";
// The API answers reads of a missing tab with this 400 message.
const UNPARSABLE_RANGE: &str = "Unable to parse range";

/// URLs of one spreadsheet.
#[derive(Debug, Clone)]
pub struct Endpoint {
    root: Url,
    spreadsheet_id: String,
}

impl Endpoint {
    pub fn new(api_root: &str, spreadsheet_id: &str) -> Result<Self> {
        let root = Url::parse(api_root).with_context(|| format!("Invalid API root {}", api_root))?;
        if root.cannot_be_a_base() {
            bail!("API root {} cannot be a base URL", api_root);
        }
        Ok(Endpoint {
            root,
            spreadsheet_id: spreadsheet_id.to_string(),
        })
    }

    /// `{root}/{id}{suffix}`, e.g. suffix `:batchUpdate`.
    pub fn spreadsheet(&self, suffix: &str) -> Url {
        let mut url = self.root.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments
                .pop_if_empty()
                .push(&format!("{}{}", self.spreadsheet_id, suffix));
        }
        url
    }

    /// `{root}/{id}/values/{range}{suffix}`, e.g. suffix `:append`.
    pub fn values(&self, range: &A1Range, suffix: &str) -> Url {
        let mut url = self.spreadsheet("");
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.push("values").push(&format!("{}{}", range, suffix));
        }
        url
    }
}

#[derive(Debug, Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<Value>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ValueWrite<'a> {
    range: String,
    major_dimension: &'a str,
    values: Vec<Vec<String>>,
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
#[serde(rename_all = "camelCase")]
struct SheetProperties {
    sheet_id: i64,
    title: String,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    message: String,
}

fn rows_from_values(range: ValueRange) -> Vec<Vec<String>> {
    range
        .values
        .into_iter()
        .map(|row| row.into_iter().map(cell_text).collect())
        .collect()
}

fn delete_rows_request(table_id: i64, start_index: u32, end_index: u32) -> Value {
    json!({
        "requests": [{
            "deleteDimension": {
                "range": {
                    "sheetId": table_id,
                    "dimension": "ROWS",
                    "startIndex": start_index,
                    "endIndex": end_index,
                }
            }
        }]
    })
}

/// Reads and writes on a range of a missing tab fail with a parse error.
fn missing_table(err: StoreError, range: &A1Range) -> StoreError {
    match err {
        StoreError::Api { status: 400, ref message } if message.starts_with(UNPARSABLE_RANGE) => {
            StoreError::UnknownTable(range.table.clone())
        }
        other => other,
    }
}

pub struct GoogleSheets {
    client: Client,
    endpoint: Endpoint,
    tokens: TokenSource,
}

impl GoogleSheets {
    pub fn new(client: Client, endpoint: Endpoint, tokens: TokenSource) -> Self {
        GoogleSheets {
            client,
            endpoint,
            tokens,
        }
    }

    async fn send(&self, request: RequestBuilder) -> StoreResult<Response> {
        let token = self.tokens.access_token().await?;
        let res = request.bearer_auth(token).send().await?;

        let status = res.status();
        if status.is_success() {
            return Ok(res);
        }

        let message = match res.json::<ErrorBody>().await {
            Ok(body) => body.error.message,
            Err(_) => status.to_string(),
        };
        Err(StoreError::Api {
            status: status.as_u16(),
            message,
        })
    }
}

#[async_trait]
impl SheetStore for GoogleSheets {
    async fn get_range(&self, range: &A1Range) -> StoreResult<Vec<Vec<String>>> {
        let url = self.endpoint.values(range, "");
        let res = self
            .send(self.client.get(url))
            .await
            .map_err(|e| missing_table(e, range))?;

        Ok(rows_from_values(res.json().await?))
    }

    async fn append_row(&self, range: &A1Range, row: Vec<String>) -> StoreResult<()> {
        debug!(%range, "appending row");
        let url = self.endpoint.values(range, ":append");
        let body = ValueWrite {
            range: range.to_string(),
            major_dimension: "ROWS",
            values: vec![row],
        };
        self.send(
            self.client
                .post(url)
                .query(&[("valueInputOption", RAW), ("insertDataOption", INSERT_ROWS)])
                .json(&body),
        )
        .await
        .map_err(|e| missing_table(e, range))?;
        Ok(())
    }

    async fn update_range(&self, range: &A1Range, rows: Vec<Vec<String>>) -> StoreResult<()> {
        debug!(%range, "updating range");
        let url = self.endpoint.values(range, "");
        let body = ValueWrite {
            range: range.to_string(),
            major_dimension: "ROWS",
            values: rows,
        };
        self.send(
            self.client
                .put(url)
                .query(&[("valueInputOption", RAW)])
                .json(&body),
        )
        .await
        .map_err(|e| missing_table(e, range))?;
        Ok(())
    }

    async fn list_tables(&self) -> StoreResult<Vec<TableInfo>> {
        let url = self.endpoint.spreadsheet("");
        let res = self
            .send(self.client.get(url).query(&[("fields", TABLE_FIELDS)]))
            .await?;
        let spreadsheet: Spreadsheet = res.json().await?;

        Ok(spreadsheet
            .sheets
            .into_iter()
            .map(|sheet| TableInfo {
                id: sheet.properties.sheet_id,
                title: sheet.properties.title,
            })
            .collect())
    }

    async fn delete_rows(&self, table_id: i64, start_index: u32, end_index: u32) -> StoreResult<()> {
        debug!(table_id, start_index, end_index, "deleting rows");
        let url = self.endpoint.spreadsheet(":batchUpdate");
        self.send(
            self.client
                .post(url)
                .json(&delete_rows_request(table_id, start_index, end_index)),
        )
        .await?;
        Ok(())
    }
}
