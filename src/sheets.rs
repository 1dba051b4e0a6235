//! Read-only access to the participant spreadsheet.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use thiserror::Error;

use crate::auth::{AuthError, ServiceAccount};

pub const DEFAULT_SHEET: &str = "Master";
const SHEETS_API_BASE: &str = "https://sheets.googleapis.com/v4/spreadsheets";

#[derive(Error, Debug)]
pub enum SheetsError {
    #[error("spreadsheet request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("spreadsheet API returned {status} for range {range}: {body}")]
    Status {
        status: u16,
        range: String,
        body: String,
    },
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error("row {0} does not exist")]
    NoSuchRow(usize),
}

/// The three reads a report needs.
#[async_trait]
pub trait SheetSource: Send + Sync {
    /// Row 1, one string per column.
    async fn header_row(&self) -> Result<Vec<String>, SheetsError>;

    /// Column A from row 1 downwards.
    async fn code_column(&self) -> Result<Vec<String>, SheetsError>;

    /// All cells of the given 1-based row.
    async fn data_row(&self, row: usize) -> Result<Vec<Value>, SheetsError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MajorDimension {
    Rows,
    Columns,
}

impl MajorDimension {
    fn as_str(self) -> &'static str {
        match self {
            MajorDimension::Rows => "ROWS",
            MajorDimension::Columns => "COLUMNS",
        }
    }
}

#[derive(Debug, Deserialize)]
struct ValueRange {
    // Omitted by the API when the range is empty.
    #[serde(default)]
    values: Vec<Vec<Value>>,
}

/// Display text of a cell, as it appears in header and code cells.
pub fn cell_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Google Sheets v4 client scoped to one sheet of one spreadsheet.
pub struct GoogleSheets {
    http: reqwest::Client,
    auth: Arc<ServiceAccount>,
    base_url: String,
    spreadsheet_id: String,
    sheet: String,
}

impl GoogleSheets {
    pub fn new(
        http: reqwest::Client,
        auth: Arc<ServiceAccount>,
        spreadsheet_id: impl Into<String>,
        sheet: impl Into<String>,
    ) -> Self {
        GoogleSheets {
            http,
            auth,
            base_url: SHEETS_API_BASE.to_string(),
            spreadsheet_id: spreadsheet_id.into(),
            sheet: sheet.into(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn range_url(&self, range: &str, dimension: MajorDimension) -> String {
        format!(
            "{}/{}/values/{}?majorDimension={}",
            self.base_url.trim_end_matches('/'),
            urlencoding::encode(&self.spreadsheet_id),
            urlencoding::encode(range),
            dimension.as_str()
        )
    }

    async fn get_values(
        &self,
        range: &str,
        dimension: MajorDimension,
    ) -> Result<Vec<Vec<Value>>, SheetsError> {
        let token = self.auth.access_token().await?;
        let response = self
            .http
            .get(self.range_url(range, dimension))
            .bearer_auth(token)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SheetsError::Status {
                status: status.as_u16(),
                range: range.to_string(),
                body,
            });
        }

        let range_values: ValueRange = response.json().await?;
        log::debug!("read {} ({} lines)", range, range_values.values.len());
        Ok(range_values.values)
    }

    async fn first_line(
        &self,
        range: &str,
        dimension: MajorDimension,
    ) -> Result<Vec<Value>, SheetsError> {
        Ok(self
            .get_values(range, dimension)
            .await?
            .into_iter()
            .next()
            .unwrap_or_default())
    }
}

#[async_trait]
impl SheetSource for GoogleSheets {
    async fn header_row(&self) -> Result<Vec<String>, SheetsError> {
        let range = format!("{}!1:1", self.sheet);
        let cells = self.first_line(&range, MajorDimension::Rows).await?;
        Ok(cells.iter().map(cell_text).collect())
    }

    async fn code_column(&self) -> Result<Vec<String>, SheetsError> {
        let range = format!("{}!A:A", self.sheet);
        let cells = self.first_line(&range, MajorDimension::Columns).await?;
        Ok(cells.iter().map(cell_text).collect())
    }

    async fn data_row(&self, row: usize) -> Result<Vec<Value>, SheetsError> {
        let range = format!("{}!{}:{}", self.sheet, row, row);
        self.first_line(&range, MajorDimension::Rows).await
    }
}

/// A sheet held in memory; row 1 is `rows[0]`.
#[derive(Debug, Default)]
pub struct InMemorySheet {
    rows: Vec<Vec<Value>>,
    data_row_reads: AtomicUsize,
}

impl InMemorySheet {
    pub fn new(rows: Vec<Vec<Value>>) -> Self {
        InMemorySheet {
            rows,
            data_row_reads: AtomicUsize::new(0),
        }
    }

    /// How many times [`SheetSource::data_row`] has been called.
    pub fn data_row_reads(&self) -> usize {
        self.data_row_reads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SheetSource for InMemorySheet {
    async fn header_row(&self) -> Result<Vec<String>, SheetsError> {
        Ok(self
            .rows
            .first()
            .map(|row| row.iter().map(cell_text).collect())
            .unwrap_or_default())
    }

    async fn code_column(&self) -> Result<Vec<String>, SheetsError> {
        Ok(self
            .rows
            .iter()
            .map(|row| row.first().map(cell_text).unwrap_or_default())
            .collect())
    }

    async fn data_row(&self, row: usize) -> Result<Vec<Value>, SheetsError> {
        self.data_row_reads.fetch_add(1, Ordering::SeqCst);
        row.checked_sub(1)
            .and_then(|index| self.rows.get(index))
            .cloned()
            .ok_or(SheetsError::NoSuchRow(row))
    }
}
