/*!
# Sheet Report

Generates participant reports from a Google Sheets workbook.

## Overview

Every participant has one row in the `Master` sheet, identified by the code
in column A. Row 1 holds the column headers. A report is produced by
locating the participant's row, turning the headers into template field
names and filling a Word (`.docx`) template whose placeholders look like
`{{GAD}}`.

## Pipeline

1. Read the header row (`Master!1:1`) and the code column (`Master!A:A`).
2. Find the first cell in column A equal to the requested code.
3. Read that row and pair each value with the header in the same column.
4. Normalize each header (hyphens and spaces removed) and rename it through
   the fixed rename table, e.g. `GAD-7` → `GAD7` → `GAD`.
5. Substitute the resulting fields into the template.

All reads happen per request; nothing is cached between reports.

## Modules

- **mapper**: header normalization, rename table, row lookup and field maps
- **template**: `.docx` placeholder substitution
- **sheets**: spreadsheet access (Google Sheets v4 or in memory)
- **auth**: service-account tokens for the Sheets API
- **report**: the per-request pipeline
- **error**: request error taxonomy and HTTP mapping
- **config**: command-line / environment settings
- **app**: routing and middleware

## REST API Endpoints

- `GET /ping` - Health check, answers `pong`
- `GET /report?code={code}` - Downloads `{code}_report.docx`
- `GET /api/report?code={code}` - Same, under the dashboard's API prefix
- `POST /api/generate-report` - JSON `{"code": ..., "reportType": ...}`, used by the dashboard
*/

pub mod mapper;
pub mod template;

#[cfg(feature = "web")]
pub mod app;
#[cfg(feature = "web")]
pub mod auth;
#[cfg(feature = "web")]
pub mod config;
#[cfg(feature = "web")]
pub mod error;
#[cfg(feature = "web")]
pub mod report;
#[cfg(feature = "web")]
pub mod sheets;

#[cfg(all(test, feature = "web"))]
mod fake_google;

pub use mapper::{
    FieldMap, LookupError, RenameTable, RowMapper, find_row_index, normalize_header,
    rename_header,
};
pub use template::{Delimiters, DocxTemplate, TemplateError, TemplateIssue};
