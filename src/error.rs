//! Request-level error taxonomy and its HTTP mapping.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::error::Error as StdError;
use thiserror::Error;

use crate::mapper::{BoxError, LookupError};
use crate::sheets::SheetsError;
use crate::template::{TemplateError, TemplateIssue};

#[derive(Error, Debug)]
pub enum ReportError {
    #[error("Code parameter is required")]
    MissingCode,

    #[error("Code '{0}' not found in spreadsheet")]
    CodeNotFound(String),

    #[error("Template processing errors")]
    TemplateSubstitution(Vec<TemplateIssue>),

    #[error("{0}")]
    Upstream(#[source] BoxError),
}

impl ReportError {
    pub fn status(&self) -> StatusCode {
        match self {
            ReportError::MissingCode | ReportError::TemplateSubstitution(_) => {
                StatusCode::BAD_REQUEST
            }
            ReportError::CodeNotFound(_) => StatusCode::NOT_FOUND,
            ReportError::Upstream(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<LookupError> for ReportError {
    fn from(e: LookupError) -> Self {
        match e {
            LookupError::CodeNotFound(code) => ReportError::CodeNotFound(code),
            other => ReportError::Upstream(Box::new(other)),
        }
    }
}

impl From<SheetsError> for ReportError {
    fn from(e: SheetsError) -> Self {
        ReportError::Upstream(Box::new(e))
    }
}

impl From<TemplateError> for ReportError {
    fn from(e: TemplateError) -> Self {
        match e {
            TemplateError::Issues(issues) => ReportError::TemplateSubstitution(issues),
            other => ReportError::Upstream(Box::new(other)),
        }
    }
}

/// `err: cause: cause ...`
pub fn error_chain(err: &dyn StdError) -> String {
    let mut out = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        out.push_str(": ");
        out.push_str(&cause.to_string());
        source = cause.source();
    }
    out
}

impl IntoResponse for ReportError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match &self {
            ReportError::MissingCode | ReportError::CodeNotFound(_) => {
                log::info!("report rejected: {}", self);
                json!({ "error": self.to_string() })
            }
            ReportError::TemplateSubstitution(issues) => {
                for issue in issues {
                    log::warn!(
                        "template issue in {} at '{}': {}",
                        issue.part,
                        issue.command,
                        issue.message
                    );
                }
                json!({ "error": self.to_string(), "details": issues })
            }
            ReportError::Upstream(cause) => {
                log::error!("Error generating report: {}", error_chain(&**cause));
                json!({ "error": "Internal server error", "message": cause.to_string() })
            }
        };
        (status, Json(body)).into_response()
    }
}
