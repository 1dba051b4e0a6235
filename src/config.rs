//! Command-line and environment configuration.

use clap::{Args, Parser};
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;

use crate::auth::{AuthError, DEFAULT_SCOPE, ServiceAccount};
use crate::report::{ReportService, TemplateSource};
use crate::sheets::{DEFAULT_SHEET, GoogleSheets};
use crate::template::Delimiters;

/// Where participant data and the report template live.
#[derive(Args, Debug, Clone)]
pub struct SourceConfig {
    /// Spreadsheet id as it appears in the sheet URL
    #[arg(long, env = "GOOGLE_DOC_SHEET_ID", default_value = "")]
    pub spreadsheet_id: String,

    /// Service-account JSON key
    #[arg(long, env = "GOOGLE_APPLICATION_CREDENTIALS", default_value = "auth/credentials.json")]
    pub credentials: PathBuf,

    /// OAuth scope requested for the service account
    #[arg(long, env = "GOOGLE_API_SERVICE", default_value = DEFAULT_SCOPE)]
    pub scope: String,

    /// Sheet holding the header row and the code column
    #[arg(long, env = "SHEET_NAME", default_value = DEFAULT_SHEET)]
    pub sheet: String,

    /// Word template with `{{Field}}` placeholders
    #[arg(long, env = "REPORT_TEMPLATE", default_value = "templates/Vorlage_Ergebnisse.docx")]
    pub template: PathBuf,

    #[arg(long, env = "TEMPLATE_OPEN_DELIMITER", default_value = "{{")]
    pub open_delimiter: String,

    #[arg(long, env = "TEMPLATE_CLOSE_DELIMITER", default_value = "}}")]
    pub close_delimiter: String,
}

impl SourceConfig {
    pub fn delimiters(&self) -> Delimiters {
        Delimiters::new(self.open_delimiter.clone(), self.close_delimiter.clone())
    }

    /// Load the service-account key and wire up the Sheets-backed pipeline.
    pub fn report_service(&self) -> Result<ReportService, AuthError> {
        if self.spreadsheet_id.is_empty() {
            log::warn!("no spreadsheet id configured; every sheet read will fail");
        }

        let http = reqwest::Client::new();
        let auth = Arc::new(ServiceAccount::from_file(
            &self.credentials,
            self.scope.clone(),
            http.clone(),
        )?);
        log::info!(
            "reading sheet '{}' of {} as {}",
            self.sheet,
            self.spreadsheet_id,
            auth.client_email()
        );

        let sheets = GoogleSheets::new(http, auth, self.spreadsheet_id.clone(), self.sheet.clone());
        Ok(
            ReportService::new(Arc::new(sheets), TemplateSource::Path(self.template.clone()))
                .with_delimiters(self.delimiters()),
        )
    }
}

#[derive(Parser, Debug, Clone)]
#[command(name = "report-server", version, about = "Participant report generator")]
pub struct ServerConfig {
    #[arg(long, env = "BIND_HOST", default_value = "127.0.0.1")]
    pub host: IpAddr,

    #[arg(long, env = "PORT", default_value_t = 8000)]
    pub port: u16,

    /// Origins allowed to call the API from a browser
    #[arg(
        long = "allowed-origin",
        env = "ALLOWED_ORIGINS",
        value_delimiter = ',',
        default_value = "http://localhost:3000"
    )]
    pub allowed_origins: Vec<String>,

    /// Built client to serve at `/`
    #[arg(long, env = "STATIC_DIR")]
    pub static_dir: Option<PathBuf>,

    #[command(flatten)]
    pub source: SourceConfig,
}

impl ServerConfig {
    pub fn addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = ServerConfig::try_parse_from(["report-server"]).unwrap();
        assert_eq!(config.port, 8000);
        assert_eq!(config.source.sheet, "Master");
        assert_eq!(config.source.scope, DEFAULT_SCOPE);
        assert_eq!(config.source.delimiters(), Delimiters::default());
        assert_eq!(config.allowed_origins, ["http://localhost:3000"]);
        assert!(config.static_dir.is_none());
    }

    #[test]
    fn flags_override() {
        let config = ServerConfig::try_parse_from([
            "report-server",
            "--host",
            "0.0.0.0",
            "--port",
            "9000",
            "--allowed-origin",
            "https://a.example,https://b.example",
            "--sheet",
            "Export",
            "--open-delimiter",
            "[[",
            "--close-delimiter",
            "]]",
        ])
        .unwrap();
        assert_eq!(config.addr().to_string(), "0.0.0.0:9000");
        assert_eq!(
            config.allowed_origins,
            ["https://a.example", "https://b.example"]
        );
        assert_eq!(config.source.sheet, "Export");
        assert_eq!(config.source.delimiters(), Delimiters::new("[[", "]]"));
    }
}
