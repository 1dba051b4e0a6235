//! Per-request report generation.

use std::path::PathBuf;
use std::sync::Arc;

use crate::error::ReportError;
use crate::mapper::{FieldMap, RenameTable, RowMapper};
use crate::sheets::SheetSource;
use crate::template::{Delimiters, DocxTemplate, TemplateError};

/// Where the `.docx` template comes from. Files are re-read for every report.
#[derive(Debug, Clone)]
pub enum TemplateSource {
    Path(PathBuf),
    InMemory(Arc<[u8]>),
}

impl TemplateSource {
    fn load(&self) -> Result<DocxTemplate, TemplateError> {
        match self {
            TemplateSource::Path(path) => DocxTemplate::open(path),
            TemplateSource::InMemory(bytes) => Ok(DocxTemplate::from_bytes(bytes.to_vec())),
        }
    }
}

#[derive(Debug, Clone)]
pub struct GeneratedReport {
    pub filename: String,
    pub bytes: Vec<u8>,
}

/// `<code>_report.docx`, with characters that would break a
/// `Content-Disposition` header replaced.
pub fn report_filename(code: &str) -> String {
    let safe: String = code
        .chars()
        .map(|c| match c {
            '"' | '\\' | '/' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    format!("{}_report.docx", safe)
}

pub struct ReportService {
    source: Arc<dyn SheetSource>,
    template: TemplateSource,
    delimiters: Delimiters,
    renames: &'static RenameTable,
}

impl ReportService {
    pub fn new(source: Arc<dyn SheetSource>, template: TemplateSource) -> Self {
        ReportService {
            source,
            template,
            delimiters: Delimiters::default(),
            renames: RenameTable::standard(),
        }
    }

    pub fn with_delimiters(mut self, delimiters: Delimiters) -> Self {
        self.delimiters = delimiters;
        self
    }

    /// Read headers and codes, locate `code` and read its row.
    pub async fn field_map(&self, code: &str) -> Result<FieldMap, ReportError> {
        if code.is_empty() {
            return Err(ReportError::MissingCode);
        }

        let headers = self.source.header_row().await?;
        let codes = self.source.code_column().await?;
        log::debug!(
            "sheet has {} columns and {} code cells",
            headers.len(),
            codes.len()
        );

        let source = &self.source;
        let fields = RowMapper::new(self.renames)
            .generate_field_map_for_code(code, &headers, &codes, move |row| source.data_row(row))
            .await?;
        Ok(fields)
    }

    /// Fill the template for `code`. Nothing is returned unless every step
    /// succeeded.
    pub async fn generate(&self, code: &str) -> Result<GeneratedReport, ReportError> {
        let fields = self.field_map(code).await?;
        let template = self
            .template
            .load()?
            .with_delimiters(self.delimiters.clone());
        let bytes = template.render(&fields)?;

        log::info!(
            "generated report for '{}' ({} fields, {} bytes)",
            code,
            fields.len(),
            bytes.len()
        );

        Ok(GeneratedReport {
            filename: report_filename(code),
            bytes,
        })
    }
}
