//! Printable documents.
//!
//! Every document is a Tera HTML template rendered from already-computed figures and then
//! handed to an external `wkhtmltopdf`. When no converter is installed, or conversion fails,
//! the rendered HTML is served instead so the browser can print it.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::str::FromStr;

use axum::{
    http::header,
    response::{IntoResponse, Response},
};
use rotu_core::config::PdfConfig;
use rust_decimal::Decimal;
use tera::{Context, Tera};
use tokio::process::Command;
use tracing::{error, info, warn};
use uuid::Uuid;

use rotu_core::documents::round_money;

const EMBEDDED_TEMPLATES: &[(&str, &str)] = &[
    ("base.html.tera", include_str!("../../../templates/base.html.tera")),
    ("quotation.html.tera", include_str!("../../../templates/quotation.html.tera")),
    ("invoice.html.tera", include_str!("../../../templates/invoice.html.tera")),
    ("sales_report.html.tera", include_str!("../../../templates/sales_report.html.tera")),
    ("expenses_report.html.tera", include_str!("../../../templates/expenses_report.html.tera")),
    ("daily_sales.html.tera", include_str!("../../../templates/daily_sales.html.tera")),
    ("total_sales.html.tera", include_str!("../../../templates/total_sales.html.tera")),
];

/// The printable documents the API serves.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DocumentTemplate {
    Quotation,
    Invoice,
    SalesReport,
    ExpensesReport,
    DailySales,
    TotalSales,
}

impl DocumentTemplate {
    pub fn file_name(self) -> &'static str {
        match self {
            Self::Quotation => "quotation.html.tera",
            Self::Invoice => "invoice.html.tera",
            Self::SalesReport => "sales_report.html.tera",
            Self::ExpensesReport => "expenses_report.html.tera",
            Self::DailySales => "daily_sales.html.tera",
            Self::TotalSales => "total_sales.html.tera",
        }
    }
}

/// Register the filters the document templates rely on and escape every `.html.tera`
/// template, since client names and notes are user input.
///
/// - `money`: two decimals, rounding half away from zero, e.g. `sale.total_amount | money`
pub fn register_template_filters(tera: &mut Tera) {
    tera.autoescape_on(vec![".html.tera"]);
    tera.register_filter("money", tera_money_filter);
}

/// Decimals arrive serialized as strings; plain numbers are accepted too.
fn tera_money_filter(
    value: &tera::Value,
    _args: &HashMap<String, tera::Value>,
) -> tera::Result<tera::Value> {
    let amount = match value {
        tera::Value::String(text) => Decimal::from_str(text.trim())
            .map_err(|e| tera::Error::msg(format!("money filter expects a decimal, got `{text}`: {e}")))?,
        tera::Value::Number(number) => Decimal::from_str(&number.to_string())
            .map_err(|e| tera::Error::msg(format!("money filter expects a decimal: {e}")))?,
        tera::Value::Null => Decimal::ZERO,
        other => return Err(tera::Error::msg(format!("money filter cannot format {other}"))),
    };
    Ok(tera::Value::String(format!("{:.2}", round_money(amount))))
}

#[derive(Debug, thiserror::Error)]
pub enum PdfError {
    #[error("template error: {0}")]
    Template(String),
    #[error("conversion error: {0}")]
    Conversion(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Clone, Debug)]
pub struct PdfGenerator {
    tera: Tera,
    converter: Option<PathBuf>,
}

impl PdfGenerator {
    /// Templates come from `template_dir` when it exists, otherwise from the copies built
    /// into the binary.
    pub fn from_config(config: &PdfConfig) -> Result<Self, PdfError> {
        let tera = if config.template_dir.is_dir() {
            let pattern = format!("{}/**/*.html.tera", config.template_dir.display());
            let mut tera = Tera::new(&pattern).map_err(|e| PdfError::Template(e.to_string()))?;
            register_template_filters(&mut tera);
            info!(
                event_name = "system.pdf.templates_loaded",
                template_dir = %config.template_dir.display(),
                "document templates loaded from disk"
            );
            tera
        } else {
            warn!(
                event_name = "system.pdf.templates_embedded",
                template_dir = %config.template_dir.display(),
                "template directory missing, using embedded templates"
            );
            embedded_tera()?
        };

        let converter = locate_converter(&config.converter);
        match &converter {
            Some(path) => info!(
                event_name = "system.pdf.converter_found",
                path = %path.display(),
                "pdf converter found"
            ),
            None => warn!(
                event_name = "system.pdf.converter_missing",
                converter = %config.converter,
                "pdf converter not found, documents will be served as HTML"
            ),
        }

        Ok(Self { tera, converter })
    }

    pub fn with_embedded_templates() -> Result<Self, PdfError> {
        Ok(Self { tera: embedded_tera()?, converter: locate_converter("wkhtmltopdf") })
    }

    /// Always serve HTML, even when a converter is installed.
    pub fn without_converter(mut self) -> Self {
        self.converter = None;
        self
    }

    pub fn converter(&self) -> Option<&Path> {
        self.converter.as_deref()
    }

    pub fn render_html(&self, template: DocumentTemplate, context: &Context) -> Result<String, PdfError> {
        self.tera
            .render(template.file_name(), context)
            .map_err(|e| PdfError::Template(format!("{}: {e:?}", template.file_name())))
    }

    pub async fn render(
        &self,
        template: DocumentTemplate,
        context: &Context,
    ) -> Result<PdfResult, PdfError> {
        let html = self.render_html(template, context)?;

        let Some(converter) = &self.converter else {
            return Ok(PdfResult::Html(html));
        };
        match convert_html_to_pdf(&html, converter).await {
            Ok(bytes) => Ok(PdfResult::Pdf(bytes)),
            Err(e) => {
                warn!(
                    event_name = "system.pdf.conversion_failed",
                    error = %e,
                    "pdf conversion failed, falling back to HTML"
                );
                Ok(PdfResult::Html(html))
            }
        }
    }
}

fn embedded_tera() -> Result<Tera, PdfError> {
    let mut tera = Tera::default();
    tera.add_raw_templates(EMBEDDED_TEMPLATES.iter().copied())
        .map_err(|e| PdfError::Template(e.to_string()))?;
    register_template_filters(&mut tera);
    Ok(tera)
}

fn locate_converter(converter: &str) -> Option<PathBuf> {
    if converter.trim().is_empty() {
        return None;
    }
    which::which(converter).ok()
}

async fn convert_html_to_pdf(html: &str, converter: &Path) -> Result<Vec<u8>, PdfError> {
    let temp_dir = std::env::temp_dir();
    let stem = Uuid::new_v4();
    let html_path = temp_dir.join(format!("rotu_{stem}.html"));
    let pdf_path = temp_dir.join(format!("rotu_{stem}.pdf"));

    tokio::fs::write(&html_path, html).await?;

    let output = Command::new(converter)
        .args(["--page-size", "Letter"])
        .args(["--margin-top", "10mm", "--margin-bottom", "10mm"])
        .args(["--margin-left", "10mm", "--margin-right", "10mm"])
        .args(["--encoding", "utf-8", "--quiet"])
        .arg(&html_path)
        .arg(&pdf_path)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await;

    let result = match output {
        Ok(output) if output.status.success() => tokio::fs::read(&pdf_path).await.map_err(PdfError::from),
        Ok(output) => {
            let stderr = String::from_utf8_lossy(&output.stderr).to_string();
            error!(event_name = "system.pdf.converter_failed", stderr = %stderr, "wkhtmltopdf failed");
            Err(PdfError::Conversion(stderr))
        }
        Err(e) => Err(PdfError::Io(e)),
    };

    let _ = tokio::fs::remove_file(&html_path).await;
    let _ = tokio::fs::remove_file(&pdf_path).await;

    if let Ok(bytes) = &result {
        info!(event_name = "system.pdf.generated", size = bytes.len(), "pdf generated");
    }
    result
}

/// Result of rendering a document.
#[derive(Debug)]
pub enum PdfResult {
    Pdf(Vec<u8>),
    Html(String),
}

impl PdfResult {
    pub fn into_download(self, filename: &str) -> Response {
        match self {
            PdfResult::Pdf(bytes) => (
                [
                    (header::CONTENT_TYPE, "application/pdf".to_string()),
                    (header::CONTENT_DISPOSITION, format!("attachment; filename=\"{filename}\"")),
                ],
                bytes,
            )
                .into_response(),
            PdfResult::Html(html) => {
                ([(header::CONTENT_TYPE, "text/html; charset=utf-8".to_string())], html).into_response()
            }
        }
    }
}
