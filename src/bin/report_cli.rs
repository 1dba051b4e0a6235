use anyhow::Context;
use clap::Parser;
use sheet_report::config::SourceConfig;
use sheet_report::error::ReportError;
use std::fs;
use std::path::PathBuf;

/// Generate one participant report and write it to disk
#[derive(Parser, Debug)]
#[command(name = "report-cli", version)]
struct Cli {
    /// Code in column A of the sheet
    #[arg(long)]
    code: String,

    /// Directory the report is written to
    #[arg(long, default_value = ".")]
    out: PathBuf,

    #[command(flatten)]
    source: SourceConfig,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let service = cli
        .source
        .report_service()
        .context("failed to set up spreadsheet access")?;

    let report = match service.generate(cli.code.trim()).await {
        Ok(report) => report,
        Err(ReportError::TemplateSubstitution(issues)) => {
            for issue in &issues {
                eprintln!("{}: {{{{{}}}}}: {}", issue.part, issue.command, issue.message);
            }
            anyhow::bail!("template has {} unresolved placeholder(s)", issues.len());
        }
        Err(e) => {
            return Err(e).with_context(|| format!("failed to generate report for '{}'", cli.code));
        }
    };

    let path = cli.out.join(&report.filename);
    fs::write(&path, &report.bytes)
        .with_context(|| format!("failed to write {}", path.display()))?;

    println!("{}", path.display());
    Ok(())
}
