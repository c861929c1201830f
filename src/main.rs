//! Bookpress CLI: export a manuscript to PDF.
//!
//! The editor itself is driven through the WASM bindings.

use anyhow::{Context, Result};
use bookpress::{BookConfig, BookEditor, CancelToken, Manuscript};
use clap::Parser;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "bookpress")]
#[command(version, about = "Paginate a manuscript and export it as PDF", long_about = None)]
#[command(after_help = "EXAMPLES:
    bookpress book.json book.pdf                      Export with default geometry
    bookpress book.json book.pdf --config a5.json     Export with a config file")]
struct Cli {
    /// Manuscript JSON (title, author, frontMatter, chapters, conclusion)
    #[arg(value_name = "MANUSCRIPT")]
    manuscript: PathBuf,

    /// PDF file to write
    #[arg(value_name = "OUTPUT")]
    out: PathBuf,

    /// Book configuration JSON; missing fields take their defaults
    #[arg(short, long, value_name = "CONFIG")]
    config: Option<PathBuf>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}=info", env!("CARGO_CRATE_NAME")))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    run(&cli)
}

fn run(cli: &Cli) -> Result<()> {
    let source = std::fs::read_to_string(&cli.manuscript)
        .with_context(|| format!("reading manuscript {}", cli.manuscript.display()))?;
    let manuscript: Manuscript = serde_json::from_str(&source)
        .with_context(|| format!("parsing manuscript {}", cli.manuscript.display()))?;

    let config = match &cli.config {
        Some(path) => {
            let json = std::fs::read_to_string(path)
                .with_context(|| format!("reading config {}", path.display()))?;
            BookConfig::from_json(&json).with_context(|| format!("loading config {}", path.display()))?
        }
        None => BookConfig::default(),
    };

    let mut editor = BookEditor::from_manuscript(&manuscript, config).context("opening manuscript")?;
    let artifact = editor.export(&CancelToken::new()).context("exporting")?;
    artifact
        .save(&cli.out)
        .with_context(|| format!("writing {}", cli.out.display()))?;

    info!(
        pages = artifact.pages,
        forced_slices = artifact.report.forced_slices,
        clipped_images = artifact.report.clipped_images,
        out = %cli.out.display(),
        "export finished"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_config_is_an_optional_flag() {
        let cli = Cli::try_parse_from(["bookpress", "book.json", "book.pdf"]).unwrap();
        assert_eq!(cli.manuscript, PathBuf::from("book.json"));
        assert_eq!(cli.out, PathBuf::from("book.pdf"));
        assert!(cli.config.is_none());

        let cli = Cli::try_parse_from(["bookpress", "book.json", "book.pdf", "--config", "a5.json"]).unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("a5.json")));

        assert!(Cli::try_parse_from(["bookpress", "book.json"]).is_err());
    }

    #[test]
    fn test_missing_manuscript_names_the_file() {
        let cli = Cli::try_parse_from(["bookpress", "/nonexistent/book.json", "/nonexistent/book.pdf"]).unwrap();
        let err = run(&cli).unwrap_err();
        assert!(format!("{err}").contains("reading manuscript /nonexistent/book.json"));
    }
}
