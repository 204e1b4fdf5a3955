//! LiveDoc command-line shell.

use std::path::{Path, PathBuf};

use anyhow::Context as _;
use clap::{Parser, Subcommand, ValueEnum};
use livedoc_core::canvas::CanvasDocument;
use livedoc_core::{DocumentBackend, DocumentKind, DocumentRef, EngineConfig, HttpBackend};
use livedoc_render::{ExportOptions, export_pdf, export_png, fetch_assets, png_data_url};

#[derive(Parser, Debug)]
#[command(name = "livedoc", version)]
struct Cli {
    /// Engine configuration JSON. Missing fields take their defaults.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Render a canvas to PNG and/or PDF.
    Export(ExportArgs),
    /// Print when a remote document last changed.
    Status(StatusArgs),
}

#[derive(Parser, Debug)]
struct ExportArgs {
    /// Canvas JSON file, or the id of a canvas on the backend.
    #[arg(long)]
    input: String,

    /// Output PNG path. With neither output given, a PNG data URL is printed.
    #[arg(long)]
    png: Option<PathBuf>,

    /// Output PDF path.
    #[arg(long)]
    pdf: Option<PathBuf>,

    /// Margin around the content, in document units.
    #[arg(long, default_value_t = 20.0)]
    padding: f64,
}

#[derive(Parser, Debug)]
struct StatusArgs {
    #[arg(long, value_enum)]
    kind: KindArg,

    #[arg(long)]
    id: u64,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum KindArg {
    Page,
    Translation,
    Canvas,
}

impl From<KindArg> for DocumentKind {
    fn from(kind: KindArg) -> Self {
        match kind {
            KindArg::Page => DocumentKind::Page,
            KindArg::Translation => DocumentKind::Translation,
            KindArg::Canvas => DocumentKind::Canvas,
        }
    }
}

/// Where the canvas to export comes from.
#[derive(Debug, PartialEq)]
enum CanvasSource {
    File(PathBuf),
    Remote(u64),
}

impl CanvasSource {
    fn parse(input: &str) -> Self {
        match input.parse::<u64>() {
            Ok(id) if !Path::new(input).exists() => CanvasSource::Remote(id),
            _ => CanvasSource::File(PathBuf::from(input)),
        }
    }
}

fn load_config(path: Option<&Path>) -> anyhow::Result<EngineConfig> {
    let Some(path) = path else {
        return Ok(EngineConfig::default());
    };
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("read config '{}'", path.display()))?;
    EngineConfig::from_json(&text).with_context(|| format!("parse config '{}'", path.display()))
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;
    match cli.cmd {
        Command::Export(args) => cmd_export(&config, args).await,
        Command::Status(args) => cmd_status(&config, args).await,
    }
}

async fn cmd_export(config: &EngineConfig, args: ExportArgs) -> anyhow::Result<()> {
    let backend = HttpBackend::new(&config.backend)?;

    let content = match CanvasSource::parse(&args.input) {
        CanvasSource::File(path) => std::fs::read_to_string(&path)
            .with_context(|| format!("read canvas '{}'", path.display()))?,
        CanvasSource::Remote(id) => {
            let document = DocumentRef::canvas(id);
            backend
                .fetch(document)
                .await
                .with_context(|| format!("fetch {document}"))?
                .content
        }
    };
    let document = if content.trim().is_empty() {
        CanvasDocument::with_background(config.preferences.default_background())
    } else {
        CanvasDocument::from_json(&content).context("parse canvas")?
    };
    log::info!(
        "Exporting canvas with {} strokes and {} images",
        document.lines.len(),
        document.images.len()
    );

    let assets = fetch_assets(&backend, &document).await;
    let options = ExportOptions {
        padding: args.padding,
        region: None,
    };

    if let Some(out) = &args.png {
        let png = export_png(&document, &assets, &options)?;
        write_output(out, &png)?;
    }
    if let Some(out) = &args.pdf {
        let pdf = export_pdf(&document, &assets, &options)?;
        write_output(out, &pdf)?;
    }
    if args.png.is_none() && args.pdf.is_none() {
        let png = export_png(&document, &assets, &options)?;
        println!("{}", png_data_url(&png));
    }
    Ok(())
}

fn write_output(path: &Path, bytes: &[u8]) -> anyhow::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create output dir '{}'", parent.display()))?;
    }
    std::fs::write(path, bytes).with_context(|| format!("write '{}'", path.display()))?;
    eprintln!("wrote {}", path.display());
    Ok(())
}

async fn cmd_status(config: &EngineConfig, args: StatusArgs) -> anyhow::Result<()> {
    let backend = HttpBackend::new(&config.backend)?;
    let document = DocumentRef::new(args.kind.into(), args.id);
    match backend.last_update(document).await? {
        Some(at) => println!("{document} last updated at {at}"),
        None => println!("{document} has never been updated"),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_export_arguments() {
        let cli = Cli::try_parse_from([
            "livedoc", "export", "--input", "42", "--pdf", "out.pdf", "--padding", "5",
        ])
        .unwrap();
        let Command::Export(args) = cli.cmd else {
            panic!("expected export");
        };
        assert_eq!(args.input, "42");
        assert_eq!(args.pdf, Some(PathBuf::from("out.pdf")));
        assert_eq!(args.png, None);
        assert_eq!(args.padding, 5.0);
    }

    #[test]
    fn test_status_arguments() {
        let cli = Cli::try_parse_from([
            "livedoc", "--config", "c.json", "status", "--kind", "translation", "--id", "7",
        ])
        .unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("c.json")));
        let Command::Status(args) = cli.cmd else {
            panic!("expected status");
        };
        assert_eq!(DocumentKind::from(args.kind), DocumentKind::Translation);
        assert_eq!(args.id, 7);
    }

    #[test]
    fn test_canvas_source() {
        assert_eq!(CanvasSource::parse("12"), CanvasSource::Remote(12));
        assert_eq!(
            CanvasSource::parse("drawing.json"),
            CanvasSource::File(PathBuf::from("drawing.json"))
        );
    }

    #[test]
    fn test_missing_config_is_default() {
        assert_eq!(load_config(None).unwrap(), EngineConfig::default());
        assert!(load_config(Some(Path::new("/nonexistent/livedoc.json"))).is_err());
    }
}
