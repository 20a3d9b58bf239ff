//! CLI Application logic
//!
//! Contains the command-line interface implementation.

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::builder::NonEmptyStringValueParser;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use mmdx_render::config::{load_css, load_json_config};
use mmdx_render::{
    ChromeLauncher, ChromeOptions, EngineScript, GanttConfig, Pipeline, RenderConfig,
    SequenceConfig, DEFAULT_WIDTH,
};

#[derive(Debug, Parser)]
#[command(name = "mmdx")]
#[command(author, version, about = "Render Mermaid diagrams to PNG and SVG", long_about = None)]
pub struct Cli {
    /// Mermaid source files, rendered in the given order
    #[arg(required = true, value_name = "FILE")]
    pub files: Vec<PathBuf>,

    /// Output SVG (without --png, only SVG is written)
    #[arg(short, long)]
    pub svg: bool,

    /// Output PNG (the default)
    #[arg(short, long)]
    pub png: bool,

    /// Directory to write artifacts to, created if missing (defaults to the current directory)
    #[arg(short, long, value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// Suffix appended to every output file name, before the extension
    #[arg(short = 'O', long, value_name = "SUFFIX", value_parser = NonEmptyStringValueParser::new())]
    pub output_suffix: Option<String>,

    /// Stylesheet for the page and the SVG (defaults to mermaid.css next to the engine)
    #[arg(short = 't', long, value_name = "FILE")]
    pub css: Option<PathBuf>,

    /// JSON file with sequence diagram settings
    #[arg(short = 'c', long, value_name = "FILE")]
    pub sequence_config: Option<PathBuf>,

    /// JSON file with gantt diagram settings
    #[arg(short, long, value_name = "FILE")]
    pub gantt_config: Option<PathBuf>,

    /// Width of the exported image in pixels
    #[arg(
        short,
        long,
        value_name = "PX",
        default_value_t = DEFAULT_WIDTH,
        value_parser = clap::value_parser!(u32).range(1..)
    )]
    pub width: u32,

    /// Log progress and forward the page's console output
    #[arg(short, long)]
    pub verbose: bool,

    /// Mermaid engine script (mermaid.min.js)
    #[arg(short, long, env = "MMDX_ENGINE", value_name = "FILE")]
    pub engine: Option<PathBuf>,

    /// Chromium executable (discovered on the system if not given)
    #[arg(long, env = "CHROME", value_name = "FILE")]
    pub chrome: Option<PathBuf>,

    /// Run Chromium without its OS sandbox (needed in most containers)
    #[arg(long)]
    pub no_sandbox: bool,
}

/// Whether PNG output is on: always, unless SVG was asked for alone
pub fn wants_png(png: bool, svg: bool) -> bool {
    png || !svg
}

/// Turn parsed arguments into a batch config and browser options
///
/// Loads the engine script, the stylesheet and the JSON configs, and
/// creates the output directory.
pub fn resolve(cli: Cli) -> Result<(RenderConfig, ChromeOptions)> {
    let engine = EngineScript::discover(cli.engine.as_deref())
        .context("Failed to load the Mermaid engine script")?;

    let css = match cli.css.clone().or_else(|| engine.sibling_css()) {
        Some(path) => load_css(&path)
            .with_context(|| format!("Failed to read stylesheet: {}", path.display()))?,
        None => String::new(),
    };

    let sequence: SequenceConfig = load_json_config(cli.sequence_config.as_deref())
        .context("Failed to load sequence config")?;
    let gantt: GanttConfig = load_json_config(cli.gantt_config.as_deref())
        .context("Failed to load gantt config")?;

    let output_dir = match cli.output_dir {
        Some(dir) => dir,
        None => std::env::current_dir().context("Failed to read the current directory")?,
    };
    fs::create_dir_all(&output_dir).with_context(|| {
        format!(
            "Failed to create output directory: {}",
            output_dir.display()
        )
    })?;

    let mut config = RenderConfig::new(engine, cli.files);
    config.output_dir = output_dir;
    config.png = wants_png(cli.png, cli.svg);
    config.svg = cli.svg;
    config.verbose = cli.verbose;
    config.css = css;
    config.sequence = sequence;
    config.gantt = gantt;
    config.width = cli.width;
    config.output_suffix = cli.output_suffix.unwrap_or_default();

    let chrome = ChromeOptions {
        executable: cli.chrome,
        no_sandbox: cli.no_sandbox,
    };
    Ok((config, chrome))
}

/// Install the stderr log subscriber
///
/// `RUST_LOG` wins; otherwise warnings only, or progress with `--verbose`.
pub fn init_logging(verbose: bool) {
    let default = if verbose { "info,chromiumoxide=warn" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Run the CLI application
///
/// Parses arguments, renders every file and stops at the first failure.
pub async fn run_cli() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let (config, chrome) = resolve(cli)?;
    let report = Pipeline::new(ChromeLauncher::new(chrome), config)
        .run()
        .await
        .context("Export aborted")?;

    info!(
        "Rendered {} file(s), wrote {} artifact(s)",
        report.files,
        report.artifacts.len()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parse_defaults() {
        let cli = Cli::try_parse_from(["mmdx", "flow.mmd"]).unwrap();

        assert_eq!(cli.files, vec![PathBuf::from("flow.mmd")]);
        assert!(!cli.svg);
        assert!(!cli.png);
        assert_eq!(cli.width, 1200);
        assert!(cli.output_dir.is_none());
        assert!(cli.output_suffix.is_none());
        assert!(!cli.verbose);
        assert!(!cli.no_sandbox);
    }

    #[test]
    fn test_cli_parse_short_flags() {
        let cli = Cli::try_parse_from([
            "mmdx", "-s", "-p", "-o", "out", "-O", "_x", "-t", "a.css", "-c", "seq.json", "-g",
            "gantt.json", "-w", "800", "-v", "a.mmd", "b.mmd",
        ])
        .unwrap();

        assert!(cli.svg && cli.png && cli.verbose);
        assert_eq!(cli.output_dir, Some(PathBuf::from("out")));
        assert_eq!(cli.output_suffix.as_deref(), Some("_x"));
        assert_eq!(cli.css, Some(PathBuf::from("a.css")));
        assert_eq!(cli.sequence_config, Some(PathBuf::from("seq.json")));
        assert_eq!(cli.gantt_config, Some(PathBuf::from("gantt.json")));
        assert_eq!(cli.width, 800);
        assert_eq!(
            cli.files,
            vec![PathBuf::from("a.mmd"), PathBuf::from("b.mmd")]
        );
    }

    #[test]
    fn test_cli_requires_a_file() {
        assert!(Cli::try_parse_from(["mmdx"]).is_err());
        assert!(Cli::try_parse_from(["mmdx", "--svg"]).is_err());
    }

    #[test]
    fn test_cli_rejects_zero_width() {
        assert!(Cli::try_parse_from(["mmdx", "-w", "0", "a.mmd"]).is_err());
        assert!(Cli::try_parse_from(["mmdx", "-w", "wide", "a.mmd"]).is_err());
    }

    #[test]
    fn test_cli_rejects_empty_values() {
        assert!(Cli::try_parse_from(["mmdx", "--output-suffix", "", "a.mmd"]).is_err());
        assert!(Cli::try_parse_from(["mmdx", "--output-dir", "", "a.mmd"]).is_err());
        assert!(Cli::try_parse_from(["mmdx", "--css", "", "a.mmd"]).is_err());
    }

    #[test]
    fn test_png_policy() {
        assert!(wants_png(false, false));
        assert!(!wants_png(false, true));
        assert!(wants_png(true, false));
        assert!(wants_png(true, true));
    }
}
