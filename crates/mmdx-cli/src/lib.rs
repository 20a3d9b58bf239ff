//! mmdx CLI - Command-line interface library
//!
//! Parses the command line into a [`mmdx_render::RenderConfig`] and runs the
//! render pipeline against a headless Chromium.
//!
//! # Library Usage
//!
//! ```ignore
//! use clap::Parser;
//! use mmdx_cli::{resolve, Cli};
//!
//! let cli = Cli::parse_from(["mmdx", "--svg", "flow.mmd"]);
//! let (config, chrome) = resolve(cli)?;
//! ```
//!
//! # Binary Usage
//!
//! ```bash
//! # PNG next to the current directory
//! mmdx flow.mmd
//!
//! # SVG only, into out/, 800px wide
//! mmdx --svg -w 800 -o out flow.mmd sequence.mmd
//!
//! # Both formats with a custom stylesheet
//! mmdx -s -p -t theme.css flow.mmd
//! ```

pub mod app;

pub use app::{init_logging, resolve, run_cli, wants_png, Cli};
