//! Pipeline tests against a scripted in-memory sandbox

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use mmdx_render::{
    DiagramFit, EngineScript, ExportError, Launcher, Pipeline, RenderConfig, RenderRequest,
    RenderResponse, Result, Sandbox, ViewportSpec,
};
use tempfile::TempDir;

const PNG_BYTES: &[u8] = b"\x89PNG\r\n\x1a\nfake";

#[derive(Debug, Clone, PartialEq)]
enum Call {
    SetContent(String),
    InjectScript(String),
    ForwardConsole,
    Render(String),
    Fit(DiagramFit),
    Viewport(ViewportSpec),
    Screenshot,
    Close,
}

/// Replies with canned markup; sources containing `FAIL` get an engine error
/// and sources containing `BROKEN` get unparseable markup
#[derive(Clone, Default)]
struct FakeLauncher {
    calls: Arc<Mutex<Vec<Call>>>,
}

impl FakeLauncher {
    fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }
}

struct FakeSandbox {
    calls: Arc<Mutex<Vec<Call>>>,
}

impl FakeSandbox {
    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl Launcher for FakeLauncher {
    type Session = FakeSandbox;

    async fn open(&self) -> Result<FakeSandbox> {
        Ok(FakeSandbox {
            calls: Arc::clone(&self.calls),
        })
    }
}

#[async_trait]
impl Sandbox for FakeSandbox {
    async fn set_content(&mut self, html: &str) -> Result<()> {
        self.record(Call::SetContent(html.to_string()));
        Ok(())
    }

    async fn inject_script(&mut self, script: &str) -> Result<()> {
        self.record(Call::InjectScript(script.to_string()));
        Ok(())
    }

    async fn forward_console(&mut self) -> Result<()> {
        self.record(Call::ForwardConsole);
        Ok(())
    }

    async fn render(&mut self, request: &RenderRequest) -> Result<RenderResponse> {
        self.record(Call::Render(request.contents.clone()));
        if request.contents.contains("FAIL") {
            return Ok(RenderResponse {
                svg: None,
                error: Some("Parse error on line 1".to_string()),
            });
        }
        if request.contents.contains("BROKEN") {
            return Ok(RenderResponse {
                svg: Some("<svg width=\"10\"><g></svg>".to_string()),
                error: None,
            });
        }
        Ok(RenderResponse {
            svg: Some(
                "<svg id=\"d\" width=\"100\" height=\"50\"><style>.old{}</style><g/></svg>"
                    .to_string(),
            ),
            error: None,
        })
    }

    async fn fit_diagram(&mut self, fit: &DiagramFit) -> Result<()> {
        self.record(Call::Fit(fit.clone()));
        Ok(())
    }

    async fn set_viewport(&mut self, viewport: ViewportSpec) -> Result<()> {
        self.record(Call::Viewport(viewport));
        Ok(())
    }

    async fn screenshot_png(&mut self) -> Result<Vec<u8>> {
        self.record(Call::Screenshot);
        Ok(PNG_BYTES.to_vec())
    }

    async fn close(&mut self) -> Result<()> {
        self.record(Call::Close);
        Ok(())
    }
}

struct Fixture {
    _inputs: TempDir,
    output: TempDir,
    files: Vec<PathBuf>,
}

fn fixture(sources: &[(&str, &str)]) -> Fixture {
    let inputs = TempDir::new().unwrap();
    let files = sources
        .iter()
        .map(|(name, source)| {
            let path = inputs.path().join(name);
            fs::write(&path, source).unwrap();
            path
        })
        .collect();
    Fixture {
        _inputs: inputs,
        output: TempDir::new().unwrap(),
        files,
    }
}

fn config(fixture: &Fixture) -> RenderConfig {
    let engine = EngineScript {
        path: PathBuf::from("mermaid.min.js"),
        source: "window.mermaid = {};".to_string(),
    };
    let mut config = RenderConfig::new(engine, fixture.files.clone());
    config.output_dir = fixture.output.path().to_path_buf();
    config
}

fn written(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

#[tokio::test]
async fn test_png_and_svg_for_every_file() {
    let fx = fixture(&[("a.mmd", "graph TD; A-->B;"), ("b.mmd", "graph LR; C-->D;")]);
    let mut config = config(&fx);
    config.svg = true;
    config.output_suffix = "_out".to_string();

    let launcher = FakeLauncher::default();
    let report = Pipeline::new(launcher.clone(), config).run().await.unwrap();

    assert_eq!(report.files, 2);
    let out = fx.output.path();
    assert_eq!(
        report.artifacts,
        vec![
            out.join("a.mmd_out.png"),
            out.join("a.mmd_out.svg"),
            out.join("b.mmd_out.png"),
            out.join("b.mmd_out.svg"),
        ]
    );
    assert_eq!(
        written(out),
        ["a.mmd_out.png", "a.mmd_out.svg", "b.mmd_out.png", "b.mmd_out.svg"]
    );
    assert_eq!(fs::read(out.join("a.mmd_out.png")).unwrap(), PNG_BYTES);
    assert_eq!(launcher.calls().last(), Some(&Call::Close));
}

#[tokio::test]
async fn test_files_rendered_in_input_order() {
    let fx = fixture(&[
        ("3.mmd", "graph TD; three"),
        ("1.mmd", "graph TD; one"),
        ("2.mmd", "graph TD; two"),
    ]);
    let launcher = FakeLauncher::default();
    Pipeline::new(launcher.clone(), config(&fx))
        .run()
        .await
        .unwrap();

    let rendered: Vec<String> = launcher
        .calls()
        .into_iter()
        .filter_map(|call| match call {
            Call::Render(source) => Some(source),
            _ => None,
        })
        .collect();
    assert_eq!(
        rendered,
        ["graph TD; three", "graph TD; one", "graph TD; two"]
    );
}

#[tokio::test]
async fn test_svg_only() {
    let fx = fixture(&[("flow.mmd", "graph TD; A-->B;")]);
    let mut config = config(&fx);
    config.png = false;
    config.svg = true;

    let launcher = FakeLauncher::default();
    Pipeline::new(launcher.clone(), config).run().await.unwrap();

    assert_eq!(written(fx.output.path()), ["flow.mmd.svg"]);
    assert!(!launcher.calls().contains(&Call::Screenshot));
}

#[tokio::test]
async fn test_svg_is_normalized_and_rescaled() {
    let fx = fixture(&[("flow.mmd", "graph TD; A-->B;")]);
    let mut config = config(&fx);
    config.svg = true;
    config.css = ".node { fill: red; }".to_string();

    Pipeline::new(FakeLauncher::default(), config)
        .run()
        .await
        .unwrap();

    let svg = fs::read_to_string(fx.output.path().join("flow.mmd.svg")).unwrap();
    assert!(svg.ends_with("</svg>\n"));
    assert!(svg.contains("xmlns=\"http://www.w3.org/2000/svg\""));
    assert!(svg.contains("xmlns:xlink=\"http://www.w3.org/1999/xlink\""));
    assert!(svg.contains("version=\"1.1\""));
    assert!(svg.contains("<style>.node { fill: red; }</style>"));
    assert!(!svg.contains(".old{}"));
    assert!(svg.contains("width=\"1200\""));
    assert!(svg.contains("style=\"width: 1192; height: 633.80"));
    assert!(svg.contains("height=\"633.80"));
}

#[tokio::test]
async fn test_viewport_sized_before_capture() {
    let fx = fixture(&[("flow.mmd", "graph TD; A-->B;")]);
    let launcher = FakeLauncher::default();
    Pipeline::new(launcher.clone(), config(&fx))
        .run()
        .await
        .unwrap();

    let calls = launcher.calls();
    let fit = calls
        .iter()
        .position(|c| matches!(c, Call::Fit(_)))
        .unwrap();
    let viewport = calls
        .iter()
        .position(|c| matches!(c, Call::Viewport(_)))
        .unwrap();
    let shot = calls.iter().position(|c| *c == Call::Screenshot).unwrap();
    assert!(fit < viewport && viewport < shot);
    assert_eq!(
        calls[viewport],
        Call::Viewport(ViewportSpec {
            width: 1200,
            height: 633
        })
    );
}

#[tokio::test]
async fn test_bootstrap_once_per_batch() {
    let fx = fixture(&[("a.mmd", "graph TD; a"), ("b.mmd", "graph TD; b")]);
    let launcher = FakeLauncher::default();
    Pipeline::new(launcher.clone(), config(&fx))
        .run()
        .await
        .unwrap();

    let calls = launcher.calls();
    let contents = calls
        .iter()
        .filter(|c| matches!(c, Call::SetContent(_)))
        .count();
    assert_eq!(contents, 1);
    assert!(matches!(&calls[0], Call::SetContent(html) if html.contains("font-family: Arial")));
    assert_eq!(
        calls[1],
        Call::InjectScript("window.mermaid = {};".to_string())
    );
    assert!(!calls.contains(&Call::ForwardConsole));
}

#[tokio::test]
async fn test_verbose_forwards_console() {
    let fx = fixture(&[("a.mmd", "graph TD; a")]);
    let mut config = config(&fx);
    config.verbose = true;

    let launcher = FakeLauncher::default();
    Pipeline::new(launcher.clone(), config).run().await.unwrap();

    assert_eq!(launcher.calls()[2], Call::ForwardConsole);
}

#[tokio::test]
async fn test_render_failure_stops_batch_and_closes() {
    let fx = fixture(&[
        ("a.mmd", "graph TD; ok"),
        ("b.mmd", "FAIL"),
        ("c.mmd", "graph TD; never"),
    ]);
    let launcher = FakeLauncher::default();
    let err = Pipeline::new(launcher.clone(), config(&fx))
        .run()
        .await
        .unwrap_err();

    match err {
        ExportError::RenderFailure { path, reason } => {
            assert_eq!(path, fx.files[1]);
            assert_eq!(reason, "Parse error on line 1");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(written(fx.output.path()), ["a.mmd.png"]);

    let calls = launcher.calls();
    assert!(!calls.contains(&Call::Render("graph TD; never".to_string())));
    assert_eq!(calls.last(), Some(&Call::Close));
}

#[tokio::test]
async fn test_malformed_output_is_an_error() {
    let fx = fixture(&[("a.mmd", "BROKEN")]);
    let launcher = FakeLauncher::default();
    let err = Pipeline::new(launcher.clone(), config(&fx))
        .run()
        .await
        .unwrap_err();

    assert!(matches!(err, ExportError::MalformedOutput(_)));
    assert!(written(fx.output.path()).is_empty());
    assert_eq!(launcher.calls().last(), Some(&Call::Close));
}

#[tokio::test]
async fn test_missing_input_file_closes_session() {
    let fx = fixture(&[]);
    let mut config = config(&fx);
    config.files = vec![fx.output.path().join("missing.mmd")];

    let launcher = FakeLauncher::default();
    let err = Pipeline::new(launcher.clone(), config)
        .run()
        .await
        .unwrap_err();

    assert!(matches!(err, ExportError::Io(_)));
    assert_eq!(launcher.calls().last(), Some(&Call::Close));
}

#[tokio::test]
async fn test_invalid_config_never_opens_a_session() {
    let fx = fixture(&[("a.mmd", "graph TD; a")]);
    let mut config = config(&fx);
    config.png = false;
    config.svg = false;

    let launcher = FakeLauncher::default();
    let err = Pipeline::new(launcher.clone(), config)
        .run()
        .await
        .unwrap_err();

    assert!(matches!(err, ExportError::Config(_)));
    assert!(launcher.calls().is_empty());
}
