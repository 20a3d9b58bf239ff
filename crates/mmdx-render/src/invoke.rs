//! Render invocation
//!
//! Host side of the render call: builds the [`RenderRequest`] for a file,
//! sends it into the sandbox and checks the reply. The in-page half lives
//! in [`RENDER_FUNCTION`], which a sandbox evaluates with the serialized
//! request as its only argument.

use crate::config::{GanttConfig, SequenceConfig};
use crate::error::{ExportError, Result};
use crate::sandbox::{DiagramFit, RenderRequest, Sandbox};
use crate::types::FileTask;

/// Engine log level passed to `mermaid.initialize`
pub const ENGINE_LOG_LEVEL: u8 = 1;

/// In-page render function
///
/// 1. drops containers left by a previous request
/// 2. inserts the source as a text node in a fresh `.mermaid` container
/// 3. configures the engine (natural widths, gantt callbacks revived)
/// 4. runs the engine and waits for it
/// 5. serializes the first `<svg>`
pub const RENDER_FUNCTION: &str = r#"async function (request) {
  for (const old of Array.from(document.getElementsByClassName('mermaid'))) {
    old.parentNode.removeChild(old);
  }

  const container = document.createElement('div');
  container.className = 'mermaid';
  container.appendChild(document.createTextNode(request.contents));
  document.body.appendChild(container);

  const revive = (value) => {
    if (typeof value === 'string' && /^\s*function/.test(value)) {
      return new Function('return (' + value + ');')();
    }
    if (Array.isArray(value)) {
      return value.map(revive);
    }
    if (value && typeof value === 'object') {
      const out = {};
      for (const key of Object.keys(value)) {
        out[key] = revive(value[key]);
      }
      return out;
    }
    return value;
  };

  try {
    const engine = window.mermaid;
    if (!engine) {
      return { svg: null, error: 'mermaid is not loaded in the page' };
    }
    const gantt = revive(request.ganttConfig);
    engine.initialize({
      startOnLoad: false,
      sequenceDiagram: request.sequenceConfig,
      sequence: request.sequenceConfig,
      flowchart: { useMaxWidth: false },
      gantt: gantt,
      logLevel: __LOG_LEVEL__
    });
    engine.ganttConfig = gantt;

    if (typeof engine.run === 'function') {
      await engine.run({ nodes: [container] });
    } else {
      await Promise.resolve(engine.init(undefined, container));
    }
  } catch (err) {
    return { svg: null, error: String((err && err.message) || err) };
  }

  const svg = document.querySelector('svg');
  if (!svg) {
    return { svg: null, error: null };
  }
  return { svg: new XMLSerializer().serializeToString(svg), error: null };
}"#;

/// In-page function that applies a [`DiagramFit`] to the body and the live `<svg>`
pub const FIT_FUNCTION: &str = r#"function (fit) {
  document.body.setAttribute('style', fit.style);
  const svg = document.querySelector('svg');
  if (svg) {
    svg.setAttribute('style', fit.style);
    svg.setAttribute('width', fit.width);
    svg.setAttribute('height', fit.height);
  }
  return true;
}"#;

/// Build a self-invoking expression calling `function` with `argument`
///
/// The argument is embedded as a JSON literal, so nothing but data crosses
/// into the page.
pub fn call_expression<T: serde::Serialize>(function: &str, argument: &T) -> Result<String> {
    let json = serde_json::to_string(argument)
        .map_err(|e| ExportError::Session(format!("cannot serialize sandbox call: {e}")))?;
    Ok(format!("({function})({json})"))
}

/// Expression a sandbox evaluates for one render request
pub fn render_expression(request: &RenderRequest) -> Result<String> {
    let function = RENDER_FUNCTION.replace("__LOG_LEVEL__", &ENGINE_LOG_LEVEL.to_string());
    call_expression(&function, request)
}

/// Expression a sandbox evaluates to fit the live diagram
pub fn fit_expression(fit: &DiagramFit) -> Result<String> {
    call_expression(FIT_FUNCTION, fit)
}

/// Render one file and return the engine's raw SVG markup
pub async fn render<S>(
    sandbox: &mut S,
    task: &FileTask,
    sequence: &SequenceConfig,
    gantt: &GanttConfig,
    width: u32,
) -> Result<String>
where
    S: Sandbox + ?Sized,
{
    let request = RenderRequest {
        contents: task.source.clone(),
        sequence_config: sequence.at_natural_width(),
        gantt_config: gantt.clone(),
        conf_width: width,
    };

    let response = sandbox.render(&request).await?;
    match response.svg {
        Some(svg) if !svg.trim().is_empty() => Ok(svg),
        _ => Err(ExportError::RenderFailure {
            path: task.path.clone(),
            reason: response
                .error
                .unwrap_or_else(|| "engine produced no <svg> element".to_string()),
        }),
    }
}
