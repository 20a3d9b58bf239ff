//! SVG post-processing
//!
//! Turns the markup the engine hands back into a standalone SVG document:
//!
//! - the root element gets `version="1.1"` and proper `xmlns` /
//!   `xmlns:xlink` declarations,
//! - the first `<style>` element gets the user stylesheet,
//! - the root's `width`/`height` give the intrinsic size, which drives the
//!   scaling to the requested output width.
//!
//! The rewrite streams events through `quick-xml`, so everything we do not
//! touch is written back byte for byte.

use std::borrow::Cow;

use quick_xml::escape::partial_escape;
use quick_xml::events::attributes::Attribute;
use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};

use crate::error::{ExportError, Result};
use crate::sandbox::DiagramFit;
use crate::types::ViewportSpec;

/// SVG namespace URI
pub const SVG_NS: &str = "http://www.w3.org/2000/svg";

/// XLink namespace URI
pub const XLINK_NS: &str = "http://www.w3.org/1999/xlink";

/// Factor between the sandbox's layout pass and the final capture density
pub const DEVICE_SCALE_CORRECTION: f64 = 1.5;

/// Fixed padding the page layout adds around the diagram
pub const LAYOUT_PADDING: f64 = 8.0;

/// Width and height read from the root element
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IntrinsicSize {
    pub width: u32,
    pub height: u32,
}

/// Output geometry derived from the intrinsic size and the target width
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Geometry {
    pub target_width: u32,
    pub bounding_width: f64,
    pub bounding_height: f64,
    pub scale_factor: f64,
    pub final_height: f64,
}

impl Geometry {
    /// Scale `intrinsic` so the capture is `target_width` pixels wide
    ///
    /// An intrinsic width of 0 is not special-cased: the divisor is then
    /// `-8` and the result is a finite (negative) scale factor.
    pub fn compute(intrinsic: IntrinsicSize, target_width: u32) -> Self {
        let target = f64::from(target_width);
        let bounding_width = f64::from(intrinsic.width) * DEVICE_SCALE_CORRECTION;
        let bounding_height = f64::from(intrinsic.height) * DEVICE_SCALE_CORRECTION;
        let scale_factor = target / (bounding_width - LAYOUT_PADDING);
        Self {
            target_width,
            bounding_width,
            bounding_height,
            scale_factor,
            final_height: bounding_height * scale_factor,
        }
    }

    /// Capture area for this geometry
    ///
    /// The height is truncated to whole pixels. Degenerate heights (zero,
    /// negative, not finite) become a single pixel, the smallest viewport
    /// the sandbox accepts.
    pub fn viewport(&self) -> ViewportSpec {
        let height = if self.final_height.is_finite() && self.final_height >= 1.0 {
            self.final_height.trunc().min(f64::from(u32::MAX)) as u32
        } else {
            log::warn!(
                "Degenerate output height {}, clamping viewport to 1px",
                self.final_height
            );
            1
        };
        ViewportSpec {
            width: self.target_width,
            height,
        }
    }

    /// Inline style shared by the page body and the svg element
    pub fn style(&self) -> String {
        format!(
            "width: {}; height: {};",
            format_number(f64::from(self.target_width) - LAYOUT_PADDING),
            format_number(self.final_height)
        )
    }

    /// Sizing instructions for the live diagram in the sandbox
    pub fn fit(&self) -> DiagramFit {
        DiagramFit {
            style: self.style(),
            width: self.target_width.to_string(),
            height: format_number(self.final_height),
        }
    }
}

/// An engine result that went through namespace and style repair
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedDocument {
    markup: String,
    intrinsic: IntrinsicSize,
}

impl NormalizedDocument {
    /// Serialized document
    pub fn markup(&self) -> &str {
        &self.markup
    }

    /// Size read from the root element before any rescaling
    pub fn intrinsic(&self) -> IntrinsicSize {
        self.intrinsic
    }

    /// Write the computed style and size onto the root element
    pub fn apply_geometry(&mut self, geometry: &Geometry) -> Result<()> {
        let style = geometry.style();
        let width = geometry.target_width.to_string();
        let height = format_number(geometry.final_height);
        let edits = [
            ("style", style.as_str()),
            ("width", width.as_str()),
            ("height", height.as_str()),
        ];

        self.markup = rewrite(&self.markup, None, |root| set_attributes(root, &edits))?;
        Ok(())
    }

    /// Contents of the `.svg` artifact
    pub fn to_file_contents(&self) -> String {
        format!("{}\n", self.markup)
    }
}

/// Repair namespaces, inject `css` and read the intrinsic size
///
/// Running this on its own output changes nothing.
pub fn normalize(raw: &str, css: &str) -> Result<NormalizedDocument> {
    let mut intrinsic = IntrinsicSize::default();
    let markup = rewrite(raw, Some(css), |root| {
        let (repaired, size) = repair_root(root)?;
        intrinsic = size;
        Ok(repaired)
    })?;
    Ok(NormalizedDocument { markup, intrinsic })
}

/// Parse a `width`/`height` attribute value the lenient way
///
/// Anything that is not a finite number of at least one pixel is `0`.
pub fn coerce_dimension(value: &str) -> u32 {
    match value.trim().parse::<f64>() {
        Ok(v) if v.is_finite() && v >= 1.0 => v.trunc().min(f64::from(u32::MAX)) as u32,
        _ => 0,
    }
}

/// Format a number the way a browser stringifies it in an attribute
pub fn format_number(value: f64) -> String {
    if value == 0.0 {
        "0".to_string()
    } else if value.is_nan() {
        "NaN".to_string()
    } else if value == f64::INFINITY {
        "Infinity".to_string()
    } else if value == f64::NEG_INFINITY {
        "-Infinity".to_string()
    } else {
        value.to_string()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StyleState {
    Pending,
    Replacing { depth: usize },
    Done,
}

/// Stream `input` back out, letting `on_root` rebuild the root start tag and
/// replacing the text of the first `<style>` with `css` (when non-empty)
fn rewrite<F>(input: &str, css: Option<&str>, mut on_root: F) -> Result<String>
where
    F: FnMut(&BytesStart<'_>) -> Result<BytesStart<'static>>,
{
    let mut reader = Reader::from_str(input);
    let mut writer = Writer::new(Vec::with_capacity(input.len() + css.map_or(0, str::len)));

    let mut style = match css {
        Some(css) if !css.is_empty() => StyleState::Pending,
        _ => StyleState::Done,
    };
    let css = css.unwrap_or_default();
    let mut depth = 0usize;
    let mut root_seen = false;
    let mut root_closed = false;

    loop {
        let event = reader.read_event().map_err(|e| {
            ExportError::MalformedOutput(format!(
                "at byte {}: {e}",
                reader.buffer_position()
            ))
        })?;

        if let StyleState::Replacing { depth: style_depth } = style {
            match &event {
                Event::End(_) if depth == style_depth => {
                    style = StyleState::Done;
                }
                Event::Start(_) => {
                    depth += 1;
                    continue;
                }
                Event::End(_) => {
                    depth -= 1;
                    continue;
                }
                Event::Eof => {}
                _ => continue,
            }
        }

        match event {
            Event::Start(e) => {
                if root_closed {
                    return Err(trailing_content());
                }
                if !root_seen {
                    root_seen = true;
                    writer.write_event(Event::Start(on_root(&e)?))?;
                } else if style == StyleState::Pending && e.local_name().as_ref() == b"style" {
                    writer.write_event(Event::Start(e))?;
                    writer.write_event(Event::Text(BytesText::from_escaped(partial_escape(
                        css,
                    ))))?;
                    style = StyleState::Replacing { depth: depth + 1 };
                } else {
                    writer.write_event(Event::Start(e))?;
                }
                depth += 1;
            }
            Event::Empty(e) => {
                if root_closed {
                    return Err(trailing_content());
                }
                if !root_seen {
                    root_seen = true;
                    root_closed = true;
                    writer.write_event(Event::Empty(on_root(&e)?))?;
                } else if style == StyleState::Pending && e.local_name().as_ref() == b"style" {
                    let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                    writer.write_event(Event::Start(e))?;
                    writer.write_event(Event::Text(BytesText::from_escaped(partial_escape(
                        css,
                    ))))?;
                    writer.write_event(Event::End(BytesEnd::new(name)))?;
                    style = StyleState::Done;
                } else {
                    writer.write_event(Event::Empty(e))?;
                }
            }
            Event::End(e) => {
                depth = depth.checked_sub(1).ok_or_else(|| {
                    ExportError::MalformedOutput("unbalanced closing tag".to_string())
                })?;
                if depth == 0 {
                    root_closed = true;
                }
                writer.write_event(Event::End(e))?;
            }
            Event::Text(t) => {
                if depth == 0 && !t.iter().all(u8::is_ascii_whitespace) {
                    return Err(ExportError::MalformedOutput(
                        "text outside the root element".to_string(),
                    ));
                }
                writer.write_event(Event::Text(t))?;
            }
            Event::Eof => break,
            other => writer.write_event(other)?,
        }
    }

    if !root_seen {
        return Err(ExportError::MalformedOutput(
            "no root element".to_string(),
        ));
    }
    if depth != 0 {
        return Err(ExportError::MalformedOutput(
            "unexpected end of document".to_string(),
        ));
    }

    String::from_utf8(writer.into_inner())
        .map_err(|e| ExportError::MalformedOutput(e.to_string()))
}

fn trailing_content() -> ExportError {
    ExportError::MalformedOutput("content after the root element".to_string())
}

fn owned_start(start: &BytesStart<'_>) -> BytesStart<'static> {
    BytesStart::new(String::from_utf8_lossy(start.name().as_ref()).into_owned())
}

fn attributes<'a>(
    start: &'a BytesStart<'_>,
) -> impl Iterator<Item = Result<Attribute<'a>>> + 'a {
    start
        .attributes()
        .map(|attr| attr.map_err(|e| ExportError::MalformedOutput(e.to_string())))
}

fn attribute_text(attr: &Attribute<'_>) -> Result<String> {
    attr.unescape_value()
        .map(Cow::into_owned)
        .map_err(|e| ExportError::MalformedOutput(e.to_string()))
}

/// Namespace repair for the root element
///
/// Existing attributes keep their position; `version` and `xmlns` are
/// overwritten in place, a bare `xlink` attribute is dropped, and missing
/// declarations are appended.
fn repair_root(start: &BytesStart<'_>) -> Result<(BytesStart<'static>, IntrinsicSize)> {
    let mut root = owned_start(start);
    let mut size = IntrinsicSize::default();
    let mut has_version = false;
    let mut has_xmlns = false;
    let mut has_xlink = false;

    for attr in attributes(start) {
        let attr = attr?;
        match attr.key.as_ref() {
            b"version" => {
                has_version = true;
                root.push_attribute(("version", "1.1"));
            }
            b"xmlns" => {
                has_xmlns = true;
                root.push_attribute(("xmlns", SVG_NS));
            }
            b"xlink" => {}
            b"xmlns:xlink" => {
                has_xlink = true;
                root.push_attribute(attr);
            }
            b"width" => {
                size.width = coerce_dimension(&attribute_text(&attr)?);
                root.push_attribute(attr);
            }
            b"height" => {
                size.height = coerce_dimension(&attribute_text(&attr)?);
                root.push_attribute(attr);
            }
            _ => root.push_attribute(attr),
        }
    }

    if !has_version {
        root.push_attribute(("version", "1.1"));
    }
    if !has_xmlns {
        root.push_attribute(("xmlns", SVG_NS));
    }
    if !has_xlink {
        root.push_attribute(("xmlns:xlink", XLINK_NS));
    }

    Ok((root, size))
}

/// Overwrite (in place) or append the given attributes on the root element
fn set_attributes(start: &BytesStart<'_>, edits: &[(&str, &str)]) -> Result<BytesStart<'static>> {
    let mut root = owned_start(start);
    let mut applied = vec![false; edits.len()];

    for attr in attributes(start) {
        let attr = attr?;
        match edits
            .iter()
            .position(|(key, _)| key.as_bytes() == attr.key.as_ref())
        {
            Some(i) => {
                applied[i] = true;
                root.push_attribute(edits[i]);
            }
            None => root.push_attribute(attr),
        }
    }

    for (edit, done) in edits.iter().zip(applied) {
        if !done {
            root.push_attribute(*edit);
        }
    }
    Ok(root)
}
