use std::fmt::Write as _;

use crate::error::ScriptError;
use crate::evaluator::{CallHandler, coerce_number, coerce_string};
use crate::executor::ArtifactPayload;
use crate::value::Value;

/// Builtin functions of the `calc` language. Printed text and declared
/// artifacts are collected for the block being executed.
pub(crate) struct Builtins<'a> {
    pub output: &'a mut String,
    pub artifacts: &'a mut Vec<ArtifactPayload>,
}

impl CallHandler for Builtins<'_> {
    fn call(&mut self, function: &str, arguments: Vec<Value>) -> Result<Value, ScriptError> {
        match function {
            "print" => {
                let line = arguments
                    .iter()
                    .map(Value::to_string)
                    .collect::<Vec<_>>()
                    .join(" ");
                self.output.push_str(&line);
                self.output.push('\n');
                Ok(Value::Unit)
            }
            "str" => {
                let [value] = exact::<1>(function, arguments)?;
                Ok(Value::String(value.to_string()))
            }
            "len" => {
                let [value] = exact::<1>(function, arguments)?;
                let s = coerce_string(&value)?;
                Ok(Value::Number(s.chars().count() as f64))
            }
            "save" => {
                let [extension, content] = exact::<2>(function, arguments)?;
                let extension = artifact_extension(coerce_string(&extension)?)?;
                self.artifacts.push(ArtifactPayload {
                    extension,
                    bytes: content.to_string().into_bytes(),
                });
                Ok(Value::Unit)
            }
            "bar_chart" => {
                let mut arguments = arguments.into_iter();
                let title = match arguments.next() {
                    Some(title) => title.to_string(),
                    None => return Err(arity(function, "at least 2", 0)),
                };
                let values = arguments
                    .map(|v| coerce_number(&v))
                    .collect::<Result<Vec<_>, _>>()?;
                if values.is_empty() {
                    return Err(arity(function, "at least 2", 1));
                }
                if let Some(value) = values.iter().find(|v| !v.is_finite()) {
                    return Err(ScriptError::Failed(format!(
                        "bar_chart values must be finite, got {value}"
                    )));
                }
                self.artifacts.push(ArtifactPayload {
                    extension: "svg".to_string(),
                    bytes: bar_chart_svg(&title, &values).into_bytes(),
                });
                Ok(Value::Unit)
            }
            "fail" => {
                let [message] = exact::<1>(function, arguments)?;
                Err(ScriptError::Failed(message.to_string()))
            }
            other => Err(ScriptError::UnknownFunction(other.to_string())),
        }
    }
}

fn arity(function: &str, expected: &str, got: usize) -> ScriptError {
    ScriptError::Arity {
        function: function.to_string(),
        expected: expected.to_string(),
        got,
    }
}

fn exact<const N: usize>(function: &str, arguments: Vec<Value>) -> Result<[Value; N], ScriptError> {
    let got = arguments.len();
    arguments
        .try_into()
        .map_err(|_| arity(function, &N.to_string(), got))
}

/// Artifact extensions end up in file names, so only `[A-Za-z0-9]+` passes.
fn artifact_extension(extension: &str) -> Result<String, ScriptError> {
    if extension.is_empty() || !extension.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(ScriptError::Failed(format!(
            "invalid artifact extension `{extension}`"
        )));
    }
    Ok(extension.to_ascii_lowercase())
}

const CHART_WIDTH: f64 = 400.0;
const CHART_HEIGHT: f64 = 240.0;
const CHART_MARGIN: f64 = 20.0;
const CHART_TITLE: f64 = 24.0;

/// A minimal bar chart. Output depends only on the inputs.
fn bar_chart_svg(title: &str, values: &[f64]) -> String {
    let max = values.iter().copied().fold(0.0_f64, f64::max);
    let plot_height = CHART_HEIGHT - 2.0 * CHART_MARGIN - CHART_TITLE;
    let scale = if max > 0.0 { plot_height / max } else { 0.0 };
    let slot = (CHART_WIDTH - 2.0 * CHART_MARGIN) / values.len() as f64;
    let baseline = CHART_HEIGHT - CHART_MARGIN;

    let mut svg = String::new();
    let _ = writeln!(
        svg,
        r#"<svg xmlns="http://www.w3.org/2000/svg" width="{CHART_WIDTH}" height="{CHART_HEIGHT}" viewBox="0 0 {CHART_WIDTH} {CHART_HEIGHT}">"#
    );
    let _ = writeln!(
        svg,
        r#"  <text x="{}" y="{}" text-anchor="middle" font-family="sans-serif" font-size="14">{}</text>"#,
        CHART_WIDTH / 2.0,
        CHART_MARGIN,
        escape_xml(title)
    );
    for (i, value) in values.iter().enumerate() {
        let height = (value.max(0.0) * scale * 100.0).round() / 100.0;
        let x = (CHART_MARGIN + slot * i as f64 + slot * 0.1) * 100.0;
        let _ = writeln!(
            svg,
            r#"  <rect x="{}" y="{}" width="{}" height="{}" fill="steelblue"/>"#,
            x.round() / 100.0,
            ((baseline - height) * 100.0).round() / 100.0,
            (slot * 80.0).round() / 100.0,
            height
        );
    }
    svg.push_str("</svg>\n");
    svg
}

fn escape_xml(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            c => out.push(c),
        }
    }
    out
}
