//! Shared output layer for human/JSON parity across CLI commands.
//!
//! Every command handler receives an [`OutputMode`] and formats its result
//! accordingly. Errors are rendered once, in `main`, from the error chain.

use quire_core::error::ErrorCode;
use serde::Serialize;
use std::io::{self, Write};

/// Shared width for human separators.
pub const RULE_WIDTH: usize = 72;

/// Write a horizontal separator.
pub fn rule(w: &mut dyn Write) -> io::Result<()> {
    writeln!(w, "{:-<width$}", "", width = RULE_WIDTH)
}

/// Write a section heading followed by a separator.
pub fn section(w: &mut dyn Write, heading: &str) -> io::Result<()> {
    writeln!(w, "{heading}")?;
    rule(w)
}

/// Render a left-aligned key/value line.
pub fn kv(w: &mut dyn Write, key: &str, value: impl AsRef<str>) -> io::Result<()> {
    writeln!(w, "{:<12} {}", format!("{key}:"), value.as_ref())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    Human,
    Json,
}

impl OutputMode {
    pub const fn from_json_flag(json: bool) -> Self {
        if json { Self::Json } else { Self::Human }
    }

    pub const fn is_json(self) -> bool {
        matches!(self, Self::Json)
    }
}

/// Render a serializable value to stdout in the requested format.
///
/// In JSON mode the value is serialized with `serde_json`; otherwise
/// `human_fn` writes the text form.
pub fn render<T: Serialize>(
    mode: OutputMode,
    value: &T,
    human_fn: impl FnOnce(&T, &mut dyn Write) -> io::Result<()>,
) -> anyhow::Result<()> {
    let stdout = io::stdout();
    let mut out = stdout.lock();
    write_value(&mut out, mode, value, human_fn)
}

fn write_value<T: Serialize>(
    out: &mut dyn Write,
    mode: OutputMode,
    value: &T,
    human_fn: impl FnOnce(&T, &mut dyn Write) -> io::Result<()>,
) -> anyhow::Result<()> {
    match mode {
        OutputMode::Json => {
            serde_json::to_writer_pretty(&mut *out, value)?;
            writeln!(out)?;
        }
        OutputMode::Human => human_fn(value, out)?,
    }
    Ok(())
}

/// An error carrying an explicit [`ErrorCode`], for failures the core
/// cannot classify on its own (missing index, unknown root).
#[derive(Debug, thiserror::Error)]
#[error("{message}")]
pub struct CodedError {
    pub code: ErrorCode,
    pub message: String,
}

impl CodedError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

/// A structured error with optional suggestion and error code.
#[derive(Debug, Serialize)]
pub struct CliError {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
    pub error_code: String,
}

impl From<&anyhow::Error> for CliError {
    fn from(error: &anyhow::Error) -> Self {
        let code = error
            .chain()
            .find_map(|cause| cause.downcast_ref::<CodedError>())
            .map_or_else(|| ErrorCode::classify(error), |coded| coded.code);
        Self {
            message: format!("{error:#}"),
            suggestion: code.hint().map(str::to_string),
            error_code: code.code().to_string(),
        }
    }
}

/// Render an error to stderr in the requested format.
pub fn render_error(mode: OutputMode, error: &CliError) -> anyhow::Result<()> {
    let stderr = io::stderr();
    let mut out = stderr.lock();
    write_error(&mut out, mode, error)
}

fn write_error(out: &mut dyn Write, mode: OutputMode, error: &CliError) -> anyhow::Result<()> {
    match mode {
        OutputMode::Json => {
            let wrapper = serde_json::json!({ "error": error });
            serde_json::to_writer_pretty(&mut *out, &wrapper)?;
            writeln!(out)?;
        }
        OutputMode::Human => {
            writeln!(out, "error[{}]: {}", error.error_code, error.message)?;
            if let Some(ref suggestion) = error.suggestion {
                writeln!(out, "  suggestion: {suggestion}")?;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn json_flag_selects_mode() {
        assert!(OutputMode::from_json_flag(true).is_json());
        assert!(!OutputMode::from_json_flag(false).is_json());
    }

    #[test]
    fn coded_errors_keep_their_code_through_context() {
        let error = Err::<(), _>(CodedError::new(ErrorCode::IndexNotFound, "no index"))
            .context("toc")
            .expect_err("error");
        let cli = CliError::from(&error);
        assert_eq!(cli.error_code, "E1001");
        assert!(cli.message.contains("no index"));
        assert!(cli.suggestion.is_some());
    }

    #[test]
    fn uncoded_errors_are_classified() {
        let error = anyhow::anyhow!("boom");
        assert_eq!(CliError::from(&error).error_code, "E9001");
    }

    #[test]
    fn human_error_shows_code_and_suggestion() {
        let error = CliError {
            message: "index database not found".into(),
            suggestion: Some("run quire index".into()),
            error_code: "E1001".into(),
        };
        let mut buf = Vec::new();
        write_error(&mut buf, OutputMode::Human, &error).expect("write");
        let text = String::from_utf8(buf).expect("utf8");
        assert!(text.starts_with("error[E1001]: index database not found"));
        assert!(text.contains("suggestion: run quire index"));
    }

    #[test]
    fn json_error_is_wrapped() {
        let error = CliError {
            message: "m".into(),
            suggestion: None,
            error_code: "E9001".into(),
        };
        let mut buf = Vec::new();
        write_error(&mut buf, OutputMode::Json, &error).expect("write");
        let json: serde_json::Value = serde_json::from_slice(&buf).expect("json");
        assert_eq!(json["error"]["error_code"], "E9001");
        assert!(json["error"].get("suggestion").is_none());
    }

    #[test]
    fn human_value_uses_closure() {
        let mut buf = Vec::new();
        write_value(&mut buf, OutputMode::Human, &42, |v, w| writeln!(w, "value {v}"))
            .expect("write");
        assert_eq!(String::from_utf8(buf).expect("utf8"), "value 42\n");
    }
}
