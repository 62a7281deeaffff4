//! Shared output layer: human text or stable JSON for every command.
//!
//! Results go to stdout, errors and logs to stderr. In JSON mode errors are
//! wrapped as `{"error": {"message": ..., "error_code": ..., "suggestion": ...}}`
//! so scripts can branch on the `E####` code.

use serde::Serialize;
use std::io::{self, Write};
use tubestats_core::{ConfigError, ErrorCode, StatsError};

/// Shared width for human separators.
pub const RULE_WIDTH: usize = 72;

/// Write a horizontal separator used by human output.
pub fn rule(w: &mut dyn Write) -> io::Result<()> {
    writeln!(w, "{:-<width$}", "", width = RULE_WIDTH)
}

/// Render a left-aligned key/value line in human output.
pub fn kv(w: &mut dyn Write, key: &str, value: impl AsRef<str>) -> io::Result<()> {
    writeln!(w, "{:<14} {}", format!("{key}:"), value.as_ref())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    Human,
    Json,
}

/// A structured error with optional suggestion and error code.
#[derive(Debug, Serialize)]
pub struct CliError {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
}

impl CliError {
    /// Build from an error chain, picking up the code of the first
    /// [`StatsError`] or [`ConfigError`] found in it.
    pub fn from_anyhow(err: &anyhow::Error) -> Self {
        let code = err.chain().find_map(error_code);
        Self {
            message: format!("{err:#}"),
            suggestion: code.and_then(ErrorCode::hint).map(str::to_string),
            error_code: code.map(|c| c.code().to_string()),
        }
    }
}

fn error_code(cause: &(dyn std::error::Error + 'static)) -> Option<ErrorCode> {
    if let Some(stats) = cause.downcast_ref::<StatsError>() {
        return Some(stats.code());
    }
    cause.downcast_ref::<ConfigError>().map(ConfigError::code)
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
    match mode {
        OutputMode::Json => {
            serde_json::to_writer_pretty(&mut out, value)?;
            writeln!(out)?;
        }
        OutputMode::Human => human_fn(value, &mut out)?,
    }
    Ok(())
}

/// Render an error to `w` in the requested format.
pub fn write_error(w: &mut dyn Write, mode: OutputMode, error: &CliError) -> anyhow::Result<()> {
    match mode {
        OutputMode::Json => {
            let wrapper = serde_json::json!({ "error": error });
            serde_json::to_writer_pretty(&mut *w, &wrapper)?;
            writeln!(w)?;
        }
        OutputMode::Human => {
            match error.error_code {
                Some(ref code) => writeln!(w, "error[{code}]: {}", error.message)?,
                None => writeln!(w, "error: {}", error.message)?,
            }
            if let Some(ref suggestion) = error.suggestion {
                writeln!(w, "  suggestion: {suggestion}")?;
            }
        }
    }
    Ok(())
}

/// Render a failed command to stderr.
pub fn render_failure(mode: OutputMode, err: &anyhow::Error) -> anyhow::Result<()> {
    let stderr = io::stderr();
    let mut out = stderr.lock();
    write_error(&mut out, mode, &CliError::from_anyhow(err))
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    fn render_to_string(mode: OutputMode, err: &anyhow::Error) -> String {
        let mut buf = Vec::new();
        write_error(&mut buf, mode, &CliError::from_anyhow(err)).expect("render");
        String::from_utf8(buf).expect("utf8")
    }

    #[test]
    fn stats_error_code_survives_context() {
        let err = Err::<(), _>(StatsError::VideoNotFound(7))
            .context("Failed to show video 7")
            .expect_err("error");
        let cli = CliError::from_anyhow(&err);
        assert_eq!(cli.error_code.as_deref(), Some("E2001"));
        assert!(cli.message.contains("Failed to show video 7"));
    }

    #[test]
    fn json_error_is_wrapped() {
        let err = anyhow::Error::new(StatsError::VideoNotFound(3));
        let text = render_to_string(OutputMode::Json, &err);
        let value: serde_json::Value = serde_json::from_str(&text).expect("json");
        assert_eq!(value["error"]["error_code"], "E2001");
    }

    #[test]
    fn config_parse_error_has_code_and_hint() {
        let source = toml::from_str::<toml::Value>("max_threads = [").expect_err("bad toml");
        let err = anyhow::Error::new(ConfigError::Parse {
            path: "Data/tubestats.toml".into(),
            source,
        });
        let text = render_to_string(OutputMode::Human, &err);
        assert!(text.starts_with("error[E1002]: Failed to parse Data/tubestats.toml"));
        assert!(text.contains("suggestion: Fix syntax in tubestats.toml and retry."));
    }

    #[test]
    fn plain_error_has_no_code() {
        let err = anyhow::anyhow!("bad input");
        let text = render_to_string(OutputMode::Human, &err);
        assert_eq!(text, "error: bad input\n");
    }

    #[test]
    fn kv_pads_key() {
        let mut buf = Vec::new();
        kv(&mut buf, "views", "12").expect("kv");
        assert_eq!(String::from_utf8(buf).expect("utf8"), "views:         12\n");
    }
}
