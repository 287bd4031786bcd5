use am_core::types::CliTool;
use serde::{Deserialize, Serialize};
use thiserror::Error;

// ---------------------------------------------------------------------------
// ResultEnvelope
// ---------------------------------------------------------------------------

/// Structured result of one assistant turn.
///
/// This is the JSON shape emitted by `claude --output-format json`; tools
/// that print plain text get an envelope fabricated around their stdout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultEnvelope {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub subtype: String,
    #[serde(default)]
    pub duration_ms: u64,
    #[serde(default)]
    pub duration_api_ms: u64,
    #[serde(default)]
    pub is_error: bool,
    #[serde(default)]
    pub result: String,
    #[serde(default)]
    pub session_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<serde_json::Value>,
}

impl ResultEnvelope {
    /// Successful envelope whose result is `text`.
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            kind: "result".into(),
            subtype: "success".into(),
            duration_ms: 0,
            duration_api_ms: 0,
            is_error: false,
            result: text.into(),
            session_id: String::new(),
            usage: None,
        }
    }
}

#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("assistant output is not a result envelope: {0}")]
    Envelope(#[from] serde_json::Error),
}

// ---------------------------------------------------------------------------
// CliAdapter trait
// ---------------------------------------------------------------------------

/// Knows how to invoke one assistant CLI and read its output.
///
/// Arguments are returned as an argv vector and passed to the process
/// directly, so messages never go through shell quoting.
pub trait CliAdapter: Send + Sync {
    /// Which assistant this adapter handles.
    fn tool(&self) -> CliTool;

    /// The executable to run.
    fn binary(&self) -> &str {
        self.tool().binary()
    }

    /// Arguments for one turn. `session_id` is `""` when no prior
    /// conversation exists.
    fn argv(&self, session_id: &str, message: &str) -> Vec<String>;

    /// Interpret the process stdout.
    fn parse_result(&self, stdout: &str) -> Result<ResultEnvelope, AdapterError>;
}

// ---------------------------------------------------------------------------
// Claude adapter
// ---------------------------------------------------------------------------

pub struct ClaudeAdapter;

impl CliAdapter for ClaudeAdapter {
    fn tool(&self) -> CliTool {
        CliTool::ClaudeCode
    }

    fn argv(&self, session_id: &str, message: &str) -> Vec<String> {
        let mut args = vec!["--dangerously-skip-permissions".to_string()];
        if !session_id.is_empty() {
            args.push("--resume".into());
            args.push(session_id.into());
        }
        args.extend([
            "--output-format".into(),
            "json".into(),
            "-p".into(),
            message.into(),
        ]);
        args
    }

    fn parse_result(&self, stdout: &str) -> Result<ResultEnvelope, AdapterError> {
        Ok(serde_json::from_str(stdout.trim())?)
    }
}

// ---------------------------------------------------------------------------
// Qwen adapter
// ---------------------------------------------------------------------------

pub struct QwenAdapter;

impl CliAdapter for QwenAdapter {
    fn tool(&self) -> CliTool {
        CliTool::QwenCode
    }

    fn argv(&self, _session_id: &str, message: &str) -> Vec<String> {
        vec!["-y".into(), "-p".into(), message.into()]
    }

    fn parse_result(&self, stdout: &str) -> Result<ResultEnvelope, AdapterError> {
        Ok(ResultEnvelope::plain(stdout.trim()))
    }
}

// ---------------------------------------------------------------------------
// Gemini adapter
// ---------------------------------------------------------------------------

pub struct GeminiAdapter;

impl CliAdapter for GeminiAdapter {
    fn tool(&self) -> CliTool {
        CliTool::Gemini
    }

    fn argv(&self, _session_id: &str, message: &str) -> Vec<String> {
        vec!["-y".into(), "-p".into(), message.into()]
    }

    fn parse_result(&self, stdout: &str) -> Result<ResultEnvelope, AdapterError> {
        Ok(ResultEnvelope::plain(stdout.trim()))
    }
}

// ---------------------------------------------------------------------------
// Factory
// ---------------------------------------------------------------------------

/// Create the appropriate adapter for a given assistant.
pub fn adapter_for(tool: CliTool) -> Box<dyn CliAdapter> {
    match tool {
        CliTool::ClaudeCode => Box::new(ClaudeAdapter),
        CliTool::QwenCode => Box::new(QwenAdapter),
        CliTool::Gemini => Box::new(GeminiAdapter),
    }
}
