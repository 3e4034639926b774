//! Fatal error categories of the release pipeline.
//!
//! Every stage raises one of these inside an [`anyhow::Error`]. None of them
//! is retried or downgraded; the binary turns any of them into exit code 1.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReleaseError {
    /// A required executable or artifact is not on the host and cannot be fetched.
    #[error("required tool '{tool}' is missing: {hint}")]
    MissingTool { tool: String, hint: String },

    #[error("download of {url} failed: {message}")]
    Network { url: String, message: String },

    #[error("failed to extract '{}': {message}", archive.display())]
    Extraction { archive: PathBuf, message: String },

    #[error("native build failed for {target}: `{command}` exited with {code}")]
    Build {
        target: String,
        command: String,
        code: String,
    },

    #[error("universal binary merge failed: `{command}` exited with {code}")]
    Merge { command: String, code: String },

    #[error("export failed for {platform}: {reason}")]
    Export { platform: String, reason: String },

    #[error("invalid configuration: {0}")]
    Configuration(String),
}

impl ReleaseError {
    pub fn missing_tool(tool: impl Into<String>, hint: impl Into<String>) -> Self {
        Self::MissingTool {
            tool: tool.into(),
            hint: hint.into(),
        }
    }
}
