//! Runtime tool path resolution
//!
//! For each external tool (e.g., `helm`), we:
//! 1. Check for an environment variable `{TOOL}_BIN` (e.g., `HELM_BIN`)
//! 2. Fall back to PATH-based invocation if the envvar is not set
//!
//! ```rust,ignore
//! use crate::tools::{get_tool_path, tools};
//!
//! // Reads HELM_BIN, falls back to "helm"
//! let helm = get_tool_path(tools::HELM);
//! ```

use anyhow::{Context, Result};
use std::env;
use std::path::PathBuf;

/// Get the path to an external tool
///
/// Checks for an environment variable `{TOOL}_BIN` (uppercase tool name + "_BIN").
/// Falls back to the tool name itself if the envvar is not set, which relies on PATH.
pub fn get_tool_path(tool: &str) -> String {
    env::var(env_var(tool)).unwrap_or_else(|_| tool.to_string())
}

/// Resolve a tool to an executable, failing early with a readable message
/// instead of a spawn error halfway through a batch.
pub fn ensure_available(tool: &str) -> Result<PathBuf> {
    let path = get_tool_path(tool);
    which::which(&path).with_context(|| {
        format!(
            "{} not found (set {} or add it to PATH)",
            path,
            env_var(tool)
        )
    })
}

/// `helm` -> `HELM_BIN`, `my-tool` -> `MY_TOOL_BIN`
fn env_var(tool: &str) -> String {
    format!("{}_BIN", tool.to_uppercase().replace('-', "_"))
}

/// Tools the mirror drives
pub mod tools {
    pub const AWS: &str = "aws";
    pub const DOCKER: &str = "docker";
    pub const HELM: &str = "helm";
}
