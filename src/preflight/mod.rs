//! Preflight checks for a release run.
//!
//! Validates that the host has the external tools a phase needs before any
//! of them is started, so a missing tool fails the run up front instead of
//! halfway through a target sequence.

use anyhow::Result;

use crate::config::{BuildConfiguration, ProjectSettings};
use crate::error::ReleaseError;
use crate::process::Runner;

/// A host tool and how to get it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequiredTool {
    pub name: String,
    pub hint: String,
}

impl RequiredTool {
    pub fn new(name: impl Into<String>, hint: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            hint: hint.into(),
        }
    }
}

/// Tools the build phase of `config` needs.
pub fn build_tools(config: &BuildConfiguration, settings: &ProjectSettings) -> Vec<RequiredTool> {
    let mut tools = vec![RequiredTool::new(
        &settings.build_tool,
        "install SCons (e.g. `pip install scons`)",
    )];

    let universal = config
        .target_platforms
        .build_platforms()
        .into_iter()
        .any(|platform| config.is_universal(platform));
    if universal {
        tools.push(RequiredTool::new(
            &settings.merge_tool,
            "install the Xcode command line tools (`xcode-select --install`)",
        ));
    }
    tools
}

/// Check that every tool in `tools` can be located through `runner`.
///
/// Fails with [`ReleaseError::MissingTool`] naming every missing tool.
pub fn check_required_tools(runner: &dyn Runner, tools: &[RequiredTool]) -> Result<()> {
    let missing: Vec<&RequiredTool> = tools
        .iter()
        .filter(|tool| runner.locate(&tool.name).is_none())
        .collect();

    if missing.is_empty() {
        return Ok(());
    }

    let names = missing
        .iter()
        .map(|t| t.name.as_str())
        .collect::<Vec<_>>()
        .join(", ");
    let hints = missing
        .iter()
        .map(|t| format!("{} ({})", t.name, t.hint))
        .collect::<Vec<_>>()
        .join("; ");
    Err(ReleaseError::missing_tool(names, hints).into())
}

/// Check the build phase's tools for `config`.
pub fn check_build_host(
    runner: &dyn Runner,
    config: &BuildConfiguration,
    settings: &ProjectSettings,
) -> Result<()> {
    check_required_tools(runner, &build_tools(config, settings))
}
