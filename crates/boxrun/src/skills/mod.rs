//! Skill discovery
//!
//! A skills directory holds one subdirectory per skill. Each skill may ship
//! a `tools.toml` declaring scripts that run in a [`Sandbox`], and a
//! `SKILL.md` whose text is folded into an aggregated documentation string.
//!
//! ```text
//! skills/
//!   text/
//!     SKILL.md
//!     tools.toml
//!     word_count.py
//!   _drafts/        (skipped)
//! ```
//!
//! Every entry loads behind its own error boundary: a broken manifest or an
//! unreadable doc is recorded in that entry's [`SkillReport`] and discovery
//! moves on.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

pub use crate::skills::manifest::{ToolDecl, ToolManifest, is_valid_tool_name};
use crate::sandbox::{Sandbox, SandboxError};
use crate::types::ExecutionResult;

mod manifest;

/// Tool manifest file name inside a skill directory
pub const TOOLS_MANIFEST: &str = "tools.toml";

/// Documentation file name inside a skill directory
pub const SKILL_DOC: &str = "SKILL.md";

/// Placeholder in tool scripts replaced by the JSON-encoded arguments
pub const ARGS_PLACEHOLDER: &str = "{args}";

#[derive(Debug, Error)]
pub enum SkillError {
    #[error("failed to read skills directory {}: {source}", path.display())]
    ReadDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to read {}: {source}", path.display())]
    ReadFile {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid tool manifest {}: {source}", path.display())]
    Manifest {
        path: PathBuf,
        #[source]
        source: config::ConfigError,
    },

    #[error("invalid tool name '{0}'")]
    InvalidToolName(String),

    #[error("tool script {} must be a relative path inside the skill", .0.display())]
    InvalidScript(PathBuf),

    #[error("tool '{0}' not found")]
    ToolNotFound(String),

    #[error("failed to encode tool arguments: {0}")]
    Args(#[from] serde_json::Error),

    #[error(transparent)]
    Sandbox(#[from] SandboxError),
}

/// A script registered by a skill
#[derive(Debug, Clone, PartialEq)]
pub struct Tool {
    pub name: String,
    pub description: String,
    /// Name of the skill that registered the tool
    pub skill: String,
    pub script_path: PathBuf,
    /// Script source, read at discovery
    pub source: String,
}

impl Tool {
    /// Substitute `{args}` with the JSON text of `args`
    pub fn render(&self, args: &Value) -> Result<String, SkillError> {
        let json = serde_json::to_string(args)?;
        Ok(self.source.replace(ARGS_PLACEHOLDER, &json))
    }
}

/// Outcome of loading one skill directory
#[derive(Debug)]
pub struct SkillReport {
    pub name: String,
    pub path: PathBuf,
    /// Tools registered from this entry
    pub tools: Vec<String>,
    pub docs_loaded: bool,
    pub errors: Vec<SkillError>,
}

impl SkillReport {
    fn new(name: String, path: PathBuf) -> Self {
        Self {
            name,
            path,
            tools: Vec::new(),
            docs_loaded: false,
            errors: Vec::new(),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Tools and documentation gathered from a skills directory
#[derive(Debug, Default)]
pub struct SkillCatalog {
    tools: BTreeMap<String, Tool>,
    docs: Vec<String>,
    reports: Vec<SkillReport>,
}

/// Scan `dir` for skills
///
/// A missing directory yields an empty catalog. Only failing to list an
/// existing directory is an error.
#[instrument]
pub fn discover(dir: &Path) -> Result<SkillCatalog, SkillError> {
    let mut catalog = SkillCatalog::default();

    if !dir.exists() {
        warn!(path = %dir.display(), "skills directory not found");
        return Ok(catalog);
    }

    let read_dir_error = |source| SkillError::ReadDir {
        path: dir.to_path_buf(),
        source,
    };

    let mut entries = Vec::new();
    for entry in fs::read_dir(dir).map_err(read_dir_error)? {
        match entry {
            Ok(entry) => entries.push(entry.path()),
            Err(e) => warn!(error = %e, "skipping unreadable skills entry"),
        }
    }
    entries.sort();

    for path in entries {
        let Some(name) = path.file_name().map(|n| n.to_string_lossy().into_owned()) else {
            continue;
        };
        if name.starts_with('_') || name.starts_with('.') || !path.is_dir() {
            debug!(%name, "skipping skills entry");
            continue;
        }
        catalog.load_skill(name, path);
    }

    info!(
        skills = catalog.reports.len(),
        tools = catalog.tools.len(),
        "skill discovery complete"
    );
    Ok(catalog)
}

impl SkillCatalog {
    fn load_skill(&mut self, name: String, path: PathBuf) {
        let mut report = SkillReport::new(name, path);

        let manifest_path = report.path.join(TOOLS_MANIFEST);
        if manifest_path.is_file() {
            match ToolManifest::load(&manifest_path) {
                Ok(manifest) => {
                    for decl in manifest.tools {
                        match load_tool(&report.name, &report.path, decl) {
                            Ok(tool) => {
                                report.tools.push(tool.name.clone());
                                self.register(tool);
                            }
                            Err(e) => report.errors.push(e),
                        }
                    }
                }
                Err(e) => report.errors.push(e),
            }
        }

        let doc_path = report.path.join(SKILL_DOC);
        if doc_path.is_file() {
            match fs::read_to_string(&doc_path) {
                Ok(content) => {
                    let content = content.trim();
                    if !content.is_empty() {
                        self.docs
                            .push(format!("\n--- SKILL: {} ---\n{}", report.name, content));
                        report.docs_loaded = true;
                    }
                }
                Err(source) => report.errors.push(SkillError::ReadFile {
                    path: doc_path,
                    source,
                }),
            }
        }

        for error in &report.errors {
            warn!(skill = %report.name, %error, "failed to load part of skill");
        }
        debug!(
            skill = %report.name,
            tools = report.tools.len(),
            docs = report.docs_loaded,
            "loaded skill"
        );
        self.reports.push(report);
    }

    fn register(&mut self, tool: Tool) {
        let name = tool.name.clone();
        let skill = tool.skill.clone();
        if let Some(previous) = self.tools.insert(name.clone(), tool) {
            warn!(
                tool = %name,
                previous = %previous.skill,
                replacement = %skill,
                "tool redefined by a later skill"
            );
        }
    }

    pub fn tools(&self) -> impl Iterator<Item = &Tool> {
        self.tools.values()
    }

    pub fn tool(&self, name: &str) -> Option<&Tool> {
        self.tools.get(name)
    }

    /// Per-entry load reports in discovery order
    pub fn reports(&self) -> &[SkillReport] {
        &self.reports
    }

    /// Aggregated `SKILL.md` text
    pub fn docs(&self) -> String {
        self.docs.join("\n")
    }

    pub fn is_empty(&self) -> bool {
        self.reports.is_empty()
    }

    /// Run a tool through `sandbox`
    #[instrument(skip(self, args, sandbox), fields(backend = %sandbox.backend()))]
    pub async fn invoke(
        &self,
        name: &str,
        args: &Value,
        sandbox: &dyn Sandbox,
        timeout_secs: f64,
    ) -> Result<ExecutionResult, SkillError> {
        let tool = self
            .tool(name)
            .ok_or_else(|| SkillError::ToolNotFound(name.to_string()))?;
        let code = tool.render(args)?;
        Ok(sandbox.execute(&code, timeout_secs).await?)
    }
}

fn load_tool(skill: &str, skill_dir: &Path, decl: ToolDecl) -> Result<Tool, SkillError> {
    if !is_valid_tool_name(&decl.name) {
        return Err(SkillError::InvalidToolName(decl.name));
    }
    let script_path = decl.script_path(skill_dir)?;
    let source = fs::read_to_string(&script_path).map_err(|source| SkillError::ReadFile {
        path: script_path.clone(),
        source,
    })?;

    Ok(Tool {
        name: decl.name,
        description: decl.description,
        skill: skill.to_string(),
        script_path,
        source,
    })
}
