//! `tools.toml` parsing

use std::path::{Component, Path, PathBuf};

use config::{Config as ConfigBuilder, File, FileFormat};
use serde::Deserialize;

use crate::skills::SkillError;

/// Contents of a skill's `tools.toml`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ToolManifest {
    #[serde(default)]
    pub tools: Vec<ToolDecl>,
}

/// One `[[tools]]` entry
#[derive(Debug, Clone, Deserialize)]
pub struct ToolDecl {
    pub name: String,

    #[serde(default)]
    pub description: String,

    /// Script path relative to the skill directory
    pub script: PathBuf,
}

impl ToolManifest {
    /// Load a manifest file
    pub fn load(path: &Path) -> Result<Self, SkillError> {
        let manifest_error = |source| SkillError::Manifest {
            path: path.to_path_buf(),
            source,
        };

        ConfigBuilder::builder()
            .add_source(File::from(path).format(FileFormat::Toml))
            .build()
            .and_then(|config| config.try_deserialize())
            .map_err(manifest_error)
    }
}

impl ToolDecl {
    /// Resolve the script inside `skill_dir`
    ///
    /// Absolute paths and `..` components are rejected.
    pub fn script_path(&self, skill_dir: &Path) -> Result<PathBuf, SkillError> {
        let escapes = self
            .script
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
        if escapes || self.script.as_os_str().is_empty() {
            return Err(SkillError::InvalidScript(self.script.clone()));
        }
        Ok(skill_dir.join(&self.script))
    }
}

/// Tool names are lowercase identifiers not starting with `_`
pub fn is_valid_tool_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_ascii_lowercase() => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}
