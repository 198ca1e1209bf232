//! Kernel configuration overlay (.config / defconfig)
//!
//! Applies boolean config keys to exactly one active configuration file: the
//! generated `<out>/.config` once it exists, otherwise the template
//! defconfig. Writes are idempotent; re-applying a matching state leaves the
//! file byte-identical.

use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::error::ConfigError;
use crate::models::{ConfigKey, ConfigState};
use crate::orchestrator::executor::BuildTool;

/// Read/write access to the active kernel configuration.
#[derive(Debug, Clone)]
pub struct ConfigOverlay {
    source_dir: PathBuf,
    out_dir: PathBuf,
    arch: String,
    defconfig: String,
}

impl ConfigOverlay {
    pub fn new(source_dir: PathBuf, out_dir: PathBuf, arch: &str, defconfig: &str) -> Self {
        ConfigOverlay {
            source_dir,
            out_dir,
            arch: arch.to_string(),
            defconfig: defconfig.to_string(),
        }
    }

    /// Location of the build-tool generated configuration.
    pub fn generated_path(&self) -> PathBuf {
        self.out_dir.join(".config")
    }

    fn exact_template_path(&self) -> PathBuf {
        self.source_dir
            .join("arch")
            .join(&self.arch)
            .join("configs")
            .join(&self.defconfig)
    }

    /// Locate the template defconfig: exact path first, then a recursive search.
    pub fn find_template(&self) -> Result<PathBuf, ConfigError> {
        let exact = self.exact_template_path();
        if exact.is_file() {
            return Ok(exact);
        }

        log::warn!(
            "[Kconfig] {} not at {}, searching source tree",
            self.defconfig,
            exact.display()
        );
        WalkDir::new(&self.source_dir)
            .sort_by_file_name()
            .into_iter()
            .filter_map(Result::ok)
            .find(|entry| entry.file_type().is_file() && entry.file_name() == self.defconfig.as_str())
            .map(|entry| {
                log::info!("[Kconfig] Found template at {}", entry.path().display());
                entry.into_path()
            })
            .ok_or_else(|| ConfigError::TemplateNotFound(self.defconfig.clone()))
    }

    /// The file `set_config` writes to. The generated file is authoritative once present.
    pub fn active_path(&self) -> Result<PathBuf, ConfigError> {
        let generated = self.generated_path();
        if generated.is_file() {
            return Ok(generated);
        }
        self.find_template()
    }

    /// Apply one key. Returns whether the file changed.
    pub fn set_config(&self, key: &ConfigKey) -> Result<bool, ConfigError> {
        let path = self.active_path()?;
        let content = fs::read_to_string(&path)?;
        let updated = apply_key(&content, key);
        if updated == content {
            log::debug!("[Kconfig] {} already set in {}", key, path.display());
            return Ok(false);
        }
        fs::write(&path, updated)?;
        log::info!("[Kconfig] {} -> {}", key, path.display());
        Ok(true)
    }

    /// Current state of a key in the active source, `None` when absent.
    pub fn get_config(&self, name: &str) -> Result<Option<ConfigState>, ConfigError> {
        let path = self.active_path()?;
        Ok(read_key(&fs::read_to_string(path)?, name))
    }

    /// Produce the generated configuration from the template.
    pub fn generate(&self, tool: &BuildTool) -> Result<(), ConfigError> {
        if self.exact_template_path().is_file() {
            return tool
                .run(&self.defconfig)
                .map_err(ConfigError::RegenerateFailed);
        }

        // Kbuild only resolves defconfig targets under arch/<arch>/configs
        let template = self.find_template()?;
        fs::create_dir_all(&self.out_dir)?;
        fs::copy(&template, self.generated_path())?;
        self.regenerate(tool)
    }

    /// Resolve dependent symbols after a batch of `set_config` calls.
    pub fn regenerate(&self, tool: &BuildTool) -> Result<(), ConfigError> {
        tool.run("olddefconfig").map_err(ConfigError::RegenerateFailed)
    }

    pub fn source_dir(&self) -> &Path {
        &self.source_dir
    }
}

/// Returns true if `line` sets or unsets `symbol`.
fn line_matches(line: &str, symbol: &str) -> bool {
    let trimmed = line.trim();
    if let Some(rest) = trimmed.strip_prefix(symbol) {
        return rest.starts_with('=');
    }
    trimmed
        .strip_prefix("# ")
        .and_then(|rest| rest.strip_prefix(symbol))
        .map(|rest| rest == " is not set")
        .unwrap_or(false)
}

/// Rewrite `content` so `key` holds its desired state.
///
/// The first existing line for the key is replaced in place and later
/// duplicates are dropped; an absent key is appended. Line terminators are
/// kept as found, so a key already in the desired state leaves the content
/// byte-identical.
pub fn apply_key(content: &str, key: &ConfigKey) -> String {
    let symbol = key.symbol();
    let rendered = key.render();
    let mut found = false;
    let mut updated = String::with_capacity(content.len() + rendered.len() + 1);

    for line in content.split_inclusive('\n') {
        let body = line.trim_end_matches(&['\n', '\r'][..]);
        if line_matches(body, &symbol) {
            if !found {
                updated.push_str(&rendered);
                updated.push_str(&line[body.len()..]);
                found = true;
            }
            continue;
        }
        updated.push_str(line);
    }
    if !found {
        if !updated.is_empty() && !updated.ends_with('\n') {
            updated.push('\n');
        }
        updated.push_str(&rendered);
        updated.push('\n');
    }
    updated
}

/// Read the state of `name` (with or without `CONFIG_`) from config content.
pub fn read_key(content: &str, name: &str) -> Option<ConfigState> {
    let symbol = format!("CONFIG_{}", name.trim_start_matches("CONFIG_"));
    content
        .lines()
        .find(|line| line_matches(line, &symbol))
        .map(|line| {
            let trimmed = line.trim();
            if trimmed.starts_with('#') || trimmed.ends_with("=n") {
                ConfigState::Disabled
            } else {
                ConfigState::Enabled
            }
        })
}
