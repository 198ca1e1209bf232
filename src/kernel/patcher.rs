//! Patch plan execution with fail-fast semantics and config overlay.
//!
//! `KernelPatcher` walks a plan produced by [`plan::plan`] strictly in order.
//! The first failing step aborts the rest of the plan, with one exception:
//! an `ApplyDiff` marked `required: false` logs a warning and continues.

pub mod kconfig;
pub mod plan;

#[cfg(test)]
mod tests;

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Command;
use once_cell::sync::Lazy;
use regex::Regex;
use walkdir::WalkDir;

use crate::error::PatchError;
use crate::kernel::git::GitManager;
use crate::kernel::parser;
use crate::system;
use kconfig::ConfigOverlay;
use plan::{PatchSource, PatchStep};

static LSM_DEFAULT_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"^\s*default\s+""#).expect("Invalid LSM default regex")
});

/// Result type for patching operations
pub type PatchResult<T> = std::result::Result<T, PatchError>;

/// What a plan execution did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PatchSummary {
    pub steps_run: usize,
    pub patches_applied: usize,
    pub tolerated_failures: usize,
    pub config_changes: usize,
    pub susfs_version: Option<String>,
}

/// Executes patch plans against one kernel source tree.
pub struct KernelPatcher {
    /// Source directory of the kernel
    src_dir: PathBuf,
    overlay: ConfigOverlay,
    /// Token for cloning private repositories
    repo_token: Option<String>,
    /// SUSFS version captured from the patched header; explicit input to fix-patch lookup
    susfs_version: Option<String>,
}

impl KernelPatcher {
    pub fn new(src_dir: PathBuf, overlay: ConfigOverlay, repo_token: Option<String>) -> Self {
        KernelPatcher {
            src_dir,
            overlay,
            repo_token,
            susfs_version: None,
        }
    }

    pub fn src_dir(&self) -> &Path {
        &self.src_dir
    }

    pub fn overlay(&self) -> &ConfigOverlay {
        &self.overlay
    }

    pub fn susfs_version(&self) -> Option<&str> {
        self.susfs_version.as_deref()
    }

    /// Run every step in order, stopping at the first fatal failure.
    pub fn execute(&mut self, steps: &[PatchStep]) -> PatchResult<PatchSummary> {
        let mut summary = PatchSummary::default();
        let total = steps.len();

        log::info!("[Patcher] Executing plan with {} steps", total);
        for (index, step) in steps.iter().enumerate() {
            log::info!("[Patcher] [STEP {}/{}] {}", index + 1, total, step);
            self.apply_step(step, &mut summary)?;
            summary.steps_run += 1;
        }

        summary.susfs_version = self.susfs_version.clone();
        log::info!(
            "[Patcher] Plan complete: {} patches applied, {} tolerated failures, {} config changes",
            summary.patches_applied, summary.tolerated_failures, summary.config_changes
        );
        Ok(summary)
    }

    fn apply_step(&mut self, step: &PatchStep, summary: &mut PatchSummary) -> PatchResult<()> {
        match step {
            PatchStep::CloneExternal { locator, dest } => {
                if dest.exists() {
                    fs::remove_dir_all(dest)?;
                }
                GitManager::clone_locator(locator, self.repo_token.as_deref(), dest)?;
            }
            PatchStep::RunSetupScript { url, args, cwd } => {
                run_setup_script(url, args, cwd)?;
            }
            PatchStep::FailIfMissing { path, message } => {
                if !path.exists() {
                    return Err(PatchError::Missing(message.clone()));
                }
            }
            PatchStep::ApplyDiff { patch, tree, fuzz, required } => {
                let outcome = resolve_patch(patch).and_then(|file| apply_diff(&file, tree, *fuzz));
                match outcome {
                    Ok(()) => summary.patches_applied += 1,
                    Err(e) if !required => {
                        log::warn!("[Patcher] [TOLERATED] {} failed, continuing: {}", patch, e);
                        summary.tolerated_failures += 1;
                    }
                    Err(e) => return Err(e),
                }
            }
            PatchStep::CopyTree { src, dst } => {
                let copied = copy_tree(src, dst)?;
                log::info!("[Patcher] [COPY] {} files into {}", copied, dst.display());
            }
            PatchStep::ExtractSusfsVersion { header } => {
                let content = fs::read_to_string(header).map_err(|_| {
                    PatchError::FileNotFound(header.display().to_string())
                })?;
                let version = parser::parse_susfs_version(&content).ok_or_else(|| {
                    PatchError::Missing(format!("no SUSFS_VERSION define in {}", header.display()))
                })?;
                log::info!("[Patcher] [SUSFS] Version {}", version);
                self.susfs_version = Some(version);
            }
            PatchStep::ApplyFixPatches { root, tree, fuzz } => {
                let version = self.susfs_version.as_deref().ok_or_else(|| {
                    PatchError::Missing("SUSFS version must be extracted before fix patches".to_string())
                })?;
                summary.patches_applied += apply_fix_patches(root, version, tree, *fuzz)?;
            }
            PatchStep::RegisterLsm { kconfig, module } => {
                let content = fs::read_to_string(kconfig).map_err(|_| {
                    PatchError::FileNotFound(kconfig.display().to_string())
                })?;
                match register_lsm(&content, module) {
                    LsmUpdate::Registered(updated) => {
                        fs::write(kconfig, updated)?;
                        log::info!("[Patcher] [LSM] Registered {} in {}", module, kconfig.display());
                    }
                    LsmUpdate::AlreadyRegistered => {
                        log::info!("[Patcher] [LSM] {} already registered in {}", module, kconfig.display())
                    }
                    LsmUpdate::NoSelinuxDefault => log::warn!(
                        "[Patcher] [LSM] No selinux default in config LSM of {}; {} is enabled but not registered",
                        kconfig.display(),
                        module
                    ),
                }
            }
            PatchStep::SetConfig(key) => {
                if self.overlay.set_config(key)? {
                    summary.config_changes += 1;
                }
            }
        }
        Ok(())
    }
}

/// Resolve a patch source to a concrete file.
///
/// Globs pick the first lexical match; more than one match is logged since the
/// choice is ambiguous.
pub fn resolve_patch(source: &PatchSource) -> PatchResult<PathBuf> {
    match source {
        PatchSource::File(path) => {
            if path.is_file() {
                Ok(path.clone())
            } else {
                Err(PatchError::FileNotFound(path.display().to_string()))
            }
        }
        PatchSource::Glob(pattern) => {
            let mut matches: Vec<PathBuf> = glob::glob(pattern)
                .map_err(|e| PatchError::RegexInvalid(format!("{}: {}", pattern, e)))?
                .filter_map(Result::ok)
                .filter(|p| p.is_file())
                .collect();
            matches.sort();

            if matches.len() > 1 {
                log::warn!(
                    "[Patcher] [GLOB] {} matches for {}, using {}",
                    matches.len(),
                    pattern,
                    matches[0].display()
                );
            }
            matches
                .into_iter()
                .next()
                .ok_or_else(|| PatchError::FileNotFound(format!("no patch matches {}", pattern)))
        }
    }
}

/// Apply a unified diff with `patch -p1` inside `tree`.
pub fn apply_diff(patch_file: &Path, tree: &Path, fuzz: u32) -> PatchResult<()> {
    if !tree.is_dir() {
        return Err(PatchError::FileNotFound(tree.display().to_string()));
    }
    let patch_file = patch_file
        .canonicalize()
        .map_err(|_| PatchError::FileNotFound(patch_file.display().to_string()))?;

    let mut command = Command::new("patch");
    command
        .arg("-p1")
        .arg("--forward")
        .arg(format!("-F{}", fuzz))
        .arg("-i")
        .arg(&patch_file)
        .current_dir(tree);

    system::run_streamed(&mut command, "patch").map_err(|e| {
        PatchError::PatchFailed(format!("{}: {}", patch_file.display(), e))
    })
}

/// Apply every `*.patch` under `root/<version>` in lexical order.
pub fn apply_fix_patches(root: &Path, version: &str, tree: &Path, fuzz: u32) -> PatchResult<usize> {
    let dir = root.join(version);
    if !dir.is_dir() {
        return Err(PatchError::Unsupported(format!(
            "no SUSFS fix patches for {} (expected {})",
            version,
            dir.display()
        )));
    }

    let mut patches: Vec<PathBuf> = fs::read_dir(&dir)?
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| path.is_file() && path.extension().map_or(false, |ext| ext == "patch"))
        .collect();
    patches.sort();

    for patch in &patches {
        apply_diff(patch, tree, fuzz)?;
    }
    log::info!("[Patcher] [FIX] Applied {} fix patches for SUSFS {}", patches.len(), version);
    Ok(patches.len())
}

/// Recursively copy `src` into `dst`, overwriting existing files.
pub fn copy_tree(src: &Path, dst: &Path) -> PatchResult<usize> {
    if !src.is_dir() {
        return Err(PatchError::FileNotFound(src.display().to_string()));
    }

    let mut copied = 0usize;
    for entry in WalkDir::new(src).into_iter() {
        let entry = entry.map_err(|e| PatchError::PatchFailed(format!("walking {}: {}", src.display(), e)))?;
        let relative = entry
            .path()
            .strip_prefix(src)
            .map_err(|e| PatchError::PatchFailed(e.to_string()))?;
        let target = dst.join(relative);

        if entry.file_type().is_dir() {
            fs::create_dir_all(&target)?;
        } else {
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::copy(entry.path(), &target)?;
            copied += 1;
        }
    }
    Ok(copied)
}

/// Outcome of registering a module in the `config LSM` default list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LsmUpdate {
    /// Updated Kconfig content
    Registered(String),
    AlreadyRegistered,
    /// No default line in the block names selinux
    NoSelinuxDefault,
}

/// Add `module` after `selinux` in the `config LSM` default list.
pub fn register_lsm(content: &str, module: &str) -> LsmUpdate {
    let mut in_block = false;
    let mut changed = false;
    let mut present = false;
    let mut lines: Vec<String> = Vec::new();

    for line in content.lines() {
        let trimmed = line.trim();
        if trimmed == "config LSM" {
            in_block = true;
        } else if in_block && (trimmed == "help" || (!line.starts_with(char::is_whitespace) && !trimmed.is_empty())) {
            in_block = false;
        }

        let is_default = in_block && LSM_DEFAULT_REGEX.is_match(line) && line.contains("selinux");
        if is_default && line.contains(module) {
            present = true;
            lines.push(line.to_string());
        } else if is_default {
            lines.push(line.replacen("selinux", &format!("selinux,{}", module), 1));
            changed = true;
        } else {
            lines.push(line.to_string());
        }
    }

    if !changed {
        return if present { LsmUpdate::AlreadyRegistered } else { LsmUpdate::NoSelinuxDefault };
    }
    let mut updated = lines.join("\n");
    if content.ends_with('\n') {
        updated.push('\n');
    }
    LsmUpdate::Registered(updated)
}

/// Download an upstream setup script and run it with bash inside `cwd`.
fn run_setup_script(url: &str, args: &[String], cwd: &Path) -> PatchResult<()> {
    log::info!("[Patcher] [SETUP] Fetching {}", url);
    let response = reqwest::blocking::get(url)
        .and_then(|r| r.error_for_status())
        .map_err(|e| PatchError::ScriptFailed(format!("fetch {}: {}", url, e)))?;
    let body = response
        .text()
        .map_err(|e| PatchError::ScriptFailed(format!("read {}: {}", url, e)))?;

    let mut script = tempfile::Builder::new().prefix("setup-").suffix(".sh").tempfile()?;
    script.write_all(body.as_bytes())?;
    script.flush()?;

    let mut command = Command::new("bash");
    command.arg(script.path()).args(args).current_dir(cwd);
    system::run_streamed(&mut command, "setup")
        .map_err(|e| PatchError::ScriptFailed(format!("{}: {}", url, e)))
}
