//! Kernel profile loader (TOML).
//!
//! The profile describes where the kernel comes from and how it is built.
//! Every field has a default so an absent profile file still yields a usable
//! GKI android12-5.10 configuration.

use crate::error::ValidationError;
use crate::kernel::git::SourceLocator;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

/// Build coordinates for one kernel.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct KernelProfile {
    /// Kernel name used as the package prefix
    pub name: String,
    /// Kernel source tree (`host:owner/repo@ref`)
    pub source: String,
    /// Template defconfig file name
    pub defconfig: String,
    pub arch: String,
    pub cc: String,
    pub cross_compile: String,
    pub ld: String,
    pub make_target: String,
    /// Toolchain root; its `bin` directory is prepended to PATH
    pub toolchain_dir: PathBuf,
    /// Local patches shipped with the builder (lxc support)
    pub patch_dir: PathBuf,
    /// Flashable template repository the image is packaged into
    pub anykernel: Option<String>,
    pub susfs: String,
    pub kernel_patches: String,
    pub baseband_guard: String,
}

impl Default for KernelProfile {
    fn default() -> Self {
        let toolchain_dir = dirs::home_dir()
            .map(|home| home.join("toolchains/clang"))
            .unwrap_or_else(|| PathBuf::from("toolchains/clang"));

        KernelProfile {
            name: "GKI".to_string(),
            source: "android.googlesource.com:kernel/common@android12-5.10-lts".to_string(),
            defconfig: "gki_defconfig".to_string(),
            arch: "arm64".to_string(),
            cc: "clang".to_string(),
            cross_compile: "aarch64-linux-gnu-".to_string(),
            ld: "ld.lld".to_string(),
            make_target: "Image".to_string(),
            toolchain_dir,
            patch_dir: PathBuf::from("patches"),
            anykernel: Some("github.com:osm0sis/AnyKernel3@master".to_string()),
            susfs: "gitlab.com:simonpunk/susfs4ksu@gki-android12-5.10".to_string(),
            kernel_patches: "github.com:WildKernels/kernel_patches@main".to_string(),
            baseband_guard: "github.com:vc-teahouse/Baseband-guard@main".to_string(),
        }
    }
}

impl KernelProfile {
    /// Check every locator parses so failures surface before any side effect.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.name.trim().is_empty() {
            return Err(ValidationError::InvalidProfile("name cannot be empty".to_string()));
        }
        SourceLocator::parse(&self.source)?;
        SourceLocator::parse(&self.susfs)?;
        SourceLocator::parse(&self.kernel_patches)?;
        SourceLocator::parse(&self.baseband_guard)?;
        if let Some(anykernel) = &self.anykernel {
            SourceLocator::parse(anykernel)?;
        }
        Ok(())
    }
}

/// Load a profile from a TOML file. A missing file yields the defaults.
pub fn load_profile(path: &Path) -> Result<KernelProfile, ValidationError> {
    if !path.exists() {
        log::info!("[Config] No profile at {}, using defaults", path.display());
        return Ok(KernelProfile::default());
    }

    let content = fs::read_to_string(path).map_err(|e| {
        ValidationError::InvalidProfile(format!("failed to read {}: {}", path.display(), e))
    })?;
    parse_profile(&content)
}

/// Parse profile TOML content.
pub fn parse_profile(content: &str) -> Result<KernelProfile, ValidationError> {
    let profile: KernelProfile = toml::from_str(content)
        .map_err(|e| ValidationError::InvalidProfile(e.to_string()))?;
    profile.validate()?;
    Ok(profile)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        assert!(KernelProfile::default().validate().is_ok());
    }

    #[test]
    fn test_partial_profile_keeps_defaults() {
        let profile = parse_profile("name = \"Sultan\"\ndefconfig = \"sm8150_defconfig\"\n").unwrap();
        assert_eq!(profile.name, "Sultan");
        assert_eq!(profile.defconfig, "sm8150_defconfig");
        assert_eq!(profile.arch, "arm64");
    }

    #[test]
    fn test_unknown_key_rejected() {
        assert!(matches!(
            parse_profile("colour = \"blue\"\n"),
            Err(ValidationError::InvalidProfile(_))
        ));
    }

    #[test]
    fn test_bad_locator_rejected() {
        assert!(matches!(
            parse_profile("susfs = \"gitlab.com/simonpunk/susfs4ksu\"\n"),
            Err(ValidationError::InvalidLocator(_))
        ));
    }

    #[test]
    fn test_missing_file_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let profile = load_profile(&dir.path().join("kernel.toml")).unwrap();
        assert_eq!(profile, KernelProfile::default());
    }
}
