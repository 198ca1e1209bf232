//! Core data types for KsuForge.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::error::ValidationError;

/// Root-hook implementation family compiled into the kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Variant {
    None,
    Official,
    Next,
    Suki,
}

impl Variant {
    pub const ALL: [Variant; 4] = [Variant::None, Variant::Official, Variant::Next, Variant::Suki];

    /// Canonical upper-case literal.
    pub fn as_str(&self) -> &'static str {
        match self {
            Variant::None => "NONE",
            Variant::Official => "OFFICIAL",
            Variant::Next => "NEXT",
            Variant::Suki => "SUKI",
        }
    }

    /// Whether any hook implementation is selected.
    pub fn is_hooked(&self) -> bool {
        *self != Variant::None
    }

    /// Variants that need the manual syscall hook patch.
    pub fn needs_manual_hooks(&self) -> bool {
        matches!(self, Variant::Next | Variant::Suki)
    }

    /// Directory the upstream setup script checks out inside the source tree.
    pub fn subdir(&self) -> Option<&'static str> {
        match self {
            Variant::None => None,
            Variant::Official => Some("KernelSU"),
            Variant::Next => Some("KernelSU-Next"),
            Variant::Suki => Some("SukiSU-Ultra"),
        }
    }
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Variant {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "NONE" => Ok(Variant::None),
            "OFFICIAL" => Ok(Variant::Official),
            "NEXT" => Ok(Variant::Next),
            "SUKI" => Ok(Variant::Suki),
            _ => Err(ValidationError::InvalidVariant(s.to_string())),
        }
    }
}

impl Default for Variant {
    fn default() -> Self {
        Variant::None
    }
}

/// Link-time optimization mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LtoType {
    None,
    Thin,
    Full,
}

impl LtoType {
    /// Config key that selects this mode. Exactly one of the three is enabled.
    pub fn config_key(&self) -> &'static str {
        match self {
            LtoType::None => "LTO_NONE",
            LtoType::Thin => "LTO_CLANG_THIN",
            LtoType::Full => "LTO_CLANG_FULL",
        }
    }

    /// Config keys for every mode, in a fixed order.
    pub fn all_keys() -> [&'static str; 3] {
        ["LTO_NONE", "LTO_CLANG_THIN", "LTO_CLANG_FULL"]
    }
}

impl fmt::Display for LtoType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LtoType::None => write!(f, "NONE"),
            LtoType::Thin => write!(f, "THIN"),
            LtoType::Full => write!(f, "FULL"),
        }
    }
}

impl FromStr for LtoType {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "none" => Ok(LtoType::None),
            "thin" => Ok(LtoType::Thin),
            "full" => Ok(LtoType::Full),
            _ => Err(ValidationError::InvalidLto(s.to_string())),
        }
    }
}

impl Default for LtoType {
    fn default() -> Self {
        LtoType::Thin
    }
}

/// Validated feature flags. Immutable once normalized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FeatureSelection {
    pub variant: Variant,
    pub susfs: bool,
    pub lxc: bool,
}

impl FeatureSelection {
    /// Variant literal plus `-SUSFS` / `-LXC` suffixes for the active branches.
    pub fn variant_label(&self) -> String {
        let mut label = self.variant.as_str().to_string();
        if self.susfs {
            label.push_str("-SUSFS");
        }
        if self.lxc {
            label.push_str("-LXC");
        }
        label
    }
}

/// Desired state of a boolean kernel config key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConfigState {
    Enabled,
    Disabled,
}

/// A named config toggle. The name carries no `CONFIG_` prefix.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConfigKey {
    pub name: String,
    pub state: ConfigState,
}

impl ConfigKey {
    pub fn enable(name: &str) -> Self {
        ConfigKey {
            name: name.trim_start_matches("CONFIG_").to_string(),
            state: ConfigState::Enabled,
        }
    }

    pub fn disable(name: &str) -> Self {
        ConfigKey {
            name: name.trim_start_matches("CONFIG_").to_string(),
            state: ConfigState::Disabled,
        }
    }

    /// Full symbol name as written in .config files.
    pub fn symbol(&self) -> String {
        format!("CONFIG_{}", self.name)
    }

    /// The exact line this key renders to on disk.
    pub fn render(&self) -> String {
        match self.state {
            ConfigState::Enabled => format!("CONFIG_{}=y", self.name),
            ConfigState::Disabled => format!("# CONFIG_{} is not set", self.name),
        }
    }
}

impl fmt::Display for ConfigKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

/// Files produced by a successful build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildArtifact {
    pub image: PathBuf,
    pub compressed_image: PathBuf,
    pub archive: PathBuf,
    pub sha256: String,
}

/// Terminal outcome of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Outcome {
    Success,
    Failure,
}

/// The single externally visible record of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub outcome: Outcome,
    pub message: String,
    pub log_path: Option<PathBuf>,
    pub artifact_path: Option<PathBuf>,
}

impl RunReport {
    pub fn success(message: String, artifact_path: Option<PathBuf>) -> Self {
        RunReport {
            outcome: Outcome::Success,
            message,
            log_path: None,
            artifact_path,
        }
    }

    pub fn failure(message: String, log_path: Option<PathBuf>) -> Self {
        RunReport {
            outcome: Outcome::Failure,
            message,
            log_path,
            artifact_path: None,
        }
    }
}
