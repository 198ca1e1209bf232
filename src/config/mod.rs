//! Configuration module for the build pipeline.
//!
//! All ambient input (process environment, optional `.env` file, kernel
//! profile TOML) is read exactly once here and turned into a validated
//! `BuildSettings` record that is threaded through every component.
//!
//! # Module Structure
//!
//! - `flags`: Feature flag normalization (variant / susfs / lxc)
//! - `loader`: Kernel profile loading from TOML

pub mod flags;
pub mod loader;

use crate::error::ValidationError;
use crate::models::{FeatureSelection, LtoType};
use flags::RawFlags;
use loader::KernelProfile;
use std::collections::HashMap;
use std::path::PathBuf;

pub const DEFAULT_API_URL: &str = "https://api.telegram.org";

/// Secrets required before the pipeline may touch anything.
#[derive(Clone)]
pub struct Credentials {
    /// Repository access token (clone of private trees, release upload)
    pub repo_token: String,
    pub bot_token: String,
    pub chat_id: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("repo_token", &"<redacted>")
            .field("bot_token", &"<redacted>")
            .field("chat_id", &self.chat_id)
            .finish()
    }
}

/// Everything needed to reach the bot endpoint.
///
/// Validated ahead of the rest of the settings so later validation failures
/// can still be reported externally.
#[derive(Debug, Clone)]
pub struct ReportSettings {
    pub credentials: Credentials,
    pub api_url: String,
    /// Mass/release build: outbound notifications are suppressed
    pub mass_build: bool,
}

impl ReportSettings {
    /// Credentials are checked first; nothing else is read if one is missing.
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ValidationError> {
        let credentials = Credentials {
            repo_token: required(vars, "GH_TOKEN")?,
            bot_token: required(vars, "TG_BOT_TOKEN")?,
            chat_id: required(vars, "TG_CHAT_ID")?,
        };
        Ok(ReportSettings {
            credentials,
            api_url: vars
                .get("TG_API_URL")
                .map(|v| v.trim())
                .filter(|v| !v.is_empty())
                .unwrap_or(DEFAULT_API_URL)
                .trim_end_matches('/')
                .to_string(),
            mass_build: flags::parse_flag(vars.get("MASS_BUILD").map(|v| v.as_str())),
        })
    }
}

/// Validated run configuration. Built once at startup.
#[derive(Debug, Clone)]
pub struct BuildSettings {
    pub selection: FeatureSelection,
    pub lto: LtoType,
    pub reporting: ReportSettings,
    pub release_repo: Option<String>,
    pub work_dir: PathBuf,
    pub profile: KernelProfile,
    /// Host PATH captured at startup, handed to child processes
    pub host_path: String,
}

/// Snapshot of the process environment, after merging a `.env` file if present.
pub fn load_env() -> HashMap<String, String> {
    if let Ok(path) = dotenvy::dotenv() {
        log::info!("[Config] Loaded environment overrides from {}", path.display());
    }
    std::env::vars().collect()
}

impl BuildSettings {
    /// Build settings from an explicit variable map.
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ValidationError> {
        Self::with_reporting(ReportSettings::from_vars(vars)?, vars)
    }

    /// Validate the remaining settings once the reporting side is known.
    pub fn with_reporting(
        reporting: ReportSettings,
        vars: &HashMap<String, String>,
    ) -> Result<Self, ValidationError> {
        let get = |key: &str| vars.get(key).map(|v| v.as_str());

        let selection = FeatureSelection::normalize(&RawFlags {
            variant: get("KSU_VARIANT").map(str::to_string),
            susfs: get("USE_SUSFS").map(str::to_string),
            lxc: get("USE_LXC").map(str::to_string),
        })?;

        let lto = match get("LTO") {
            Some(raw) if !raw.trim().is_empty() => raw.parse()?,
            _ => LtoType::default(),
        };

        let work_dir = get("WORK_DIR")
            .filter(|v| !v.trim().is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."));

        let profile_path = get("KERNEL_PROFILE")
            .filter(|v| !v.trim().is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("kernel.toml"));
        let profile = loader::load_profile(&profile_path)?;

        Ok(BuildSettings {
            selection,
            lto,
            reporting,
            release_repo: get("RELEASE_REPO")
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string),
            work_dir,
            profile,
            host_path: get("PATH").unwrap_or_default().to_string(),
        })
    }
}

fn required(vars: &HashMap<String, String>, key: &'static str) -> Result<String, ValidationError> {
    match vars.get(key) {
        Some(value) if !value.trim().is_empty() => Ok(value.trim().to_string()),
        _ => Err(ValidationError::MissingCredential(key)),
    }
}
