//! Unified error type hierarchy for KsuForge
//!
//! Provides structured error handling with ValidationError, ConfigError,
//! PatchError, ReportError and the top-level BuildError that every pipeline
//! stage returns to the escalation controller.

use std::io;
use thiserror::Error;

use crate::kernel::git::GitError;

/// Malformed or missing required input, detected before any side effect.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Required credential {0} is not set")]
    MissingCredential(&'static str),

    #[error("Invalid hook variant '{0}' (expected NONE, OFFICIAL, NEXT or SUKI)")]
    InvalidVariant(String),

    #[error("Invalid LTO mode '{0}' (expected NONE, THIN or FULL)")]
    InvalidLto(String),

    #[error("Invalid source locator '{0}' (expected host:owner/repo@ref)")]
    InvalidLocator(String),

    #[error("Invalid kernel profile: {0}")]
    InvalidProfile(String),
}

/// Kernel configuration (.config / defconfig) errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Template defconfig '{0}' not found in source tree")]
    TemplateNotFound(String),

    #[error("Configuration regeneration failed: {0}")]
    RegenerateFailed(String),

    #[error("IO error during config operations: {0}")]
    IoError(#[from] io::Error),
}

/// Kernel patching operation errors.
#[derive(Error, Debug)]
pub enum PatchError {
    #[error("Invalid regex pattern: {0}")]
    RegexInvalid(String),

    #[error("Patch target file not found: {0}")]
    FileNotFound(String),

    #[error("Patch application failed: {0}")]
    PatchFailed(String),

    #[error("Setup script failed: {0}")]
    ScriptFailed(String),

    #[error("{0}")]
    Missing(String),

    #[error("Unsupported feature combination: {0}")]
    Unsupported(String),

    #[error("Git error: {0}")]
    Git(#[from] GitError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error during patching: {0}")]
    Io(#[from] io::Error),
}

/// Notification transport errors.
#[derive(Error, Debug)]
pub enum ReportError {
    #[error("Endpoint rejected request: {0}")]
    Rejected(String),

    #[error("Malformed endpoint response: {0}")]
    MalformedResponse(String),

    #[error("HTTP transport error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error while preparing attachment: {0}")]
    Io(#[from] io::Error),
}

/// The two failure classes the pipeline distinguishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    Validation,
    Stage,
}

/// Build process execution errors.
#[derive(Error, Debug)]
pub enum BuildError {
    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("Preparation phase failed: {0}")]
    PreparationFailed(String),

    #[error("Configuration phase failed: {0}")]
    Config(#[from] ConfigError),

    #[error("Patching phase failed: {0}")]
    Patch(#[from] PatchError),

    #[error("Source fetch failed: {0}")]
    Git(#[from] GitError),

    #[error("Build phase failed: {0}")]
    BuildFailed(String),

    #[error("Packaging phase failed: {0}")]
    PackagingFailed(String),

    #[error("Report delivery failed: {0}")]
    Report(#[from] ReportError),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl BuildError {
    /// Classify the error into validation or stage failure.
    pub fn class(&self) -> ErrorClass {
        match self {
            BuildError::Validation(_) => ErrorClass::Validation,
            _ => ErrorClass::Stage,
        }
    }

    /// Short stage name for reports and console output.
    pub fn stage(&self) -> &'static str {
        match self {
            BuildError::Validation(_) => "validation",
            BuildError::PreparationFailed(_) | BuildError::Io(_) => "preparation",
            BuildError::Config(_) => "configuration",
            BuildError::Patch(_) => "patching",
            BuildError::Git(_) => "source fetch",
            BuildError::BuildFailed(_) => "build",
            BuildError::PackagingFailed(_) => "packaging",
            BuildError::Report(_) => "reporting",
        }
    }
}

/// Top-level result type for pipeline operations.
pub type Result<T> = std::result::Result<T, BuildError>;
