//! KsuForge: flag-driven GKI kernel build pipeline
//!
//! Builds a customized Android GKI kernel: fetches sources, composes an
//! optional set of root-hook, filesystem-spoof, container and baseband
//! patches selected by flags, compiles the image, packages it for flashing
//! and reports the outcome to a bot endpoint.
//!
//! The system is organized into functional modules:
//! - **error**: Unified error type hierarchy
//! - **models**: Core data structures and types
//! - **config**: Flag normalization, kernel profile and run settings
//! - **kernel**: Source fetch, config overlay and patch composition
//! - **orchestrator**: Build stage, packaging, pipeline and escalation
//! - **report**: Outbound notifications
//! - **system**: Process execution helpers
//! - **log_collector**: Console + file logging backend

// Core foundational modules
pub mod error;
pub mod models;

// Settings: flags, profile, environment
pub mod config;

// Kernel source handling and patching
pub mod kernel;

// Pipeline stages and the failure path
pub mod orchestrator;

// Bot notifications
pub mod report;

// Process execution helpers
pub mod system;

// Console and run-log backend
pub mod log_collector;

// Re-export the log crate for macro usage
pub use log;

pub use log_collector::LogCollector;

// ============================================================================
// PUBLIC RE-EXPORTS FOR CONVENIENCE
// ============================================================================

pub use error::{
    BuildError, ConfigError, ErrorClass, PatchError, ReportError, Result, ValidationError,
};

pub use models::{
    BuildArtifact, ConfigKey, ConfigState, FeatureSelection, LtoType, Outcome, RunReport, Variant,
};

pub use config::BuildSettings;
pub use orchestrator::{BuildPipeline, EscalationController};
pub use report::Reporter;

/// Version of the KsuForge crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
