//! Build orchestration: the sequential pipeline from source fetch to report.
//!
//! Stages run in a fixed order and each returns `Result`. The first error is
//! returned to the caller, which hands it to the [`EscalationController`].
//!
//! ```text
//! prepare -> fetch source -> compose patches -> generate config
//!         -> LTO overlay + regenerate -> make -> package -> metadata -> report
//! ```

pub mod escalation;
pub mod executor;
pub mod package;

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub use escalation::{EscalationController, EscalationState, FAILURE_EXIT_CODE};
pub use executor::{run_kernel_build, BuildTool, BuildToolArgs};
pub use package::{package_name, RunMetadata};

use crate::config::loader::KernelProfile;
use crate::config::{BuildSettings, ReportSettings};
use crate::error::{BuildError, Result};
use crate::kernel::git::{GitManager, SourceLocator};
use crate::kernel::parser::{self, KernelVersion};
use crate::kernel::patcher::kconfig::ConfigOverlay;
use crate::kernel::patcher::plan::{self, PatchStep, PlanContext};
use crate::kernel::patcher::{KernelPatcher, PatchSummary};
use crate::log_collector::LogCollector;
use crate::models::{ConfigKey, LtoType, RunReport};
use crate::report::Reporter;

/// Validate the run settings and build the controller that reports on them.
///
/// Once the bot credentials validate, every later validation failure is
/// returned with a bot-backed controller. Only a missing credential falls
/// back to the offline reporter.
pub fn load_settings(
    vars: &HashMap<String, String>,
    log: Option<Arc<LogCollector>>,
) -> std::result::Result<(BuildSettings, EscalationController), (EscalationController, BuildError)> {
    let reporting = match ReportSettings::from_vars(vars) {
        Ok(reporting) => reporting,
        Err(e) => return Err((EscalationController::new(Reporter::offline(), log), e.into())),
    };
    let reporter = Reporter::from_settings(&reporting);

    match BuildSettings::with_reporting(reporting, vars) {
        Ok(settings) => {
            let context = format!("{} {}", settings.profile.name, settings.selection.variant_label());
            let controller = EscalationController::new(reporter, log).with_context(context);
            Ok((settings, controller))
        }
        Err(e) => Err((EscalationController::new(reporter, log), e.into())),
    }
}

/// Directory layout under the work root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkLayout {
    pub root: PathBuf,
    /// Kernel source tree
    pub source: PathBuf,
    /// Build-tool output tree (`O=`), wiped at run start
    pub out: PathBuf,
    /// Packaged archives and digests
    pub dist: PathBuf,
    pub anykernel: PathBuf,
    pub metadata: PathBuf,
    pub logs: PathBuf,
}

impl WorkLayout {
    pub fn new(root: &Path) -> Self {
        WorkLayout {
            root: root.to_path_buf(),
            source: root.join("kernel"),
            out: root.join("out"),
            dist: root.join("dist"),
            anykernel: root.join("AnyKernel3"),
            metadata: root.join("build-metadata.env"),
            logs: root.join("logs"),
        }
    }
}

/// Build the planner inputs from the profile and the detected kernel version.
pub fn plan_context(
    profile: &KernelProfile,
    layout: &WorkLayout,
    kernel_series: &str,
) -> Result<PlanContext> {
    Ok(PlanContext {
        source_dir: layout.source.clone(),
        work_dir: layout.root.clone(),
        patch_dir: profile.patch_dir.clone(),
        kernel_series: kernel_series.to_string(),
        susfs: SourceLocator::parse(&profile.susfs)?,
        kernel_patches: SourceLocator::parse(&profile.kernel_patches)?,
        baseband_guard: SourceLocator::parse(&profile.baseband_guard)?,
    })
}

/// Read the version declared by a source tree's Makefile.
pub fn read_kernel_version(source: &Path) -> Result<KernelVersion> {
    let makefile = source.join("Makefile");
    let content = fs::read_to_string(&makefile).map_err(|e| {
        BuildError::PreparationFailed(format!("cannot read {}: {}", makefile.display(), e))
    })?;
    parser::parse_makefile_version(&content).ok_or_else(|| {
        BuildError::PreparationFailed(format!("no kernel version in {}", makefile.display()))
    })
}

/// Enable exactly the selected LTO key and disable the other two.
pub fn apply_lto(overlay: &ConfigOverlay, lto: LtoType) -> Result<()> {
    for key in LtoType::all_keys() {
        let config = if key == lto.config_key() {
            ConfigKey::enable(key)
        } else {
            ConfigKey::disable(key)
        };
        overlay.set_config(&config)?;
    }
    Ok(())
}

/// One run of the flag-driven kernel build.
pub struct BuildPipeline<'a> {
    settings: &'a BuildSettings,
    layout: WorkLayout,
}

impl<'a> BuildPipeline<'a> {
    pub fn new(settings: &'a BuildSettings) -> Self {
        BuildPipeline {
            layout: WorkLayout::new(&settings.work_dir),
            settings,
        }
    }

    pub fn layout(&self) -> &WorkLayout {
        &self.layout
    }

    fn tool(&self) -> BuildTool {
        let profile = &self.settings.profile;
        BuildTool::new(
            self.layout.source.clone(),
            BuildToolArgs::from_profile(profile, self.layout.out.clone()),
            &profile.toolchain_dir,
            &self.settings.host_path,
        )
    }

    fn overlay(&self) -> ConfigOverlay {
        let profile = &self.settings.profile;
        ConfigOverlay::new(
            self.layout.source.clone(),
            self.layout.out.clone(),
            &profile.arch,
            &profile.defconfig,
        )
    }

    /// Wipe the output trees from previous runs.
    pub fn prepare(&self) -> Result<()> {
        for dir in [&self.layout.out, &self.layout.dist] {
            if dir.exists() {
                log::info!("[Build] [PREPARE] Removing {}", dir.display());
                fs::remove_dir_all(dir)?;
            }
            fs::create_dir_all(dir)?;
        }
        Ok(())
    }

    /// Clone the kernel source fresh and return its version.
    pub fn fetch_source(&self) -> Result<KernelVersion> {
        let locator = SourceLocator::parse(&self.settings.profile.source)?;
        if self.layout.source.exists() {
            fs::remove_dir_all(&self.layout.source)?;
        }
        let repo = GitManager::clone_locator(
            &locator,
            Some(self.settings.reporting.credentials.repo_token.as_str()),
            &self.layout.source,
        )?;
        match repo.head_commit() {
            Ok(commit) => log::info!("[Build] [SOURCE] {} at {}", locator, commit),
            Err(e) => log::warn!("[Build] [SOURCE] Could not read HEAD: {}", e),
        }

        let version = read_kernel_version(&self.layout.source)?;
        log::info!("[Build] [SOURCE] Kernel version {}", version);
        Ok(version)
    }

    /// Compose the patch plan for the configured flags.
    pub fn compose(&self, version: &KernelVersion) -> Result<Vec<PatchStep>> {
        let ctx = plan_context(&self.settings.profile, &self.layout, &version.series())?;
        Ok(plan::plan(&self.settings.selection, &ctx))
    }

    /// Execute the plan against the template configuration.
    pub fn apply_patches(&self, steps: &[PatchStep]) -> Result<PatchSummary> {
        let mut patcher = KernelPatcher::new(
            self.layout.source.clone(),
            self.overlay(),
            Some(self.settings.reporting.credentials.repo_token.clone()),
        );
        Ok(patcher.execute(steps)?)
    }

    /// Generate the build configuration, then apply LTO and resolve dependencies.
    pub fn configure(&self, tool: &BuildTool) -> Result<()> {
        let overlay = self.overlay();
        overlay.generate(tool)?;
        apply_lto(&overlay, self.settings.lto)?;
        overlay.regenerate(tool)?;
        Ok(())
    }

    fn fetch_anykernel(&self) -> Result<Option<PathBuf>> {
        let Some(raw) = &self.settings.profile.anykernel else {
            return Ok(None);
        };
        let locator = SourceLocator::parse(raw)?;
        if self.layout.anykernel.exists() {
            fs::remove_dir_all(&self.layout.anykernel)?;
        }
        GitManager::clone_locator(&locator, None, &self.layout.anykernel)?;
        Ok(Some(self.layout.anykernel.clone()))
    }

    /// Run every stage. Returns the success report, already delivered.
    pub fn run(&self, reporter: &Reporter) -> Result<RunReport> {
        let settings = self.settings;
        let selection = &settings.selection;
        let label = selection.variant_label();

        reporter.start(&settings.profile.name, &label, &settings.lto.to_string())?;

        self.prepare()?;
        let version = self.fetch_source()?;

        let steps = self.compose(&version)?;
        let summary = self.apply_patches(&steps)?;

        let tool = self.tool();
        self.configure(&tool)?;
        let image = run_kernel_build(&tool, &settings.profile.make_target)?;

        let package = package_name(&settings.profile.name, &version.to_string(), selection);
        let template = self.fetch_anykernel()?;
        let artifact = package::package(&image, &package, &self.layout.dist, template.as_deref())?;

        let susfs_version = if selection.susfs { summary.susfs_version.clone() } else { None };
        RunMetadata::now(
            version.to_string(),
            tool.toolchain_identity(),
            package.clone(),
            susfs_version.clone(),
            label,
            self.layout.out.clone(),
            settings.release_repo.clone(),
        )
        .write(&self.layout.metadata)
        .map_err(|e| BuildError::PackagingFailed(format!("write metadata: {}", e)))?;
        log::info!("[Build] Metadata written to {}", self.layout.metadata.display());

        let mut message = format!("{}\nSHA-256: {}", package, artifact.sha256);
        if let Some(version) = &susfs_version {
            message.push_str(&format!("\nSUSFS: {}", version));
        }
        let report = RunReport::success(message, Some(artifact.archive.clone()));
        reporter.success(&report)?;

        log::info!("[Build] Completed {}", package);
        Ok(report)
    }
}
