//! Patch planning: `FeatureSelection` to an ordered list of `PatchStep`s.
//!
//! Planning is pure. It never touches the filesystem or network; every path
//! and locator it needs comes in through `PlanContext`. Branch order:
//! hook variant, SUSFS, LXC, baseband guard.

use std::collections::HashSet;
use std::fmt;
use std::path::PathBuf;

use crate::kernel::git::SourceLocator;
use crate::models::{ConfigKey, FeatureSelection, Variant};

/// Fuzz for patches maintained against drifting GKI branches.
pub const HOOK_FUZZ: u32 = 3;
pub const LXC_FUZZ: u32 = 3;
/// `patch` default.
pub const DEFAULT_FUZZ: u32 = 2;

pub const SUSFS_CONFIG: &str = "KSU_SUSFS";
pub const BBG_CONFIG: &str = "BBG";
pub const BBG_LSM_NAME: &str = "baseband_guard";

/// Hook keys enabled for manual-hook variants.
pub const MANUAL_HOOK_ENABLE: [&str; 4] = [
    "KSU_MANUAL_HOOK",
    "KSU_MULTI_MANAGER_SUPPORT",
    "TMPFS_XATTR",
    "TMPFS_POSIX_ACL",
];
/// Keys that conflict with manual hooks.
pub const MANUAL_HOOK_DISABLE: [&str; 2] = ["KSU_SWITCH_MANAGER", "KSU_KPROBES"];
/// Kprobe hooking is always off once manual hooks are patched in.
pub const KPROBES_HOOK_CONFIG: &str = "KSU_KPROBES_HOOK";

/// Where a diff comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PatchSource {
    File(PathBuf),
    /// Resolved at execution time; the first lexical match wins.
    Glob(String),
}

impl fmt::Display for PatchSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PatchSource::File(path) => write!(f, "{}", path.display()),
            PatchSource::Glob(pattern) => write!(f, "glob:{}", pattern),
        }
    }
}

/// One unit of source-tree mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PatchStep {
    CloneExternal { locator: SourceLocator, dest: PathBuf },
    RunSetupScript { url: String, args: Vec<String>, cwd: PathBuf },
    FailIfMissing { path: PathBuf, message: String },
    ApplyDiff { patch: PatchSource, tree: PathBuf, fuzz: u32, required: bool },
    CopyTree { src: PathBuf, dst: PathBuf },
    ExtractSusfsVersion { header: PathBuf },
    /// Apply every `*.patch` in `root/<susfs version>`; a missing directory is fatal.
    ApplyFixPatches { root: PathBuf, tree: PathBuf, fuzz: u32 },
    RegisterLsm { kconfig: PathBuf, module: String },
    SetConfig(ConfigKey),
}

impl PatchStep {
    /// Steps that run the diff applier.
    pub fn is_patch(&self) -> bool {
        matches!(self, PatchStep::ApplyDiff { .. } | PatchStep::ApplyFixPatches { .. })
    }
}

impl fmt::Display for PatchStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PatchStep::CloneExternal { locator, dest } => {
                write!(f, "clone {} -> {}", locator, dest.display())
            }
            PatchStep::RunSetupScript { url, args, cwd } => {
                write!(f, "run {} {} (in {})", url, args.join(" "), cwd.display())
            }
            PatchStep::FailIfMissing { path, .. } => write!(f, "require {}", path.display()),
            PatchStep::ApplyDiff { patch, tree, fuzz, required } => write!(
                f,
                "patch -F{} {} (in {}){}",
                fuzz,
                patch,
                tree.display(),
                if *required { "" } else { " [tolerated]" }
            ),
            PatchStep::CopyTree { src, dst } => {
                write!(f, "copy {} -> {}", src.display(), dst.display())
            }
            PatchStep::ExtractSusfsVersion { header } => {
                write!(f, "read SUSFS version from {}", header.display())
            }
            PatchStep::ApplyFixPatches { root, tree, fuzz } => write!(
                f,
                "patch -F{} {}/<susfs version>/*.patch (in {})",
                fuzz,
                root.display(),
                tree.display()
            ),
            PatchStep::RegisterLsm { kconfig, module } => {
                write!(f, "register LSM {} in {}", module, kconfig.display())
            }
            PatchStep::SetConfig(key) => write!(f, "config {}", key),
        }
    }
}

/// Explicit inputs the planner needs besides the feature flags.
#[derive(Debug, Clone)]
pub struct PlanContext {
    /// Kernel source tree being patched
    pub source_dir: PathBuf,
    /// Directory external repositories are cloned into
    pub work_dir: PathBuf,
    /// Local patches shipped with the builder
    pub patch_dir: PathBuf,
    /// Kernel `major.minor`
    pub kernel_series: String,
    pub susfs: SourceLocator,
    pub kernel_patches: SourceLocator,
    pub baseband_guard: SourceLocator,
}

impl PlanContext {
    pub fn susfs_dir(&self) -> PathBuf {
        self.work_dir.join("susfs4ksu")
    }

    pub fn kernel_patches_dir(&self) -> PathBuf {
        self.work_dir.join("kernel_patches")
    }
}

/// Upstream repository whose setup script installs the variant.
pub fn variant_upstream(variant: Variant) -> Option<SourceLocator> {
    let (repo, reference) = match variant {
        Variant::None => return None,
        Variant::Official => ("tiann/KernelSU", "main"),
        Variant::Next => ("KernelSU-Next/KernelSU-Next", "next"),
        Variant::Suki => ("SukiSU-Ultra/SukiSU-Ultra", "main"),
    };
    Some(SourceLocator {
        host: "github.com".to_string(),
        repo: repo.to_string(),
        reference: reference.to_string(),
    })
}

/// Manual syscall hook patch inside the kernel-patches repository.
fn manual_hook_patch(variant: Variant) -> &'static str {
    match variant {
        Variant::Suki => "hooks/syscall_hooks.patch",
        _ => "next/scope_min_manual_hooks_v1.4.patch",
    }
}

/// Accumulates steps and remembers which externals are already cloned.
struct Planner<'a> {
    ctx: &'a PlanContext,
    steps: Vec<PatchStep>,
    cloned: HashSet<PathBuf>,
}

impl<'a> Planner<'a> {
    fn push(&mut self, step: PatchStep) {
        self.steps.push(step);
    }

    fn clone_once(&mut self, locator: &SourceLocator, dest: PathBuf) {
        if self.cloned.insert(dest.clone()) {
            self.push(PatchStep::CloneExternal { locator: locator.clone(), dest });
        }
    }

    fn hook_branch(&mut self, variant: Variant) {
        let (Some(upstream), Some(subdir)) = (variant_upstream(variant), variant.subdir()) else {
            return;
        };
        let source = self.ctx.source_dir.clone();

        self.push(PatchStep::RunSetupScript {
            url: upstream.raw_file_url("kernel/setup.sh"),
            args: vec![upstream.reference.clone()],
            cwd: source.clone(),
        });
        self.push(PatchStep::FailIfMissing {
            path: source.join(subdir),
            message: format!("{} setup did not create {}/", variant, subdir),
        });
        self.push(PatchStep::SetConfig(ConfigKey::enable("KSU")));

        if variant.needs_manual_hooks() {
            let ctx = self.ctx;
            let patches = ctx.kernel_patches_dir();
            self.clone_once(&ctx.kernel_patches, patches.clone());
            self.push(PatchStep::ApplyDiff {
                patch: PatchSource::File(patches.join(manual_hook_patch(variant))),
                tree: source,
                fuzz: HOOK_FUZZ,
                required: true,
            });
            self.push(PatchStep::SetConfig(ConfigKey::disable(KPROBES_HOOK_CONFIG)));
            for name in MANUAL_HOOK_ENABLE {
                self.push(PatchStep::SetConfig(ConfigKey::enable(name)));
            }
            for name in MANUAL_HOOK_DISABLE {
                self.push(PatchStep::SetConfig(ConfigKey::disable(name)));
            }
        }
    }

    fn susfs_branch(&mut self, selection: &FeatureSelection) {
        if !selection.susfs {
            self.push(PatchStep::SetConfig(ConfigKey::disable(SUSFS_CONFIG)));
            return;
        }

        let ctx = self.ctx;
        let source = ctx.source_dir.clone();
        let susfs = ctx.susfs_dir();
        let kernel_patches = susfs.join("kernel_patches");

        self.clone_once(&ctx.susfs, susfs.clone());
        self.push(PatchStep::CopyTree {
            src: kernel_patches.join("fs"),
            dst: source.join("fs"),
        });
        self.push(PatchStep::CopyTree {
            src: kernel_patches.join("include").join("linux"),
            dst: source.join("include").join("linux"),
        });
        self.push(PatchStep::ApplyDiff {
            patch: PatchSource::Glob(format!(
                "{}/50_add_susfs_in_*-{}.patch",
                kernel_patches.display(),
                ctx.kernel_series
            )),
            tree: source.clone(),
            fuzz: DEFAULT_FUZZ,
            required: true,
        });
        self.push(PatchStep::ExtractSusfsVersion {
            header: source.join("include").join("linux").join("susfs.h"),
        });

        if matches!(selection.variant, Variant::Next | Variant::Official) {
            if let Some(subdir) = selection.variant.subdir() {
                self.push(PatchStep::ApplyDiff {
                    patch: PatchSource::File(
                        kernel_patches.join("KernelSU").join("10_enable_susfs_for_ksu.patch"),
                    ),
                    tree: source.join(subdir),
                    fuzz: DEFAULT_FUZZ,
                    required: false,
                });
            }
        }

        if selection.variant == Variant::Next {
            let patches = ctx.kernel_patches_dir();
            self.clone_once(&ctx.kernel_patches, patches.clone());
            if let Some(subdir) = selection.variant.subdir() {
                self.push(PatchStep::ApplyFixPatches {
                    root: patches.join("next").join("susfs_fix_patches"),
                    tree: source.join(subdir),
                    fuzz: DEFAULT_FUZZ,
                });
            }
        }

        self.push(PatchStep::SetConfig(ConfigKey::enable(SUSFS_CONFIG)));
    }

    fn lxc_branch(&mut self) {
        self.push(PatchStep::ApplyDiff {
            patch: PatchSource::File(self.ctx.patch_dir.join("lxc_support.patch")),
            tree: self.ctx.source_dir.clone(),
            fuzz: LXC_FUZZ,
            required: true,
        });
    }

    fn baseband_branch(&mut self) {
        let source = self.ctx.source_dir.clone();
        self.push(PatchStep::RunSetupScript {
            url: self.ctx.baseband_guard.raw_file_url("setup.sh"),
            args: Vec::new(),
            cwd: source.clone(),
        });
        self.push(PatchStep::RegisterLsm {
            kconfig: source.join("security").join("Kconfig"),
            module: BBG_LSM_NAME.to_string(),
        });
        self.push(PatchStep::SetConfig(ConfigKey::enable(BBG_CONFIG)));
    }
}

/// Compose the ordered patch plan for a feature selection.
pub fn plan(selection: &FeatureSelection, ctx: &PlanContext) -> Vec<PatchStep> {
    let mut planner = Planner {
        ctx,
        steps: Vec::new(),
        cloned: HashSet::new(),
    };

    if selection.variant.is_hooked() {
        planner.hook_branch(selection.variant);
    }
    planner.susfs_branch(selection);
    if selection.lxc {
        planner.lxc_branch();
    }
    if selection.variant.is_hooked() {
        planner.baseband_branch();
    }

    planner.steps
}
