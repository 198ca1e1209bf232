//! Build-tool invocation: the fixed `make` argument template and the final
//! image build.
//!
//! Every call to the native build system goes through `BuildTool`, so the
//! defconfig generation, configuration regeneration and the image build all
//! share an identical argument prefix and toolchain PATH.

use crate::config::loader::KernelProfile;
use crate::error::BuildError;
use crate::system;
use std::path::{Path, PathBuf};
use std::process::Command;

/// Arguments passed unchanged to every build-tool invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildToolArgs {
    pub jobs: usize,
    pub out_dir: PathBuf,
    pub arch: String,
    pub cc: String,
    pub cross_compile: String,
    pub ld: String,
}

impl BuildToolArgs {
    /// Template from the kernel profile, with a job count from the host CPU count.
    pub fn from_profile(profile: &KernelProfile, out_dir: PathBuf) -> Self {
        BuildToolArgs {
            jobs: num_cpus::get(),
            out_dir,
            arch: profile.arch.clone(),
            cc: profile.cc.clone(),
            cross_compile: profile.cross_compile.clone(),
            ld: profile.ld.clone(),
        }
    }

    /// Render the argument template.
    pub fn to_args(&self) -> Vec<String> {
        vec![
            format!("-j{}", self.jobs),
            format!("O={}", self.out_dir.display()),
            format!("ARCH={}", self.arch),
            format!("CC={}", self.cc),
            format!("CROSS_COMPILE={}", self.cross_compile),
            format!("LD={}", self.ld),
            "LLVM=1".to_string(),
            "LLVM_IAS=1".to_string(),
        ]
    }
}

/// The opaque native build collaborator.
#[derive(Debug, Clone)]
pub struct BuildTool {
    source_dir: PathBuf,
    args: BuildToolArgs,
    toolchain_bin: PathBuf,
    /// Child PATH, fixed at construction
    path: String,
}

impl BuildTool {
    /// `host_path` is the PATH captured at startup; the toolchain `bin` goes first.
    pub fn new(source_dir: PathBuf, args: BuildToolArgs, toolchain_dir: &Path, host_path: &str) -> Self {
        let toolchain_bin = toolchain_dir.join("bin");
        BuildTool {
            path: system::toolchain_path(&toolchain_bin, host_path),
            source_dir,
            args,
            toolchain_bin,
        }
    }

    /// PATH handed to every child process.
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn args(&self) -> &BuildToolArgs {
        &self.args
    }

    /// The complete argument vector for one target.
    pub fn command_line(&self, target: &str) -> Vec<String> {
        let mut args = self.args.to_args();
        args.push(target.to_string());
        args
    }

    /// Run `make <template> <target>` in the source tree.
    pub fn run(&self, target: &str) -> Result<(), String> {
        log::info!("[Build] [MAKE] make {}", self.command_line(target).join(" "));

        let mut command = Command::new("make");
        command
            .args(self.command_line(target))
            .current_dir(&self.source_dir)
            .env("PATH", &self.path);
        system::run_streamed(&mut command, "make")
    }

    /// Identity string of the compiler in use (`clang --version` first line).
    pub fn toolchain_identity(&self) -> String {
        let compiler = self.toolchain_bin.join(&self.args.cc);
        let program = if compiler.exists() { compiler } else { PathBuf::from(&self.args.cc) };
        match system::capture_stdout(Command::new(program).arg("--version")) {
            Ok(output) => output.lines().next().unwrap_or_default().trim().to_string(),
            Err(e) => {
                log::warn!("[Build] Could not query toolchain identity: {}", e);
                self.args.cc.clone()
            }
        }
    }
}

/// Build the kernel image and return its path.
pub fn run_kernel_build(tool: &BuildTool, target: &str) -> Result<PathBuf, BuildError> {
    log::info!("[Build] [EXECUTOR] Starting kernel build ({} jobs)", tool.args().jobs);

    tool.run(target).map_err(BuildError::BuildFailed)?;

    let image = tool
        .args()
        .out_dir
        .join("arch")
        .join(&tool.args().arch)
        .join("boot")
        .join(target);
    if !image.is_file() {
        return Err(BuildError::BuildFailed(format!(
            "build reported success but {} is missing",
            image.display()
        )));
    }

    log::info!("[Build] [EXECUTOR] Image ready: {}", image.display());
    Ok(image)
}
