//! Build-tool contract tests against a stand-in `make` placed in the toolchain
//! `bin` directory. The stand-in records each target it is asked to build.

use ksu_forge::config::loader::KernelProfile;
use ksu_forge::kernel::patcher::kconfig::ConfigOverlay;
use ksu_forge::orchestrator::{apply_lto, run_kernel_build, BuildTool, BuildToolArgs};
use ksu_forge::{BuildError, ConfigState, LtoType};
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

const FAKE_MAKE: &str = r#"#!/bin/sh
out=""
target=""
for arg in "$@"; do
    case "$arg" in
        O=*) out="${arg#O=}" ;;
        -j*|*=*) ;;
        *) target="$arg" ;;
    esac
done
echo "$* " >> "$out/../make.log"
case "$target" in
    *defconfig)
        mkdir -p "$out"
        cp "arch/arm64/configs/$target" "$out/.config"
        ;;
    olddefconfig)
        echo "CONFIG_REGENERATED=y" >> "$out/.config"
        ;;
    Image)
        mkdir -p "$out/arch/arm64/boot"
        printf 'kernel' > "$out/arch/arm64/boot/Image"
        ;;
    *)
        echo "no rule to make target $target" >&2
        exit 2
        ;;
esac
"#;

struct Workspace {
    _temp: TempDir,
    root: PathBuf,
    source: PathBuf,
    out: PathBuf,
    tool: BuildTool,
}

fn workspace() -> Workspace {
    let temp = tempfile::tempdir().unwrap();
    let root = temp.path().to_path_buf();
    let source = root.join("kernel");
    let out = root.join("out");
    fs::create_dir_all(source.join("arch/arm64/configs")).unwrap();
    fs::create_dir_all(&out).unwrap();
    fs::write(
        source.join("arch/arm64/configs/gki_defconfig"),
        "CONFIG_KSU=y\nCONFIG_LTO_CLANG_FULL=y\n",
    )
    .unwrap();

    let bin = root.join("toolchain/bin");
    fs::create_dir_all(&bin).unwrap();
    let make = bin.join("make");
    fs::write(&make, FAKE_MAKE).unwrap();
    fs::set_permissions(&make, fs::Permissions::from_mode(0o755)).unwrap();

    let profile = KernelProfile {
        toolchain_dir: root.join("toolchain"),
        ..KernelProfile::default()
    };
    let tool = BuildTool::new(
        source.clone(),
        BuildToolArgs::from_profile(&profile, out.clone()),
        &profile.toolchain_dir,
        &std::env::var("PATH").unwrap_or_default(),
    );
    Workspace { _temp: temp, root, source, out, tool }
}

fn invocations(root: &Path) -> Vec<String> {
    fs::read_to_string(root.join("make.log"))
        .unwrap_or_default()
        .lines()
        .map(|l| l.trim().to_string())
        .collect()
}

#[test]
fn test_generate_then_regenerate() {
    let ws = workspace();
    let overlay = ConfigOverlay::new(ws.source.clone(), ws.out.clone(), "arm64", "gki_defconfig");

    overlay.generate(&ws.tool).unwrap();
    assert!(overlay.generated_path().is_file());

    apply_lto(&overlay, LtoType::Thin).unwrap();
    overlay.regenerate(&ws.tool).unwrap();

    let config = fs::read_to_string(overlay.generated_path()).unwrap();
    assert!(config.contains("CONFIG_LTO_CLANG_THIN=y\n"));
    assert!(config.contains("# CONFIG_LTO_CLANG_FULL is not set\n"));
    assert!(config.ends_with("CONFIG_REGENERATED=y\n"));
    // Template untouched once the generated file exists
    assert_eq!(
        overlay.get_config("LTO_CLANG_THIN").unwrap(),
        Some(ConfigState::Enabled)
    );
    assert!(fs::read_to_string(ws.source.join("arch/arm64/configs/gki_defconfig"))
        .unwrap()
        .contains("CONFIG_LTO_CLANG_FULL=y"));
}

#[test]
fn test_identical_argument_prefix() {
    let ws = workspace();
    let overlay = ConfigOverlay::new(ws.source.clone(), ws.out.clone(), "arm64", "gki_defconfig");

    overlay.generate(&ws.tool).unwrap();
    overlay.regenerate(&ws.tool).unwrap();
    let image = run_kernel_build(&ws.tool, "Image").unwrap();
    assert_eq!(image, ws.out.join("arch/arm64/boot/Image"));

    let calls = invocations(&ws.root);
    assert_eq!(calls.len(), 3);
    let prefix = ws.tool.args().to_args().join(" ");
    assert_eq!(calls[0], format!("{} gki_defconfig", prefix));
    assert_eq!(calls[1], format!("{} olddefconfig", prefix));
    assert_eq!(calls[2], format!("{} Image", prefix));
    assert!(prefix.ends_with("ARCH=arm64 CC=clang CROSS_COMPILE=aarch64-linux-gnu- LD=ld.lld LLVM=1 LLVM_IAS=1"));
}

#[test]
fn test_build_failure_carries_stderr() {
    let ws = workspace();

    let err = run_kernel_build(&ws.tool, "vmlinuz").unwrap_err();

    assert!(matches!(&err, BuildError::BuildFailed(msg) if msg.contains("no rule to make target vmlinuz")));
    assert_eq!(err.stage(), "build");
}
