//! Executor tests against throwaway source trees.
//!
//! None of these reach the network or the `patch` binary: every diff step
//! used here either resolves to a missing file or is never reached.

use super::*;
use crate::models::{ConfigKey, ConfigState};
use std::path::Path;

const DEFCONFIG: &str = "CONFIG_KPROBES=y\n# CONFIG_KSU is not set\nCONFIG_LTO_CLANG_THIN=y\n";

const SECURITY_KCONFIG: &str = r#"menu "Security options"

config LSM
	string "Ordered list of enabled LSMs"
	default "lockdown,yama,loadpin,safesetid,integrity,smack,selinux,tomoyo,apparmor,bpf" if DEFAULT_SECURITY_SMACK
	default "lockdown,yama,loadpin,safesetid,integrity,selinux,smack,tomoyo,apparmor,bpf"
	help
	  A comma-separated list of LSMs, in initialization order.
	  default "selinux" is only an example here

source "security/selinux/Kconfig"

endmenu
"#;

/// Source tree with a template defconfig; returns (tempdir, source dir, patcher).
fn fixture() -> (tempfile::TempDir, PathBuf, KernelPatcher) {
    let temp = tempfile::tempdir().expect("Failed to create temp dir");
    let source = temp.path().join("common");
    let configs = source.join("arch/arm64/configs");
    fs::create_dir_all(&configs).unwrap();
    fs::write(configs.join("gki_defconfig"), DEFCONFIG).unwrap();

    let overlay = ConfigOverlay::new(source.clone(), temp.path().join("out"), "arm64", "gki_defconfig");
    let patcher = KernelPatcher::new(source.clone(), overlay, None);
    (temp, source, patcher)
}

fn defconfig(source: &Path) -> String {
    fs::read_to_string(source.join("arch/arm64/configs/gki_defconfig")).unwrap()
}

#[test]
fn test_config_only_plan() {
    let (_temp, source, mut patcher) = fixture();
    let steps = vec![PatchStep::SetConfig(ConfigKey::disable("KSU_SUSFS"))];

    let summary = patcher.execute(&steps).unwrap();

    assert_eq!(summary.steps_run, 1);
    assert_eq!(summary.patches_applied, 0);
    assert_eq!(summary.config_changes, 1);
    assert_eq!(defconfig(&source), format!("{}# CONFIG_KSU_SUSFS is not set\n", DEFCONFIG));
}

#[test]
fn test_set_config_twice_is_noop() {
    let (_temp, source, mut patcher) = fixture();
    let step = PatchStep::SetConfig(ConfigKey::enable("KSU"));

    patcher.execute(&[step.clone()]).unwrap();
    let after_first = defconfig(&source);
    let summary = patcher.execute(&[step]).unwrap();

    assert_eq!(summary.config_changes, 0);
    assert_eq!(defconfig(&source), after_first);
}

#[test]
fn test_fail_if_missing_aborts_remaining_steps() {
    let (_temp, source, mut patcher) = fixture();
    let steps = vec![
        PatchStep::FailIfMissing {
            path: source.join("KernelSU-Next"),
            message: "NEXT setup did not create KernelSU-Next/".to_string(),
        },
        PatchStep::SetConfig(ConfigKey::enable("KSU")),
    ];

    let err = patcher.execute(&steps).unwrap_err();

    assert!(matches!(err, PatchError::Missing(ref m) if m.contains("KernelSU-Next")));
    assert_eq!(patcher.overlay().get_config("KSU").unwrap(), Some(ConfigState::Disabled));
}

#[test]
fn test_missing_fix_patch_dir_is_fatal() {
    let (temp, source, mut patcher) = fixture();
    let header_dir = source.join("include/linux");
    fs::create_dir_all(&header_dir).unwrap();
    fs::write(header_dir.join("susfs.h"), "#define SUSFS_VERSION \"v1.5.9\"\n").unwrap();
    let fix_root = temp.path().join("kernel_patches/next/susfs_fix_patches");
    fs::create_dir_all(fix_root.join("v1.5.7")).unwrap();

    let steps = vec![
        PatchStep::ExtractSusfsVersion { header: header_dir.join("susfs.h") },
        PatchStep::ApplyFixPatches { root: fix_root, tree: source.clone(), fuzz: 2 },
        PatchStep::SetConfig(ConfigKey::enable("KSU_SUSFS")),
    ];

    let err = patcher.execute(&steps).unwrap_err();

    assert!(matches!(err, PatchError::Unsupported(ref m) if m.contains("v1.5.9")), "{}", err);
    assert_eq!(patcher.susfs_version(), Some("v1.5.9"));
    assert_eq!(patcher.overlay().get_config("KSU_SUSFS").unwrap(), None);
}

#[test]
fn test_fix_patches_require_extracted_version() {
    let (temp, source, mut patcher) = fixture();
    let steps = vec![PatchStep::ApplyFixPatches {
        root: temp.path().join("fixes"),
        tree: source,
        fuzz: 2,
    }];
    assert!(matches!(patcher.execute(&steps), Err(PatchError::Missing(_))));
}

#[test]
fn test_empty_fix_patch_dir_applies_nothing() {
    let (temp, source, _patcher) = fixture();
    let root = temp.path().join("fixes");
    fs::create_dir_all(root.join("v1.5.7")).unwrap();
    fs::write(root.join("v1.5.7/README"), "not a patch").unwrap();
    assert_eq!(apply_fix_patches(&root, "v1.5.7", &source, 2).unwrap(), 0);
}

#[test]
fn test_tolerated_patch_failure_continues() {
    let (temp, source, mut patcher) = fixture();
    let steps = vec![
        PatchStep::ApplyDiff {
            patch: PatchSource::File(temp.path().join("10_enable_susfs_for_ksu.patch")),
            tree: source.clone(),
            fuzz: 2,
            required: false,
        },
        PatchStep::SetConfig(ConfigKey::enable("KSU_SUSFS")),
    ];

    let summary = patcher.execute(&steps).unwrap();

    assert_eq!(summary.tolerated_failures, 1);
    assert_eq!(summary.patches_applied, 0);
    assert_eq!(patcher.overlay().get_config("KSU_SUSFS").unwrap(), Some(ConfigState::Enabled));
}

#[test]
fn test_required_patch_failure_is_fatal() {
    let (temp, source, mut patcher) = fixture();
    let steps = vec![
        PatchStep::ApplyDiff {
            patch: PatchSource::File(temp.path().join("lxc_support.patch")),
            tree: source,
            fuzz: 3,
            required: true,
        },
        PatchStep::SetConfig(ConfigKey::enable("KSU")),
    ];

    assert!(matches!(patcher.execute(&steps), Err(PatchError::FileNotFound(_))));
    assert_eq!(patcher.overlay().get_config("KSU").unwrap(), Some(ConfigState::Disabled));
}

#[test]
fn test_glob_picks_first_lexical_match() {
    let temp = tempfile::tempdir().unwrap();
    for name in ["50_add_susfs_in_gki-android13-5.10.patch", "50_add_susfs_in_gki-android12-5.10.patch"] {
        fs::write(temp.path().join(name), "").unwrap();
    }
    let pattern = format!("{}/50_add_susfs_in_*-5.10.patch", temp.path().display());

    let resolved = resolve_patch(&PatchSource::Glob(pattern)).unwrap();
    assert_eq!(
        resolved.file_name().unwrap().to_str().unwrap(),
        "50_add_susfs_in_gki-android12-5.10.patch"
    );

    let none = format!("{}/50_add_susfs_in_*-6.1.patch", temp.path().display());
    assert!(matches!(resolve_patch(&PatchSource::Glob(none)), Err(PatchError::FileNotFound(_))));
}

#[test]
fn test_copy_tree_overwrites() {
    let temp = tempfile::tempdir().unwrap();
    let src = temp.path().join("kernel_patches/fs");
    let dst = temp.path().join("common/fs");
    fs::create_dir_all(src.join("sub")).unwrap();
    fs::create_dir_all(&dst).unwrap();
    fs::write(src.join("susfs.c"), "new").unwrap();
    fs::write(src.join("sub/sus_su.c"), "nested").unwrap();
    fs::write(dst.join("susfs.c"), "old").unwrap();
    fs::write(dst.join("namei.c"), "untouched").unwrap();

    assert_eq!(copy_tree(&src, &dst).unwrap(), 2);
    assert_eq!(fs::read_to_string(dst.join("susfs.c")).unwrap(), "new");
    assert_eq!(fs::read_to_string(dst.join("sub/sus_su.c")).unwrap(), "nested");
    assert_eq!(fs::read_to_string(dst.join("namei.c")).unwrap(), "untouched");

    assert!(matches!(copy_tree(&temp.path().join("absent"), &dst), Err(PatchError::FileNotFound(_))));
}

#[test]
fn test_register_lsm_inserts_once() {
    let LsmUpdate::Registered(updated) = register_lsm(SECURITY_KCONFIG, "baseband_guard") else {
        panic!("should change");
    };
    assert!(updated.contains("integrity,smack,selinux,baseband_guard,tomoyo"));
    assert!(updated.contains("integrity,selinux,baseband_guard,smack"));
    // help text below the block is left alone
    assert!(updated.contains("default \"selinux\" is only an example here"));
    assert_eq!(register_lsm(&updated, "baseband_guard"), LsmUpdate::AlreadyRegistered);
}

#[test]
fn test_register_lsm_without_selinux_default() {
    let kconfig = "config LSM\n\tstring \"LSMs\"\n\tdefault \"lockdown,yama,bpf\"\n\thelp\n\t  selinux\n";
    assert_eq!(register_lsm(kconfig, "baseband_guard"), LsmUpdate::NoSelinuxDefault);
    assert_eq!(register_lsm("menu \"Security\"\nendmenu\n", "baseband_guard"), LsmUpdate::NoSelinuxDefault);
}

#[test]
fn test_register_lsm_step_without_default_leaves_file() {
    let (_temp, source, mut patcher) = fixture();
    let kconfig = source.join("security/Kconfig");
    fs::create_dir_all(kconfig.parent().unwrap()).unwrap();
    let content = "config LSM\n\tdefault \"lockdown,yama\"\n";
    fs::write(&kconfig, content).unwrap();

    patcher
        .execute(&[PatchStep::RegisterLsm { kconfig: kconfig.clone(), module: "baseband_guard".to_string() }])
        .unwrap();

    assert_eq!(fs::read_to_string(&kconfig).unwrap(), content);
}

#[test]
fn test_register_lsm_step_idempotent() {
    let (_temp, source, mut patcher) = fixture();
    let kconfig = source.join("security/Kconfig");
    fs::create_dir_all(kconfig.parent().unwrap()).unwrap();
    fs::write(&kconfig, SECURITY_KCONFIG).unwrap();
    let step = PatchStep::RegisterLsm { kconfig: kconfig.clone(), module: "baseband_guard".to_string() };

    patcher.execute(&[step.clone()]).unwrap();
    let once = fs::read_to_string(&kconfig).unwrap();
    patcher.execute(&[step]).unwrap();

    assert_eq!(fs::read_to_string(&kconfig).unwrap(), once);
    assert_eq!(once.matches("baseband_guard").count(), 2);
}
