use ksu_forge::kernel::patcher::kconfig::ConfigOverlay;
use ksu_forge::{ConfigError, ConfigKey, ConfigState};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::tempdir;

const TEMPLATE: &str = "CONFIG_KPROBES=y\n# CONFIG_KSU is not set\nCONFIG_MODULES=n\n";

fn overlay(root: &Path) -> ConfigOverlay {
    ConfigOverlay::new(root.join("common"), root.join("out"), "arm64", "gki_defconfig")
}

fn write(path: PathBuf, content: &str) -> PathBuf {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(&path, content).unwrap();
    path
}

#[test]
fn test_exact_template_path() {
    let dir = tempdir().unwrap();
    let exact = write(dir.path().join("common/arch/arm64/configs/gki_defconfig"), TEMPLATE);
    write(dir.path().join("common/vendor/configs/gki_defconfig"), "");

    assert_eq!(overlay(dir.path()).find_template().unwrap(), exact);
}

#[test]
fn test_recursive_template_search() {
    let dir = tempdir().unwrap();
    write(dir.path().join("common/arch/arm64/configs/other_defconfig"), "");
    let b = write(dir.path().join("common/b/configs/gki_defconfig"), TEMPLATE);
    write(dir.path().join("common/c/gki_defconfig"), "");

    // First match in sorted walk order
    assert_eq!(overlay(dir.path()).find_template().unwrap(), b);
}

#[test]
fn test_missing_template() {
    let dir = tempdir().unwrap();
    fs::create_dir_all(dir.path().join("common/arch/arm64/configs")).unwrap();

    let err = overlay(dir.path()).set_config(&ConfigKey::enable("KSU")).unwrap_err();
    assert!(matches!(err, ConfigError::TemplateNotFound(name) if name == "gki_defconfig"));
}

#[test]
fn test_get_config_states() {
    let dir = tempdir().unwrap();
    write(dir.path().join("common/arch/arm64/configs/gki_defconfig"), TEMPLATE);
    let overlay = overlay(dir.path());

    assert_eq!(overlay.get_config("KPROBES").unwrap(), Some(ConfigState::Enabled));
    assert_eq!(overlay.get_config("CONFIG_KSU").unwrap(), Some(ConfigState::Disabled));
    assert_eq!(overlay.get_config("MODULES").unwrap(), Some(ConfigState::Disabled));
    assert_eq!(overlay.get_config("KSU_SUSFS").unwrap(), None);
}

#[test]
fn test_set_config_idempotent_bytes() {
    let dir = tempdir().unwrap();
    let template = write(dir.path().join("common/arch/arm64/configs/gki_defconfig"), TEMPLATE);
    let overlay = overlay(dir.path());

    assert!(overlay.set_config(&ConfigKey::enable("KSU")).unwrap());
    assert!(overlay.set_config(&ConfigKey::disable("KSU_SUSFS")).unwrap());
    let once = fs::read(&template).unwrap();

    assert!(!overlay.set_config(&ConfigKey::enable("KSU")).unwrap());
    assert!(!overlay.set_config(&ConfigKey::disable("KSU_SUSFS")).unwrap());
    assert_eq!(fs::read(&template).unwrap(), once);
    assert_eq!(
        String::from_utf8(once).unwrap(),
        "CONFIG_KPROBES=y\nCONFIG_KSU=y\nCONFIG_MODULES=n\n# CONFIG_KSU_SUSFS is not set\n"
    );
}

#[test]
fn test_generated_config_is_authoritative() {
    let dir = tempdir().unwrap();
    let template = write(dir.path().join("common/arch/arm64/configs/gki_defconfig"), TEMPLATE);
    let generated = write(dir.path().join("out/.config"), "CONFIG_KPROBES=y\n");
    let overlay = overlay(dir.path());

    assert_eq!(overlay.active_path().unwrap(), generated);
    overlay.set_config(&ConfigKey::enable("LTO_CLANG_THIN")).unwrap();

    assert_eq!(fs::read_to_string(&template).unwrap(), TEMPLATE);
    assert_eq!(
        fs::read_to_string(&generated).unwrap(),
        "CONFIG_KPROBES=y\nCONFIG_LTO_CLANG_THIN=y\n"
    );
}

#[test]
fn test_matching_key_is_noop_on_first_call() {
    let dir = tempdir().unwrap();
    let content = "CONFIG_KPROBES=y\r\n# CONFIG_KSU_SUSFS is not set";
    let template = write(dir.path().join("common/arch/arm64/configs/gki_defconfig"), content);
    let overlay = overlay(dir.path());

    assert!(!overlay.set_config(&ConfigKey::enable("KPROBES")).unwrap());
    assert!(!overlay.set_config(&ConfigKey::disable("KSU_SUSFS")).unwrap());
    assert_eq!(fs::read_to_string(&template).unwrap(), content);
}
