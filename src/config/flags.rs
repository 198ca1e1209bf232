//! Flag normalization: raw environment strings to a validated `FeatureSelection`.
//!
//! Boolean flags use a permissive policy: the accepted truthy and falsy
//! spellings are recognized case-insensitively, and any other token maps to
//! `false` with a warning. The hook variant is strict: anything outside the
//! four literals is a validation error.

use crate::error::ValidationError;
use crate::models::{FeatureSelection, Variant};

const TRUTHY: &[&str] = &["1", "y", "yes", "t", "true", "on"];
const FALSY: &[&str] = &["0", "n", "no", "f", "false", "off"];

/// Raw, unvalidated flag input as read from the environment.
#[derive(Debug, Clone, Default)]
pub struct RawFlags {
    pub variant: Option<String>,
    pub susfs: Option<String>,
    pub lxc: Option<String>,
}

/// Coerce a boolean token. Unrecognized tokens are `false`.
pub fn parse_bool(raw: &str) -> bool {
    let token = raw.trim().to_lowercase();
    if TRUTHY.contains(&token.as_str()) {
        return true;
    }
    if !FALSY.contains(&token.as_str()) {
        log::warn!("[Flags] Unrecognized boolean token '{}', treating as false", raw);
    }
    false
}

/// Coerce an optional boolean token. Absent is `false`.
pub fn parse_flag(raw: Option<&str>) -> bool {
    raw.map(parse_bool).unwrap_or(false)
}

/// Normalize the hook variant. Absent input selects `NONE`.
pub fn parse_variant(raw: Option<&str>) -> Result<Variant, ValidationError> {
    match raw {
        Some(value) if !value.trim().is_empty() => value.parse(),
        _ => Ok(Variant::None),
    }
}

impl FeatureSelection {
    /// Build the canonical selection from raw flags.
    pub fn normalize(raw: &RawFlags) -> Result<Self, ValidationError> {
        let selection = FeatureSelection {
            variant: parse_variant(raw.variant.as_deref())?,
            susfs: parse_flag(raw.susfs.as_deref()),
            lxc: parse_flag(raw.lxc.as_deref()),
        };
        log::info!(
            "[Flags] Normalized selection: variant={} susfs={} lxc={}",
            selection.variant, selection.susfs, selection.lxc
        );
        Ok(selection)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truthy_tokens() {
        for token in ["1", "y", "YES", "t", "True", "on", " On "] {
            assert!(parse_bool(token), "{} should be true", token);
        }
    }

    #[test]
    fn test_falsy_and_unknown_tokens() {
        for token in ["0", "N", "no", "F", "false", "OFF", "maybe", "", "2"] {
            assert!(!parse_bool(token), "{} should be false", token);
        }
    }

    #[test]
    fn test_absent_variant_is_none() {
        assert_eq!(parse_variant(None).unwrap(), Variant::None);
        assert_eq!(parse_variant(Some("  ")).unwrap(), Variant::None);
    }

    #[test]
    fn test_normalize_rejects_bad_variant() {
        let raw = RawFlags {
            variant: Some("magisk".into()),
            susfs: Some("true".into()),
            lxc: None,
        };
        assert_eq!(
            FeatureSelection::normalize(&raw),
            Err(ValidationError::InvalidVariant("magisk".into()))
        );
    }

    #[test]
    fn test_normalize_full_selection() {
        let raw = RawFlags {
            variant: Some("suki".into()),
            susfs: Some("yes".into()),
            lxc: Some("1".into()),
        };
        let sel = FeatureSelection::normalize(&raw).unwrap();
        assert_eq!(sel, FeatureSelection { variant: Variant::Suki, susfs: true, lxc: true });
    }
}
