//! Source-tree metadata extraction.
//!
//! Reads the kernel version from the top-level Makefile and the SUSFS
//! version string from `include/linux/susfs.h`.

use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt;

static MAKEFILE_VAR_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^(VERSION|PATCHLEVEL|SUBLEVEL)\s*=\s*(\d+)\s*$")
        .expect("Invalid Makefile variable regex")
});
static SUSFS_VERSION_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?m)^\s*#define\s+SUSFS_VERSION\s+"(v\d+\.\d+\.\d+)""#)
        .expect("Invalid SUSFS version regex")
});

/// Kernel version as declared by the top-level Makefile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KernelVersion {
    pub major: u32,
    pub minor: u32,
    pub sublevel: u32,
}

impl KernelVersion {
    /// `major.minor`, used to select version-matched patches
    pub fn series(&self) -> String {
        format!("{}.{}", self.major, self.minor)
    }
}

impl fmt::Display for KernelVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.sublevel)
    }
}

/// Parse VERSION / PATCHLEVEL / SUBLEVEL from Makefile content.
pub fn parse_makefile_version(content: &str) -> Option<KernelVersion> {
    let mut major = None;
    let mut minor = None;
    let mut sublevel = None;

    for caps in MAKEFILE_VAR_REGEX.captures_iter(content) {
        let value = caps[2].parse::<u32>().ok();
        match &caps[1] {
            "VERSION" if major.is_none() => major = value,
            "PATCHLEVEL" if minor.is_none() => minor = value,
            "SUBLEVEL" if sublevel.is_none() => sublevel = value,
            _ => {}
        }
    }

    Some(KernelVersion {
        major: major?,
        minor: minor?,
        sublevel: sublevel.unwrap_or(0),
    })
}

/// Extract the `SUSFS_VERSION` define (e.g. `v1.5.7`) from header content.
pub fn parse_susfs_version(header: &str) -> Option<String> {
    SUSFS_VERSION_REGEX
        .captures(header)
        .map(|caps| caps[1].to_string())
}
