//! Kernel Source Management Module
//!
//! Handles interactions with the Linux kernel source tree:
//! - Git operations (cloning trees and external patch repositories)
//! - Source metadata parsing (Makefile version, SUSFS header)
//! - Feature composition (patch planning, application, config overlay)

pub mod git;
pub mod parser;
pub mod patcher;
