//! Outbound build notifications.
//!
//! `Notifier` is the transport seam (the bot endpoint in production, a
//! recorder in tests). `Reporter` renders start/success/failure messages and
//! applies the mass-build silence policy: when silent, nothing leaves the
//! host and the messages only reach the local log.

pub mod telegram;

use std::path::Path;

use crate::config::ReportSettings;
use crate::error::ReportError;
use crate::models::RunReport;
pub use telegram::{escape_markdown, unescape_markdown, TelegramNotifier};

/// Transport for text messages and file uploads.
pub trait Notifier {
    fn send_text(&self, text: &str) -> Result<(), ReportError>;
    fn send_document(&self, path: &Path, caption: &str) -> Result<(), ReportError>;
}

/// Notifier that never leaves the host.
pub struct OfflineNotifier;

impl Notifier for OfflineNotifier {
    fn send_text(&self, text: &str) -> Result<(), ReportError> {
        log::info!("[Report] [OFFLINE] {}", unescape_markdown(text));
        Ok(())
    }

    fn send_document(&self, path: &Path, caption: &str) -> Result<(), ReportError> {
        log::info!("[Report] [OFFLINE] {} ({})", unescape_markdown(caption), path.display());
        Ok(())
    }
}

/// Renders and sends run notifications.
pub struct Reporter {
    notifier: Box<dyn Notifier>,
    silent: bool,
}

impl Reporter {
    pub fn new(notifier: Box<dyn Notifier>, silent: bool) -> Self {
        Reporter { notifier, silent }
    }

    /// Bot-backed reporter, silent in mass-build mode.
    pub fn from_settings(settings: &ReportSettings) -> Self {
        let notifier = TelegramNotifier::new(
            &settings.api_url,
            &settings.credentials.bot_token,
            &settings.credentials.chat_id,
        );
        Reporter::new(Box::new(notifier), settings.mass_build)
    }

    /// Reporter used before credentials are known.
    pub fn offline() -> Self {
        Reporter::new(Box::new(OfflineNotifier), false)
    }

    pub fn is_silent(&self) -> bool {
        self.silent
    }

    /// Send raw text; the caller escapes dynamic parts.
    pub fn send_text(&self, text: &str) -> Result<(), ReportError> {
        if self.silent {
            log::info!("[Report] [SILENT] {}", unescape_markdown(text));
            return Ok(());
        }
        self.notifier.send_text(text)
    }

    /// Upload a file with an already escaped caption.
    pub fn send_document(&self, path: &Path, caption: &str) -> Result<(), ReportError> {
        if self.silent {
            log::info!("[Report] [SILENT] {} ({})", unescape_markdown(caption), path.display());
            return Ok(());
        }
        self.notifier.send_document(path, caption)
    }

    /// Announce the start of a run.
    pub fn start(&self, kernel: &str, variant_label: &str, lto: &str) -> Result<(), ReportError> {
        self.send_text(&format!(
            "*Build started*\nKernel: `{}`\nVariant: `{}`\nLTO: `{}`",
            escape_markdown(kernel),
            escape_markdown(variant_label),
            escape_markdown(lto)
        ))
    }

    /// Deliver the terminal success report, attaching the artifact when present.
    pub fn success(&self, report: &RunReport) -> Result<(), ReportError> {
        let caption = format!("*Build succeeded*\n{}", escape_markdown(&report.message));
        match &report.artifact_path {
            Some(path) if path.is_file() => self.send_document(path, &caption),
            _ => self.send_text(&caption),
        }
    }

    /// Render the failure message for a terminal failure report.
    pub fn failure_text(report: &RunReport) -> String {
        format!("*Build failed*\n{}", escape_markdown(&report.message))
    }
}
