//! Telegram Bot API transport.
//!
//! Messages are rendered in the MarkdownV2 dialect, so every reserved
//! character in dynamic text must be backslash-escaped.

use std::path::Path;

use reqwest::blocking::{multipart, Client};
use serde::Deserialize;

use super::Notifier;
use crate::error::ReportError;

/// Reserved MarkdownV2 characters. The backslash comes first so escapes
/// added for later characters are not escaped again.
pub const RESERVED: [char; 19] = [
    '\\', '_', '*', '[', ']', '(', ')', '~', '`', '>', '#', '+', '-', '=', '|', '{', '}', '.', '!',
];

/// Backslash-escape every reserved character.
pub fn escape_markdown(text: &str) -> String {
    let mut escaped = text.to_string();
    for ch in RESERVED {
        escaped = escaped.replace(ch, &format!("\\{}", ch));
    }
    escaped
}

/// Inverse of [`escape_markdown`].
pub fn unescape_markdown(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars();
    while let Some(ch) = chars.next() {
        if ch == '\\' {
            if let Some(next) = chars.next() {
                out.push(next);
                continue;
            }
        }
        out.push(ch);
    }
    out
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    ok: Option<bool>,
    description: Option<String>,
}

/// Bot endpoint for one chat.
pub struct TelegramNotifier {
    client: Client,
    api_url: String,
    bot_token: String,
    chat_id: String,
}

impl TelegramNotifier {
    pub fn new(api_url: &str, bot_token: &str, chat_id: &str) -> Self {
        TelegramNotifier {
            client: Client::new(),
            api_url: api_url.trim_end_matches('/').to_string(),
            bot_token: bot_token.to_string(),
            chat_id: chat_id.to_string(),
        }
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.api_url, self.bot_token, method)
    }

    /// Every response must carry `ok: true`; anything else is an error
    /// carrying the endpoint's description.
    fn confirm(response: reqwest::blocking::Response) -> Result<(), ReportError> {
        let status = response.status();
        let body = response.text()?;
        let parsed: ApiResponse = serde_json::from_str(&body).map_err(|e| {
            ReportError::MalformedResponse(format!("HTTP {}: {}", status, e))
        })?;

        match parsed.ok {
            Some(true) => Ok(()),
            _ => Err(ReportError::Rejected(
                parsed
                    .description
                    .unwrap_or_else(|| format!("HTTP {} without description", status)),
            )),
        }
    }
}

impl Notifier for TelegramNotifier {
    fn send_text(&self, text: &str) -> Result<(), ReportError> {
        let response = self
            .client
            .post(self.method_url("sendMessage"))
            .json(&serde_json::json!({
                "chat_id": self.chat_id,
                "text": text,
                "parse_mode": "MarkdownV2",
                "disable_web_page_preview": true,
            }))
            .send()?;
        Self::confirm(response)
    }

    fn send_document(&self, path: &Path, caption: &str) -> Result<(), ReportError> {
        let form = multipart::Form::new()
            .text("chat_id", self.chat_id.clone())
            .text("caption", caption.to_string())
            .text("parse_mode", "MarkdownV2")
            .file("document", path)?;
        let response = self
            .client
            .post(self.method_url("sendDocument"))
            .multipart(form)
            .send()?;
        Self::confirm(response)
    }
}
