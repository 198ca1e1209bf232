//! Native git management using the `git2` crate.
//!
//! Clones kernel trees and external patch repositories addressed by
//! `host:owner/repo@ref` source locators.

use std::fmt;
use std::path::{Path, PathBuf};
use git2::{Repository, build::RepoBuilder};
use thiserror::Error;

use crate::error::ValidationError;

/// Errors that can occur during git operations
#[derive(Debug, Error)]
pub enum GitError {
    #[error("Repository error: {0}")]
    Repository(String),

    #[error("Clone error: {0}")]
    Clone(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Git2 error: {0}")]
    Git2(#[from] git2::Error),
}

/// Result type for git operations
pub type GitResult<T> = Result<T, GitError>;

/// Parsed `host:owner/repo@ref` coordinate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceLocator {
    pub host: String,
    pub repo: String,
    pub reference: String,
}

impl SourceLocator {
    /// Split a locator on `:` and `@`. All three parts must be non-empty.
    pub fn parse(raw: &str) -> Result<Self, ValidationError> {
        let invalid = || ValidationError::InvalidLocator(raw.to_string());

        let (host, rest) = raw.trim().split_once(':').ok_or_else(invalid)?;
        let (repo, reference) = rest.rsplit_once('@').ok_or_else(invalid)?;
        let repo = repo.trim_end_matches(".git");

        if host.is_empty() || repo.is_empty() || reference.is_empty() || !repo.contains('/') {
            return Err(invalid());
        }

        Ok(SourceLocator {
            host: host.to_string(),
            repo: repo.to_string(),
            reference: reference.to_string(),
        })
    }

    /// HTTPS clone URL. A token is embedded only for github.com.
    pub fn clone_url(&self, token: Option<&str>) -> String {
        match token {
            Some(token) if self.host == "github.com" && !token.is_empty() => {
                format!("https://x-access-token:{}@{}/{}.git", token, self.host, self.repo)
            }
            _ => format!("https://{}/{}.git", self.host, self.repo),
        }
    }

    /// Raw file URL for a path inside the repository at this ref.
    pub fn raw_file_url(&self, path: &str) -> String {
        match self.host.as_str() {
            "github.com" => format!(
                "https://raw.githubusercontent.com/{}/{}/{}",
                self.repo, self.reference, path
            ),
            "gitlab.com" => format!(
                "https://gitlab.com/{}/-/raw/{}/{}",
                self.repo, self.reference, path
            ),
            host => format!("https://{}/{}/raw/{}/{}", host, self.repo, self.reference, path),
        }
    }
}

impl fmt::Display for SourceLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}@{}", self.host, self.repo, self.reference)
    }
}

/// Manages a checked-out repository using native git bindings
pub struct GitManager {
    repo_path: PathBuf,
}

impl GitManager {
    /// Opens an existing repository
    pub fn open(repo_path: impl AsRef<Path>) -> GitResult<Self> {
        let repo_path = repo_path.as_ref().to_path_buf();
        Repository::open(&repo_path).map_err(|e| {
            GitError::Repository(format!("Failed to open repository at {:?}: {}", repo_path, e))
        })?;
        Ok(GitManager { repo_path })
    }

    /// Clones the locator's ref into `target_path`.
    pub fn clone_locator(
        locator: &SourceLocator,
        token: Option<&str>,
        target_path: impl AsRef<Path>,
    ) -> GitResult<Self> {
        log::info!("[Git] [CLONE] {} -> {}", locator, target_path.as_ref().display());
        Self::clone_branch(&locator.clone_url(token), &locator.reference, target_path)
    }

    /// Clones a single branch, shallow first with a full-clone fallback.
    pub fn clone_branch(url: &str, branch: &str, target_path: impl AsRef<Path>) -> GitResult<Self> {
        let target_path = target_path.as_ref();

        Self::shallow_clone(url, branch, target_path).or_else(|shallow_err| {
            log::warn!("[Git] [CLONE] Shallow clone failed: {}", shallow_err);
            log::warn!("[Git] [CLONE] Falling back to standard (full) clone");

            // A failed shallow clone can leave a half-initialized directory behind
            if target_path.exists() {
                std::fs::remove_dir_all(target_path)?;
            }
            RepoBuilder::new()
                .branch(branch)
                .clone(url, target_path)
                .map(|_| ())
                .map_err(|e| GitError::Clone(format!(
                    "Failed to clone {} ({}) to {:?}: {}",
                    redact(url), branch, target_path, e
                )))
        })?;

        log::info!("[Git] [CLONE] Clone completed: {}", target_path.display());
        GitManager::open(target_path)
    }

    fn shallow_clone(url: &str, branch: &str, target_path: &Path) -> GitResult<()> {
        let mut fetch_options = git2::FetchOptions::new();
        fetch_options.depth(1);

        let mut callbacks = git2::RemoteCallbacks::new();
        let mut last_percent = 0u32;
        callbacks.transfer_progress(move |progress| {
            let total = progress.total_objects();
            if total > 0 {
                let percent = (progress.received_objects() as f32 / total as f32 * 100.0) as u32;
                if percent >= last_percent + 25 {
                    last_percent = percent;
                    log::debug!("[Git] [PROGRESS] {}/{} objects - {}%",
                        progress.received_objects(), total, percent);
                }
            }
            true
        });
        fetch_options.remote_callbacks(callbacks);

        let mut builder = RepoBuilder::new();
        builder.branch(branch);
        builder.fetch_options(fetch_options);
        builder.clone(url, target_path).map_err(|e| {
            GitError::Clone(format!("Shallow clone failed for {}: {}", redact(url), e))
        })?;
        Ok(())
    }

    /// Full hex id of the checked-out HEAD commit
    pub fn head_commit(&self) -> GitResult<String> {
        let repo = Repository::open(&self.repo_path)?;
        let head = repo.head()?;
        let commit = head.peel_to_commit()?;
        Ok(commit.id().to_string())
    }

    pub fn repo_path(&self) -> &Path {
        &self.repo_path
    }
}

/// Strip credentials from a URL before it reaches the log.
fn redact(url: &str) -> String {
    match (url.find("://"), url.find('@')) {
        (Some(scheme), Some(at)) if at > scheme => format!("{}{}", &url[..scheme + 3], &url[at + 1..]),
        _ => url.to_string(),
    }
}
