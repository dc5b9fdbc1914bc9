//! `ScmProbe` backed by `git ls-remote`.

use crate::definitions::RepositorySource;
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use tokio::process::Command;
use tracing::debug;
use trigger_reconciler::{JobId, ScmProbe, TriggerError};

/// Asks the remote for the head of each job's configured branch.
pub struct GitLsRemoteProbe {
    git: String,
    sources: RwLock<HashMap<JobId, RepositorySource>>,
}

impl Default for GitLsRemoteProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl GitLsRemoteProbe {
    pub fn new() -> Self {
        Self::with_git_binary("git")
    }

    pub fn with_git_binary(git: impl Into<String>) -> Self {
        Self {
            git: git.into(),
            sources: RwLock::new(HashMap::new()),
        }
    }

    /// Replace the job -> repository map. Called after every definitions reload.
    pub fn set_sources(&self, sources: HashMap<JobId, RepositorySource>) {
        *self.sources.write() = sources;
    }

    #[must_use]
    pub fn source(&self, job: &JobId) -> Option<RepositorySource> {
        self.sources.read().get(job).cloned()
    }
}

/// First object id in `git ls-remote` output.
pub fn parse_ls_remote(output: &str) -> Option<String> {
    output
        .lines()
        .filter_map(|line| line.split_whitespace().next())
        .find(|sha| !sha.is_empty() && sha.chars().all(|c| c.is_ascii_hexdigit()))
        .map(str::to_string)
}

#[async_trait]
impl ScmProbe for GitLsRemoteProbe {
    async fn latest_revision(&self, job: &JobId) -> Result<Option<String>, TriggerError> {
        let Some(source) = self.source(job) else {
            return Err(TriggerError::Probe(format!("job {job} has no repository configured")));
        };

        let output = Command::new(&self.git)
            .arg("ls-remote")
            .arg(&source.url)
            .arg(&source.branch)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| TriggerError::Probe(format!("failed to run {}: {e}", self.git)))?;

        if !output.status.success() {
            return Err(TriggerError::Probe(format!(
                "git ls-remote {} {} exited with {}: {}",
                source.url,
                source.branch,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        let revision = parse_ls_remote(&String::from_utf8_lossy(&output.stdout));
        debug!(job = %job, url = %source.url, revision = ?revision, "Polled repository");
        Ok(revision)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_ls_remote() {
        let out = "3f786850e387550fdab836ed7e6dc881de23001b\trefs/heads/main\n";
        assert_eq!(
            parse_ls_remote(out).as_deref(),
            Some("3f786850e387550fdab836ed7e6dc881de23001b")
        );
    }

    #[test]
    fn test_parse_ls_remote_empty_branch() {
        assert_eq!(parse_ls_remote(""), None);
        assert_eq!(parse_ls_remote("warning: redirecting\n"), None);
    }

    #[tokio::test]
    async fn test_unknown_job_is_probe_error() {
        let probe = GitLsRemoteProbe::new();
        let err = probe.latest_revision(&JobId::from("nope")).await.unwrap_err();
        assert!(matches!(err, TriggerError::Probe(_)));
    }

    #[tokio::test]
    async fn test_missing_binary_is_probe_error() {
        let probe = GitLsRemoteProbe::with_git_binary("/nonexistent/git");
        let job = JobId::from("app");
        probe.set_sources(HashMap::from([(
            job.clone(),
            RepositorySource {
                url: "https://example.com/app.git".into(),
                branch: "main".into(),
            },
        )]));

        let err = probe.latest_revision(&job).await.unwrap_err();
        assert!(matches!(err, TriggerError::Probe(msg) if msg.contains("failed to run")));
    }
}
