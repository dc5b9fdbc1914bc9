//! # Job Definitions
//!
//! The declarative file listing every job and the triggers it wants.
//!
//! ```toml
//! [[jobs]]
//! name = "nightly"
//!
//! [[jobs.triggers]]
//! kind = "timer"
//! config = "H 2 * * *"
//!
//! [[jobs]]
//! name = "app"
//! repository = "https://example.com/app.git"
//! branch = "main"
//!
//! [[jobs.triggers]]
//! kind = "scm-poll"
//! config = { spec = "H/5 * * * *" }
//! ```

use serde::Deserialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use thiserror::Error;
use trigger_reconciler::{ConfigPayload, JobId, TriggerSpec};

#[derive(Debug, Error)]
pub enum DefinitionError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse job definitions: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Job name must not be empty")]
    EmptyName,

    #[error("Job {0} is defined more than once")]
    DuplicateJob(String),

    #[error("Trigger #{index} of job {job} has an empty kind")]
    EmptyKind { job: String, index: usize },
}

/// Where `scm-poll` triggers of a job look for new revisions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositorySource {
    pub url: String,
    pub branch: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct JobsFile {
    #[serde(default)]
    pub jobs: Vec<JobDefinition>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JobDefinition {
    pub name: String,
    #[serde(default)]
    pub repository: Option<String>,
    #[serde(default)]
    pub branch: Option<String>,
    #[serde(default)]
    pub triggers: Vec<TriggerDefinition>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TriggerDefinition {
    pub kind: String,
    #[serde(default)]
    pub config: ConfigPayload,
}

impl JobsFile {
    pub fn parse(text: &str) -> Result<Self, DefinitionError> {
        let file: Self = toml::from_str(text)?;
        file.validate()?;
        Ok(file)
    }

    pub fn load(path: &Path) -> Result<Self, DefinitionError> {
        let text = std::fs::read_to_string(path).map_err(|source| DefinitionError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&text)
    }

    fn validate(&self) -> Result<(), DefinitionError> {
        let mut seen = HashSet::new();
        for job in &self.jobs {
            if job.name.trim().is_empty() {
                return Err(DefinitionError::EmptyName);
            }
            if !seen.insert(job.name.as_str()) {
                return Err(DefinitionError::DuplicateJob(job.name.clone()));
            }
            if let Some(index) = job.triggers.iter().position(|t| t.kind.trim().is_empty()) {
                return Err(DefinitionError::EmptyKind {
                    job: job.name.clone(),
                    index,
                });
            }
        }
        Ok(())
    }

    pub fn job_ids(&self) -> Vec<JobId> {
        self.jobs.iter().map(JobDefinition::id).collect()
    }
}

impl JobDefinition {
    pub fn id(&self) -> JobId {
        JobId::new(self.name.clone())
    }

    /// The desired trigger list, in declaration order.
    pub fn desired(&self) -> Vec<TriggerSpec> {
        self.triggers
            .iter()
            .map(|t| TriggerSpec::new(t.kind.as_str(), t.config.clone()))
            .collect()
    }

    /// Repository to poll; the branch defaults to `HEAD`.
    pub fn source(&self) -> Option<RepositorySource> {
        self.repository.as_ref().map(|url| RepositorySource {
            url: url.clone(),
            branch: self.branch.clone().unwrap_or_else(|| "HEAD".to_string()),
        })
    }
}
