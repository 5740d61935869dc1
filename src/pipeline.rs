//! Batch Pipeline - one scoped pass per file
//!
//! Files are opened, checked and closed one at a time in argument order. A
//! failed file never leaks state into the next one; the policy only decides
//! whether the batch keeps going.

use std::fmt::Display;
use std::path::Path;

use serde::Serialize;
use thiserror::Error;

use crate::container::Container;
use crate::fixture::{describe, DescribeError, FixtureDescriptor};
use crate::validation::{validate, ValidationReport};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("cannot open '{path}': {reason}")]
    Open { path: String, reason: String },

    #[error("cannot describe '{path}': {source}")]
    Describe {
        path: String,
        #[source]
        source: DescribeError,
    },
}

impl PipelineError {
    /// Open and I/O failures are not contract failures.
    pub fn is_contract_failure(&self) -> bool {
        match self {
            PipelineError::Open { .. } => false,
            PipelineError::Describe { source, .. } => source.is_contract_failure(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum BatchPolicy {
    /// Check every file, report all failures at the end.
    #[default]
    ContinueOnFailure,
    /// Stop after the first file that fails.
    StopOnFailure,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum FileOutcome {
    Checked(ValidationReport),
    OpenFailed { source: String, error: String },
}

impl FileOutcome {
    pub fn is_valid(&self) -> bool {
        matches!(self, FileOutcome::Checked(report) if report.valid)
    }

    pub fn source(&self) -> &str {
        match self {
            FileOutcome::Checked(report) => &report.source,
            FileOutcome::OpenFailed { source, .. } => source,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchSummary {
    pub outcomes: Vec<FileOutcome>,
    /// Files never opened because the batch stopped early.
    pub skipped: Vec<String>,
}

impl BatchSummary {
    pub fn all_valid(&self) -> bool {
        self.skipped.is_empty() && self.outcomes.iter().all(FileOutcome::is_valid)
    }

    pub fn failed(&self) -> usize {
        self.outcomes.iter().filter(|o| !o.is_valid()).count()
    }

    /// True when at least one file could not be opened at all.
    pub fn had_open_errors(&self) -> bool {
        self.outcomes
            .iter()
            .any(|o| matches!(o, FileOutcome::OpenFailed { .. }))
    }
}

/// Drives validation and description through a caller-supplied opener.
pub struct BatchPipeline<F> {
    opener: F,
    policy: BatchPolicy,
}

impl<F, C, E> BatchPipeline<F>
where
    F: FnMut(&Path) -> Result<C, E>,
    C: Container,
    E: Display,
{
    pub fn new(opener: F, policy: BatchPolicy) -> Self {
        Self { opener, policy }
    }

    fn open(&mut self, path: &Path) -> Result<C, PipelineError> {
        (self.opener)(path).map_err(|e| PipelineError::Open {
            path: path.display().to_string(),
            reason: e.to_string(),
        })
    }

    /// Validate one file. The container is dropped before this returns.
    pub fn check_file(&mut self, path: &Path) -> FileOutcome {
        match self.open(path) {
            Ok(container) => FileOutcome::Checked(validate(&container)),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "open failed");
                FileOutcome::OpenFailed {
                    source: path.display().to_string(),
                    error: e.to_string(),
                }
            }
        }
    }

    /// Validate `paths` in order, handing each outcome to `observe` as soon
    /// as it is available.
    pub fn run<P: AsRef<Path>>(
        &mut self,
        paths: &[P],
        mut observe: impl FnMut(&FileOutcome),
    ) -> BatchSummary {
        let mut summary = BatchSummary::default();
        for (index, path) in paths.iter().enumerate() {
            let outcome = self.check_file(path.as_ref());
            observe(&outcome);
            let stop = !outcome.is_valid() && self.policy == BatchPolicy::StopOnFailure;
            summary.outcomes.push(outcome);
            if stop {
                summary.skipped = paths[index + 1..]
                    .iter()
                    .map(|p| p.as_ref().display().to_string())
                    .collect();
                break;
            }
        }
        tracing::info!(
            files = summary.outcomes.len(),
            failed = summary.failed(),
            skipped = summary.skipped.len(),
            "batch finished"
        );
        summary
    }

    /// Fixture descriptor for a single file; aborts on the first problem.
    pub fn describe_file(&mut self, path: &Path) -> Result<FixtureDescriptor, PipelineError> {
        let container = self.open(path)?;
        describe(&container).map_err(|source| PipelineError::Describe {
            path: path.display().to_string(),
            source,
        })
    }
}
