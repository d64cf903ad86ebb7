//! Saga executor
//!
//! A multi-entity change is a list of named steps. Each step re-reads what
//! it needs, writes at most a few entities, and reports whether it changed
//! anything. Steps are idempotent, so a step that lost a version race or hit
//! a transient store failure is simply run again, and re-running a whole
//! saga after a partial failure converges on the same end state.

use std::future::Future;
use std::pin::Pin;

use tracing::{debug, warn};

use crate::error::WorkflowError;

/// What a step did on this run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    Applied,
    /// Nothing to do; an earlier run already got here
    Skipped,
}

pub type StepFuture<'a> = Pin<Box<dyn Future<Output = Result<StepOutcome, WorkflowError>> + Send + 'a>>;

/// One named, idempotent step
pub struct Step<'a> {
    name: &'static str,
    run: Box<dyn Fn() -> StepFuture<'a> + Send + Sync + 'a>,
}

impl<'a> Step<'a> {
    pub fn new<F>(name: &'static str, run: F) -> Self
    where
        F: Fn() -> StepFuture<'a> + Send + Sync + 'a,
    {
        Self {
            name,
            run: Box::new(run),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

/// Which steps changed state on a run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SagaReport {
    pub applied: Vec<&'static str>,
    pub skipped: Vec<&'static str>,
}

impl SagaReport {
    pub fn changed_anything(&self) -> bool {
        !self.applied.is_empty()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SagaExecutor {
    max_step_retries: u32,
}

impl SagaExecutor {
    pub fn new(max_step_retries: u32) -> Self {
        Self { max_step_retries }
    }

    /// Runs `steps` in order, stopping at the first step that fails for good
    pub async fn run(&self, saga: &str, steps: &[Step<'_>]) -> Result<SagaReport, WorkflowError> {
        let mut report = SagaReport::default();

        for step in steps {
            let mut attempt = 0;
            loop {
                match (step.run)().await {
                    Ok(StepOutcome::Applied) => {
                        debug!(saga, step = step.name, "step applied");
                        report.applied.push(step.name);
                        break;
                    }
                    Ok(StepOutcome::Skipped) => {
                        debug!(saga, step = step.name, "step skipped, already done");
                        report.skipped.push(step.name);
                        break;
                    }
                    Err(err) if err.is_retryable() && attempt < self.max_step_retries => {
                        attempt += 1;
                        warn!(saga, step = step.name, attempt, error = %err, "retrying saga step");
                    }
                    Err(err) => {
                        warn!(saga, step = step.name, error = %err, "saga step failed");
                        return Err(err);
                    }
                }
            }
        }

        Ok(report)
    }
}
