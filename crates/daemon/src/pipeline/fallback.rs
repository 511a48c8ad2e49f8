//! Ordered provider fallback.
//!
//! A stage is a list of attempts. The first success wins; running out of
//! attempts is the stage's fatal error.

use futures::future::BoxFuture;
use futures::FutureExt;
use std::future::Future;
use tracing::warn;

use super::job::{JobStage, ProviderKind};
use crate::error::{PipelineError, PipelineResult};

type AttemptFn<'a, T> = Box<dyn FnOnce() -> BoxFuture<'a, PipelineResult<T>> + Send + 'a>;

pub struct Attempt<'a, T> {
    pub provider: ProviderKind,
    /// Stage recorded on the job before this attempt runs.
    pub checkpoint: Option<JobStage>,
    run: AttemptFn<'a, T>,
}

impl<'a, T: 'a> Attempt<'a, T> {
    pub fn new<F, Fut>(provider: ProviderKind, checkpoint: Option<JobStage>, run: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'a,
        Fut: Future<Output = PipelineResult<T>> + Send + 'a,
    {
        Self {
            provider,
            checkpoint,
            run: Box::new(move || run().boxed()),
        }
    }
}

/// The winning attempt, plus every failure that came before it.
#[derive(Debug)]
pub struct ChainOutcome<T> {
    pub value: T,
    pub provider: ProviderKind,
    pub failures: Vec<(ProviderKind, PipelineError)>,
}

pub async fn run_chain<'a, T>(
    stage: &'static str,
    attempts: Vec<Attempt<'a, T>>,
    mut on_checkpoint: impl FnMut(JobStage),
) -> PipelineResult<ChainOutcome<T>> {
    let mut failures = Vec::new();
    for attempt in attempts {
        if let Some(checkpoint) = attempt.checkpoint {
            on_checkpoint(checkpoint);
        }
        match (attempt.run)().await {
            Ok(value) => {
                return Ok(ChainOutcome {
                    value,
                    provider: attempt.provider,
                    failures,
                })
            }
            Err(err) => {
                warn!(stage, provider = ?attempt.provider, error = %err, "provider attempt failed");
                failures.push((attempt.provider, err));
            }
        }
    }

    let last = match failures.pop() {
        Some((_, err)) => err,
        None => PipelineError::provider("none", "no providers configured"),
    };
    Err(PipelineError::Exhausted {
        stage,
        last: Box::new(last),
    })
}
