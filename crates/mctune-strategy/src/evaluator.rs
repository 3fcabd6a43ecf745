//! Evaluation boundary
//!
//! An [`Evaluator`] turns a complete configuration into a score. Evaluations
//! are untrusted: they may hang, panic, or fail. Every provided evaluator
//! therefore runs the work off the calling thread and gives up at the timeout,
//! so a stuck evaluation cannot hold a rollout past its budget.

use crate::error::EvaluationError;
use crossbeam::channel;
use mctune_graph::RestProblem;
use mctune_space::Configuration;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// Scores complete configurations
///
/// Implementations must tolerate concurrent calls with different
/// configurations.
pub trait Evaluator: Send + Sync {
    /// Score `config`, giving up after `timeout`
    ///
    /// # Errors
    ///
    /// Returns an error if the evaluation fails, panics, or times out.
    fn evaluate(
        &self,
        problem: &RestProblem,
        config: &Configuration,
        timeout: Duration,
    ) -> Result<f64, EvaluationError>;
}

type EvalFn = dyn Fn(&RestProblem, &Configuration) -> Result<f64, EvaluationError> + Send + Sync;

/// Evaluator backed by a closure running on a detached worker thread
///
/// A closure that outlives the timeout keeps running in the background; its
/// result is discarded.
#[derive(Clone)]
pub struct FnEvaluator {
    func: Arc<EvalFn>,
}

impl std::fmt::Debug for FnEvaluator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnEvaluator").finish_non_exhaustive()
    }
}

impl FnEvaluator {
    /// Wrap a fallible scoring function
    pub fn new<F>(func: F) -> Self
    where
        F: Fn(&RestProblem, &Configuration) -> Result<f64, EvaluationError> + Send + Sync + 'static,
    {
        Self { func: Arc::new(func) }
    }

    /// Wrap an infallible scoring function
    pub fn infallible<F>(func: F) -> Self
    where
        F: Fn(&RestProblem, &Configuration) -> f64 + Send + Sync + 'static,
    {
        Self::new(move |problem, config| Ok(func(problem, config)))
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

impl Evaluator for FnEvaluator {
    fn evaluate(
        &self,
        problem: &RestProblem,
        config: &Configuration,
        timeout: Duration,
    ) -> Result<f64, EvaluationError> {
        let (tx, rx) = channel::bounded(1);
        let func = Arc::clone(&self.func);
        let problem = problem.clone();
        let config = config.clone();

        thread::Builder::new()
            .name("mctune-eval".to_string())
            .spawn(move || {
                let outcome = panic::catch_unwind(AssertUnwindSafe(|| func(&problem, &config)))
                    .unwrap_or_else(|payload| {
                        Err(EvaluationError::Panicked(panic_message(payload.as_ref())))
                    });
                // The receiver is gone once the caller timed out.
                let _ = tx.send(outcome);
            })?;

        match rx.recv_timeout(timeout) {
            Ok(outcome) => outcome,
            Err(channel::RecvTimeoutError::Timeout) => Err(EvaluationError::Timeout(timeout)),
            Err(channel::RecvTimeoutError::Disconnected) => Err(EvaluationError::Panicked(
                "evaluation worker exited without a result".to_string(),
            )),
        }
    }
}
