//! Scoring callback bound to one strategy leaf
//!
//! A [`Scorer`] ties a parameter domain to the evaluator and to the two stop
//! flags a strategy has to honor: the global search stop and its own
//! cancellation flag.

use crate::evaluator::Evaluator;
use mctune_graph::{RestProblem, StopSignal};
use mctune_space::{Configuration, ParameterDomain};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Notified about every configuration that was actually evaluated
pub trait ScoreObserver: Send + Sync {
    /// A configuration of `problem` received `score`
    fn solution_scored(&self, problem: &RestProblem, config: &Configuration, score: f64);
}

/// Scoring callback handed to strategies
#[derive(Clone)]
pub struct Scorer {
    problem: Arc<RestProblem>,
    domain: Arc<ParameterDomain>,
    evaluator: Arc<dyn Evaluator>,
    evaluation_timeout: Duration,
    stop: StopSignal,
    cancel: StopSignal,
    observer: Option<Arc<dyn ScoreObserver>>,
}

impl fmt::Debug for Scorer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scorer")
            .field("components", &self.problem.labels())
            .field("dimension", &self.domain.len())
            .field("evaluation_timeout", &self.evaluation_timeout)
            .field("cancelled", &self.cancel.is_raised())
            .finish_non_exhaustive()
    }
}

impl Scorer {
    /// Bind `domain` and `evaluator` under the global `stop` signal
    ///
    /// The scorer gets a fresh cancellation flag of its own.
    #[must_use]
    pub fn new(
        problem: Arc<RestProblem>,
        domain: Arc<ParameterDomain>,
        evaluator: Arc<dyn Evaluator>,
        evaluation_timeout: Duration,
        stop: StopSignal,
    ) -> Self {
        Self {
            problem,
            domain,
            evaluator,
            evaluation_timeout,
            stop,
            cancel: StopSignal::new(),
            observer: None,
        }
    }

    /// Copy of this scorer observing `cancel` instead of its own flag
    #[must_use]
    pub fn with_cancel_flag(&self, cancel: StopSignal) -> Self {
        Self {
            cancel,
            ..self.clone()
        }
    }

    /// Report evaluated configurations to `observer`
    #[must_use]
    pub fn with_observer(mut self, observer: Arc<dyn ScoreObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Rest problem being scored
    #[inline]
    #[must_use]
    pub fn problem(&self) -> &Arc<RestProblem> {
        &self.problem
    }

    /// Parameter domain shared by every strategy of this branch
    #[inline]
    #[must_use]
    pub fn domain(&self) -> &Arc<ParameterDomain> {
        &self.domain
    }

    /// Cancellation flag of this scorer
    #[inline]
    #[must_use]
    pub fn cancel_flag(&self) -> &StopSignal {
        &self.cancel
    }

    /// Global stop signal
    #[inline]
    #[must_use]
    pub fn stop_signal(&self) -> &StopSignal {
        &self.stop
    }

    /// Whether the strategy should return its best-so-far result
    #[inline]
    #[must_use]
    pub fn should_stop(&self) -> bool {
        self.stop.is_raised() || self.cancel.is_raised()
    }

    /// Score a candidate vector
    ///
    /// The candidate is clamped into the domain bounds first. Known vectors
    /// are answered from the domain cache. Once a stop was requested no new
    /// evaluation starts and the result is `0.0`. Evaluation failures are
    /// logged and recorded as `0.0`.
    pub fn score_candidate(&self, candidate: &[f64]) -> f64 {
        let candidate = self.domain.clamp(candidate);
        if let Some(score) = self.domain.score_of(&candidate) {
            return score;
        }
        if self.should_stop() {
            return 0.0;
        }

        let config = match self.domain.from_vector(&candidate) {
            Ok(config) => config,
            Err(err) => {
                warn!(error = %err, "candidate could not be decoded");
                return 0.0;
            }
        };

        let score = match self
            .evaluator
            .evaluate(&self.problem, &config, self.evaluation_timeout)
        {
            Ok(score) if score.is_finite() => score,
            Ok(score) => {
                warn!(score, "evaluator returned a non-finite score");
                0.0
            }
            Err(err) => {
                warn!(error = %err, components = ?self.problem.labels(), "evaluation failed");
                0.0
            }
        };
        debug!(score, "candidate scored");

        if self.domain.add_result(&candidate, score) {
            if let Some(observer) = &self.observer {
                observer.solution_scored(&self.problem, &config, score);
            }
        }
        score
    }

    /// Best known vector of the domain, scoring the default vector if none is known
    pub fn incumbent(&self) -> (Vec<f64>, f64) {
        if let Some((score, vector)) = self.domain.best() {
            return (vector, score);
        }
        let default = self.domain.default_vector();
        let score = self.score_candidate(&default);
        (self.domain.clamp(&default), score)
    }
}
