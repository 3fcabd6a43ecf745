//! Subprocess evaluation
//!
//! Runs every evaluation in its own child process:
//! - the payload is written as JSON to the child's stdin
//! - the last non-empty stdout line must be the score
//! - the child is killed once the evaluation timeout passes

use crate::error::EvaluationError;
use crate::evaluator::Evaluator;
use mctune_graph::RestProblem;
use mctune_space::Configuration;
use std::io::{Read, Write};
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Evaluator that scores configurations with an external command
#[derive(Debug, Clone)]
pub struct ProcessEvaluator {
    program: String,
    args: Vec<String>,
    clear_env: bool,
}

impl ProcessEvaluator {
    /// Run `program` with no arguments
    #[must_use]
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            clear_env: false,
        }
    }

    /// Split a whitespace-separated command line into program and arguments
    #[must_use]
    pub fn from_command_line(command: &str) -> Option<Self> {
        let mut parts = command.split_whitespace();
        let program = parts.next()?;
        Some(Self::new(program).with_args(parts))
    }

    /// Append arguments
    #[must_use]
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Start the child with an empty environment
    #[must_use]
    pub fn with_clear_env(mut self, clear_env: bool) -> Self {
        self.clear_env = clear_env;
        self
    }

    fn payload(problem: &RestProblem, config: &Configuration) -> Vec<u8> {
        serde_json::json!({
            "components": problem.labels(),
            "configuration": config.to_json(),
        })
        .to_string()
        .into_bytes()
    }

    fn spawn(&self) -> std::io::Result<Child> {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null());
        if self.clear_env {
            cmd.env_clear();
        }
        cmd.spawn()
    }
}

fn parse_score(stdout: &str) -> Result<f64, EvaluationError> {
    let line = stdout
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .last()
        .ok_or_else(|| EvaluationError::InvalidOutput("empty output".to_string()))?;
    line.parse::<f64>()
        .map_err(|_| EvaluationError::InvalidOutput(line.to_string()))
}

impl Evaluator for ProcessEvaluator {
    fn evaluate(
        &self,
        problem: &RestProblem,
        config: &Configuration,
        timeout: Duration,
    ) -> Result<f64, EvaluationError> {
        let deadline = Instant::now() + timeout;
        let mut child = self.spawn()?;

        if let Some(mut stdin) = child.stdin.take() {
            let payload = Self::payload(problem, config);
            // The child may exit without reading; a broken pipe is not an error here.
            thread::spawn(move || {
                let _ = stdin.write_all(&payload);
            });
        }
        let reader = child.stdout.take().map(|mut stdout| {
            thread::spawn(move || {
                let mut out = String::new();
                let _ = stdout.read_to_string(&mut out);
                out
            })
        });

        let status = loop {
            if let Some(status) = child.try_wait()? {
                break status;
            }
            if Instant::now() >= deadline {
                warn!(program = %self.program, ?timeout, "killing evaluation process");
                let _ = child.kill();
                let _ = child.wait();
                return Err(EvaluationError::Timeout(timeout));
            }
            thread::sleep(POLL_INTERVAL);
        };

        let stdout = reader
            .and_then(|handle| handle.join().ok())
            .unwrap_or_default();
        debug!(program = %self.program, %status, "evaluation process finished");

        if !status.success() {
            return Err(EvaluationError::Failed(format!(
                "`{}` exited with {status}",
                self.program
            )));
        }
        parse_score(&stdout)
    }
}
