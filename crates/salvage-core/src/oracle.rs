//! Equivalence oracle: compare failure patterns, not pass rates.
//!
//! Two artifacts are judged equivalent when an external test harness
//! treats them identically — including failing identically. Reproducing
//! the original's failures is strong evidence the reconstruction preserved
//! its semantic shape even though neither version is fully correct.

use std::collections::BTreeMap;
use std::io::{Read, Write};
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::errors::HarnessError;
use crate::guards::DEFAULT_HARNESS_TIMEOUT_MS;
use crate::models::{Equivalence, EquivalenceVerdict, EvidenceReport, TestOutcome};

/// Capability contract for an external test harness.
pub trait TestHarness: Sync {
    /// Execute the harness against one artifact, returning per-test
    /// outcomes keyed by test identifier.
    fn run(&self, artifact_text: &str) -> Result<BTreeMap<String, TestOutcome>, HarnessError>;

    /// Whether two executions may run concurrently. Non-reentrant
    /// harnesses are serialized through a process-wide guard.
    fn reentrant(&self) -> bool {
        true
    }
}

// Serializes executions of non-reentrant harnesses. Guards scheduling
// only; no data lives behind it.
static NON_REENTRANT_GUARD: Mutex<()> = Mutex::new(());

/// Run the harness against both artifacts and classify the result.
///
/// Commutative in its two text arguments given a reentrant harness. Any
/// harness failure (timeout, crash, artifact not runnable) downgrades the
/// verdict to `Inconclusive`; it never aborts the reconstruction.
pub fn evaluate(
    original_text: &str,
    reconstructed_text: &str,
    harness: &dyn TestHarness,
) -> EquivalenceVerdict {
    let (original, reconstructed) = if harness.reentrant() {
        rayon::join(
            || harness.run(original_text),
            || harness.run(reconstructed_text),
        )
    } else {
        let _guard = NON_REENTRANT_GUARD.lock();
        let original = harness.run(original_text);
        let reconstructed = harness.run(reconstructed_text);
        (original, reconstructed)
    };

    let (original, reconstructed) = match (original, reconstructed) {
        (Ok(o), Ok(r)) => (o, r),
        (o, r) => {
            let mut notes = Vec::new();
            if let Err(e) = &o {
                notes.push(format!("original: {e}"));
            }
            if let Err(e) = &r {
                notes.push(format!("reconstructed: {e}"));
            }
            warn!("harness could not evaluate both artifacts: {}", notes.join("; "));
            return EquivalenceVerdict {
                classification: Equivalence::Inconclusive,
                evidence: EvidenceReport {
                    original: o.unwrap_or_default(),
                    reconstructed: r.unwrap_or_default(),
                    failure_diff: notes.join("\n"),
                },
            };
        }
    };

    let failing = |outcomes: &BTreeMap<String, TestOutcome>| -> Vec<String> {
        outcomes
            .iter()
            .filter(|(_, v)| **v == TestOutcome::Fail)
            .map(|(k, _)| k.clone())
            .collect()
    };
    let orig_failing = failing(&original);
    let recon_failing = failing(&reconstructed);

    let classification = if orig_failing.is_empty() && recon_failing.is_empty() {
        Equivalence::SuccessEquivalent
    } else if orig_failing == recon_failing {
        Equivalence::FailureEquivalent
    } else {
        // Includes the "improvement" case: fewer failures is still a
        // divergence from the equivalence contract and needs human review.
        Equivalence::Divergent
    };
    debug!(?classification, "equivalence verdict");

    EquivalenceVerdict {
        classification,
        evidence: EvidenceReport {
            failure_diff: failure_diff(&orig_failing, &recon_failing),
            original,
            reconstructed,
        },
    }
}

/// Symmetric-difference listing: `-` for tests failing only on the
/// original, `+` for tests failing only on the reconstruction.
fn failure_diff(orig_failing: &[String], recon_failing: &[String]) -> String {
    let mut lines = Vec::new();
    for id in orig_failing {
        if !recon_failing.contains(id) {
            lines.push(format!("- {id}"));
        }
    }
    for id in recon_failing {
        if !orig_failing.contains(id) {
            lines.push(format!("+ {id}"));
        }
    }
    lines.join("\n")
}

// ---------------------------------------------------------------------------
// Command harness
// ---------------------------------------------------------------------------

/// Harness binding that runs an external command against a materialized
/// artifact file and reads a JSON `{"test-id": "pass"|"fail"}` report from
/// stdout.
pub struct CommandHarness {
    program: String,
    args: Vec<String>,
    timeout: Duration,
    reentrant: bool,
}

impl CommandHarness {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            timeout: Duration::from_millis(DEFAULT_HARNESS_TIMEOUT_MS),
            reentrant: true,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn non_reentrant(mut self) -> Self {
        self.reentrant = false;
        self
    }
}

impl TestHarness for CommandHarness {
    fn run(&self, artifact_text: &str) -> Result<BTreeMap<String, TestOutcome>, HarnessError> {
        let mut artifact = tempfile::Builder::new()
            .prefix("salvage-harness-")
            .suffix(".py")
            .tempfile()
            .map_err(|e| HarnessError::Unrunnable(format!("cannot stage artifact: {e}")))?;
        artifact
            .write_all(artifact_text.as_bytes())
            .map_err(|e| HarnessError::Unrunnable(format!("cannot stage artifact: {e}")))?;

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .arg(artifact.path())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| HarnessError::Unrunnable(format!("failed to spawn harness: {e}")))?;

        // Drain stdout on its own thread: a report larger than the pipe
        // buffer would otherwise block the child until the deadline.
        let mut stdout = child
            .stdout
            .take()
            .ok_or_else(|| HarnessError::Crash("harness stdout not captured".into()))?;
        let reader = std::thread::spawn(move || {
            let mut buf = Vec::new();
            stdout.read_to_end(&mut buf).map(|_| buf)
        });

        // Poll with a deadline; no lock is held across this boundary.
        let deadline = Instant::now() + self.timeout;
        loop {
            match child.try_wait() {
                Ok(Some(_status)) => break,
                Ok(None) => {
                    if Instant::now() >= deadline {
                        let _ = child.kill();
                        let _ = child.wait();
                        return Err(HarnessError::Timeout(self.timeout.as_millis() as u64));
                    }
                    std::thread::sleep(Duration::from_millis(10));
                }
                Err(e) => {
                    return Err(HarnessError::Crash(format!("wait failed: {e}")));
                }
            }
        }

        let stdout_bytes = reader
            .join()
            .map_err(|_| HarnessError::Crash("stdout reader panicked".into()))?
            .map_err(|e| HarnessError::Crash(format!("cannot collect output: {e}")))?;
        let report: BTreeMap<String, String> = serde_json::from_slice(&stdout_bytes)
            .map_err(|e| HarnessError::Crash(format!("unreadable harness report: {e}")))?;

        let mut outcomes = BTreeMap::new();
        for (test_id, raw) in report {
            let outcome = match raw.as_str() {
                "pass" => TestOutcome::Pass,
                "fail" => TestOutcome::Fail,
                other => {
                    return Err(HarnessError::Crash(format!(
                        "unrecognized outcome '{other}' for test '{test_id}'"
                    )))
                }
            };
            outcomes.insert(test_id, outcome);
        }
        Ok(outcomes)
    }

    fn reentrant(&self) -> bool {
        self.reentrant
    }
}
