//! One recovery session: broken artifact in, best-effort reconstruction out.
//!
//! Parsing the current text and mining history are independent and run
//! concurrently. Cancellation is cooperative: the flag is checked between
//! stages, and the revision workspace is reclaimed on every exit path.

use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{info, warn};

use crate::errors::{SalvageError, SalvageResult};
use crate::guards::DEFAULT_HISTORY_DEPTH;
use crate::history::{enumerate_revisions, HistoryBackend, RevisionWorkspace};
use crate::models::{
    Diagnostic, DiagnosticKind, EquivalenceVerdict, ReconstructionPlan, StabilityProfile,
    StructuralModel,
};
use crate::oracle::{evaluate, TestHarness};
use crate::planner::plan;
use crate::ranker::rank;

/// Cooperative cancellation signal, checked between pipeline stages.
#[derive(Default)]
pub struct CancelFlag(AtomicBool);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Input boundary of the engine.
pub struct RecoveryRequest {
    pub artifact_id: String,
    pub current_text: String,
    pub max_history_depth: usize,
}

impl RecoveryRequest {
    pub fn new(artifact_id: impl Into<String>, current_text: impl Into<String>) -> Self {
        Self {
            artifact_id: artifact_id.into(),
            current_text: current_text.into(),
            max_history_depth: DEFAULT_HISTORY_DEPTH,
        }
    }

    pub fn with_depth(mut self, max_history_depth: usize) -> Self {
        self.max_history_depth = max_history_depth;
        self
    }
}

/// Everything a caller receives: always a model and a plan, optionally a
/// verdict, never a raised analysis error.
pub struct RecoveryOutcome {
    pub current_model: StructuralModel,
    pub profile: StabilityProfile,
    pub plan: ReconstructionPlan,
    pub verdict: Option<EquivalenceVerdict>,
    /// Session-level warnings (e.g. an unreachable history backend).
    pub warnings: Vec<Diagnostic>,
}

/// Run one full recovery session.
///
/// Fatal errors are limited to workspace allocation and cancellation;
/// everything else degrades into diagnostics on the outcome.
pub fn recover(
    request: &RecoveryRequest,
    backend: &dyn HistoryBackend,
    harness: Option<&dyn TestHarness>,
    cancel: &CancelFlag,
) -> SalvageResult<RecoveryOutcome> {
    let workspace = RevisionWorkspace::create()?;
    let mut warnings = Vec::new();

    checkpoint(cancel)?;

    // The current-text parse and history enumeration share no state.
    let (current_model, history) = rayon::join(
        || crate::parser::parse(&request.current_text),
        || {
            enumerate_revisions(
                backend,
                &request.artifact_id,
                request.max_history_depth,
                &workspace,
            )
        },
    );
    let revisions = match history {
        Ok(revisions) => revisions,
        Err(e) => {
            warn!(artifact = %request.artifact_id, "history unavailable: {e}");
            warnings.push(Diagnostic::new(
                DiagnosticKind::HistoryUnavailable,
                None,
                format!("history backend failed: {e}"),
            ));
            Vec::new()
        }
    };

    checkpoint(cancel)?;
    let profile = rank(&revisions);

    checkpoint(cancel)?;
    let template = profile
        .best_template_ordinal
        .and_then(|ordinal| revisions.iter().find(|r| r.ordinal == ordinal));
    let plan = plan(&request.current_text, &current_model, template);
    info!(
        artifact = %request.artifact_id,
        strategy = ?plan.strategy,
        fidelity = ?current_model.fidelity,
        "reconstruction planned"
    );

    checkpoint(cancel)?;
    let verdict = harness.map(|h| evaluate(&request.current_text, &plan.reconstructed_text, h));

    Ok(RecoveryOutcome {
        current_model,
        profile,
        plan,
        verdict,
        warnings,
    })
}

fn checkpoint(cancel: &CancelFlag) -> SalvageResult<()> {
    if cancel.is_cancelled() {
        return Err(SalvageError::Cancelled);
    }
    Ok(())
}
