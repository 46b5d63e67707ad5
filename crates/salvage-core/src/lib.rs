//! Salvage core library — structural recovery engine for broken source
//! artifacts.
//!
//! Given a source file whose syntax is invalid (or in doubt), the engine
//! extracts a best-effort structural model through a degrading-fidelity
//! parser chain, mines prior known-good revisions from a version-history
//! backend, ranks them by validity and stability, and either substitutes
//! or selectively patches a historical template to produce a syntactically
//! valid reconstruction. An equivalence oracle can then validate the
//! result by comparing failure patterns between the original and the
//! reconstruction under an external test harness.
//!
//! The engine is a library invoked by an external orchestrator: callers
//! always receive a model, a reconstruction plan, and a diagnostics list;
//! analysis problems never surface as raised errors.

pub mod compare;
pub mod errors;
pub mod guards;
pub mod history;
pub mod models;
pub mod oracle;
pub mod parser;
pub mod planner;
pub mod ranker;
pub mod session;

pub use compare::{compare, Comparison, StructuralDiff};
pub use errors::{HarnessError, HistoryError, SalvageError, SalvageResult};
pub use history::{enumerate_revisions, git::GitBackend, HistoryBackend, RevisionWorkspace};
pub use models::{
    Diagnostic, DiagnosticKind, Equivalence, EquivalenceVerdict, Fidelity, ReconstructionPlan,
    Revision, StabilityProfile, Strategy, StructuralModel, TestOutcome,
};
pub use oracle::{evaluate, CommandHarness, TestHarness};
pub use planner::plan;
pub use ranker::rank;
pub use session::{recover, CancelFlag, RecoveryOutcome, RecoveryRequest};
