//! Shared typed models used across parsing, ranking, planning, and evaluation.
//!
//! Every type here is an immutable value: constructed once by a pipeline
//! stage and passed by reference to later stages. Comparisons always operate
//! on pairs of models; nothing is mutated in place.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use indexmap::IndexSet;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

// ---------------------------------------------------------------------------
// Helper functions
// ---------------------------------------------------------------------------

/// Compute a SHA-256 hex digest of revision content.
pub fn content_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

// ---------------------------------------------------------------------------
// 1. Diagnostics
// ---------------------------------------------------------------------------

/// Category of a diagnostic attached to a model or plan.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticKind {
    /// A parser stage failed and a lower-fidelity stage took over.
    ParseDegradation,
    /// The version-history backend was unreachable or the artifact has no history.
    HistoryUnavailable,
    /// A revision workspace could not be created or written.
    WorkspaceFailure,
    /// An element present in the current model is absent from the reconstruction.
    DroppedElement,
    /// An element present only in the template was not reintroduced.
    OmittedTemplateElement,
    /// An element could not be unambiguously placed during a selective patch.
    AmbiguousMerge,
    /// An internal merge error degraded the plan to the history-less fallback.
    MergeFailure,
    /// A harness execution timed out or crashed.
    HarnessFailure,
}

/// One diagnostic record produced by a pipeline stage.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub line: Option<u32>,
    pub message: String,
}

impl Diagnostic {
    pub fn new(kind: DiagnosticKind, line: Option<u32>, message: impl Into<String>) -> Self {
        Self {
            kind,
            line,
            message: message.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// 2. Structural elements
// ---------------------------------------------------------------------------

/// One import binding: `module` is the source path, `bound_name` the name
/// it introduces into scope (alias-aware).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportEntry {
    pub module: String,
    pub bound_name: String,
    pub line: u32,
}

/// One function (or method) definition.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionEntry {
    pub name: String,
    pub parameters: Vec<String>,
    pub start_line: u32,
    pub end_line: u32,
    /// Block nesting depth: 0 for module-level functions.
    pub depth: u32,
}

/// One class/record definition with its member function names.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeEntry {
    pub name: String,
    pub methods: Vec<String>,
    pub start_line: u32,
    pub end_line: u32,
    /// Block nesting depth: 0 for module-level classes.
    pub depth: u32,
}

/// One module-level binding (assignment at nesting depth 0).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BindingEntry {
    pub name: String,
    pub line: u32,
}

// ---------------------------------------------------------------------------
// 3. StructuralModel
// ---------------------------------------------------------------------------

/// Which parser stage produced a model; ordered from highest to lowest
/// confidence.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Fidelity {
    Exact,
    TokenRecovered,
    PatternRecovered,
}

/// The canonical extracted shape of one artifact revision.
///
/// Invariant: `fidelity == Exact` implies `diagnostics` is empty and the
/// source text is syntactically valid as-is.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StructuralModel {
    pub imports: Vec<ImportEntry>,
    pub functions: Vec<FunctionEntry>,
    pub types: Vec<TypeEntry>,
    pub bindings: Vec<BindingEntry>,
    pub diagnostics: Vec<Diagnostic>,
    pub fidelity: Fidelity,
    pub line_count: u32,
}

impl StructuralModel {
    /// Function names at any depth, order-preserving, deduplicated.
    pub fn function_names(&self) -> IndexSet<&str> {
        self.functions.iter().map(|f| f.name.as_str()).collect()
    }

    /// Type names, order-preserving, deduplicated.
    pub fn type_names(&self) -> IndexSet<&str> {
        self.types.iter().map(|t| t.name.as_str()).collect()
    }

    /// Import identity keys: `module` plus the bound name.
    pub fn import_keys(&self) -> IndexSet<(&str, &str)> {
        self.imports
            .iter()
            .map(|i| (i.module.as_str(), i.bound_name.as_str()))
            .collect()
    }

    /// Total number of structural elements (imports + functions + types).
    pub fn element_count(&self) -> usize {
        self.imports.len() + self.functions.len() + self.types.len()
    }

    /// True when the model carries no structural elements at all.
    pub fn is_structurally_empty(&self) -> bool {
        self.element_count() == 0 && self.bindings.is_empty()
    }
}

// ---------------------------------------------------------------------------
// 4. Revision
// ---------------------------------------------------------------------------

/// One historical snapshot of an artifact, restored from the version-history
/// backend into a scoped workspace.
#[derive(Debug)]
pub struct Revision {
    /// Opaque backend handle (e.g. a commit hash).
    pub reference: String,
    /// 0 = most recent, increasing = older.
    pub ordinal: usize,
    /// Materialized content of the snapshot.
    pub text: String,
    pub content_hash: String,
    model: OnceLock<StructuralModel>,
}

impl Revision {
    pub fn new(reference: String, ordinal: usize, text: String) -> Self {
        let content_hash = content_hash(&text);
        Self {
            reference,
            ordinal,
            text,
            content_hash,
            model: OnceLock::new(),
        }
    }

    /// Structural model of this snapshot, computed lazily via the parser
    /// chain and cached for the lifetime of the revision.
    pub fn model(&self) -> &StructuralModel {
        self.model.get_or_init(|| crate::parser::parse(&self.text))
    }
}

// ---------------------------------------------------------------------------
// 5. StabilityProfile
// ---------------------------------------------------------------------------

/// Direction of artifact size change across sampled history (oldest to
/// newest).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SizeTrend {
    Growing,
    Shrinking,
    Stable,
}

/// Aggregate ranking outcome over the sampled revisions of one artifact.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StabilityProfile {
    pub size_trend: SizeTrend,
    /// Fraction of consecutive valid-revision pairs whose function-name and
    /// type-name sets are identical; 1.0 means the skeleton never changed.
    pub stability_score: f64,
    /// Ordinal of the revision chosen as reconstruction template, or `None`
    /// when no sampled revision parsed exactly.
    pub best_template_ordinal: Option<usize>,
    /// Ordinals of all revisions whose model reached `Fidelity::Exact`.
    pub valid_ordinals: Vec<usize>,
}

impl StabilityProfile {
    /// Profile for an artifact with no usable history.
    pub fn empty() -> Self {
        Self {
            size_trend: SizeTrend::Stable,
            stability_score: 0.0,
            best_template_ordinal: None,
            valid_ordinals: vec![],
        }
    }
}

// ---------------------------------------------------------------------------
// 6. ReconstructionPlan
// ---------------------------------------------------------------------------

/// Terminal strategy chosen by the reconstruction planner.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    TemplateSubstitution,
    SelectivePatch,
    NoHistoryFallback,
}

/// Which side contributed a fragment of the reconstructed text.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FragmentOrigin {
    Current,
    Template,
}

/// Kind of region a fragment covers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FragmentKind {
    Preamble,
    Function,
    Type,
}

/// Mapping from one output region to the model that contributed it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Fragment {
    pub name: String,
    pub kind: FragmentKind,
    pub origin: FragmentOrigin,
}

/// Best-effort reconstruction of a broken artifact.
///
/// Invariant: every function/type present in the current model but absent
/// from `reconstructed_text` is recorded as a `DroppedElement` diagnostic —
/// reconstruction never silently deletes structural elements.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ReconstructionPlan {
    pub strategy: Strategy,
    pub reconstructed_text: String,
    pub fragments: Vec<Fragment>,
    pub diagnostics: Vec<Diagnostic>,
}

// ---------------------------------------------------------------------------
// 7. EquivalenceVerdict
// ---------------------------------------------------------------------------

/// Outcome of one test in a harness run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestOutcome {
    Pass,
    Fail,
}

/// Classification of a reconstruction against the original under an
/// external test harness.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Equivalence {
    SuccessEquivalent,
    FailureEquivalent,
    Divergent,
    Inconclusive,
}

/// Raw evidence backing an equivalence classification.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct EvidenceReport {
    pub original: BTreeMap<String, TestOutcome>,
    pub reconstructed: BTreeMap<String, TestOutcome>,
    /// Textual diff of the two failing-test sets, empty when identical.
    pub failure_diff: String,
}

/// The oracle's primary acceptance signal: failure-pattern comparison, not
/// raw pass rate.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EquivalenceVerdict {
    pub classification: Equivalence,
    pub evidence: EvidenceReport,
}
