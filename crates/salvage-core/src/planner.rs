//! Reconstruction planning: template substitution, selective patching, or
//! history-less fallback.
//!
//! The planner never raises. Any internal merge failure degrades to
//! `NoHistoryFallback` with an explicit diagnostic, and no structural
//! element from the current model is ever dropped silently.

use tracing::{debug, warn};

use crate::compare::{compare, Comparison};
use crate::guards::SIMILARITY_SUBSTITUTION_THRESHOLD;
use crate::models::{
    Diagnostic, DiagnosticKind, Fidelity, Fragment, FragmentKind, FragmentOrigin,
    ReconstructionPlan, Revision, Strategy, StructuralModel,
};

/// Decide and materialize a reconstruction for the current broken artifact.
pub fn plan(
    current_text: &str,
    current: &StructuralModel,
    template: Option<&Revision>,
) -> ReconstructionPlan {
    let Some(template) = template else {
        return fallback_plan(
            current_text,
            current,
            Diagnostic::new(
                DiagnosticKind::HistoryUnavailable,
                None,
                "no valid historical template; output is the current best-effort recovery",
            ),
        );
    };

    let comparison = compare(current, template.model());
    debug!(
        similarity = comparison.similarity,
        template_ordinal = template.ordinal,
        "template comparison complete"
    );

    if comparison.similarity >= SIMILARITY_SUBSTITUTION_THRESHOLD {
        return substitution_plan(template, &comparison);
    }

    match selective_patch(current_text, current, template, &comparison) {
        Ok(plan) => plan,
        Err(reason) => {
            warn!("selective patch failed, degrading to fallback: {reason}");
            fallback_plan(
                current_text,
                current,
                Diagnostic::new(
                    DiagnosticKind::MergeFailure,
                    None,
                    format!("selective patch failed: {reason}"),
                ),
            )
        }
    }
}

/// Output equals the current model's own highest-fidelity recoverable text.
fn fallback_plan(
    current_text: &str,
    current: &StructuralModel,
    cause: Diagnostic,
) -> ReconstructionPlan {
    let mut diagnostics = current.diagnostics.clone();
    diagnostics.push(cause);
    ReconstructionPlan {
        strategy: Strategy::NoHistoryFallback,
        reconstructed_text: current_text.to_string(),
        fragments: current_fragments(current),
        diagnostics,
    }
}

fn current_fragments(current: &StructuralModel) -> Vec<Fragment> {
    let mut fragments = Vec::new();
    for f in current.functions.iter().filter(|f| f.depth == 0) {
        fragments.push(Fragment {
            name: f.name.clone(),
            kind: FragmentKind::Function,
            origin: FragmentOrigin::Current,
        });
    }
    for t in current.types.iter().filter(|t| t.depth == 0) {
        fragments.push(Fragment {
            name: t.name.clone(),
            kind: FragmentKind::Type,
            origin: FragmentOrigin::Current,
        });
    }
    fragments
}

/// The template text becomes the reconstruction verbatim; the current
/// low-fidelity noise is presumed superficial. Current-only elements that
/// vanish this way must be flagged, never silently deleted.
fn substitution_plan(template: &Revision, comparison: &Comparison) -> ReconstructionPlan {
    let mut diagnostics = Vec::new();
    for name in &comparison.diff.added_functions {
        diagnostics.push(Diagnostic::new(
            DiagnosticKind::DroppedElement,
            None,
            format!("function '{name}' present in current text is absent from the template"),
        ));
    }
    for name in &comparison.diff.added_types {
        diagnostics.push(Diagnostic::new(
            DiagnosticKind::DroppedElement,
            None,
            format!("type '{name}' present in current text is absent from the template"),
        ));
    }

    let tmpl_model = template.model();
    let mut fragments = Vec::new();
    for f in tmpl_model.functions.iter().filter(|f| f.depth == 0) {
        fragments.push(Fragment {
            name: f.name.clone(),
            kind: FragmentKind::Function,
            origin: FragmentOrigin::Template,
        });
    }
    for t in tmpl_model.types.iter().filter(|t| t.depth == 0) {
        fragments.push(Fragment {
            name: t.name.clone(),
            kind: FragmentKind::Type,
            origin: FragmentOrigin::Template,
        });
    }
    ReconstructionPlan {
        strategy: Strategy::TemplateSubstitution,
        reconstructed_text: template.text.clone(),
        fragments,
        diagnostics,
    }
}

// ---------------------------------------------------------------------------
// Selective patch
// ---------------------------------------------------------------------------

/// One top-level region of the current text: a function or type span.
struct Region<'a> {
    name: &'a str,
    kind: FragmentKind,
    start: usize, // 1-based, inclusive
    end: usize,   // 1-based, inclusive
    reliable: bool,
}

/// Merge template bodies into the current text.
///
/// Elements present in both prefer the template's body; elements only in
/// the current text are retained verbatim; elements only in the template
/// are deliberately not reintroduced. `Err` means the merge cannot be
/// trusted at all and the caller degrades to the fallback.
fn selective_patch(
    current_text: &str,
    current: &StructuralModel,
    template: &Revision,
    comparison: &Comparison,
) -> Result<ReconstructionPlan, String> {
    let current_lines: Vec<&str> = current_text.lines().collect();
    let template_lines: Vec<&str> = template.text.lines().collect();
    let tmpl_model = template.model();

    let mut regions = collect_regions(current);
    regions.sort_by_key(|r| r.start);
    for pair in regions.windows(2) {
        if pair[1].start <= pair[0].end {
            return Err(format!(
                "overlapping regions '{}' and '{}'",
                pair[0].name, pair[1].name
            ));
        }
    }
    if let Some(last) = regions.last() {
        if last.end > current_lines.len() {
            return Err(format!(
                "region '{}' extends past end of text",
                last.name
            ));
        }
    }

    let mut out: Vec<String> = Vec::new();
    let mut fragments: Vec<Fragment> = Vec::new();
    let mut diagnostics: Vec<Diagnostic> = current.diagnostics.clone();
    let mut cursor = 1usize; // next current line to emit

    for region in &regions {
        // Preamble / inter-element lines come from the current text.
        for line in cursor..region.start {
            out.push(current_lines[line - 1].to_string());
        }
        cursor = region.end + 1;

        let template_span = find_template_span(tmpl_model, region, &template_lines);
        match template_span {
            Some(span) if region.reliable => {
                out.extend(span.iter().map(|l| l.to_string()));
                fragments.push(Fragment {
                    name: region.name.to_string(),
                    kind: region.kind,
                    origin: FragmentOrigin::Template,
                });
            }
            Some(_) => {
                // Shared element, but the current span cannot be trusted:
                // keep the current text and say so.
                diagnostics.push(Diagnostic::new(
                    DiagnosticKind::AmbiguousMerge,
                    Some(region.start as u32),
                    format!(
                        "'{}' exists in the template but its current extent is unreliable; retained from current",
                        region.name
                    ),
                ));
                emit_current_region(&current_lines, region, &mut out, &mut fragments);
            }
            None => {
                // Present only in the current text: retain verbatim.
                emit_current_region(&current_lines, region, &mut out, &mut fragments);
            }
        }
    }
    for line in cursor..=current_lines.len() {
        out.push(current_lines[line - 1].to_string());
    }

    // Template-only elements are not reintroduced; the current author may
    // have removed them on purpose.
    for name in &comparison.diff.removed_functions {
        diagnostics.push(Diagnostic::new(
            DiagnosticKind::OmittedTemplateElement,
            None,
            format!("template function '{name}' not reintroduced"),
        ));
    }
    for name in &comparison.diff.removed_types {
        diagnostics.push(Diagnostic::new(
            DiagnosticKind::OmittedTemplateElement,
            None,
            format!("template type '{name}' not reintroduced"),
        ));
    }

    let mut reconstructed_text = out.join("\n");
    if current_text.ends_with('\n') && !reconstructed_text.is_empty() {
        reconstructed_text.push('\n');
    }

    // No-silent-deletion invariant: anything from the current skeleton that
    // failed to survive the merge gets flagged.
    flag_dropped_elements(current, &reconstructed_text, &mut diagnostics);

    Ok(ReconstructionPlan {
        strategy: Strategy::SelectivePatch,
        reconstructed_text,
        fragments,
        diagnostics,
    })
}

// Only module-level elements form regions; a nested class lives inside
// its enclosing function's span and would otherwise overlap it.
fn collect_regions(current: &StructuralModel) -> Vec<Region<'_>> {
    let mut regions = Vec::new();
    let ranges_reliable = current.fidelity != Fidelity::PatternRecovered;
    for f in current.functions.iter().filter(|f| f.depth == 0) {
        regions.push(Region {
            name: &f.name,
            kind: FragmentKind::Function,
            start: f.start_line as usize,
            end: f.end_line.max(f.start_line) as usize,
            reliable: ranges_reliable && f.end_line >= f.start_line,
        });
    }
    for t in current.types.iter().filter(|t| t.depth == 0) {
        regions.push(Region {
            name: &t.name,
            kind: FragmentKind::Type,
            start: t.start_line as usize,
            end: t.end_line.max(t.start_line) as usize,
            reliable: ranges_reliable && t.end_line >= t.start_line,
        });
    }
    regions
}

/// Lines of the template element with the same name and kind, if any.
fn find_template_span<'a>(
    tmpl_model: &StructuralModel,
    region: &Region<'_>,
    template_lines: &[&'a str],
) -> Option<Vec<&'a str>> {
    let (start, end) = match region.kind {
        FragmentKind::Function => tmpl_model
            .functions
            .iter()
            .filter(|f| f.depth == 0)
            .find(|f| f.name == region.name)
            .map(|f| (f.start_line as usize, f.end_line as usize))?,
        FragmentKind::Type => tmpl_model
            .types
            .iter()
            .find(|t| t.name == region.name)
            .map(|t| (t.start_line as usize, t.end_line as usize))?,
        FragmentKind::Preamble => return None,
    };
    if start == 0 || end < start || end > template_lines.len() {
        return None;
    }
    Some(template_lines[start - 1..end].to_vec())
}

fn emit_current_region(
    current_lines: &[&str],
    region: &Region<'_>,
    out: &mut Vec<String>,
    fragments: &mut Vec<Fragment>,
) {
    for line in region.start..=region.end.min(current_lines.len()) {
        out.push(current_lines[line - 1].to_string());
    }
    fragments.push(Fragment {
        name: region.name.to_string(),
        kind: region.kind,
        origin: FragmentOrigin::Current,
    });
}

/// Flag every current function/type name missing from the output text.
fn flag_dropped_elements(
    current: &StructuralModel,
    reconstructed_text: &str,
    diagnostics: &mut Vec<Diagnostic>,
) {
    for name in current.function_names() {
        if !contains_name(reconstructed_text, name) {
            diagnostics.push(Diagnostic::new(
                DiagnosticKind::DroppedElement,
                None,
                format!("function '{name}' missing from reconstruction"),
            ));
        }
    }
    for name in current.type_names() {
        if !contains_name(reconstructed_text, name) {
            diagnostics.push(Diagnostic::new(
                DiagnosticKind::DroppedElement,
                None,
                format!("type '{name}' missing from reconstruction"),
            ));
        }
    }
}

/// Whole-word occurrence check. Identifiers may contain multi-byte
/// characters, so the retry advances by the width of the first char to
/// stay on a char boundary.
fn contains_name(text: &str, name: &str) -> bool {
    if name.is_empty() {
        return true;
    }
    let bytes = text.as_bytes();
    let mut from = 0;
    while let Some(pos) = text[from..].find(name) {
        let start = from + pos;
        let end = start + name.len();
        let before_ok = start == 0 || !is_word_byte(bytes[start - 1]);
        let after_ok = end == bytes.len() || !is_word_byte(bytes[end]);
        if before_ok && after_ok {
            return true;
        }
        from = start + name.chars().next().map_or(1, char::len_utf8);
    }
    false
}

fn is_word_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;

    fn template(text: &str) -> Revision {
        Revision::new("tmpl".into(), 0, text.to_string())
    }

    #[test]
    fn test_no_template_falls_back_with_diagnostic() {
        let text = "def foo(:\n    pass\n";
        let current = parse(text);
        let p = plan(text, &current, None);
        assert_eq!(p.strategy, Strategy::NoHistoryFallback);
        assert_eq!(p.reconstructed_text, text);
        assert!(p
            .diagnostics
            .iter()
            .any(|d| d.kind == DiagnosticKind::HistoryUnavailable));
        // Current parse degradation diagnostics surface as-is.
        assert!(p
            .diagnostics
            .iter()
            .any(|d| d.kind == DiagnosticKind::ParseDegradation));
    }

    #[test]
    fn test_identical_skeleton_substitutes_template() {
        // Current has foo and bar recovered at token fidelity; template has
        // the same skeleton, so similarity is 1.0.
        let broken = "\
def foo(a):
    x = [1,
    return x

def bar(b):
    return b
";
        let tmpl_text = "\
def foo(a):
    return [1]

def bar(b):
    return b
";
        let current = parse(broken);
        let tmpl = template(tmpl_text);
        let p = plan(broken, &current, Some(&tmpl));
        assert_eq!(p.strategy, Strategy::TemplateSubstitution);
        assert_eq!(p.reconstructed_text, tmpl_text);
        assert!(p
            .diagnostics
            .iter()
            .all(|d| d.kind != DiagnosticKind::DroppedElement));
    }

    #[test]
    fn test_substitution_flags_dropped_current_elements() {
        // Current carries `extra`, which the template lacks. Eight common
        // functions plus two common imports against an eleven-element union
        // keeps similarity just over the substitution threshold.
        let broken = "\
import os
import sys

def foo(a):
    x = [1,
    return x

def bar(b):
    return b

def baz(c):
    return c

def qux(d):
    return d

def quux(e):
    return e

def corge(f):
    return f

def grault(g):
    return g

def garply(h):
    return h

def extra(z):
    return z
";
        let tmpl_text = "\
import os
import sys

def foo(a):
    return [1]

def bar(b):
    return b

def baz(c):
    return c

def qux(d):
    return d

def quux(e):
    return e

def corge(f):
    return f

def grault(g):
    return g

def garply(h):
    return h
";
        let current = parse(broken);
        let tmpl = template(tmpl_text);
        // 10 common / 11 union ≈ 0.909.
        let p = plan(broken, &current, Some(&tmpl));
        assert_eq!(p.strategy, Strategy::TemplateSubstitution);
        let dropped: Vec<&Diagnostic> = p
            .diagnostics
            .iter()
            .filter(|d| d.kind == DiagnosticKind::DroppedElement)
            .collect();
        assert_eq!(dropped.len(), 1);
        assert!(dropped[0].message.contains("extra"));
    }

    #[test]
    fn test_selective_patch_prefers_template_bodies() {
        let broken = "\
def foo(a):
    x = [1,
    return x

def only_here(y):
    return y
";
        let tmpl_text = "\
def foo(a):
    return [1]

def only_in_template(q):
    return q
";
        let current = parse(broken);
        let tmpl = template(tmpl_text);
        // Union {foo, only_here, only_in_template}: similarity 1/3.
        let p = plan(broken, &current, Some(&tmpl));
        assert_eq!(p.strategy, Strategy::SelectivePatch);
        // foo's body comes from the template.
        assert!(p.reconstructed_text.contains("return [1]"));
        assert!(!p.reconstructed_text.contains("x = [1,"));
        // Current-only element retained verbatim.
        assert!(p.reconstructed_text.contains("def only_here(y):"));
        // Template-only element not reintroduced, but recorded.
        assert!(!p.reconstructed_text.contains("only_in_template"));
        assert!(p
            .diagnostics
            .iter()
            .any(|d| d.kind == DiagnosticKind::OmittedTemplateElement
                && d.message.contains("only_in_template")));
        // Fragment ledger names both origins.
        assert!(p
            .fragments
            .iter()
            .any(|f| f.name == "foo" && f.origin == FragmentOrigin::Template));
        assert!(p
            .fragments
            .iter()
            .any(|f| f.name == "only_here" && f.origin == FragmentOrigin::Current));
    }

    #[test]
    fn test_pattern_fidelity_regions_are_ambiguous() {
        // Unterminated triple-quote forces the pattern stage, whose spans
        // are unreliable: shared elements stay from current with a flag.
        let broken = "s = \"\"\"oops\n\ndef foo(a):\n    return 1\n";
        let tmpl_text = "def foo(a):\n    return 2\n\ndef bar(b):\n    return b\n";
        let current = parse(broken);
        assert_eq!(current.fidelity, Fidelity::PatternRecovered);
        let tmpl = template(tmpl_text);
        let p = plan(broken, &current, Some(&tmpl));
        assert_eq!(p.strategy, Strategy::SelectivePatch);
        assert!(p.reconstructed_text.contains("return 1"));
        assert!(p
            .diagnostics
            .iter()
            .any(|d| d.kind == DiagnosticKind::AmbiguousMerge));
    }

    #[test]
    fn test_no_silent_deletion_property() {
        let broken = "\
def alpha(a):
    x = (1,
    return x

class Beta:
    def m(self):
        pass
";
        let tmpl_text = "def alpha(a):\n    return (1,)\n";
        let current = parse(broken);
        let tmpl = template(tmpl_text);
        let p = plan(broken, &current, Some(&tmpl));
        // Every current top-level name either survives in the text or is
        // flagged as dropped.
        for name in ["alpha", "Beta"] {
            let survives = contains_name(&p.reconstructed_text, name);
            let flagged = p
                .diagnostics
                .iter()
                .any(|d| d.kind == DiagnosticKind::DroppedElement && d.message.contains(name));
            assert!(survives || flagged, "{name} silently deleted");
        }
    }

    #[test]
    fn test_contains_name_is_word_bounded() {
        assert!(contains_name("def foo():", "foo"));
        assert!(!contains_name("def foobar():", "foo"));
        assert!(contains_name("x = foo + 1", "foo"));
    }

    #[test]
    fn test_contains_name_handles_multibyte_identifiers() {
        // The non-bounded hit inside `añ` must be stepped over without
        // splitting the two-byte character.
        assert!(contains_name("añ = 2\ndef ñ():", "ñ"));
        assert!(!contains_name("añ = 2", "ñ"));
    }

    #[test]
    fn test_multibyte_identifiers_survive_dropped_element_check() {
        let broken = "añ = 2\n\ndef g():\n    x = [1,\n\ndef ñ():\n    pass\n";
        let tmpl_text = "def g():\n    return 1\n";
        let current = parse(broken);
        let tmpl = template(tmpl_text);
        let p = plan(broken, &current, Some(&tmpl));
        assert_eq!(p.strategy, Strategy::SelectivePatch);
        assert!(contains_name(&p.reconstructed_text, "ñ"));
        assert!(p
            .diagnostics
            .iter()
            .all(|d| d.kind != DiagnosticKind::DroppedElement));
    }

    #[test]
    fn test_nested_class_does_not_block_selective_patch() {
        let broken = "\
def outer(a):
    class Inner:
        pass
    x = [1,
    return x

def only_here(y):
    return y
";
        let tmpl_text = "\
def outer(a):
    return [1]
";
        let current = parse(broken);
        let tmpl = template(tmpl_text);
        let p = plan(broken, &current, Some(&tmpl));
        // `Inner` spans lines inside `outer` and must not become a region
        // of its own, which would overlap and abort the merge.
        assert_eq!(p.strategy, Strategy::SelectivePatch);
        assert!(p
            .diagnostics
            .iter()
            .all(|d| d.kind != DiagnosticKind::MergeFailure));
        // Inner vanishes with outer's old body: flagged, not silent.
        assert!(p
            .diagnostics
            .iter()
            .any(|d| d.kind == DiagnosticKind::DroppedElement && d.message.contains("Inner")));
    }
}
