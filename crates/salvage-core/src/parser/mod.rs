//! Degrading-fidelity structural parser chain.
//!
//! Three strategies, each strictly more permissive and less precise than
//! the one before: an exact tree-sitter parse, a token-level block scan,
//! and a line-pattern scan. `parse` never fails; precision loss is always
//! recorded in the model's diagnostics, never hidden.

pub mod patterns;
pub mod strict;
pub mod tokens;

use tracing::debug;

use crate::models::{Diagnostic, DiagnosticKind, StructuralModel};

/// Extract a structural model from raw source text.
///
/// Always returns a model: `Fidelity::Exact` when the text is valid as-is,
/// otherwise the best approximation a lower stage could produce, with a
/// `ParseDegradation` diagnostic per stage that failed.
pub fn parse(text: &str) -> StructuralModel {
    let strict_failure = match strict::parse_exact(text) {
        Ok(model) => return model,
        Err(failure) => failure,
    };
    debug!(
        line = strict_failure.line,
        "strict parse failed, degrading to token scan"
    );
    let strict_diag = Diagnostic::new(
        DiagnosticKind::ParseDegradation,
        Some(strict_failure.line),
        format!("strict parse failed: {}", strict_failure.message),
    );

    let scan_failure = match tokens::scan(text) {
        Ok(mut model) => {
            model.diagnostics.insert(0, strict_diag);
            return model;
        }
        Err(failure) => failure,
    };
    debug!(
        line = scan_failure.line,
        "token scan raised, degrading to pattern scan"
    );

    let mut model = patterns::scan(text);
    let mut diagnostics = vec![
        strict_diag,
        Diagnostic::new(
            DiagnosticKind::ParseDegradation,
            Some(scan_failure.line),
            format!("token scan failed: {}", scan_failure.message),
        ),
    ];
    diagnostics.append(&mut model.diagnostics);
    model.diagnostics = diagnostics;
    model
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Fidelity;

    const VALID: &str = "\
import json

def encode(value):
    return json.dumps(value)

class Codec:
    def decode(self, raw):
        return json.loads(raw)
";

    #[test]
    fn test_valid_text_is_exact_with_no_diagnostics() {
        let model = parse(VALID);
        assert_eq!(model.fidelity, Fidelity::Exact);
        assert!(model.diagnostics.is_empty());
    }

    #[test]
    fn test_exact_parse_is_idempotent() {
        // Re-parsing identical text must produce an identical model.
        assert_eq!(parse(VALID), parse(VALID));
    }

    #[test]
    fn test_broken_text_degrades_to_token_stage() {
        let src = "def foo(a, b):\n    x = (1,\n    return x\n";
        let model = parse(src);
        assert_eq!(model.fidelity, Fidelity::TokenRecovered);
        assert_eq!(model.diagnostics[0].kind, DiagnosticKind::ParseDegradation);
        assert!(model.diagnostics[0].message.contains("strict parse failed"));
        assert_eq!(model.functions[0].name, "foo");
    }

    #[test]
    fn test_unterminated_literal_degrades_to_pattern_stage() {
        let src = "def foo():\n    s = \"\"\"abc\n\ndef bar():\n    pass\n";
        let model = parse(src);
        assert_eq!(model.fidelity, Fidelity::PatternRecovered);
        // One degradation diagnostic per failed stage, in chain order.
        assert!(model.diagnostics[0].message.contains("strict parse failed"));
        assert!(model.diagnostics[1].message.contains("token scan failed"));
        let names: Vec<&str> = model.functions.iter().map(|f| f.name.as_str()).collect();
        assert!(names.contains(&"foo"));
        assert!(names.contains(&"bar"));
    }

    #[test]
    fn test_chain_never_fails() {
        for text in ["", "((((", "def", "\u{0}\u{fffd}", "class :\n"] {
            let model = parse(text);
            assert!(model.line_count <= 1);
            let _ = model.element_count();
        }
    }

    #[test]
    fn test_lower_stage_keeps_higher_stage_diagnostics() {
        let src = "def foo():\n    s = \"\"\"abc\n";
        let model = parse(src);
        let degradations = model
            .diagnostics
            .iter()
            .filter(|d| d.kind == DiagnosticKind::ParseDegradation)
            .count();
        assert!(degradations >= 2);
    }
}
