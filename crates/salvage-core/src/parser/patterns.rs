//! Line-pattern structural scan, the last resort of the parser chain.
//!
//! Matches keyword-at-line-start cues with compiled regexes and nothing
//! else. Infallible by construction; element end lines are unknown here
//! (recorded equal to the start line), which the planner treats as an
//! unreliable range.

use std::sync::LazyLock;

use regex::Regex;

use crate::models::{
    BindingEntry, Fidelity, FunctionEntry, ImportEntry, StructuralModel, TypeEntry,
};

// ---------------------------------------------------------------------------
// Compiled regex patterns (LazyLock for one-time init)
// ---------------------------------------------------------------------------

static DEF_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\s*)(?:async\s+)?def\s+([A-Za-z_][A-Za-z0-9_]*)\s*\(([^)]*)").unwrap()
});

static CLASS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\s*)class\s+([A-Za-z_][A-Za-z0-9_]*)").unwrap());

static IMPORT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^import\s+([A-Za-z0-9_.]+)(?:\s+as\s+([A-Za-z_][A-Za-z0-9_]*))?").unwrap()
});

static FROM_IMPORT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^from\s+([A-Za-z0-9_.]+)\s+import\s+(.+)").unwrap()
});

static BINDING_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([A-Za-z_][A-Za-z0-9_]*)\s*=[^=]").unwrap());

/// Scan `text` for structural cues line by line. Never fails.
pub fn scan(text: &str) -> StructuralModel {
    let mut model = StructuralModel {
        imports: vec![],
        functions: vec![],
        types: vec![],
        bindings: vec![],
        diagnostics: vec![],
        fidelity: Fidelity::PatternRecovered,
        line_count: text.lines().count() as u32,
    };

    // Innermost class seen so far and its indent, for method attribution.
    let mut class_context: Option<(usize, usize)> = None;

    for (idx, line) in text.lines().enumerate() {
        let line_no = idx as u32 + 1;

        if let Some(caps) = DEF_RE.captures(line) {
            let indent = caps[1].len();
            let name = caps[2].to_string();
            let parameters: Vec<String> = caps[3]
                .split(',')
                .map(|p| {
                    p.trim()
                        .trim_start_matches('*')
                        .split([':', '='])
                        .next()
                        .unwrap_or("")
                        .trim()
                        .to_string()
                })
                .filter(|p| !p.is_empty())
                .collect();
            if let Some((class_idx, class_indent)) = class_context {
                if indent > class_indent {
                    model.types[class_idx].methods.push(name.clone());
                }
            }
            model.functions.push(FunctionEntry {
                name,
                parameters,
                start_line: line_no,
                end_line: line_no,
                depth: if indent > 0 { 1 } else { 0 },
            });
            continue;
        }

        if let Some(caps) = CLASS_RE.captures(line) {
            let indent = caps[1].len();
            model.types.push(TypeEntry {
                name: caps[2].to_string(),
                methods: vec![],
                start_line: line_no,
                end_line: line_no,
                depth: if indent > 0 { 1 } else { 0 },
            });
            class_context = Some((model.types.len() - 1, indent));
            continue;
        }

        if let Some(caps) = IMPORT_RE.captures(line) {
            let module = caps[1].to_string();
            let bound = caps
                .get(2)
                .map(|m| m.as_str().to_string())
                .unwrap_or_else(|| module.split('.').next().unwrap_or(&module).to_string());
            model.imports.push(ImportEntry {
                module,
                bound_name: bound,
                line: line_no,
            });
            continue;
        }

        if let Some(caps) = FROM_IMPORT_RE.captures(line) {
            let module = caps[1].to_string();
            let names = caps[2].trim_start_matches('(').trim_end_matches(')');
            for part in names.split(',') {
                let part = part.trim();
                if part.is_empty() {
                    continue;
                }
                let bound = match part.split_once(" as ") {
                    Some((_, alias)) => alias.trim(),
                    None => part,
                };
                if !bound.is_empty() {
                    model.imports.push(ImportEntry {
                        module: module.clone(),
                        bound_name: bound.to_string(),
                        line: line_no,
                    });
                }
            }
            continue;
        }

        if let Some(caps) = BINDING_RE.captures(line) {
            model.bindings.push(BindingEntry {
                name: caps[1].to_string(),
                line: line_no,
            });
        }

        // Any dedent back to column zero ends the current class scope.
        if !line.trim().is_empty() && !line.starts_with([' ', '\t']) {
            class_context = None;
        }
    }
    model
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extracts_cues_from_garbage() {
        // Unterminated triple-quote would make the token scanner raise;
        // the pattern stage still sees the line-start cues.
        let src = "\
import os
from typing import Dict, Any

BROKEN = \"\"\"oops
def foo(a, b):
class Thing:
    def method(self):
";
        let model = scan(src);
        assert_eq!(model.fidelity, Fidelity::PatternRecovered);
        assert_eq!(model.imports.len(), 3);
        assert_eq!(model.imports[1].bound_name, "Dict");
        let names: Vec<&str> = model.functions.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["foo", "method"]);
        assert_eq!(model.types[0].name, "Thing");
        assert_eq!(model.types[0].methods, vec!["method"]);
        assert_eq!(model.bindings[0].name, "BROKEN");
    }

    #[test]
    fn test_method_attribution_resets_on_dedent() {
        let src = "\
class A:
    def m(self):
        pass

def free():
    pass
";
        let model = scan(src);
        assert_eq!(model.types[0].methods, vec!["m"]);
        assert_eq!(model.functions.len(), 2);
        assert_eq!(model.functions[1].name, "free");
        assert_eq!(model.functions[1].depth, 0);
    }

    #[test]
    fn test_never_fails_on_binary_noise() {
        let model = scan("\u{0}\u{1}\u{2} not python at all ((((");
        assert!(model.is_structurally_empty());
    }
}
