//! Structural model comparison and similarity scoring.
//!
//! Similarity is name-based on purpose: the current model may be
//! low-fidelity, so body equality would punish recoverable artifacts for
//! superficial corruption.

use indexmap::IndexSet;
use serde::{Deserialize, Serialize};

use crate::models::StructuralModel;

/// Structured diff between two models. "Modified" means same name but a
/// different parameter list (functions) or member set (types).
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct StructuralDiff {
    pub added_functions: Vec<String>,
    pub removed_functions: Vec<String>,
    pub modified_functions: Vec<String>,
    pub added_types: Vec<String>,
    pub removed_types: Vec<String>,
    pub modified_types: Vec<String>,
    pub added_imports: Vec<String>,
    pub removed_imports: Vec<String>,
}

/// Similarity score plus the diff that produced it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Comparison {
    /// `common / union` over function, type, and import names, in [0, 1].
    pub similarity: f64,
    pub diff: StructuralDiff,
}

fn set_counts(a: &IndexSet<&str>, b: &IndexSet<&str>) -> (usize, usize) {
    let common = a.intersection(b).count();
    let union = a.union(b).count();
    (common, union)
}

/// Compare `a` (typically the current, possibly low-fidelity model) against
/// `b` (typically a historical template).
///
/// Two structurally empty models are vacuously identical: similarity 1.0.
pub fn compare(a: &StructuralModel, b: &StructuralModel) -> Comparison {
    let fn_a = a.function_names();
    let fn_b = b.function_names();
    let ty_a = a.type_names();
    let ty_b = b.type_names();
    let im_a = a.import_keys();
    let im_b = b.import_keys();

    let (fn_common, fn_union) = set_counts(&fn_a, &fn_b);
    let (ty_common, ty_union) = set_counts(&ty_a, &ty_b);
    let im_common = im_a.intersection(&im_b).count();
    let im_union = im_a.union(&im_b).count();

    let union_total = fn_union + ty_union + im_union;
    let similarity = if union_total == 0 {
        1.0
    } else {
        (fn_common + ty_common + im_common) as f64 / union_total as f64
    };

    let mut diff = StructuralDiff {
        added_functions: fn_a.difference(&fn_b).map(|s| s.to_string()).collect(),
        removed_functions: fn_b.difference(&fn_a).map(|s| s.to_string()).collect(),
        modified_functions: vec![],
        added_types: ty_a.difference(&ty_b).map(|s| s.to_string()).collect(),
        removed_types: ty_b.difference(&ty_a).map(|s| s.to_string()).collect(),
        modified_types: vec![],
        added_imports: im_a
            .difference(&im_b)
            .map(|(m, n)| format!("{m}::{n}"))
            .collect(),
        removed_imports: im_b
            .difference(&im_a)
            .map(|(m, n)| format!("{m}::{n}"))
            .collect(),
    };

    for name in fn_a.intersection(&fn_b) {
        let pa = a.functions.iter().find(|f| f.name == *name);
        let pb = b.functions.iter().find(|f| f.name == *name);
        if let (Some(fa), Some(fb)) = (pa, pb) {
            if fa.parameters != fb.parameters {
                diff.modified_functions.push(name.to_string());
            }
        }
    }
    for name in ty_a.intersection(&ty_b) {
        let ta = a.types.iter().find(|t| t.name == *name);
        let tb = b.types.iter().find(|t| t.name == *name);
        if let (Some(ta), Some(tb)) = (ta, tb) {
            let ma: IndexSet<&str> = ta.methods.iter().map(String::as_str).collect();
            let mb: IndexSet<&str> = tb.methods.iter().map(String::as_str).collect();
            if ma != mb {
                diff.modified_types.push(name.to_string());
            }
        }
    }

    Comparison { similarity, diff }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;

    #[test]
    fn test_vacuous_similarity_is_one() {
        let empty = parse("");
        let cmp = compare(&empty, &empty);
        assert_eq!(cmp.similarity, 1.0);
        assert_eq!(cmp.diff, StructuralDiff::default());
    }

    #[test]
    fn test_identical_skeletons_score_one() {
        let a = parse("import os\n\ndef foo(x):\n    return x\n");
        let b = parse("import os\n\ndef foo(x):\n    return x + 1\n");
        let cmp = compare(&a, &b);
        assert_eq!(cmp.similarity, 1.0);
        assert!(cmp.diff.modified_functions.is_empty());
    }

    #[test]
    fn test_partial_overlap() {
        let a = parse("def foo():\n    pass\n");
        let b = parse("def foo():\n    pass\n\ndef bar():\n    pass\n");
        let cmp = compare(&a, &b);
        // One common function out of a union of two.
        assert!((cmp.similarity - 0.5).abs() < f64::EPSILON);
        assert_eq!(cmp.diff.removed_functions, vec!["bar"]);
        assert!(cmp.diff.added_functions.is_empty());
    }

    #[test]
    fn test_modified_function_detected() {
        let a = parse("def foo(x):\n    pass\n");
        let b = parse("def foo(x, y):\n    pass\n");
        let cmp = compare(&a, &b);
        assert_eq!(cmp.similarity, 1.0);
        assert_eq!(cmp.diff.modified_functions, vec!["foo"]);
    }

    #[test]
    fn test_modified_type_detected() {
        let a = parse("class C:\n    def m(self):\n        pass\n");
        let b = parse("class C:\n    def n(self):\n        pass\n");
        let cmp = compare(&a, &b);
        assert_eq!(cmp.diff.modified_types, vec!["C"]);
    }

    #[test]
    fn test_comparison_is_name_based_across_fidelity() {
        // Broken current text recovered at token fidelity still compares
        // cleanly against an exact historical model.
        let current = parse("def foo(a):\n    x = [1,\n    return x\n");
        let template = parse("def foo(a):\n    return [1]\n");
        let cmp = compare(&current, &template);
        assert_eq!(cmp.similarity, 1.0);
    }
}
