//! Generation ranking: which historical revision makes the best template.
//!
//! Revision parsing is embarrassingly parallel and runs in a bounded
//! worker pool; `max_depth` is small, so parse cost dominates and more
//! workers than `RANKER_WORKERS` would be waste.

use rayon::prelude::*;
use tracing::{debug, warn};

use crate::guards::RANKER_WORKERS;
use crate::models::{Fidelity, Revision, SizeTrend, StabilityProfile};

/// Rank sampled revisions into a stability profile.
///
/// Only revisions whose model reaches `Fidelity::Exact` are usable
/// templates; the most recent valid one wins. Ordinals are distinct by
/// construction, so recency alone decides.
pub fn rank(revisions: &[Revision]) -> StabilityProfile {
    if revisions.is_empty() {
        return StabilityProfile::empty();
    }

    // Force-compute every model up front, inside a bounded pool. The
    // OnceLock on each revision caches the result for later stages.
    match rayon::ThreadPoolBuilder::new()
        .num_threads(RANKER_WORKERS)
        .build()
    {
        Ok(pool) => pool.install(|| {
            revisions.par_iter().for_each(|rev| {
                rev.model();
            });
        }),
        Err(e) => {
            warn!("ranker pool unavailable, parsing sequentially: {e}");
            for rev in revisions {
                rev.model();
            }
        }
    }

    let valid: Vec<&Revision> = revisions
        .iter()
        .filter(|r| r.model().fidelity == Fidelity::Exact)
        .collect();
    for rev in revisions {
        if rev.model().fidelity != Fidelity::Exact {
            debug!(
                ordinal = rev.ordinal,
                reference = %rev.reference,
                "revision discarded: not syntactically valid"
            );
        }
    }

    StabilityProfile {
        size_trend: size_trend(revisions),
        stability_score: stability_score(&valid),
        best_template_ordinal: valid.first().map(|r| r.ordinal),
        valid_ordinals: valid.iter().map(|r| r.ordinal).collect(),
    }
}

/// Fraction of consecutive valid pairs whose function-name and type-name
/// sets are identical (order-independent). One or zero pairs cannot show
/// instability: fewer than two valid revisions scores 1.0 (or 0.0 when
/// none are valid at all).
fn stability_score(valid: &[&Revision]) -> f64 {
    if valid.is_empty() {
        return 0.0;
    }
    if valid.len() < 2 {
        return 1.0;
    }
    let mut stable_pairs = 0usize;
    let pairs = valid.len() - 1;
    for window in valid.windows(2) {
        let a = window[0].model();
        let b = window[1].model();
        if a.function_names() == b.function_names() && a.type_names() == b.type_names() {
            stable_pairs += 1;
        }
    }
    stable_pairs as f64 / pairs as f64
}

/// Monotonicity of line counts from the oldest sampled revision to the
/// newest.
fn size_trend(revisions: &[Revision]) -> SizeTrend {
    // Ordinal 0 is newest; walk oldest-first.
    let counts: Vec<u32> = revisions
        .iter()
        .rev()
        .map(|r| r.model().line_count)
        .collect();
    let non_decreasing = counts.windows(2).all(|w| w[0] <= w[1]);
    let non_increasing = counts.windows(2).all(|w| w[0] >= w[1]);
    let first = counts.first().copied().unwrap_or(0);
    let last = counts.last().copied().unwrap_or(0);
    if non_decreasing && last > first {
        SizeTrend::Growing
    } else if non_increasing && last < first {
        SizeTrend::Shrinking
    } else {
        SizeTrend::Stable
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rev(ordinal: usize, text: &str) -> Revision {
        Revision::new(format!("ref-{ordinal}"), ordinal, text.to_string())
    }

    #[test]
    fn test_empty_history_yields_empty_profile() {
        let profile = rank(&[]);
        assert_eq!(profile.best_template_ordinal, None);
        assert_eq!(profile.stability_score, 0.0);
    }

    #[test]
    fn test_invalid_revisions_are_discarded() {
        let revisions = vec![
            rev(0, "def broken(:\n    pass\n"),
            rev(1, "def ok():\n    pass\n"),
            rev(2, "def ok():\n    pass\n"),
        ];
        let profile = rank(&revisions);
        assert_eq!(profile.valid_ordinals, vec![1, 2]);
        assert_eq!(profile.best_template_ordinal, Some(1));
        assert_eq!(profile.stability_score, 1.0);
    }

    #[test]
    fn test_all_invalid_signals_fallback() {
        let revisions = vec![rev(0, "def a(:\n"), rev(1, "class (:\n")];
        let profile = rank(&revisions);
        assert_eq!(profile.best_template_ordinal, None);
        assert!(profile.valid_ordinals.is_empty());
    }

    #[test]
    fn test_stability_counts_skeleton_changes() {
        // Three valid revisions; the middle pair changes the skeleton.
        let revisions = vec![
            rev(0, "def a():\n    pass\n\ndef b():\n    pass\n"),
            rev(1, "def a():\n    pass\n\ndef b():\n    pass\n"),
            rev(2, "def a():\n    pass\n"),
        ];
        let profile = rank(&revisions);
        assert!((profile.stability_score - 0.5).abs() < f64::EPSILON);
        assert_eq!(profile.best_template_ordinal, Some(0));
    }

    #[test]
    fn test_body_changes_do_not_count_as_instability() {
        let revisions = vec![
            rev(0, "def a():\n    return 2\n"),
            rev(1, "def a():\n    return 1\n"),
        ];
        let profile = rank(&revisions);
        assert_eq!(profile.stability_score, 1.0);
    }

    #[test]
    fn test_size_trend_growing() {
        // Ordinal 0 (newest) is the largest; oldest-first counts grow.
        let revisions = vec![
            rev(0, "def a():\n    pass\n\ndef b():\n    pass\n\ndef c():\n    pass\n"),
            rev(1, "def a():\n    pass\n\ndef b():\n    pass\n"),
            rev(2, "def a():\n    pass\n"),
        ];
        assert_eq!(rank(&revisions).size_trend, SizeTrend::Growing);
    }

    #[test]
    fn test_size_trend_stable_on_mixed_counts() {
        let revisions = vec![
            rev(0, "def a():\n    pass\n"),
            rev(1, "def a():\n    pass\n\ndef b():\n    pass\n"),
            rev(2, "def a():\n    pass\n"),
        ];
        assert_eq!(rank(&revisions).size_trend, SizeTrend::Stable);
    }
}
