//! Shared guardrails for history depth, worker counts, and thresholds.

/// Default number of prior revisions mined per recovery session.
pub const DEFAULT_HISTORY_DEPTH: usize = 5;

/// Hard cap on history depth regardless of caller request.
pub const MAX_HISTORY_DEPTH: usize = 50;

/// Worker pool size for per-revision parsing in the generation ranker.
pub const RANKER_WORKERS: usize = 4;

/// Similarity at or above which the planner substitutes the template verbatim.
pub const SIMILARITY_SUBSTITUTION_THRESHOLD: f64 = 0.9;

/// Default deadline for one external test-harness execution.
pub const DEFAULT_HARNESS_TIMEOUT_MS: u64 = 30_000;

/// Cap a requested history depth at `MAX_HISTORY_DEPTH`. Zero is a valid
/// request and samples nothing.
pub fn clamp_depth(value: usize) -> usize {
    value.min(MAX_HISTORY_DEPTH)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clamp_depth_bounds() {
        assert_eq!(clamp_depth(0), 0);
        assert_eq!(clamp_depth(5), 5);
        assert_eq!(clamp_depth(10_000), MAX_HISTORY_DEPTH);
    }
}
