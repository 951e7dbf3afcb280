//! Decide whether a directory can serve as the checkout or a fresh clone is needed.

/// Why a directory cannot be reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloneReason {
    NoRepository,
    DirtyWorkingTree,
    OriginMismatch,
}

/// Result of evaluating one directory against the reuse policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloneDecision {
    Reuse,
    CloneNeeded(CloneReason),
}

/// Observed state of a candidate directory.
///
/// `is_dirty` and `origin_url` are meaningless when `metadata_present` is false.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryState {
    pub metadata_present: bool,
    pub is_dirty: bool,
    pub origin_url: Option<String>,
}

/// Evaluate the reuse policy, short-circuiting in order:
///
/// 1. no repository metadata → clone
/// 2. uncommitted or untracked changes → clone
/// 3. `origin` missing or not exactly `expected_url` → clone
/// 4. otherwise reuse
pub fn decide_clone(state: &DirectoryState, expected_url: &str) -> CloneDecision {
    if !state.metadata_present {
        return CloneDecision::CloneNeeded(CloneReason::NoRepository);
    }
    if state.is_dirty {
        return CloneDecision::CloneNeeded(CloneReason::DirtyWorkingTree);
    }
    if state.origin_url.as_deref() != Some(expected_url) {
        return CloneDecision::CloneNeeded(CloneReason::OriginMismatch);
    }
    CloneDecision::Reuse
}

#[cfg(test)]
mod tests {
    use super::*;

    const FORK: &str = "git@github.com:alice/widgets.git";

    fn state(metadata_present: bool, is_dirty: bool, origin: Option<&str>) -> DirectoryState {
        DirectoryState {
            metadata_present,
            is_dirty,
            origin_url: origin.map(str::to_string),
        }
    }

    #[test]
    fn reuse_only_when_all_conditions_hold() {
        assert_eq!(decide_clone(&state(true, false, Some(FORK)), FORK), CloneDecision::Reuse);
    }

    #[test]
    fn every_other_combination_needs_clone() {
        for metadata in [false, true] {
            for dirty in [false, true] {
                for origin in [None, Some(FORK), Some("git@github.com:bob/widgets.git")] {
                    let decision = decide_clone(&state(metadata, dirty, origin), FORK);
                    let reusable = metadata && !dirty && origin == Some(FORK);
                    assert_eq!(decision == CloneDecision::Reuse, reusable, "{metadata} {dirty} {origin:?}");
                }
            }
        }
    }

    #[test]
    fn reasons_follow_evaluation_order() {
        assert_eq!(
            decide_clone(&state(false, true, None), FORK),
            CloneDecision::CloneNeeded(CloneReason::NoRepository)
        );
        assert_eq!(
            decide_clone(&state(true, true, Some("other")), FORK),
            CloneDecision::CloneNeeded(CloneReason::DirtyWorkingTree)
        );
        assert_eq!(
            decide_clone(&state(true, false, None), FORK),
            CloneDecision::CloneNeeded(CloneReason::OriginMismatch)
        );
    }

    #[test]
    fn origin_match_is_exact() {
        let https = "https://github.com/alice/widgets.git";
        let no_suffix = "https://github.com/alice/widgets";
        assert_eq!(
            decide_clone(&state(true, false, Some(no_suffix)), https),
            CloneDecision::CloneNeeded(CloneReason::OriginMismatch)
        );
    }
}
