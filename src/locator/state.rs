use serde::{Deserialize, Serialize};

use crate::executor::element::ResolvedElement;
use crate::geometry::BBox;

/// Stage of one lookup. Tiers are tried in declaration order; a tier that
/// misses hands over to the next, and the last one ends in `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LookupState {
    LocalCache,
    RemoteCache,
    RemoteDetect,
    ScrollSearch,
    Resolved,
    Failed,
}

impl LookupState {
    /// Where a miss in this state leads.
    pub fn next(self) -> LookupState {
        match self {
            LookupState::LocalCache => LookupState::RemoteCache,
            LookupState::RemoteCache => LookupState::RemoteDetect,
            LookupState::RemoteDetect => LookupState::ScrollSearch,
            LookupState::ScrollSearch => LookupState::Failed,
            LookupState::Resolved => LookupState::Resolved,
            LookupState::Failed => LookupState::Failed,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, LookupState::Resolved | LookupState::Failed)
    }

    /// The tier this state runs, if any.
    pub fn tier(self) -> Option<ResolutionTier> {
        match self {
            LookupState::LocalCache => Some(ResolutionTier::LocalCache),
            LookupState::RemoteCache => Some(ResolutionTier::RemoteCache),
            LookupState::RemoteDetect => Some(ResolutionTier::RemoteDetect),
            LookupState::ScrollSearch => Some(ResolutionTier::ScrollSearch),
            LookupState::Resolved | LookupState::Failed => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionTier {
    LocalCache,
    RemoteCache,
    RemoteDetect,
    ScrollSearch,
}

impl ResolutionTier {
    /// Tiers that rely on the remote classifier.
    pub fn is_remote(self) -> bool {
        !matches!(self, ResolutionTier::LocalCache)
    }
}

/// A predicted box and the context needed to place it on the page.
#[derive(Debug, Clone, PartialEq)]
pub struct Prediction {
    /// Classifier pixels, relative to the capture it came from.
    pub bbox: BBox,
    /// Driver-space scroll offset at which that capture was taken.
    pub scroll_offset: f64,
    /// Content hash (or service UUID) of that capture.
    pub key: String,
    pub score: Option<f64>,
}

/// Outcome of a successful lookup.
#[derive(Debug, Clone)]
pub struct Resolution<H> {
    pub element: ResolvedElement<H>,
    /// Screenshot key the prediction belongs to.
    pub key: String,
    /// Last message from the service, if any.
    pub message: Option<String>,
    pub tier: ResolutionTier,
    pub score: Option<f64>,
    pub predicted: BBox,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn misses_walk_the_tiers_in_order() {
        let mut state = LookupState::LocalCache;
        let mut seen = Vec::new();
        while !state.is_terminal() {
            seen.extend(state.tier());
            state = state.next();
        }
        assert_eq!(state, LookupState::Failed);
        assert_eq!(
            seen,
            [
                ResolutionTier::LocalCache,
                ResolutionTier::RemoteCache,
                ResolutionTier::RemoteDetect,
                ResolutionTier::ScrollSearch
            ]
        );
    }

    #[test]
    fn terminal_states_stay_put() {
        assert_eq!(LookupState::Resolved.next(), LookupState::Resolved);
        assert_eq!(LookupState::Failed.next(), LookupState::Failed);
        assert!(!ResolutionTier::LocalCache.is_remote());
    }
}
