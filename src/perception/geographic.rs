//! Geographic disambiguation of visually identical template matches.
//!
//! Ten identical "Add to cart" buttons all match a template equally well;
//! what separates them is where the element was acted on before. Every
//! candidate and every historical location is normalised to screen fractions
//! and the candidate closest to any past location wins.

use crate::geometry::distance;
use crate::perception::types::{ActionInfo, ScreenDims, TemplateMatch};

/// Returns `None` when there are no candidates, and also when there is no
/// history yet: without a prior the choice would be arbitrary, and the caller
/// must fall through to the remote tiers instead.
pub fn pick_closest(
    candidates: &[TemplateMatch],
    history: &[ActionInfo],
    screen: ScreenDims,
) -> Option<TemplateMatch> {
    if candidates.is_empty() || history.is_empty() {
        return None;
    }
    let (w, h) = (screen.width as f64, screen.height as f64);
    let past: Vec<(f64, f64)> = history.iter().map(|a| a.normalized_box().center()).collect();

    let mut best: Option<(f64, &TemplateMatch)> = None;
    for candidate in candidates {
        let center = candidate.bbox.to_screen_fraction(w, h).center();
        let nearest = past
            .iter()
            .map(|p| distance(center, *p))
            .fold(f64::INFINITY, f64::min);
        // strict < keeps the earliest candidate on ties
        if best.map_or(true, |(d, _)| nearest < d) {
            best = Some((nearest, candidate));
        }
    }
    best.map(|(d, m)| {
        tracing::debug!(distance = d, score = m.score, x = m.bbox.x, y = m.bbox.y, "geographic pick");
        *m
    })
}
