//! Predicted box → live element.
//!
//! The driver is queried one element type at a time in priority order
//! (anchors, inputs, buttons, images, then everything). Each element is
//! scored by IOU against the predicted box; only elements that overlap
//! enough *and* contain the box centre survive, so a page-sized container
//! whose rect happens to cover the target cannot win. The first type that
//! yields a survivor decides.

use crate::config::ResolverConfig;
use crate::driver::query::ElementQuery;
use crate::driver::traits::AutomationDriver;
use crate::errors::{LocatorError, LocatorResult};
use crate::executor::coordinator::{predicted_to_driver, viewport_center};
use crate::executor::element::ResolvedElement;
use crate::geometry::{center_contained, iou, BBox, CoordinateScale};

#[derive(Debug, Clone, PartialEq)]
pub struct Candidate<H> {
    /// IOU with the predicted box, in [0,1].
    pub score: f64,
    pub handle: H,
    /// Driver space, document-relative.
    pub rect: BBox,
    pub tag: String,
    /// Position in the driver's enumeration.
    pub order: usize,
}

impl<H> Candidate<H>
where
    H: Clone + Send + Sync + std::fmt::Debug,
{
    pub fn into_element(self) -> ResolvedElement<H> {
        ResolvedElement::Live {
            handle: self.handle,
            rect: self.rect,
            tag: self.tag,
        }
    }
}

pub struct ElementResolver {
    cfg: ResolverConfig,
}

impl ElementResolver {
    pub fn new(cfg: ResolverConfig) -> Self {
        Self { cfg }
    }

    /// Staged enumeration. `scroll_offset` is the driver-space offset at which
    /// the capture behind `predicted` was taken.
    pub async fn resolve<D: AutomationDriver>(
        &self,
        driver: &D,
        predicted: &BBox,
        scale: CoordinateScale,
        scroll_offset: f64,
    ) -> LocatorResult<Candidate<D::Handle>> {
        let target = predicted_to_driver(predicted, scale, scroll_offset);
        if target.is_degenerate() {
            return Err(LocatorError::NoElementFound(format!("empty predicted box {predicted:?}")));
        }

        for tag in &self.cfg.tag_priority {
            let query = ElementQuery::from_tag(tag);
            let candidates = self.score_query(driver, &query, &target).await;
            tracing::debug!(tag = %tag, survivors = candidates.len(), "resolver pass");
            if let Some(best) = select(candidates, self.cfg.near_best_ratio) {
                tracing::debug!(tag = %best.tag, score = best.score, order = best.order, "resolver pick");
                return Ok(best);
            }
        }
        Err(LocatorError::NoElementFound(format!(
            "no element under predicted box ({:.0}, {:.0}, {:.0}x{:.0})",
            target.x, target.y, target.width, target.height
        )))
    }

    /// Ask the driver for the topmost element under the box centre. Falls back
    /// to [`resolve`](Self::resolve) when the backend cannot answer or finds
    /// nothing there.
    pub async fn resolve_at_point<D: AutomationDriver>(
        &self,
        driver: &D,
        predicted: &BBox,
        scale: CoordinateScale,
        scroll_offset: f64,
    ) -> LocatorResult<Candidate<D::Handle>> {
        let target = predicted_to_driver(predicted, scale, scroll_offset);
        if target.is_degenerate() {
            return Err(LocatorError::NoElementFound(format!("empty predicted box {predicted:?}")));
        }
        let current = driver.scroll_offset().await?;
        let (x, y) = viewport_center(&target, current);
        match driver.element_at_point(x, y).await {
            Ok(Some(handle)) => {
                let rect = driver.element_rect(&handle).await.unwrap_or(target);
                let tag = driver.element_tag(&handle).await.unwrap_or_default();
                return Ok(Candidate {
                    score: iou(&target, &rect),
                    handle,
                    rect,
                    tag,
                    order: 0,
                });
            }
            Ok(None) => tracing::debug!(x, y, "nothing at point, enumerating"),
            Err(e) => tracing::debug!(error = %e, "point lookup unavailable, enumerating"),
        }
        self.resolve(driver, predicted, scale, scroll_offset).await
    }

    /// Surviving candidates of one query. Enumeration is retried once if the
    /// page changed under it; elements that go stale mid-scan score 0.
    async fn score_query<D: AutomationDriver>(
        &self,
        driver: &D,
        query: &ElementQuery,
        target: &BBox,
    ) -> Vec<Candidate<D::Handle>> {
        let handles = match driver.find_elements(query).await {
            Err(LocatorError::StaleHandle(_)) => driver.find_elements(query).await,
            other => other,
        };
        let handles = match handles {
            Ok(h) => h,
            Err(e) => {
                tracing::debug!(query = query.kind(), value = query.value(), error = %e, "enumeration failed");
                return Vec::new();
            }
        };

        let mut out = Vec::new();
        for (order, handle) in handles.into_iter().enumerate() {
            let rect = match driver.element_rect(&handle).await {
                Ok(r) => r,
                Err(e) => {
                    tracing::debug!(order, error = %e, "element vanished, scoring 0");
                    continue;
                }
            };
            let score = iou(target, &rect);
            if score <= self.cfg.min_iou || !center_contained(target, &rect) {
                continue;
            }
            let tag = match driver.element_tag(&handle).await {
                Ok(t) => t,
                Err(_) => query.value().to_string(),
            };
            out.push(Candidate { score, handle, rect, tag, order });
        }
        out
    }
}

/// Among candidates scoring at least `near_best_ratio` × the best score, the
/// one enumerated first. Deterministic for a given enumeration.
pub fn select<H>(candidates: Vec<Candidate<H>>, near_best_ratio: f64) -> Option<Candidate<H>> {
    let top = candidates.iter().map(|c| c.score).fold(f64::NEG_INFINITY, f64::max);
    if !top.is_finite() {
        return None;
    }
    let floor = top * near_best_ratio;
    candidates
        .into_iter()
        .filter(|c| c.score >= floor)
        .min_by_key(|c| c.order)
}
