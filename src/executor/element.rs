use std::time::Duration;

use crate::driver::query::{PointerEvent, PointerEventKind};
use crate::driver::traits::AutomationDriver;
use crate::errors::LocatorResult;
use crate::executor::coordinator::viewport_center;
use crate::geometry::BBox;

const PRESS_DELAY: Duration = Duration::from_millis(70);
const RELEASE_DELAY: Duration = Duration::from_millis(150);

/// An element produced by a lookup.
///
/// `Live` wraps a backend handle and delegates every action to it.
/// `Synthetic` has no handle; it acts through pointer and keyboard events
/// at its rect. Rects are document-relative driver coordinates.
#[derive(Debug, Clone, PartialEq)]
pub enum ResolvedElement<H> {
    Live { handle: H, rect: BBox, tag: String },
    Synthetic { rect: BBox, tag: String },
}

impl<H> ResolvedElement<H>
where
    H: Clone + Send + Sync + std::fmt::Debug,
{
    pub fn synthetic(rect: BBox) -> Self {
        ResolvedElement::Synthetic {
            rect,
            tag: "div".to_string(),
        }
    }

    pub fn rect(&self) -> BBox {
        match self {
            ResolvedElement::Live { rect, .. } | ResolvedElement::Synthetic { rect, .. } => *rect,
        }
    }

    pub fn tag_name(&self) -> &str {
        match self {
            ResolvedElement::Live { tag, .. } | ResolvedElement::Synthetic { tag, .. } => tag,
        }
    }

    pub fn is_live(&self) -> bool {
        matches!(self, ResolvedElement::Live { .. })
    }

    pub fn handle(&self) -> Option<&H> {
        match self {
            ResolvedElement::Live { handle, .. } => Some(handle),
            ResolvedElement::Synthetic { .. } => None,
        }
    }

    pub fn center(&self) -> (f64, f64) {
        self.rect().center()
    }

    pub async fn click<D>(&self, driver: &D) -> LocatorResult<()>
    where
        D: AutomationDriver<Handle = H>,
    {
        match self {
            ResolvedElement::Live { handle, .. } => driver.click_element(handle).await,
            ResolvedElement::Synthetic { rect, .. } => {
                let offset = driver.scroll_offset().await?;
                let (x, y) = viewport_center(rect, offset);
                tracing::debug!(x, y, "synthetic click");
                driver.pointer(PointerEvent::new(PointerEventKind::Move, x, y)).await?;
                tokio::time::sleep(PRESS_DELAY).await;
                driver.pointer(PointerEvent::new(PointerEventKind::Down, x, y)).await?;
                tokio::time::sleep(RELEASE_DELAY).await;
                driver.pointer(PointerEvent::new(PointerEventKind::Up, x, y)).await
            }
        }
    }

    /// Type `text`. Synthetic elements cannot take keys directly, so they are
    /// focused by a click and the text goes to whatever holds focus.
    pub async fn send_keys<D>(&self, driver: &D, text: &str, click_first: bool) -> LocatorResult<()>
    where
        D: AutomationDriver<Handle = H>,
    {
        if click_first {
            self.click(driver).await?;
        }
        match self {
            ResolvedElement::Live { handle, .. } => driver.send_keys_to_element(handle, text).await,
            ResolvedElement::Synthetic { .. } => driver.type_text(text).await,
        }
    }

    pub async fn submit<D>(&self, driver: &D) -> LocatorResult<()>
    where
        D: AutomationDriver<Handle = H>,
    {
        match self {
            ResolvedElement::Live { handle, .. } => driver.send_keys_to_element(handle, "\n").await,
            ResolvedElement::Synthetic { .. } => driver.type_text("\n").await,
        }
    }

    /// Press at the centre, move by `(dx, dy)`, release.
    pub async fn drag<D>(&self, driver: &D, dx: f64, dy: f64) -> LocatorResult<()>
    where
        D: AutomationDriver<Handle = H>,
    {
        let rect = match self {
            // a live element may have moved since it was resolved
            ResolvedElement::Live { handle, rect, .. } => {
                driver.element_rect(handle).await.unwrap_or(*rect)
            }
            ResolvedElement::Synthetic { rect, .. } => *rect,
        };
        let offset = driver.scroll_offset().await?;
        let (x, y) = viewport_center(&rect, offset);
        driver.pointer(PointerEvent::new(PointerEventKind::Move, x, y)).await?;
        driver.pointer(PointerEvent::new(PointerEventKind::Down, x, y)).await?;
        tokio::time::sleep(PRESS_DELAY).await;
        driver.pointer(PointerEvent::new(PointerEventKind::Move, x + dx, y + dy)).await?;
        driver.pointer(PointerEvent::new(PointerEventKind::Up, x + dx, y + dy)).await
    }

    pub async fn highlight<D>(&self, driver: &D) -> LocatorResult<()>
    where
        D: AutomationDriver<Handle = H>,
    {
        if let ResolvedElement::Live { handle, .. } = self {
            driver.scroll_into_view(handle, true).await?;
        }
        driver.highlight_rect(&self.rect()).await
    }
}
