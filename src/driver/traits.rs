use async_trait::async_trait;

use crate::driver::query::{ElementQuery, PointerEvent, Viewport};
use crate::errors::{LocatorError, LocatorResult};
use crate::geometry::BBox;

/// The subset of UI-automation capabilities the locator needs.
///
/// Backends (WebDriver, CDP, Appium bridges, ...) implement this once; the
/// resolver and orchestrator never see anything else. Element handles are
/// owned by the backend and may go stale at any time, in which case element
/// methods return [`LocatorError::StaleHandle`].
#[async_trait]
pub trait AutomationDriver: Send + Sync {
    type Handle: Clone + Send + Sync + std::fmt::Debug;

    /// Backend name reported at check-in (browser or platform name).
    fn automation_name(&self) -> String {
        String::new()
    }

    /// Full-viewport capture, base64-encoded PNG/JPEG.
    async fn screenshot_base64(&self) -> LocatorResult<String>;

    async fn viewport(&self) -> LocatorResult<Viewport>;

    /// Enumerate live elements in document order.
    async fn find_elements(&self, query: &ElementQuery) -> LocatorResult<Vec<Self::Handle>>;

    /// Element geometry in driver space, document-relative.
    async fn element_rect(&self, element: &Self::Handle) -> LocatorResult<BBox>;

    async fn element_tag(&self, element: &Self::Handle) -> LocatorResult<String>;

    /// Vertical page scroll position in driver space.
    async fn scroll_offset(&self) -> LocatorResult<f64>;

    async fn scroll_by(&self, dy: f64) -> LocatorResult<()>;

    async fn scroll_to(&self, y: f64) -> LocatorResult<()>;

    async fn scroll_into_view(&self, element: &Self::Handle, align_top: bool) -> LocatorResult<()>;

    /// Topmost element under a viewport point, when the backend can answer.
    async fn element_at_point(&self, _x: f64, _y: f64) -> LocatorResult<Option<Self::Handle>> {
        Err(LocatorError::Unsupported("element_at_point".into()))
    }

    /// Absolute XPath of an element, used for diagnostics only.
    async fn element_xpath(&self, _element: &Self::Handle) -> LocatorResult<Option<String>> {
        Ok(None)
    }

    /// Draw a temporary outline around a document rect, where supported.
    async fn highlight_rect(&self, _rect: &BBox) -> LocatorResult<()> {
        Err(LocatorError::Unsupported("highlight_rect".into()))
    }

    async fn click_element(&self, element: &Self::Handle) -> LocatorResult<()>;

    async fn send_keys_to_element(&self, element: &Self::Handle, text: &str) -> LocatorResult<()>;

    /// Dispatch a raw pointer event at viewport coordinates.
    async fn pointer(&self, event: PointerEvent) -> LocatorResult<()>;

    /// Type into whatever currently has focus.
    async fn type_text(&self, text: &str) -> LocatorResult<()>;
}
