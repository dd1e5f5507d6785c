//! In-memory driver and scripted classification service for unit tests.
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;
use image::{Rgb, RgbImage};

use crate::driver::query::{ElementQuery, PointerEvent, Viewport};
use crate::driver::traits::AutomationDriver;
use crate::errors::{LocatorError, LocatorResult};
use crate::geometry::BBox;
use crate::perception::screenshot::{encode_png_base64, Capture};
use crate::remote::service::ClassifierService;
use crate::remote::types::*;

/// Deterministic high-entropy RGB image; `seed` varies the pattern.
pub fn noise_image(w: u32, h: u32, seed: u32) -> RgbImage {
    RgbImage::from_fn(w, h, |x, y| {
        let px = |c: u32| {
            let mut v = x.wrapping_mul(0x9E37_79B1)
                ^ y.wrapping_mul(0x85EB_CA77)
                ^ c.wrapping_mul(0xC2B2_AE3D)
                ^ seed.wrapping_mul(0x27D4_EB2F);
            v ^= v >> 15;
            v = v.wrapping_mul(0x2C1B_3C6D);
            v ^= v >> 12;
            (v & 0xFF) as u8
        };
        Rgb([px(0), px(1), px(2)])
    })
}

#[derive(Debug, Clone, PartialEq)]
pub enum DriverCall {
    Click(usize),
    SendKeys(usize, String),
    TypeText(String),
    ScrollIntoView(usize, bool),
    Highlight(BBox),
}

#[derive(Debug, Clone)]
struct FakeElement {
    tag: String,
    rect: BBox,
    stale: bool,
    xpath: Option<String>,
}

struct FakeState {
    elements: Vec<FakeElement>,
    viewport: Viewport,
    page_height: f64,
    scroll: f64,
    multiplier: f64,
    fixed_screenshot: Option<String>,
    selector_hits: HashMap<ElementQuery, Vec<usize>>,
    point_lookup: bool,
    point_queries: Vec<(f64, f64)>,
    failing_enumerations: usize,
    pointer_events: Vec<PointerEvent>,
    calls: Vec<DriverCall>,
    scroll_history: Vec<f64>,
    screenshots: usize,
}

/// A page of `page_height` driver pixels seen through a viewport. Captures
/// are `multiplier` times the viewport size and differ per scroll offset.
pub struct FakeDriver {
    state: Mutex<FakeState>,
}

impl FakeDriver {
    pub fn new(viewport_w: f64, viewport_h: f64, page_height: f64) -> Self {
        Self {
            state: Mutex::new(FakeState {
                elements: Vec::new(),
                viewport: Viewport { width: viewport_w, height: viewport_h },
                page_height,
                scroll: 0.0,
                multiplier: 1.0,
                fixed_screenshot: None,
                selector_hits: HashMap::new(),
                point_lookup: false,
                point_queries: Vec::new(),
                failing_enumerations: 0,
                pointer_events: Vec::new(),
                calls: Vec::new(),
                scroll_history: Vec::new(),
                screenshots: 0,
            }),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, FakeState> {
        self.state.lock().unwrap()
    }

    pub fn with_multiplier(self, multiplier: f64) -> Self {
        self.lock().multiplier = multiplier;
        self
    }

    pub fn add_element(&self, tag: &str, rect: BBox) -> usize {
        let mut s = self.lock();
        s.elements.push(FakeElement { tag: tag.into(), rect, stale: false, xpath: None });
        s.elements.len() - 1
    }

    pub fn set_xpath(&self, idx: usize, xpath: &str) {
        self.lock().elements[idx].xpath = Some(xpath.into());
    }

    pub fn mark_stale(&self, idx: usize) {
        self.lock().elements[idx].stale = true;
    }

    /// The next `n` enumerations fail as if the page re-rendered.
    pub fn fail_enumerations(&self, n: usize) {
        self.lock().failing_enumerations = n;
    }

    pub fn enable_point_lookup(&self) {
        self.lock().point_lookup = true;
    }

    pub fn register_selector(&self, query: ElementQuery, hits: Vec<usize>) {
        self.lock().selector_hits.insert(query, hits);
    }

    pub fn set_scroll(&self, y: f64) {
        let mut s = self.lock();
        s.scroll = clamp_scroll(&s, y);
    }

    pub fn scroll(&self) -> f64 {
        self.lock().scroll
    }

    /// Serve this capture regardless of scroll position.
    pub fn set_fixed_screenshot(&self, base64: String) {
        self.lock().fixed_screenshot = Some(base64);
    }

    /// The capture the driver produces at `offset` (when not fixed).
    pub fn capture_at(&self, offset: f64) -> Capture {
        let s = self.lock();
        Capture::new(generated_screenshot(&s, offset))
    }

    pub fn pointer_events(&self) -> Vec<PointerEvent> {
        self.lock().pointer_events.clone()
    }

    pub fn calls(&self) -> Vec<DriverCall> {
        self.lock().calls.clone()
    }

    /// Offsets reached after every scroll operation.
    pub fn scroll_history(&self) -> Vec<f64> {
        self.lock().scroll_history.clone()
    }

    pub fn point_queries(&self) -> Vec<(f64, f64)> {
        self.lock().point_queries.clone()
    }

    pub fn screenshots_taken(&self) -> usize {
        self.lock().screenshots
    }

    fn element(&self, idx: usize) -> LocatorResult<FakeElement> {
        let s = self.lock();
        match s.elements.get(idx) {
            Some(e) if !e.stale => Ok(e.clone()),
            _ => Err(LocatorError::StaleHandle(format!("element {idx}"))),
        }
    }

    fn scroll_to_clamped(&self, y: f64) {
        let mut s = self.lock();
        s.scroll = clamp_scroll(&s, y);
        let reached = s.scroll;
        s.scroll_history.push(reached);
    }
}

fn clamp_scroll(s: &FakeState, y: f64) -> f64 {
    y.clamp(0.0, (s.page_height - s.viewport.height).max(0.0))
}

fn generated_screenshot(s: &FakeState, offset: f64) -> String {
    let w = (s.viewport.width * s.multiplier) as u32;
    let h = (s.viewport.height * s.multiplier) as u32;
    let o = offset as u32;
    let img = RgbImage::from_pixel(w, h, Rgb([(o & 0xFF) as u8, ((o >> 8) & 0xFF) as u8, 7]));
    encode_png_base64(&img).unwrap()
}

#[async_trait]
impl AutomationDriver for FakeDriver {
    type Handle = usize;

    fn automation_name(&self) -> String {
        "fake".into()
    }

    async fn screenshot_base64(&self) -> LocatorResult<String> {
        let mut s = self.lock();
        s.screenshots += 1;
        if let Some(fixed) = &s.fixed_screenshot {
            return Ok(fixed.clone());
        }
        let offset = s.scroll;
        Ok(generated_screenshot(&s, offset))
    }

    async fn viewport(&self) -> LocatorResult<Viewport> {
        Ok(self.lock().viewport)
    }

    async fn find_elements(&self, query: &ElementQuery) -> LocatorResult<Vec<usize>> {
        let mut s = self.lock();
        if s.failing_enumerations > 0 {
            s.failing_enumerations -= 1;
            return Err(LocatorError::StaleHandle("page changed during enumeration".into()));
        }
        let all = 0..s.elements.len();
        Ok(match query {
            ElementQuery::Any => all.collect(),
            ElementQuery::Tag(tag) => all.filter(|&i| &s.elements[i].tag == tag).collect(),
            other => s.selector_hits.get(other).cloned().unwrap_or_default(),
        })
    }

    async fn element_rect(&self, element: &usize) -> LocatorResult<BBox> {
        Ok(self.element(*element)?.rect)
    }

    async fn element_tag(&self, element: &usize) -> LocatorResult<String> {
        Ok(self.element(*element)?.tag)
    }

    async fn scroll_offset(&self) -> LocatorResult<f64> {
        Ok(self.lock().scroll)
    }

    async fn scroll_by(&self, dy: f64) -> LocatorResult<()> {
        let current = self.lock().scroll;
        self.scroll_to_clamped(current + dy);
        Ok(())
    }

    async fn scroll_to(&self, y: f64) -> LocatorResult<()> {
        self.scroll_to_clamped(y);
        Ok(())
    }

    async fn scroll_into_view(&self, element: &usize, align_top: bool) -> LocatorResult<()> {
        let rect = self.element(*element)?.rect;
        let vh = self.lock().viewport.height;
        self.lock().calls.push(DriverCall::ScrollIntoView(*element, align_top));
        let target = if align_top { rect.y } else { rect.bottom() - vh };
        self.scroll_to_clamped(target);
        Ok(())
    }

    async fn element_at_point(&self, x: f64, y: f64) -> LocatorResult<Option<usize>> {
        let mut s = self.lock();
        if !s.point_lookup {
            return Err(LocatorError::Unsupported("element_at_point".into()));
        }
        s.point_queries.push((x, y));
        let doc_y = y + s.scroll;
        Ok(s.elements.iter().enumerate().rev().find_map(|(i, e)| {
            let r = e.rect;
            (!e.stale && x >= r.x && x <= r.right() && doc_y >= r.y && doc_y <= r.bottom()).then_some(i)
        }))
    }

    async fn element_xpath(&self, element: &usize) -> LocatorResult<Option<String>> {
        Ok(self.element(*element)?.xpath)
    }

    async fn highlight_rect(&self, rect: &BBox) -> LocatorResult<()> {
        self.lock().calls.push(DriverCall::Highlight(*rect));
        Ok(())
    }

    async fn click_element(&self, element: &usize) -> LocatorResult<()> {
        self.element(*element)?;
        self.lock().calls.push(DriverCall::Click(*element));
        Ok(())
    }

    async fn send_keys_to_element(&self, element: &usize, text: &str) -> LocatorResult<()> {
        self.element(*element)?;
        self.lock().calls.push(DriverCall::SendKeys(*element, text.into()));
        Ok(())
    }

    async fn pointer(&self, event: PointerEvent) -> LocatorResult<()> {
        self.lock().pointer_events.push(event);
        Ok(())
    }

    async fn type_text(&self, text: &str) -> LocatorResult<()> {
        self.lock().calls.push(DriverCall::TypeText(text.into()));
        Ok(())
    }
}

/// Responses and recorded traffic of [`ScriptedService`]. Unscripted calls
/// answer with a logical failure.
#[derive(Default)]
pub struct ServiceScript {
    pub labels: Option<Vec<String>>,
    /// `/exists_screenshot` answers keyed by screenshot hash.
    pub exists: HashMap<String, ExistsScreenshotResponse>,
    /// `/detect` answers keyed by screenshot hash, checked before the queue.
    pub detect_by_hash: HashMap<String, DetectResponse>,
    pub detect_queue: VecDeque<DetectResponse>,
    pub detect_failure_message: Option<String>,
    pub template_data: HashMap<String, TemplateDataResponse>,
    pub retrieve: HashMap<String, String>,
    pub frozen: bool,
    pub upload_uuid: Option<String>,
    /// Routes that fail as unreachable.
    pub unreachable: Vec<&'static str>,

    pub calls: Vec<&'static str>,
    pub detect_hashes: Vec<String>,
    pub exists_requests: Vec<ExistsScreenshotRequest>,
    pub action_infos: Vec<AddActionInfoRequest>,
    pub uploads: Vec<UploadScreenshotRequest>,
    pub warnings: Vec<SaveWarningRequest>,
    pub check_ins: Vec<CheckInRequest>,
}

#[derive(Default)]
pub struct ScriptedService {
    script: Mutex<ServiceScript>,
}

impl ScriptedService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with<R>(&self, f: impl FnOnce(&mut ServiceScript) -> R) -> R {
        f(&mut self.script.lock().unwrap())
    }

    pub fn calls_to(&self, route: &str) -> usize {
        self.with(|s| s.calls.iter().filter(|c| **c == route).count())
    }

    fn enter(&self, route: &'static str) -> LocatorResult<()> {
        self.with(|s| {
            s.calls.push(route);
            if s.unreachable.contains(&route) {
                Err(LocatorError::TransportTimeout { route: route.into(), attempts: 3 })
            } else {
                Ok(())
            }
        })
    }
}

#[async_trait]
impl ClassifierService for ScriptedService {
    async fn check_in(&self, req: &CheckInRequest) -> LocatorResult<CheckInResponse> {
        self.enter("check_in")?;
        Ok(self.with(|s| {
            s.check_ins.push(req.clone());
            CheckInResponse { success: true, labels: s.labels.clone(), message: None }
        }))
    }

    async fn detect(&self, req: &DetectRequest) -> LocatorResult<DetectResponse> {
        self.enter("detect")?;
        let hash = crate::perception::screenshot::content_hash(&req.screenshot);
        Ok(self.with(|s| {
            s.detect_hashes.push(hash.clone());
            if let Some(resp) = s.detect_by_hash.get(&hash) {
                return resp.clone();
            }
            s.detect_queue.pop_front().unwrap_or_else(|| DetectResponse {
                success: false,
                message: s.detect_failure_message.clone(),
                ..Default::default()
            })
        }))
    }

    async fn exists_screenshot(&self, req: &ExistsScreenshotRequest) -> LocatorResult<ExistsScreenshotResponse> {
        self.enter("exists_screenshot")?;
        Ok(self.with(|s| {
            s.exists_requests.push(req.clone());
            s.exists.get(&req.screenshot_uuid).cloned().unwrap_or_default()
        }))
    }

    async fn check_frozen(&self, _req: &CheckFrozenRequest) -> LocatorResult<CheckFrozenResponse> {
        self.enter("check_frozen")?;
        Ok(self.with(|s| CheckFrozenResponse { is_frozen: s.frozen }))
    }

    async fn element_template_data(&self, req: &TemplateDataRequest) -> LocatorResult<TemplateDataResponse> {
        self.enter("element_template_data")?;
        Ok(self.with(|s| s.template_data.get(&req.label).cloned().unwrap_or_default()))
    }

    async fn retrieve_element(&self, req: &RetrieveElementRequest) -> LocatorResult<RetrieveElementResponse> {
        self.enter("retrieve_element")?;
        Ok(self.with(|s| match s.retrieve.get(&req.screenshot_uuid) {
            Some(b64) => RetrieveElementResponse {
                success: true,
                screenshot_b64: Some(b64.clone()),
                message: None,
            },
            None => RetrieveElementResponse {
                success: false,
                screenshot_b64: None,
                message: Some("unknown template".into()),
            },
        }))
    }

    async fn add_action_info(&self, req: &AddActionInfoRequest) -> LocatorResult<AckResponse> {
        self.enter("add_action_info")?;
        self.with(|s| s.action_infos.push(req.clone()));
        Ok(AckResponse { success: true, message: None })
    }

    async fn upload_screenshot(&self, req: &UploadScreenshotRequest) -> LocatorResult<UploadScreenshotResponse> {
        self.enter("upload_screenshot")?;
        Ok(self.with(|s| {
            s.uploads.push(req.clone());
            UploadScreenshotResponse {
                success: true,
                screenshot_uuid: s.upload_uuid.clone().or_else(|| Some(req.screenshot_uuid.clone())),
                message: None,
            }
        }))
    }

    async fn save_warning(&self, req: &SaveWarningRequest) -> LocatorResult<AckResponse> {
        self.enter("save_warning")?;
        self.with(|s| s.warnings.push(req.clone()));
        Ok(AckResponse { success: true, message: None })
    }
}
