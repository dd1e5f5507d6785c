use std::sync::Arc;
use std::time::Duration;

use crate::config::{LocatorConfig, ResolveStrategy};
use crate::driver::query::ElementQuery;
use crate::driver::traits::AutomationDriver;
use crate::errors::{LocatorError, LocatorResult};
use crate::executor::coordinator::{predicted_to_driver, top_in_viewport};
use crate::executor::element::ResolvedElement;
use crate::geometry::BBox;
use crate::locator::session::Session;
use crate::locator::state::{LookupState, Prediction, Resolution, ResolutionTier};
use crate::perception::screenshot::Capture;
use crate::remote::http::HttpClassifierService;
use crate::remote::service::{localize_message, ClassifierService};
use crate::remote::types::{
    AddActionInfoRequest, CheckFrozenRequest, DetectRequest, DetectResponse,
    ExistsScreenshotRequest, ExistsScreenshotResponse, SaveWarningRequest,
    UploadScreenshotRequest, WarningType,
};
use crate::resolver::ElementResolver;

/// Resolves element labels to elements through the tier chain
/// local cache → remote cache → remote detect → scroll search.
///
/// Methods that resolve take `&mut self`: one lookup per session at a time.
pub struct SmartLocator<D: AutomationDriver> {
    driver: D,
    service: Arc<dyn ClassifierService>,
    config: LocatorConfig,
    session: Session,
    resolver: ElementResolver,
    last_message: Option<String>,
}

impl<D: AutomationDriver> SmartLocator<D> {
    pub async fn start(
        driver: D,
        service: Arc<dyn ClassifierService>,
        config: LocatorConfig,
    ) -> LocatorResult<Self> {
        let session = Session::start(&driver, service.as_ref(), &config).await?;
        let resolver = ElementResolver::new(config.resolver.clone());
        Ok(Self {
            driver,
            service,
            config,
            session,
            resolver,
            last_message: None,
        })
    }

    /// Start against the HTTP service at `config.server_url`.
    pub async fn connect(driver: D, config: LocatorConfig) -> LocatorResult<Self> {
        let service: Arc<dyn ClassifierService> = Arc::new(HttpClassifierService::from_config(&config));
        Self::start(driver, service, config).await
    }

    pub fn driver(&self) -> &D {
        &self.driver
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn config(&self) -> &LocatorConfig {
        &self.config
    }

    /// Look an element up by label through the tiers only.
    pub async fn find_by_ai(&mut self, label: &str) -> LocatorResult<ResolvedElement<D::Handle>> {
        Ok(self.locate(label, false).await?.element)
    }

    /// Run the conventional query first and record where the element was
    /// found; fall back to the tiers when the query finds nothing.
    pub async fn find_element(
        &mut self,
        query: &ElementQuery,
        label: Option<&str>,
    ) -> LocatorResult<ResolvedElement<D::Handle>> {
        let label = label.map(str::to_string).unwrap_or_else(|| query.default_label());
        match self.find_live(query).await {
            Ok(Some(element)) => {
                if let Some(handle) = element.handle() {
                    self.record_action(&label, handle).await;
                }
                return Ok(element);
            }
            Ok(None) => tracing::warn!(
                label = %label, by = query.kind(), value = query.value(),
                "selector matched nothing, using the AI classifier"
            ),
            Err(e) => tracing::warn!(
                label = %label, by = query.kind(), value = query.value(), error = %e,
                "selector failed, using the AI classifier"
            ),
        }
        Ok(self.locate(&label, true).await?.element)
    }

    /// Walk the tiers until one resolves. Tier errors are logged and treated
    /// as misses; only exhausting every tier is an error.
    pub async fn locate(&mut self, label: &str, is_backup: bool) -> LocatorResult<Resolution<D::Handle>> {
        self.last_message = None;
        let mut last_error: Option<String> = None;
        let mut state = match &self.session.local {
            Some(local) if local.has_templates(label) => LookupState::LocalCache,
            _ => LookupState::RemoteCache,
        };

        while let Some(tier) = state.tier() {
            tracing::debug!(label, tier = ?tier, "trying tier");
            match self.run_tier(tier, label).await {
                Ok(Some(resolution)) => {
                    tracing::info!(
                        label,
                        tier = ?tier,
                        live = resolution.element.is_live(),
                        key = %resolution.key,
                        score = ?resolution.score,
                        "element located"
                    );
                    if tier.is_remote() {
                        self.send_warning(label, &resolution, is_backup).await;
                    }
                    return Ok(resolution);
                }
                Ok(None) => tracing::info!(label, tier = ?tier, "tier missed"),
                Err(e) => {
                    tracing::warn!(label, tier = ?tier, error = %e, "tier failed");
                    last_error = Some(e.to_string());
                }
            }
            state = state.next();
        }

        let message = self
            .last_message
            .take()
            .or(last_error)
            .unwrap_or_else(|| "no tier produced a prediction".to_string());
        tracing::error!(label, message = %message, "all tiers exhausted");
        Err(LocatorError::Exhausted {
            label: label.to_string(),
            message,
        })
    }

    async fn run_tier(
        &mut self,
        tier: ResolutionTier,
        label: &str,
    ) -> LocatorResult<Option<Resolution<D::Handle>>> {
        match tier {
            ResolutionTier::LocalCache => self.local_cache_tier(label).await,
            ResolutionTier::RemoteCache => self.remote_cache_tier(label).await,
            ResolutionTier::RemoteDetect => self.remote_detect_tier(label).await,
            ResolutionTier::ScrollSearch => self.scroll_search_tier(label).await,
        }
    }

    async fn local_cache_tier(&mut self, label: &str) -> LocatorResult<Option<Resolution<D::Handle>>> {
        let capture = self.capture().await?;
        let screenshot = capture.decode()?;
        let hit = match &self.session.local {
            Some(local) => local.classify(label, &screenshot),
            None => None,
        };
        let Some(hit) = hit else {
            return Ok(None);
        };
        let prediction = Prediction {
            bbox: hit.bbox,
            scroll_offset: self.driver.scroll_offset().await?,
            key: capture.hash,
            score: Some(hit.score),
        };
        let message = Some("Found using local cache".to_string());
        self.resolve_prediction(ResolutionTier::LocalCache, prediction, message)
            .await
            .map(Some)
    }

    /// Cached prediction for the current screen. A prediction recorded at a
    /// scroll offset outside the visible band triggers exactly one scroll and
    /// re-check.
    async fn remote_cache_tier(&mut self, label: &str) -> LocatorResult<Option<Resolution<D::Handle>>> {
        let mut capture = self.capture().await?;
        let mut resp = self.exists(&capture, label).await?;
        if cached_box(&resp).is_none() {
            return Ok(None);
        }

        let current = self.driver.scroll_offset().await?;
        let recorded = self.session.scale.offset_to_driver(resp.page_offset.unwrap_or(0.0));
        if recorded < current || recorded > current + self.session.viewport.height {
            tracing::info!(label, recorded, current, "cached prediction is off screen, scrolling to it");
            self.driver.scroll_by(recorded - current).await?;
            tokio::time::sleep(Duration::from_millis(self.config.remote_scroll_settle_ms)).await;
            capture = self.capture().await?;
            resp = self.exists(&capture, label).await?;
        }

        let Some(bbox) = cached_box(&resp) else {
            return Ok(None);
        };
        let prediction = Prediction {
            bbox,
            scroll_offset: self.session.scale.offset_to_driver(resp.page_offset.unwrap_or(0.0)),
            key: capture.hash,
            score: resp.score,
        };
        let message = self.remember(resp.message);
        self.resolve_prediction(ResolutionTier::RemoteCache, prediction, message)
            .await
            .map(Some)
    }

    async fn remote_detect_tier(&mut self, label: &str) -> LocatorResult<Option<Resolution<D::Handle>>> {
        let capture = self.capture().await?;
        let resp = self.detect(&capture, label).await?;
        let message = self.remember(resp.message.clone());
        let Some(bbox) = detected_box(&resp) else {
            return Ok(None);
        };
        let prediction = Prediction {
            bbox,
            scroll_offset: self.driver.scroll_offset().await?,
            key: resp.screenshot_uuid.unwrap_or(capture.hash),
            score: resp.score,
        };
        self.resolve_prediction(ResolutionTier::RemoteDetect, prediction, message)
            .await
            .map(Some)
    }

    /// Detect page by page from the top. The page is scrolled back to the top
    /// when nothing is found.
    async fn scroll_search_tier(&mut self, label: &str) -> LocatorResult<Option<Resolution<D::Handle>>> {
        let outcome = self.scan_pages(label).await;
        if !matches!(outcome, Ok(Some(_))) {
            if let Err(e) = self.driver.scroll_to(0.0).await {
                tracing::debug!(error = %e, "could not scroll back to the top");
            }
        }
        outcome
    }

    async fn scan_pages(&mut self, label: &str) -> LocatorResult<Option<Resolution<D::Handle>>> {
        self.driver.scroll_to(0.0).await?;
        let step = self.session.viewport.height;
        let settle = Duration::from_millis(self.config.scroll_step_settle_ms);

        for page in 0..=self.config.max_scroll_steps {
            let offset = self.driver.scroll_offset().await?;
            let capture = self.capture().await?;
            let resp = self.detect(&capture, label).await?;
            let message = self.remember(resp.message.clone());
            if let Some(bbox) = detected_box(&resp) {
                tracing::info!(label, page, offset, "found while scrolling");
                let prediction = Prediction {
                    bbox,
                    scroll_offset: offset,
                    key: resp.screenshot_uuid.unwrap_or(capture.hash),
                    score: resp.score,
                };
                return self
                    .resolve_prediction(ResolutionTier::ScrollSearch, prediction, message)
                    .await
                    .map(Some);
            }

            self.driver.scroll_by(step).await?;
            tokio::time::sleep(settle).await;
            if self.driver.scroll_offset().await? <= offset {
                tracing::debug!(label, offset, "reached the bottom of the page");
                break;
            }
        }
        Ok(None)
    }

    async fn resolve_prediction(
        &self,
        tier: ResolutionTier,
        prediction: Prediction,
        message: Option<String>,
    ) -> LocatorResult<Resolution<D::Handle>> {
        let element = self.materialize(&prediction).await?;
        Ok(Resolution {
            element,
            key: prediction.key,
            message,
            tier,
            score: prediction.score,
            predicted: prediction.bbox,
        })
    }

    /// Turn a prediction into an element according to the configured strategy.
    pub async fn materialize(&self, prediction: &Prediction) -> LocatorResult<ResolvedElement<D::Handle>> {
        let scale = self.session.scale;
        let synthetic =
            || ResolvedElement::synthetic(predicted_to_driver(&prediction.bbox, scale, prediction.scroll_offset));
        if prediction.bbox.is_degenerate() {
            return Err(LocatorError::NoElementFound(format!(
                "empty predicted box {:?}",
                prediction.bbox
            )));
        }

        let found = match self.config.resolve_strategy {
            ResolveStrategy::Synthetic => return Ok(synthetic()),
            ResolveStrategy::Enumerate => {
                self.resolver
                    .resolve(&self.driver, &prediction.bbox, scale, prediction.scroll_offset)
                    .await
            }
            ResolveStrategy::PointLookup => {
                self.resolver
                    .resolve_at_point(&self.driver, &prediction.bbox, scale, prediction.scroll_offset)
                    .await
            }
        };
        match found {
            Ok(candidate) => Ok(candidate.into_element()),
            Err(LocatorError::NoElementFound(reason)) if self.config.synthetic_fallback => {
                tracing::warn!(
                    reason = %reason,
                    "no live element at the predicted box, using a synthetic element; some attributes are unavailable"
                );
                Ok(synthetic())
            }
            Err(e) => Err(e),
        }
    }

    /// Record where a conventionally found element sits so the service can
    /// learn it. Never fails the caller.
    pub async fn record_action(&self, label: &str, handle: &D::Handle) {
        if let Err(e) = self.try_record_action(label, handle).await {
            tracing::warn!(label, error = %e, "could not record element location, continuing");
        }
    }

    /// Pull `label`'s templates into the local cache, for labels the
    /// check-in did not list. Returns `false` when the service has nothing
    /// for the label.
    pub async fn cache_label(&mut self, label: &str) -> LocatorResult<bool> {
        let Some(local) = self.session.local.as_mut() else {
            return Err(LocatorError::Config("local caching is disabled".to_string()));
        };
        let pulled = local
            .pull_label(self.service.as_ref(), &self.session.api_key, label)
            .await?;
        if pulled && !self.session.labels.iter().any(|l| l == label) {
            self.session.labels.push(label.to_string());
        }
        Ok(pulled)
    }

    async fn try_record_action(&self, label: &str, handle: &D::Handle) -> LocatorResult<()> {
        let frozen = match self
            .service
            .check_frozen(&CheckFrozenRequest {
                label: label.to_string(),
                api_key: self.session.api_key.clone(),
            })
            .await
        {
            Ok(resp) => resp.is_frozen,
            Err(e) => {
                tracing::debug!(label, error = %e, "frozen check failed, assuming frozen");
                true
            }
        };
        if frozen {
            tracing::debug!(label, "label is frozen, not recording");
            return Ok(());
        }

        let mut capture = self.capture().await?;
        let mut offset = self.driver.scroll_offset().await?;
        let rect = self.driver.element_rect(handle).await?;
        let mut ref_screenshot_uuid = None;

        if !top_in_viewport(&rect, offset, self.session.viewport) {
            let previous = offset;
            ref_screenshot_uuid = Some(capture.hash.clone());
            self.driver.scroll_into_view(handle, rect.y >= offset).await?;
            capture = self.capture().await?;
            offset = self.driver.scroll_offset().await?;
            self.driver.scroll_by(previous - offset).await?;
        }

        let screenshot_uuid = self.ensure_uploaded(label, &capture).await?;
        let m = self.session.multiplier();
        let resp = self
            .service
            .add_action_info(&AddActionInfoRequest {
                screenshot_uuid,
                retrain: true,
                api_key: self.session.api_key.clone(),
                label: label.to_string(),
                x: rect.x * m,
                y: rect.y * m,
                width: rect.width * m,
                height: rect.height * m,
                multiplier: m,
                test_case_name: self.session.test_case_name.clone(),
                page_offset: offset * m,
                ref_screenshot_uuid,
            })
            .await?;
        if !resp.success {
            tracing::error!(label, message = ?resp.message, "action info rejected");
        }
        Ok(())
    }

    /// Key of the capture on the service, uploading it first if unknown.
    async fn ensure_uploaded(&self, label: &str, capture: &Capture) -> LocatorResult<String> {
        let exists = self
            .service
            .exists_screenshot(&ExistsScreenshotRequest {
                screenshot_uuid: capture.hash.clone(),
                label: label.to_string(),
                api_key: self.session.api_key.clone(),
            })
            .await?;
        if exists.exists_screenshot || exists.is_frozen {
            return Ok(capture.hash.clone());
        }

        tracing::debug!(label, hash = %capture.hash, "uploading screenshot");
        let resp = self
            .service
            .upload_screenshot(&UploadScreenshotRequest {
                api_key: self.session.api_key.clone(),
                screenshot_uuid: capture.hash.clone(),
                screenshot: capture.base64.clone(),
                label: label.to_string(),
                test_case_name: self.session.test_case_name.clone(),
            })
            .await?;
        if !resp.success {
            tracing::error!(label, hash = %capture.hash, message = ?resp.message, "screenshot upload failed");
            return Ok(capture.hash.clone());
        }
        Ok(resp.screenshot_uuid.unwrap_or_else(|| capture.hash.clone()))
    }

    /// Report a classifier-resolved live element, with its XPath, back to the
    /// service.
    async fn send_warning(&self, label: &str, resolution: &Resolution<D::Handle>, is_backup: bool) {
        let Some(handle) = resolution.element.handle() else {
            return;
        };
        let real_xpath = match self.driver.element_xpath(handle).await {
            Ok(Some(xpath)) => xpath,
            Ok(None) => return,
            Err(e) => {
                tracing::debug!(label, error = %e, "no xpath for resolved element");
                return;
            }
        };
        let (warning_type, message) = if is_backup {
            (WarningType::BackupTriggered, "Selector failed, element located by the AI classifier")
        } else {
            (WarningType::FindByAi, "Element located by the AI classifier")
        };
        let req = SaveWarningRequest {
            real_xpath,
            label: label.to_string(),
            screenshot_uuid: resolution.key.clone(),
            api_key: self.session.api_key.clone(),
            warning_type,
            predicted_element: Some(resolution.predicted),
            score: resolution.score,
            message: message.to_string(),
        };
        if let Err(e) = self.service.save_warning(&req).await {
            tracing::debug!(label, error = %e, "save_warning failed");
        }
    }

    async fn find_live(&self, query: &ElementQuery) -> LocatorResult<Option<ResolvedElement<D::Handle>>> {
        let handles = self.driver.find_elements(query).await?;
        let Some(handle) = handles.into_iter().next() else {
            return Ok(None);
        };
        let rect = self.driver.element_rect(&handle).await?;
        let tag = self.driver.element_tag(&handle).await?;
        Ok(Some(ResolvedElement::Live { handle, rect, tag }))
    }

    async fn capture(&self) -> LocatorResult<Capture> {
        Ok(Capture::new(self.driver.screenshot_base64().await?))
    }

    async fn exists(&self, capture: &Capture, label: &str) -> LocatorResult<ExistsScreenshotResponse> {
        let resp = self
            .service
            .exists_screenshot(&ExistsScreenshotRequest {
                screenshot_uuid: capture.hash.clone(),
                label: label.to_string(),
                api_key: self.session.api_key.clone(),
            })
            .await?;
        if !resp.success {
            tracing::debug!(label, hash = %capture.hash, message = ?resp.message, "no cached prediction");
        }
        Ok(resp)
    }

    async fn detect(&self, capture: &Capture, label: &str) -> LocatorResult<DetectResponse> {
        self.service
            .detect(&DetectRequest {
                screenshot: capture.base64.clone(),
                source: String::new(),
                api_key: self.session.api_key.clone(),
                label: label.to_string(),
                test_case_name: self.session.test_case_name.clone(),
                do_exact_match_first: self.config.do_exact_match_first,
                exact_match_first_threshold: self.config.exact_match_first_threshold,
            })
            .await
    }

    /// Keep the latest service message (with the configured server URL) for
    /// the exhaustion error.
    fn remember(&mut self, message: Option<String>) -> Option<String> {
        let message = message.map(|m| localize_message(&m, &self.config.server_url));
        if let Some(m) = &message {
            tracing::debug!(message = %m, "service message");
            self.last_message = Some(m.clone());
        }
        message
    }
}

fn cached_box(resp: &ExistsScreenshotResponse) -> Option<BBox> {
    resp.predicted_element.filter(|_| resp.success)
}

fn detected_box(resp: &DetectResponse) -> Option<BBox> {
    resp.predicted_element.filter(|_| resp.success)
}
