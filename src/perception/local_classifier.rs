use image::RgbImage;

use crate::config::TemplateConfig;
use crate::errors::LocatorResult;
use crate::perception::geographic::pick_closest;
use crate::perception::template_cache::LocalTemplateCache;
use crate::perception::template_matcher::TemplateMatcher;
use crate::perception::types::{ScreenDims, TemplateMatch};
use crate::remote::service::ClassifierService;

/// Template matching over the local cache followed by geographic
/// disambiguation against the label's action history.
pub struct LocalClassifier {
    cache: LocalTemplateCache,
    matcher: TemplateMatcher,
}

impl LocalClassifier {
    pub fn new(cache: LocalTemplateCache, cfg: &TemplateConfig) -> Self {
        Self {
            cache,
            matcher: TemplateMatcher::new(cfg),
        }
    }

    pub fn cache(&self) -> &LocalTemplateCache {
        &self.cache
    }

    pub fn has_templates(&self, label: &str) -> bool {
        self.cache.has_templates(label)
    }

    /// Best local match for `label` in classifier pixels, or `None` when the
    /// label cannot be resolved locally (no templates, no match, or no history
    /// to choose among matches with).
    pub fn classify(&self, label: &str, screenshot: &RgbImage) -> Option<TemplateMatch> {
        let record = self.cache.record(label)?;
        let templates = self.cache.load_templates(label);
        if templates.is_empty() {
            return None;
        }
        let candidates = self.matcher.match_templates(screenshot, &templates);
        tracing::debug!(
            label,
            templates = templates.len(),
            candidates = candidates.len(),
            threshold = self.matcher.threshold(),
            "local template matching"
        );
        if candidates.is_empty() {
            return None;
        }
        let screen = ScreenDims::new(screenshot.width(), screenshot.height());
        pick_closest(&candidates, &record.action_infos, screen)
    }

    /// Pull templates for each label, continuing past labels that fail.
    /// Returns how many labels had template data.
    pub async fn pull_labels(
        &mut self,
        service: &dyn ClassifierService,
        api_key: &str,
        labels: &[String],
    ) -> usize {
        let mut pulled = 0;
        for label in labels {
            match self.cache.pull_element(service, api_key, label).await {
                Ok(true) => pulled += 1,
                Ok(false) => {}
                Err(e) => tracing::warn!(label = %label, error = %e, "template pull failed"),
            }
        }
        pulled
    }

    pub async fn pull_label(
        &mut self,
        service: &dyn ClassifierService,
        api_key: &str,
        label: &str,
    ) -> LocatorResult<bool> {
        self.cache.pull_element(service, api_key, label).await
    }
}
