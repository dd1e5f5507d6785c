use crate::config::LocatorConfig;
use crate::driver::query::Viewport;
use crate::driver::traits::AutomationDriver;
use crate::errors::LocatorResult;
use crate::geometry::CoordinateScale;
use crate::perception::local_classifier::LocalClassifier;
use crate::perception::screenshot::Capture;
use crate::perception::template_cache::LocalTemplateCache;
use crate::remote::service::ClassifierService;
use crate::remote::types::CheckInRequest;

/// Per-session context: everything that used to be ambient state. Created
/// once by [`Session::start`] and owned by the locator.
pub struct Session {
    pub api_key: String,
    pub test_case_name: String,
    /// Random per-run identifier, for correlating logs.
    pub run_id: String,
    pub scale: CoordinateScale,
    pub viewport: Viewport,
    /// Labels the service knows for this test case.
    pub labels: Vec<String>,
    pub local: Option<LocalClassifier>,
}

impl Session {
    /// Check in, derive the multiplier from one capture, and warm the local
    /// template cache when local caching is on. A failed check-in only costs
    /// the label list.
    pub async fn start<D: AutomationDriver>(
        driver: &D,
        service: &dyn ClassifierService,
        config: &LocatorConfig,
    ) -> LocatorResult<Self> {
        let api_key = config.require_api_key()?.to_string();
        let test_case_name = config.test_case_name().to_string();
        let run_id = uuid::Uuid::new_v4().to_string();

        let labels = check_in(driver, service, &api_key, &test_case_name).await;

        let viewport = driver.viewport().await?;
        let capture = Capture::new(driver.screenshot_base64().await?);
        let dims = capture.dims()?;
        let scale = CoordinateScale::from_widths(dims.width, viewport.width);

        let local = if config.local_caching {
            let cache = LocalTemplateCache::open(config.cache_dir()?)?;
            let mut classifier = LocalClassifier::new(cache, &config.template);
            let pulled = classifier.pull_labels(service, &api_key, &labels).await;
            tracing::info!(labels = labels.len(), pulled, "local template cache ready");
            Some(classifier)
        } else {
            None
        };

        tracing::info!(
            run_id = %run_id,
            test_case = %test_case_name,
            multiplier = scale.multiplier(),
            viewport_w = viewport.width,
            viewport_h = viewport.height,
            "session started"
        );

        Ok(Self {
            api_key,
            test_case_name,
            run_id,
            scale,
            viewport,
            labels,
            local,
        })
    }

    pub fn multiplier(&self) -> f64 {
        self.scale.multiplier()
    }

    pub fn local_caching(&self) -> bool {
        self.local.is_some()
    }
}

async fn check_in<D: AutomationDriver>(
    driver: &D,
    service: &dyn ClassifierService,
    api_key: &str,
    test_case_name: &str,
) -> Vec<String> {
    let req = CheckInRequest {
        api_key: api_key.to_string(),
        os: format!("{}-{}", std::env::consts::OS, std::env::consts::ARCH),
        sdk_version: env!("CARGO_PKG_VERSION").to_string(),
        language: "rust".to_string(),
        test_case_name: test_case_name.to_string(),
        automation_name: driver.automation_name(),
    };
    match service.check_in(&req).await {
        Ok(resp) if resp.success => match resp.labels {
            Some(labels) => {
                tracing::debug!(labels = ?labels, "labels from check-in");
                labels
            }
            None => {
                tracing::info!("local matching disabled, no labels found during check-in");
                Vec::new()
            }
        },
        Ok(resp) => {
            tracing::error!(message = ?resp.message, "check-in rejected");
            Vec::new()
        }
        Err(e) => {
            tracing::debug!(error = %e, "check-in failed");
            Vec::new()
        }
    }
}
