use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::config::LocatorConfig;
use crate::errors::{LocatorError, LocatorResult};
use crate::remote::service::ClassifierService;
use crate::remote::types::{
    AckResponse, AddActionInfoRequest, CheckFrozenRequest, CheckFrozenResponse, CheckInRequest,
    CheckInResponse, DetectRequest, DetectResponse, ExistsScreenshotRequest,
    ExistsScreenshotResponse, RetrieveElementRequest, RetrieveElementResponse, SaveWarningRequest,
    TemplateDataRequest, TemplateDataResponse, UploadScreenshotRequest, UploadScreenshotResponse,
};

/// Initial per-request timeouts; each retry doubles the one in use.
#[derive(Debug, Clone, Copy)]
pub struct RouteTimeouts {
    pub detect: Duration,
    pub misc: Duration,
    pub template: Duration,
    pub retrieve: Duration,
}

impl RouteTimeouts {
    pub fn from_config(cfg: &LocatorConfig) -> Self {
        Self {
            detect: Duration::from_secs(cfg.detect_timeout_secs),
            misc: Duration::from_secs(cfg.misc_timeout_secs),
            template: Duration::from_secs(cfg.template_timeout_secs),
            retrieve: Duration::from_secs(cfg.retrieve_timeout_secs),
        }
    }
}

pub struct HttpClassifierService {
    base_url: String,
    client: reqwest::Client,
    timeouts: RouteTimeouts,
    tries: u32,
    backoff: Duration,
}

impl HttpClassifierService {
    pub fn new(base_url: String, timeouts: RouteTimeouts, tries: u32, backoff: Duration) -> Self {
        Self {
            base_url,
            client: reqwest::Client::new(),
            timeouts,
            tries: tries.max(1),
            backoff,
        }
    }

    pub fn from_config(cfg: &LocatorConfig) -> Self {
        Self::new(
            cfg.server_url.clone(),
            RouteTimeouts::from_config(cfg),
            cfg.network_tries,
            Duration::from_millis(cfg.retry_backoff_ms),
        )
    }

    /// Replace the HTTP client (custom TLS roots, proxy settings).
    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }

    fn url(&self, route: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), route)
    }

    /// POST a JSON body, retrying timeouts and dropped connections with a
    /// doubled timeout and a doubling pause between attempts.
    async fn post_json<Req, Resp>(&self, route: &str, body: &Req, timeout: Duration) -> LocatorResult<Resp>
    where
        Req: Serialize + Sync + ?Sized,
        Resp: DeserializeOwned,
    {
        tracing::trace!(route, body = %sanitized_body(body), "request body (images omitted)");

        let mut timeout = timeout;
        let mut pause = self.backoff;
        // None while every failure so far was a timeout
        let mut last_drop: Option<String> = None;
        for attempt in 1..=self.tries {
            tracing::debug!(route, attempt, timeout_ms = timeout.as_millis() as u64, "posting to service");
            match self.send_once(route, body, timeout).await {
                Ok(resp) => return Ok(resp),
                Err(e) if e.is_retryable() => {
                    timeout *= 2;
                    if e.is_timeout() {
                        last_drop = None;
                        tracing::warn!(
                            route,
                            attempt,
                            next_timeout_secs = timeout.as_secs_f64(),
                            "service timeout, probably under heavy load or slow connection; doubling the timeout"
                        );
                    } else {
                        tracing::warn!(route, attempt, error = %e, "connection to service dropped, retrying");
                        last_drop = Some(e.to_string());
                    }
                    if attempt < self.tries {
                        tokio::time::sleep(pause).await;
                        pause *= 2;
                    }
                }
                Err(e) => {
                    tracing::error!(route, error = %e, "request to service failed");
                    return Err(e);
                }
            }
        }
        Err(match last_drop {
            Some(reason) => LocatorError::Transport(format!(
                "{route} failed after {} attempts: {reason}",
                self.tries
            )),
            None => LocatorError::TransportTimeout {
                route: route.to_string(),
                attempts: self.tries,
            },
        })
    }

    async fn send_once<Req, Resp>(&self, route: &str, body: &Req, timeout: Duration) -> LocatorResult<Resp>
    where
        Req: Serialize + Sync + ?Sized,
        Resp: DeserializeOwned,
    {
        let response = self
            .client
            .post(self.url(route))
            .timeout(timeout)
            .json(body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let err_body = response.text().await.unwrap_or_default();
            return Err(LocatorError::RemoteFailure(format!("{route} {status}: {err_body}")));
        }
        Ok(response.json::<Resp>().await?)
    }
}

/// JSON body for logging with base64 payloads replaced.
fn sanitized_body<Req: Serialize + ?Sized>(body: &Req) -> String {
    let mut value = serde_json::to_value(body).unwrap_or_default();
    if let Some(obj) = value.as_object_mut() {
        for key in ["screenshot", "screenshot_b64"] {
            if let Some(v) = obj.get_mut(key) {
                *v = serde_json::Value::String("<omitted_base64_image>".to_string());
            }
        }
    }
    value.to_string()
}

#[async_trait]
impl ClassifierService for HttpClassifierService {
    async fn check_in(&self, req: &CheckInRequest) -> LocatorResult<CheckInResponse> {
        self.post_json("/ping", req, self.timeouts.misc).await
    }

    async fn detect(&self, req: &DetectRequest) -> LocatorResult<DetectResponse> {
        self.post_json("/detect", req, self.timeouts.detect).await
    }

    async fn exists_screenshot(
        &self,
        req: &ExistsScreenshotRequest,
    ) -> LocatorResult<ExistsScreenshotResponse> {
        self.post_json("/exists_screenshot", req, self.timeouts.misc).await
    }

    async fn check_frozen(&self, req: &CheckFrozenRequest) -> LocatorResult<CheckFrozenResponse> {
        self.post_json("/check_frozen", req, self.timeouts.misc).await
    }

    async fn element_template_data(
        &self,
        req: &TemplateDataRequest,
    ) -> LocatorResult<TemplateDataResponse> {
        self.post_json("/get_element_template_data", req, self.timeouts.template).await
    }

    async fn retrieve_element(
        &self,
        req: &RetrieveElementRequest,
    ) -> LocatorResult<RetrieveElementResponse> {
        self.post_json("/retrieve_element", req, self.timeouts.retrieve).await
    }

    async fn add_action_info(&self, req: &AddActionInfoRequest) -> LocatorResult<AckResponse> {
        self.post_json("/add_action_info", req, self.timeouts.misc).await
    }

    async fn upload_screenshot(
        &self,
        req: &UploadScreenshotRequest,
    ) -> LocatorResult<UploadScreenshotResponse> {
        self.post_json("/upload_screenshot", req, self.timeouts.misc).await
    }

    async fn save_warning(&self, req: &SaveWarningRequest) -> LocatorResult<AckResponse> {
        self.post_json("/save_warning", req, self.timeouts.misc).await
    }
}
