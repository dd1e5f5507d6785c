use async_trait::async_trait;

use crate::errors::LocatorResult;
use crate::remote::types::{
    AckResponse, AddActionInfoRequest, CheckFrozenRequest, CheckFrozenResponse, CheckInRequest,
    CheckInResponse, DetectRequest, DetectResponse, ExistsScreenshotRequest,
    ExistsScreenshotResponse, RetrieveElementRequest, RetrieveElementResponse, SaveWarningRequest,
    TemplateDataRequest, TemplateDataResponse, UploadScreenshotRequest, UploadScreenshotResponse,
};

/// Remote classification service. The HTTP client is the production
/// implementation; tests substitute scripted ones.
///
/// `Err` means the service could not be reached (after retries). A reachable
/// service that declines returns `Ok` with `success = false`.
#[async_trait]
pub trait ClassifierService: Send + Sync {
    async fn check_in(&self, req: &CheckInRequest) -> LocatorResult<CheckInResponse>;

    async fn detect(&self, req: &DetectRequest) -> LocatorResult<DetectResponse>;

    async fn exists_screenshot(
        &self,
        req: &ExistsScreenshotRequest,
    ) -> LocatorResult<ExistsScreenshotResponse>;

    async fn check_frozen(&self, req: &CheckFrozenRequest) -> LocatorResult<CheckFrozenResponse>;

    async fn element_template_data(
        &self,
        req: &TemplateDataRequest,
    ) -> LocatorResult<TemplateDataResponse>;

    async fn retrieve_element(
        &self,
        req: &RetrieveElementRequest,
    ) -> LocatorResult<RetrieveElementResponse>;

    async fn add_action_info(&self, req: &AddActionInfoRequest) -> LocatorResult<AckResponse>;

    async fn upload_screenshot(
        &self,
        req: &UploadScreenshotRequest,
    ) -> LocatorResult<UploadScreenshotResponse>;

    async fn save_warning(&self, req: &SaveWarningRequest) -> LocatorResult<AckResponse>;
}

/// Service messages link to the production dashboard; point them at the
/// configured server instead.
pub fn localize_message(message: &str, server_url: &str) -> String {
    message.replace(crate::config::DEFAULT_SERVER_URL, server_url.trim_end_matches('/'))
}
