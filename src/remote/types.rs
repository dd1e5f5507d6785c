//! Request and response bodies of the classification service. Field names
//! are the wire contract. Responses default every missing field, so a
//! truncated or older response still deserialises (with `success = false`).
use serde::{Deserialize, Serialize};

use crate::geometry::BBox;
use crate::perception::types::{ActionInfo, TemplateRef};

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize)]
pub struct CheckInRequest {
    pub api_key: String,
    pub os: String,
    pub sdk_version: String,
    pub language: String,
    pub test_case_name: String,
    pub automation_name: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CheckInResponse {
    pub success: bool,
    pub labels: Option<Vec<String>>,
    pub message: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DetectRequest {
    pub screenshot: String,
    pub source: String,
    pub api_key: String,
    pub label: String,
    pub test_case_name: String,
    pub do_exact_match_first: bool,
    pub exact_match_first_threshold: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectResponse {
    pub success: bool,
    pub predicted_element: Option<BBox>,
    pub screenshot_uuid: Option<String>,
    pub score: Option<f64>,
    pub message: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExistsScreenshotRequest {
    pub screenshot_uuid: String,
    pub label: String,
    pub api_key: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ExistsScreenshotResponse {
    pub success: bool,
    pub exists_screenshot: bool,
    pub is_frozen: bool,
    pub predicted_element: Option<BBox>,
    /// Scroll offset (classifier pixels) at which the cached box was recorded.
    pub page_offset: Option<f64>,
    pub score: Option<f64>,
    pub message: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CheckFrozenRequest {
    pub label: String,
    pub api_key: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CheckFrozenResponse {
    /// Unknown means frozen, so nothing gets uploaded by accident.
    #[serde(default = "default_true")]
    pub is_frozen: bool,
}

impl Default for CheckFrozenResponse {
    fn default() -> Self {
        Self { is_frozen: true }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TemplateDataRequest {
    pub label: String,
    pub api_key: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TemplateDataResponse {
    pub success: bool,
    pub templates: Vec<TemplateRef>,
    pub action_infos: Vec<ActionInfo>,
    pub message: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RetrieveElementRequest {
    pub screenshot_uuid: String,
    pub label: String,
    pub api_key: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RetrieveElementResponse {
    pub success: bool,
    pub screenshot_b64: Option<String>,
    pub message: Option<String>,
}

/// Geometry and offsets are in classifier pixels.
#[derive(Debug, Clone, Serialize)]
pub struct AddActionInfoRequest {
    pub screenshot_uuid: String,
    pub retrain: bool,
    pub api_key: String,
    pub label: String,
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    pub multiplier: f64,
    pub test_case_name: String,
    pub page_offset: f64,
    pub ref_screenshot_uuid: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct UploadScreenshotRequest {
    pub api_key: String,
    pub screenshot_uuid: String,
    pub screenshot: String,
    pub label: String,
    pub test_case_name: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct UploadScreenshotResponse {
    pub success: bool,
    pub screenshot_uuid: Option<String>,
    pub message: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarningType {
    FindByAi,
    BackupTriggered,
}

#[derive(Debug, Clone, Serialize)]
pub struct SaveWarningRequest {
    pub real_xpath: String,
    pub label: String,
    pub screenshot_uuid: String,
    pub api_key: String,
    pub warning_type: WarningType,
    pub predicted_element: Option<BBox>,
    pub score: Option<f64>,
    pub message: String,
}

/// Plain `{success, message}` acknowledgement.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AckResponse {
    pub success: bool,
    pub message: Option<String>,
}
