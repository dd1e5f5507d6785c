use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use image::RgbImage;
use regex::Regex;

use crate::errors::{LocatorError, LocatorResult};
use crate::perception::screenshot::{decode_base64, decode_base64_image, decode_image_bytes};
use crate::perception::types::{ElementRecord, TemplateRef};
use crate::remote::service::ClassifierService;
use crate::remote::types::{RetrieveElementRequest, TemplateDataRequest};

const INDEX_FILE: &str = "element_data.json";

fn template_id_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[A-Za-z0-9_\-]+$").expect("static pattern"))
}

/// On-disk store of element templates and their action history.
///
/// Layout: one file per template, named by its UUID and holding the raw
/// image bytes, plus `element_data.json` mapping each label to its
/// [`ElementRecord`]. Templates are append-only: a file that already exists
/// is never rewritten. Concurrent writers are not coordinated; the index is
/// last-writer-wins.
pub struct LocalTemplateCache {
    dir: PathBuf,
    records: HashMap<String, ElementRecord>,
}

impl LocalTemplateCache {
    /// Open (creating if needed) the cache rooted at `dir`. A corrupt index is
    /// logged and replaced by an empty one rather than failing the session.
    pub fn open(dir: impl Into<PathBuf>) -> LocatorResult<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        let index = dir.join(INDEX_FILE);
        let records = if index.is_file() {
            let content = std::fs::read_to_string(&index)?;
            match serde_json::from_str::<HashMap<String, ElementRecord>>(&content) {
                Ok(records) => records,
                Err(e) => {
                    tracing::warn!(path = %index.display(), error = %e, "template index unreadable, starting empty");
                    HashMap::new()
                }
            }
        } else {
            HashMap::new()
        };
        tracing::debug!(dir = %dir.display(), labels = records.len(), "template cache opened");
        Ok(Self { dir, records })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.records.keys().map(String::as_str)
    }

    pub fn record(&self, label: &str) -> Option<&ElementRecord> {
        self.records.get(label)
    }

    pub fn has_templates(&self, label: &str) -> bool {
        self.records.get(label).is_some_and(|r| !r.templates.is_empty())
    }

    /// Path of a template file. Identifiers come from the service, so anything
    /// that could escape the cache directory is rejected.
    pub fn template_path(&self, template_uuid: &str) -> LocatorResult<PathBuf> {
        if !template_id_pattern().is_match(template_uuid) {
            return Err(LocatorError::Cache(format!("invalid template id: {template_uuid:?}")));
        }
        Ok(self.dir.join(template_uuid))
    }

    /// Write a template once. Returns `false` when it was already stored.
    pub fn store_template(&self, template_uuid: &str, bytes: &[u8]) -> LocatorResult<bool> {
        let path = self.template_path(template_uuid)?;
        if path.exists() {
            return Ok(false);
        }
        let tmp = path.with_extension("part");
        std::fs::write(&tmp, bytes)?;
        std::fs::rename(&tmp, &path)?;
        Ok(true)
    }

    /// Decoded templates for a label. Missing or undecodable files are
    /// skipped with a warning.
    pub fn load_templates(&self, label: &str) -> Vec<RgbImage> {
        let Some(record) = self.records.get(label) else {
            return Vec::new();
        };
        record
            .templates
            .iter()
            .filter_map(|t| match self.load_template(&t.template_uuid) {
                Ok(img) => Some(img),
                Err(e) => {
                    tracing::warn!(label, template = %t.template_uuid, error = %e, "skipping template");
                    None
                }
            })
            .collect()
    }

    fn load_template(&self, template_uuid: &str) -> LocatorResult<RgbImage> {
        let bytes = std::fs::read(self.template_path(template_uuid)?)?;
        match decode_image_bytes(&bytes) {
            Ok(img) => Ok(img),
            // older caches stored the base64 text itself
            Err(_) => decode_base64_image(&String::from_utf8_lossy(&bytes)),
        }
    }

    pub fn upsert_record(&mut self, label: &str, record: ElementRecord) {
        self.records.entry(label.to_string()).or_default().merge(record);
    }

    /// Persist the index atomically (write to a temp file, then rename).
    pub fn save(&self) -> LocatorResult<()> {
        let index = self.dir.join(INDEX_FILE);
        let tmp = self.dir.join(format!("{INDEX_FILE}.tmp"));
        std::fs::write(&tmp, serde_json::to_string_pretty(&self.records)?)?;
        std::fs::rename(&tmp, &index)?;
        Ok(())
    }

    /// Fetch template metadata for `label` and download every template not yet
    /// on disk. Returns `false` when the service has nothing for the label.
    /// Individual template downloads that fail are logged and left out.
    pub async fn pull_element(
        &mut self,
        service: &dyn ClassifierService,
        api_key: &str,
        label: &str,
    ) -> LocatorResult<bool> {
        let data = service
            .element_template_data(&TemplateDataRequest {
                label: label.to_string(),
                api_key: api_key.to_string(),
            })
            .await?;
        if !data.success {
            tracing::debug!(label, message = ?data.message, "no template data for label");
            return Ok(false);
        }

        let mut stored: Vec<TemplateRef> = Vec::with_capacity(data.templates.len());
        for template in data.templates {
            match self.ensure_template(service, api_key, label, &template.template_uuid).await {
                Ok(()) => stored.push(template),
                Err(e) => {
                    tracing::warn!(label, template = %template.template_uuid, error = %e, "template download failed")
                }
            }
        }

        tracing::info!(label, templates = stored.len(), "templates pulled");
        self.upsert_record(
            label,
            ElementRecord {
                templates: stored,
                action_infos: data.action_infos,
                updated_at: None,
            },
        );
        self.save()?;
        Ok(true)
    }

    async fn ensure_template(
        &self,
        service: &dyn ClassifierService,
        api_key: &str,
        label: &str,
        template_uuid: &str,
    ) -> LocatorResult<()> {
        if self.template_path(template_uuid)?.exists() {
            return Ok(());
        }
        let resp = service
            .retrieve_element(&RetrieveElementRequest {
                screenshot_uuid: template_uuid.to_string(),
                label: label.to_string(),
                api_key: api_key.to_string(),
            })
            .await?;
        let b64 = match resp.screenshot_b64 {
            Some(b64) if resp.success => b64,
            _ => {
                return Err(LocatorError::RemoteFailure(
                    resp.message.unwrap_or_else(|| "template not returned".into()),
                ))
            }
        };
        self.store_template(template_uuid, &decode_base64(&b64)?)?;
        Ok(())
    }
}
