use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::geometry::BBox;

/// Pixel size of a capture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScreenDims {
    pub width: u32,
    pub height: u32,
}

impl ScreenDims {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

/// One template-matching hit, in screenshot (classifier) pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TemplateMatch {
    pub bbox: BBox,
    /// Similarity in [0,1]: `1 − normalised squared difference`.
    pub score: f64,
}

/// Reference to a stored template image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateRef {
    pub template_uuid: String,
}

/// Where an element was matched on a past capture, together with that
/// capture's size so the box can be normalised.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchedEntity {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    pub img_w: f64,
    pub img_h: f64,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ActionInfo {
    pub matched_entity: MatchedEntity,
}

impl ActionInfo {
    pub fn from_screen_box(bbox: BBox, screen: ScreenDims) -> Self {
        Self {
            matched_entity: MatchedEntity {
                x: bbox.x,
                y: bbox.y,
                width: bbox.width,
                height: bbox.height,
                img_w: screen.width as f64,
                img_h: screen.height as f64,
            },
        }
    }

    /// The recorded box as [0,1] screen fractions.
    pub fn normalized_box(&self) -> BBox {
        let e = &self.matched_entity;
        BBox::new(e.x, e.y, e.width, e.height).to_screen_fraction(e.img_w, e.img_h)
    }
}

/// Local cache entry for one element label.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ElementRecord {
    #[serde(default)]
    pub templates: Vec<TemplateRef>,
    #[serde(default)]
    pub action_infos: Vec<ActionInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl ElementRecord {
    /// Append templates not yet known and adopt the newer action history.
    /// Existing templates are never removed or rewritten.
    pub fn merge(&mut self, incoming: ElementRecord) {
        for template in incoming.templates {
            if !self.templates.contains(&template) {
                self.templates.push(template);
            }
        }
        if !incoming.action_infos.is_empty() {
            self.action_infos = incoming.action_infos;
        }
        self.updated_at = Some(Utc::now());
    }
}
