use serde::{Deserialize, Serialize};

/// Element lookup understood by every automation backend.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "by", content = "value", rename_all = "snake_case")]
pub enum ElementQuery {
    /// Every element with the given tag name (`a`, `input`, ...).
    Tag(String),
    /// Every element on the page.
    Any,
    Css(String),
    XPath(String),
    Id(String),
    Name(String),
    ClassName(String),
    LinkText(String),
    AccessibilityId(String),
}

impl ElementQuery {
    /// Map a resolver priority entry to a query; `*` means any element.
    pub fn from_tag(tag: &str) -> Self {
        if tag == "*" {
            ElementQuery::Any
        } else {
            ElementQuery::Tag(tag.to_string())
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ElementQuery::Tag(_) => "tag_name",
            ElementQuery::Any => "any",
            ElementQuery::Css(_) => "css_selector",
            ElementQuery::XPath(_) => "xpath",
            ElementQuery::Id(_) => "id",
            ElementQuery::Name(_) => "name",
            ElementQuery::ClassName(_) => "class_name",
            ElementQuery::LinkText(_) => "link_text",
            ElementQuery::AccessibilityId(_) => "accessibility_id",
        }
    }

    pub fn value(&self) -> &str {
        match self {
            ElementQuery::Any => "*",
            ElementQuery::Tag(v)
            | ElementQuery::Css(v)
            | ElementQuery::XPath(v)
            | ElementQuery::Id(v)
            | ElementQuery::Name(v)
            | ElementQuery::ClassName(v)
            | ElementQuery::LinkText(v)
            | ElementQuery::AccessibilityId(v) => v,
        }
    }

    /// Label used when a selector lookup is registered without an explicit name,
    /// e.g. `element_name_by_locator_By_css_selector:_#cart_button`.
    pub fn default_label(&self) -> String {
        let sanitize = |s: &str| {
            s.chars()
                .map(|c| if c == '.' || c.is_whitespace() { '_' } else { c })
                .collect::<String>()
        };
        format!(
            "element_name_by_locator_By_{}:_{}",
            sanitize(self.kind()),
            sanitize(self.value())
        )
    }
}

/// Logical viewport size reported by the driver.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Viewport {
    pub width: f64,
    pub height: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PointerEventKind {
    Move,
    Down,
    Up,
}

/// Pointer event in viewport coordinates (driver space, scroll already removed).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PointerEvent {
    pub kind: PointerEventKind,
    pub x: f64,
    pub y: f64,
}

impl PointerEvent {
    pub fn new(kind: PointerEventKind, x: f64, y: f64) -> Self {
        Self { kind, x, y }
    }
}
