pub mod geographic;
pub mod local_classifier;
pub mod screenshot;
pub mod template_cache;
pub mod template_matcher;
pub mod types;

pub use local_classifier::LocalClassifier;
pub use screenshot::Capture;
pub use template_cache::LocalTemplateCache;
pub use template_matcher::TemplateMatcher;
