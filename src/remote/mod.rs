pub mod http;
pub mod service;
pub mod types;

pub use http::HttpClassifierService;
pub use service::ClassifierService;
