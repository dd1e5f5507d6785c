pub mod engine;
pub mod session;
pub mod state;

pub use engine::SmartLocator;
pub use session::Session;
pub use state::{LookupState, Prediction, Resolution, ResolutionTier};
