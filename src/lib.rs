pub mod config;
pub mod driver;
pub mod errors;
pub mod executor;
pub mod geometry;
pub mod locator;
pub mod perception;
pub mod remote;
pub mod resolver;

#[cfg(test)]
mod test_support;

pub use config::{load_config, LocatorConfig};
pub use driver::{AutomationDriver, ElementQuery};
pub use errors::{LocatorError, LocatorResult};
pub use executor::ResolvedElement;
pub use locator::SmartLocator;

/// Install a fmt subscriber filtered by `RUST_LOG` (default `info`).
/// Calling it again, or after the host installed its own, is a no-op.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .try_init();
}
