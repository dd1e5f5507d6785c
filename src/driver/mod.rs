pub mod query;
pub mod traits;

pub use query::{ElementQuery, PointerEvent, PointerEventKind, Viewport};
pub use traits::AutomationDriver;
