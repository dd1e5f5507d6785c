pub mod coordinator;
pub mod element;

pub use element::ResolvedElement;
