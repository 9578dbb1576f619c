pub mod resolver;
pub mod unique;

pub use resolver::{Selector, SelectorType, resolve_selector};
pub use unique::{Degraded, SelectorStrategy, UniqueSelector, generate_unique_selector};
