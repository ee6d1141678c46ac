//! Standards resolution: N precedence layers merged into one attributed view.

pub mod cache;
pub mod diff;
pub mod layer;
pub mod resolve;

pub use cache::{CacheStatus, ResolutionCache};
pub use diff::{diff_layers, KeyChange, KeyDiff};
pub use layer::StandardsLayer;
pub use resolve::{resolve, Resolution, ResolvedStandard};
