//! Report module - scored output, sector strategy and terminal summaries

pub mod export;
pub mod sector;
pub mod summary;

pub use export::*;
pub use sector::*;
pub use summary::*;
