//! Cache Module
//!
//! Everything the virtualized grid needs to show a dataset without
//! holding it in memory.
//!
//! ## Responsibilities
//! - Grid arithmetic: columns from width, rows, content height, visible window
//! - Lazily fetch fixed-size pages into a sparse index → record map
//! - Forward-fill prefetch from the visible window plus a lookahead margin
//! - Persist the scroll offset (debounced) and restore it once

mod layout;
mod page_cache;
mod scroll;

pub use layout::{columns_for, GridLayout};
pub use page_cache::PageCache;
pub use scroll::{Debouncer, ScrollMemory};
