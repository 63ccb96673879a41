//! In-memory storage module
//!
//! Provides the key-value maps, expiry bookkeeping and KEYS pattern matching.
//! Nothing here is synchronized; see `cache::LocalCache` for the shared handle.

mod clock;
mod memory;
mod pattern;

pub use clock::{Clock, ManualClock, SystemClock};
pub use memory::{MemoryStore, StoreStats};
pub use pattern::KeyPattern;
