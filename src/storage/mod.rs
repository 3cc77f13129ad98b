//! In-process state: the TTL caches shared by the validator and analyzer,
//! and the append-only generation history.

pub mod cache;
pub mod history;

pub use cache::{CacheEntry, CacheFill, CacheStats, Clock, ManualClock, SystemClock, TtlCache};
pub use history::{GenerationHistory, GenerationStats, HistoryEntry};
