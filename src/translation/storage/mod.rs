//! 存储模块
//!
//! 会话内翻译缓存与按日计量的用量存储。

pub mod cache;
pub mod usage;

pub use cache::{CacheKey, CacheStats, TranslationCache};
pub use usage::{open_store, InMemoryUsageStore, RedbUsageStore, UsageSnapshot, UsageStore};
