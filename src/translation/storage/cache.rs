//! 会话级翻译缓存
//!
//! 以 (文本, 源语言, 目标语言, 是否需要英文) 为键去重相同请求。
//! 基于 `DashMap` 的并发映射；两个任务同时未命中同一键时各自请求一次远端，
//! 结果相同，后写入者覆盖先写入者。

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use dashmap::DashMap;

// ============================================================================
// 核心类型
// ============================================================================

/// 缓存键
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    /// 整段翻译请求的键
    pub fn translation(text: &str, source_lang: &str, target_lang: &str, want_secondary: bool) -> Self {
        Self::hashed("trans", &[text, source_lang, target_lang, if want_secondary { "1" } else { "0" }])
    }

    /// 单词查询的键
    pub fn word(word: &str, source_lang: &str, target_lang: &str) -> Self {
        Self::hashed("word", &[word, source_lang, target_lang])
    }

    fn hashed(namespace: &str, parts: &[&str]) -> Self {
        let mut hasher = blake3::Hasher::new();
        for part in parts {
            hasher.update(part.as_bytes());
            // 分隔符避免 ("ab","c") 与 ("a","bc") 冲突
            hasher.update(&[0u8]);
        }
        Self(format!("{}:{}", namespace, hasher.finalize().to_hex()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// 缓存条目
#[derive(Debug, Clone)]
struct CacheEntry<V> {
    value: V,
    created_at: Instant,
    last_accessed: Instant,
    access_count: u64,
}

impl<V> CacheEntry<V> {
    fn new(value: V) -> Self {
        let now = Instant::now();
        Self {
            value,
            created_at: now,
            last_accessed: now,
            access_count: 0,
        }
    }

    fn is_expired(&self, ttl: Duration) -> bool {
        self.created_at.elapsed() > ttl
    }

    fn touch(&mut self) {
        self.access_count += 1;
        self.last_accessed = Instant::now();
    }
}

/// 缓存统计信息
#[derive(Debug, Default, Clone, PartialEq)]
pub struct CacheStats {
    pub total_requests: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub total_entries: usize,
    pub evictions: u64,
}

impl CacheStats {
    /// 计算缓存命中率
    pub fn hit_rate(&self) -> f64 {
        if self.total_requests == 0 {
            0.0
        } else {
            self.cache_hits as f64 / self.total_requests as f64
        }
    }
}

/// 翻译缓存
pub struct TranslationCache<V> {
    entries: DashMap<CacheKey, CacheEntry<V>>,
    max_size: usize,
    ttl: Duration,
    enabled: bool,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

// ============================================================================
// 实现
// ============================================================================

impl<V: Clone> TranslationCache<V> {
    pub fn new(max_size: usize, ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            max_size: max_size.max(1),
            ttl,
            enabled: true,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    /// 不缓存任何内容的实例
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::new(1, Duration::ZERO)
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// 获取缓存值，过期条目在读取时删除
    pub fn get(&self, key: &CacheKey) -> Option<V> {
        if !self.enabled {
            return None;
        }

        let hit = match self.entries.get_mut(key) {
            Some(mut entry) if !entry.is_expired(self.ttl) => {
                entry.touch();
                Some(entry.value.clone())
            }
            Some(_) => None,
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                return None;
            }
        };

        match hit {
            Some(value) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                metrics::counter!("translation_cache_hits").increment(1);
                Some(value)
            }
            None => {
                self.entries.remove(key);
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// 插入缓存值，达到容量时驱逐最久未访问的条目
    pub fn insert(&self, key: CacheKey, value: V) {
        if !self.enabled {
            return;
        }

        if !self.entries.contains_key(&key) && self.entries.len() >= self.max_size {
            self.evict_lru();
        }

        self.entries.insert(key, CacheEntry::new(value));
    }

    pub fn contains_key(&self, key: &CacheKey) -> bool {
        self.entries
            .get(key)
            .map_or(false, |entry| !entry.is_expired(self.ttl))
    }

    pub fn size(&self) -> usize {
        self.entries.len()
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    /// 清理过期条目
    pub fn cleanup_expired(&self) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired(self.ttl));
        let removed = before.saturating_sub(self.entries.len());
        self.evictions.fetch_add(removed as u64, Ordering::Relaxed);
        removed
    }

    pub fn get_stats(&self) -> CacheStats {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        CacheStats {
            total_requests: hits + misses,
            cache_hits: hits,
            cache_misses: misses,
            total_entries: self.entries.len(),
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }

    /// LRU驱逐算法
    fn evict_lru(&self) {
        let oldest_key = self
            .entries
            .iter()
            .min_by_key(|entry| entry.value().last_accessed)
            .map(|entry| entry.key().clone());

        if let Some(key) = oldest_key {
            self.entries.remove(&key);
            self.evictions.fetch_add(1, Ordering::Relaxed);
            tracing::debug!("缓存已满，驱逐条目 {}", key.as_str());
        }
    }
}
