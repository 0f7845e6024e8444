//! 用量计数存储
//!
//! 以 (key_name, 日期) 为键的字符计数，只增不减。日期翻转即视为重置，
//! 旧日期的数据保留用于统计报表。

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use chrono::NaiveDate;
use dashmap::DashMap;
use redb::{Database, ReadableTable, TableDefinition};

use crate::translation::config::TranslationConfig;
use crate::translation::error::{helpers, TranslationResult};

/// key_name → 日期 → 字符数
pub type UsageSnapshot = BTreeMap<String, BTreeMap<NaiveDate, u64>>;

/// 用量存储接口
///
/// `increment` 必须是原子的读-改-写
pub trait UsageStore: Send + Sync {
    /// 增加计数并返回增加后的值
    fn increment(&self, key_name: &str, date: NaiveDate, amount: u64) -> TranslationResult<u64>;

    fn get(&self, key_name: &str, date: NaiveDate) -> TranslationResult<u64>;

    fn snapshot(&self) -> TranslationResult<UsageSnapshot>;

    fn backend_name(&self) -> &'static str;
}

/// 根据配置选择存储：设置了路径时使用 redb，否则使用进程内存储
pub fn open_store(config: &TranslationConfig) -> TranslationResult<Arc<dyn UsageStore>> {
    match &config.usage_store_path {
        Some(path) => {
            let path = shellexpand::tilde(path).into_owned();
            tracing::info!("使用持久化用量存储: {}", path);
            Ok(Arc::new(RedbUsageStore::open(path)?))
        }
        None => {
            tracing::info!("使用进程内用量存储");
            Ok(Arc::new(InMemoryUsageStore::new()))
        }
    }
}

// ============================================================================
// 进程内存储
// ============================================================================

/// 进程内用量存储，只适用于单实例部署
#[derive(Debug, Default)]
pub struct InMemoryUsageStore {
    counters: DashMap<(String, NaiveDate), u64>,
}

impl InMemoryUsageStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl UsageStore for InMemoryUsageStore {
    fn increment(&self, key_name: &str, date: NaiveDate, amount: u64) -> TranslationResult<u64> {
        let mut counter = self.counters.entry((key_name.to_string(), date)).or_insert(0);
        *counter = counter.saturating_add(amount);
        Ok(*counter)
    }

    fn get(&self, key_name: &str, date: NaiveDate) -> TranslationResult<u64> {
        Ok(self
            .counters
            .get(&(key_name.to_string(), date))
            .map_or(0, |count| *count))
    }

    fn snapshot(&self) -> TranslationResult<UsageSnapshot> {
        let mut snapshot = UsageSnapshot::new();
        for entry in self.counters.iter() {
            let (key_name, date) = entry.key();
            snapshot
                .entry(key_name.clone())
                .or_default()
                .insert(*date, *entry.value());
        }
        Ok(snapshot)
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

// ============================================================================
// redb 持久化存储
// ============================================================================

const USAGE_TABLE: TableDefinition<(&str, &str), u64> = TableDefinition::new("usage");
const DATE_FORMAT: &str = "%Y-%m-%d";

/// 基于 redb 的单文件持久化存储，进程重启后数据保留
pub struct RedbUsageStore {
    db: Database,
}

impl RedbUsageStore {
    pub fn open<P: AsRef<Path>>(path: P) -> TranslationResult<Self> {
        let db = Database::create(path.as_ref())?;

        // 预先建表，之后的只读事务可以直接打开
        let write_txn = db.begin_write()?;
        write_txn.open_table(USAGE_TABLE)?;
        write_txn.commit()?;

        Ok(Self { db })
    }
}

impl UsageStore for RedbUsageStore {
    fn increment(&self, key_name: &str, date: NaiveDate, amount: u64) -> TranslationResult<u64> {
        let date = date.format(DATE_FORMAT).to_string();
        let write_txn = self.db.begin_write()?;
        let total = {
            let mut table = write_txn.open_table(USAGE_TABLE)?;
            let current = table
                .get((key_name, date.as_str()))?
                .map_or(0, |count| count.value());
            let total = current.saturating_add(amount);
            table.insert((key_name, date.as_str()), total)?;
            total
        };
        write_txn.commit()?;
        Ok(total)
    }

    fn get(&self, key_name: &str, date: NaiveDate) -> TranslationResult<u64> {
        let date = date.format(DATE_FORMAT).to_string();
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(USAGE_TABLE)?;
        let count = table
            .get((key_name, date.as_str()))?
            .map_or(0, |count| count.value());
        Ok(count)
    }

    fn snapshot(&self) -> TranslationResult<UsageSnapshot> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(USAGE_TABLE)?;

        let mut snapshot = UsageSnapshot::new();
        for item in table.iter()? {
            let (key, count) = item?;
            let (key_name, date) = key.value();
            let date = NaiveDate::parse_from_str(date, DATE_FORMAT)
                .map_err(|e| helpers::storage_error(format!("无效的日期 '{}': {}", date, e)))?;
            snapshot
                .entry(key_name.to_string())
                .or_default()
                .insert(date, count.value());
        }

        Ok(snapshot)
    }

    fn backend_name(&self) -> &'static str {
        "redb"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, d).unwrap()
    }

    fn exercise(store: &dyn UsageStore) {
        assert_eq!(store.get("userA", day(1)).unwrap(), 0);
        assert_eq!(store.increment("userA", day(1), 10).unwrap(), 10);
        assert_eq!(store.increment("userA", day(1), 5).unwrap(), 15);
        store.increment("userA", day(2), 7).unwrap();
        store.increment("admin", day(2), 1).unwrap();

        assert_eq!(store.get("userA", day(1)).unwrap(), 15);

        let snapshot = store.snapshot().unwrap();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot["userA"][&day(1)], 15);
        assert_eq!(snapshot["userA"][&day(2)], 7);
        assert_eq!(snapshot["admin"][&day(2)], 1);
    }

    #[test]
    fn test_in_memory_store() {
        let store = InMemoryUsageStore::new();
        exercise(&store);
        assert_eq!(store.backend_name(), "memory");
    }

    #[test]
    fn test_redb_store() {
        let dir = TempDir::new().unwrap();
        let store = RedbUsageStore::open(dir.path().join("usage.redb")).unwrap();
        exercise(&store);
        assert_eq!(store.backend_name(), "redb");
    }

    #[test]
    fn test_redb_store_survives_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("usage.redb");

        {
            let store = RedbUsageStore::open(&path).unwrap();
            store.increment("reader", day(3), 42).unwrap();
        }

        let store = RedbUsageStore::open(&path).unwrap();
        assert_eq!(store.get("reader", day(3)).unwrap(), 42);
    }

    #[test]
    fn test_concurrent_increments_are_not_lost() {
        let store = Arc::new(InMemoryUsageStore::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        store.increment("userA", day(1), 1).unwrap();
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(store.get("userA", day(1)).unwrap(), 800);
    }
}
