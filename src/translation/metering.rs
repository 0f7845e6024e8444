//! 用量计量与额度控制
//!
//! 凭据先解析为稳定的 key_name，所有计数都按 key_name 记账，
//! 同一个底层密钥的多次登录会累计到同一个计数上。

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use chrono::NaiveDate;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::translation::config::{constants, AccessConfig};
use crate::translation::error::{TranslationError, TranslationResult};
use crate::translation::storage::usage::{UsageSnapshot, UsageStore};

/// 额度等级
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    #[default]
    Default,
    Premium,
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Tier::Default => write!(f, "default"),
            Tier::Premium => write!(f, "premium"),
        }
    }
}

/// 管理员统计视图
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StatsSnapshot {
    pub total_distinct_keys: usize,
    pub per_date_totals: BTreeMap<NaiveDate, u64>,
    pub per_key_per_date_totals: UsageSnapshot,
}

impl StatsSnapshot {
    fn from_usage(usage: UsageSnapshot) -> Self {
        let mut per_date_totals = BTreeMap::new();
        for dates in usage.values() {
            for (date, count) in dates {
                *per_date_totals.entry(*date).or_insert(0) += count;
            }
        }

        Self {
            total_distinct_keys: usage.len(),
            per_date_totals,
            per_key_per_date_totals: usage,
        }
    }

    /// 所有身份、所有日期的字符总数
    pub fn total_characters(&self) -> u64 {
        self.per_date_totals.values().sum()
    }
}

/// 单个身份的当日用量
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UsageReport {
    pub key_name: String,
    pub tier: Tier,
    pub used_today: u64,
    pub daily_limit: u64,
}

impl UsageReport {
    pub fn remaining(&self) -> u64 {
        self.daily_limit.saturating_sub(self.used_today)
    }
}

impl fmt::Display for UsageReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Today's usage: {}/{}", self.used_today, self.daily_limit)?;
        if self.tier == Tier::Premium {
            write!(f, " (Premium)")?;
        }
        Ok(())
    }
}

/// 计费字符数：去掉空白后计数，需要英文且目标语言不是英文时翻倍
pub fn character_cost(text: &str, include_secondary: bool, target_lang: &str) -> u64 {
    let count = text.chars().filter(|ch| !ch.is_whitespace()).count() as u64;
    if include_secondary && !target_lang.eq_ignore_ascii_case("en") {
        count * 2
    } else {
        count
    }
}

type Clock = Arc<dyn Fn() -> NaiveDate + Send + Sync>;

/// 用量计量器
pub struct UsageMeter {
    access: AccessConfig,
    store: Arc<dyn UsageStore>,
    /// 每个 key_name 一把锁，保证 admit + record 为一个整体
    key_locks: DashMap<String, Arc<Mutex<()>>>,
    clock: Clock,
}

impl UsageMeter {
    pub fn new(access: AccessConfig, store: Arc<dyn UsageStore>) -> Self {
        Self {
            access,
            store,
            key_locks: DashMap::new(),
            clock: Arc::new(|| chrono::Local::now().date_naive()),
        }
    }

    /// 固定 "今天"，用于测试日期翻转
    pub fn with_clock<F>(mut self, clock: F) -> Self
    where
        F: Fn() -> NaiveDate + Send + Sync + 'static,
    {
        self.clock = Arc::new(clock);
        self
    }

    pub fn today(&self) -> NaiveDate {
        (self.clock)()
    }

    pub fn store(&self) -> &Arc<dyn UsageStore> {
        &self.store
    }

    /// 凭据 → key_name；无法识别的凭据以自身作为 key_name
    pub fn resolve_identity(&self, raw_credential: &str) -> String {
        if self.access.admin_secret.as_deref() == Some(raw_credential) {
            return constants::ADMIN_KEY_NAME.to_string();
        }

        self.access
            .api_keys
            .iter()
            .filter(|(_, secret)| secret.as_str() == raw_credential)
            .map(|(label, _)| label)
            .min()
            .cloned()
            .unwrap_or_else(|| raw_credential.to_string())
    }

    /// 凭据是否为已配置的管理员或命名密钥
    pub fn is_known_credential(&self, raw_credential: &str) -> bool {
        self.access.admin_secret.as_deref() == Some(raw_credential)
            || self.access.api_keys.values().any(|secret| secret == raw_credential)
    }

    pub fn is_admin(&self, key_name: &str) -> bool {
        key_name == constants::ADMIN_KEY_NAME
    }

    pub fn tier_of(&self, key_name: &str) -> Tier {
        if self.is_admin(key_name) {
            return Tier::Premium;
        }
        self.access.user_tiers.get(key_name).copied().unwrap_or_default()
    }

    pub fn daily_limit(&self, tier: Tier) -> u64 {
        match tier {
            Tier::Default => self.access.usage_limits.default_daily_limit,
            Tier::Premium => self.access.usage_limits.premium_daily_limit,
        }
    }

    pub fn current_usage(&self, key_name: &str) -> TranslationResult<u64> {
        self.current_usage_on(key_name, self.today())
    }

    pub fn current_usage_on(&self, key_name: &str, date: NaiveDate) -> TranslationResult<u64> {
        self.store.get(key_name, date)
    }

    pub fn admit(&self, key_name: &str, request_cost: u64) -> TranslationResult<bool> {
        let used = self.current_usage(key_name)?;
        let limit = self.daily_limit(self.tier_of(key_name));
        Ok(used.saturating_add(request_cost) <= limit)
    }

    /// 记入今日用量，调用前必须已通过 `admit`
    pub fn record(&self, key_name: &str, cost: u64) -> TranslationResult<u64> {
        let total = self.store.increment(key_name, self.today(), cost)?;
        metrics::counter!("usage_characters_recorded").increment(cost);
        tracing::debug!("记录用量: {} +{} = {}", key_name, cost, total);
        Ok(total)
    }

    /// 在同一个临界区内完成额度检查和记账
    pub async fn admit_and_record(&self, key_name: &str, cost: u64) -> TranslationResult<UsageReport> {
        let lock = self
            .key_locks
            .entry(key_name.to_string())
            .or_default()
            .clone();

        let result = {
            let _guard = lock.lock().await;
            self.check_and_record(key_name, cost)
        };

        // 没有其他请求持有或等待时移除该键的锁
        drop(lock);
        self.key_locks.remove_if(key_name, |_, lock| Arc::strong_count(lock) == 1);

        result
    }

    fn check_and_record(&self, key_name: &str, cost: u64) -> TranslationResult<UsageReport> {
        let tier = self.tier_of(key_name);
        let limit = self.daily_limit(tier);
        let used = self.current_usage(key_name)?;

        if used.saturating_add(cost) > limit {
            tracing::info!("额度不足: {} 已用 {}，请求 {}，上限 {}", key_name, used, cost, limit);
            return Err(TranslationError::QuotaExceeded {
                key_name: key_name.to_string(),
                used,
                requested: cost,
                limit,
            });
        }

        let used_today = self.record(key_name, cost)?;

        Ok(UsageReport {
            key_name: key_name.to_string(),
            tier,
            used_today,
            daily_limit: limit,
        })
    }

    pub fn usage_report(&self, key_name: &str) -> TranslationResult<UsageReport> {
        let tier = self.tier_of(key_name);
        Ok(UsageReport {
            key_name: key_name.to_string(),
            tier,
            used_today: self.current_usage(key_name)?,
            daily_limit: self.daily_limit(tier),
        })
    }

    pub fn stats_snapshot(&self) -> TranslationResult<StatsSnapshot> {
        Ok(StatsSnapshot::from_usage(self.store.snapshot()?))
    }
}
