//! 翻译服务
//!
//! 应用根对象：持有网关（连同其缓存）、用量计量器和分段器，由调用方构造一次后按引用传递。
//! 一次请求依次经过：额度准入 → 分段 → 并发翻译 → 组装。
//!
//! ```rust,no_run
//! use hanzi_bridge::translation::config::ConfigManager;
//! use hanzi_bridge::translation::core::service::{TranslateRequest, TranslationService};
//! use hanzi_bridge::translation::pipeline::NoProgress;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ConfigManager::new()?.into_config();
//! let service = TranslationService::from_config(config)?;
//!
//! let request = TranslateRequest::new("reader-secret", "第一句。第二句！", "vi");
//! let outcome = service.translate(&request, &NoProgress).await?;
//! println!("{}", outcome.usage);
//! # Ok(())
//! # }
//! ```

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use super::backend::{GeminiBackend, GenerationBackend};
use super::gateway::{GatewayStatsSnapshot, TranslationGateway};
use crate::translation::config::{AppConfig, Language, TranslationConfig};
use crate::translation::error::{helpers, ErrorStats, TranslationError, TranslationResult};
use crate::translation::metering::{character_cost, StatsSnapshot, UsageMeter, UsageReport};
use crate::translation::phonetic::PhoneticStyle;
use crate::translation::pipeline::{
    assemble, assemble_interactive, BatchOptions, ChunkOrchestrator, Document, ProgressSink, SegmentMode,
    Segmenter,
};
use crate::translation::storage::cache::CacheStats;
use crate::translation::storage::usage::{open_store, UsageStore};

// ============================================================================
// 请求与结果
// ============================================================================

/// 翻译模式
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TranslationMode {
    /// 按句切分，逐段翻译并附带拼音
    #[default]
    Standard,
    /// 长文档按块切分
    Block,
    /// 逐字查询释义
    Interactive,
}

impl TranslationMode {
    fn segment_mode(self) -> SegmentMode {
        match self {
            TranslationMode::Block => SegmentMode::Block,
            _ => SegmentMode::Sentence,
        }
    }
}

impl fmt::Display for TranslationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TranslationMode::Standard => write!(f, "standard"),
            TranslationMode::Block => write!(f, "block"),
            TranslationMode::Interactive => write!(f, "interactive"),
        }
    }
}

impl FromStr for TranslationMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "standard" => Ok(TranslationMode::Standard),
            "block" => Ok(TranslationMode::Block),
            "interactive" => Ok(TranslationMode::Interactive),
            other => Err(format!("unknown mode '{}'", other)),
        }
    }
}

/// 一次翻译请求
#[derive(Debug, Clone)]
pub struct TranslateRequest {
    pub credential: String,
    pub text: String,
    /// 语言名称或代码
    pub target_lang: String,
    pub include_secondary: bool,
    pub mode: TranslationMode,
    pub phonetic: PhoneticStyle,
}

impl TranslateRequest {
    pub fn new(credential: impl Into<String>, text: impl Into<String>, target_lang: impl Into<String>) -> Self {
        Self {
            credential: credential.into(),
            text: text.into(),
            target_lang: target_lang.into(),
            include_secondary: true,
            mode: TranslationMode::Standard,
            phonetic: PhoneticStyle::ToneMarks,
        }
    }

    pub fn with_secondary(mut self, include: bool) -> Self {
        self.include_secondary = include;
        self
    }

    pub fn with_mode(mut self, mode: TranslationMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_phonetic(mut self, style: PhoneticStyle) -> Self {
        self.phonetic = style;
        self
    }
}

/// 翻译结果与本次计费
#[derive(Debug, Clone, Serialize)]
pub struct TranslationOutcome {
    pub document: Document,
    pub usage: UsageReport,
    pub cost: u64,
    pub target: Language,
    pub secondary_included: bool,
}

// ============================================================================
// 服务
// ============================================================================

pub struct TranslationService {
    config: TranslationConfig,
    gateway: TranslationGateway,
    meter: UsageMeter,
    segmenter: Segmenter,
    cancel: CancellationToken,
    stats: ServiceStats,
    errors: Mutex<ErrorStats>,
}

impl TranslationService {
    /// 使用注入的生成后端和用量存储创建服务
    pub fn new(
        config: AppConfig,
        backend: Arc<dyn GenerationBackend>,
        store: Arc<dyn UsageStore>,
    ) -> TranslationResult<Self> {
        config.translation.validate()?;
        config.access.validate()?;

        let AppConfig { translation, access } = config;
        tracing::info!(
            "初始化翻译服务: 后端 {}, 用量存储 {}",
            backend.name(),
            store.backend_name()
        );

        Ok(Self {
            gateway: TranslationGateway::new(backend, &translation),
            meter: UsageMeter::new(access, store),
            segmenter: Segmenter::from_config(&translation),
            cancel: CancellationToken::new(),
            stats: ServiceStats::default(),
            errors: Mutex::new(ErrorStats::default()),
            config: translation,
        })
    }

    /// 按配置创建 Gemini 后端和用量存储
    pub fn from_config(config: AppConfig) -> TranslationResult<Self> {
        let backend = Arc::new(GeminiBackend::from_config(&config.translation)?);
        let store = open_store(&config.translation)?;
        Self::new(config, backend, store)
    }

    /// 替换网关，用于注入自定义重试策略
    pub fn with_gateway<F>(mut self, configure: F) -> Self
    where
        F: FnOnce(TranslationGateway) -> TranslationGateway,
    {
        self.gateway = configure(self.gateway);
        self
    }

    /// 固定计量日期
    pub fn with_clock<F>(mut self, clock: F) -> Self
    where
        F: Fn() -> NaiveDate + Send + Sync + 'static,
    {
        self.meter = self.meter.with_clock(clock);
        self
    }

    pub fn config(&self) -> &TranslationConfig {
        &self.config
    }

    pub fn gateway(&self) -> &TranslationGateway {
        &self.gateway
    }

    pub fn meter(&self) -> &UsageMeter {
        &self.meter
    }

    /// 取消后，尚未完成的片段以 "[Cancelled]" 结果返回
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn resolve_target(&self, target: &str) -> TranslationResult<Language> {
        Language::target(target)
            .filter(|lang| !lang.code.eq_ignore_ascii_case(&self.config.source_lang))
            .ok_or_else(|| helpers::validation_error(format!("不支持的目标语言: {}", target)))
    }

    /// 目标语言本身就是英文时不再单独请求英文译文
    fn wants_secondary(&self, target: &Language, include_secondary: bool) -> bool {
        let wanted = self.config.wants_secondary_for(target.code, include_secondary);
        if include_secondary && !wanted {
            tracing::warn!("目标语言为 {}，省略重复的英文译文", target.name);
        }
        wanted
    }

    /// 不执行翻译，只计算请求的计费字符数
    pub fn quote(&self, text: &str, target_lang: &str, include_secondary: bool) -> TranslationResult<u64> {
        let target = self.resolve_target(target_lang)?;
        let want_secondary = self.wants_secondary(&target, include_secondary);
        Ok(character_cost(text, want_secondary, target.code))
    }

    /// 处理一次翻译请求
    ///
    /// 额度不足或输入为空时在派发任何翻译前返回错误；单个片段失败只体现在文档对应位置
    pub async fn translate(
        &self,
        request: &TranslateRequest,
        progress: &dyn ProgressSink,
    ) -> TranslationResult<TranslationOutcome> {
        match self.run(request, progress).await {
            Ok(outcome) => Ok(outcome),
            Err(error) => {
                self.errors
                    .lock()
                    .unwrap_or_else(|poisoned| poisoned.into_inner())
                    .record_error(&error);
                helpers::log_error(error)
            }
        }
    }

    async fn run(&self, request: &TranslateRequest, progress: &dyn ProgressSink) -> TranslationResult<TranslationOutcome> {
        let started = Instant::now();
        self.stats.requests.fetch_add(1, Ordering::Relaxed);

        let target = self.resolve_target(&request.target_lang)?;
        let key_name = self.meter.resolve_identity(&request.credential);
        let interactive = request.mode == TranslationMode::Interactive;
        let want_secondary = !interactive && self.wants_secondary(&target, request.include_secondary);

        let work = if interactive {
            Work::Words(self.segmenter.tokenize_words(&request.text))
        } else {
            Work::Chunks(self.segmenter.segment(&request.text, request.mode.segment_mode()))
        };
        if work.is_empty() {
            self.stats.rejected_requests.fetch_add(1, Ordering::Relaxed);
            return Err(TranslationError::SegmentationEmpty);
        }

        // 服务已取消时不再计费
        if self.cancel.is_cancelled() {
            self.stats.rejected_requests.fetch_add(1, Ordering::Relaxed);
            return Err(TranslationError::Cancelled);
        }

        let cost = character_cost(&request.text, want_secondary, target.code);
        let usage = match self.meter.admit_and_record(&key_name, cost).await {
            Ok(usage) => usage,
            Err(error) => {
                self.stats.rejected_requests.fetch_add(1, Ordering::Relaxed);
                return Err(error);
            }
        };
        self.stats.characters_billed.fetch_add(cost, Ordering::Relaxed);

        tracing::info!(
            "开始翻译: {} 模式, 目标 {}, 英文 {}, 计费 {} 字符 ({})",
            request.mode,
            target.name,
            want_secondary,
            cost,
            usage
        );

        let cancel = self.cancel.child_token();
        let document = match work {
            Work::Chunks(chunks) => {
                let concurrency = match request.mode {
                    TranslationMode::Block => self.config.block_concurrency,
                    _ => self.config.max_concurrent_requests,
                };
                let options = BatchOptions {
                    target_lang: target.code.to_string(),
                    want_secondary,
                    phonetic: (request.mode == TranslationMode::Standard).then_some(request.phonetic),
                };

                let results = ChunkOrchestrator::new(concurrency)
                    .translate_all(&self.gateway, chunks, &options, progress, &cancel)
                    .await
                    .map_err(|error| {
                        self.stats.failed_requests.fetch_add(1, Ordering::Relaxed);
                        error
                    })?;

                let errored = results.iter().filter(|result| !result.is_ok()).count();
                self.stats.chunks_translated.fetch_add(results.len() - errored, Ordering::Relaxed);
                self.stats.chunks_errored.fetch_add(errored, Ordering::Relaxed);
                assemble(results)
            }
            Work::Words(tokens) => {
                let words = ChunkOrchestrator::new(self.config.interactive_concurrency)
                    .lookup_all(
                        &self.gateway,
                        tokens,
                        &self.config.source_lang,
                        target.code,
                        request.phonetic,
                        progress,
                        &cancel,
                    )
                    .await
                    .map_err(|error| {
                        self.stats.failed_requests.fetch_add(1, Ordering::Relaxed);
                        error
                    })?;
                self.stats
                    .words_looked_up
                    .fetch_add(words.iter().filter(|word| !word.is_paragraph_break()).count(), Ordering::Relaxed);
                assemble_interactive(words)
            }
        };

        let elapsed = started.elapsed();
        metrics::histogram!("translation_request_seconds").record(elapsed.as_secs_f64());
        self.stats.add_processing_time(elapsed);
        tracing::info!("翻译完成，耗时 {:?}", elapsed);

        Ok(TranslationOutcome {
            document,
            usage,
            cost,
            target,
            secondary_included: want_secondary,
        })
    }

    pub fn usage_report(&self, credential: &str) -> TranslationResult<UsageReport> {
        self.meter.usage_report(&self.meter.resolve_identity(credential))
    }

    /// 管理员统计，非管理员凭据被拒绝
    pub fn admin_stats(&self, credential: &str) -> TranslationResult<StatsSnapshot> {
        let key_name = self.meter.resolve_identity(credential);
        if !self.meter.is_admin(&key_name) {
            return Err(helpers::validation_error("需要管理员凭据"));
        }
        self.meter.stats_snapshot()
    }

    pub fn get_stats(&self) -> &ServiceStats {
        &self.stats
    }

    /// 被拒绝或中止的请求按类别汇总
    pub fn error_stats(&self) -> ErrorStats {
        self.errors
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn gateway_stats(&self) -> GatewayStatsSnapshot {
        self.gateway.stats()
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.gateway.cache_stats()
    }

    /// 检查用量存储是否可读，以及近期片段失败率
    pub fn get_health(&self) -> HealthStatus {
        let mut components = HashMap::new();

        let store_level = match self.meter.current_usage(crate::translation::config::constants::ADMIN_KEY_NAME) {
            Ok(_) => HealthLevel::Healthy,
            Err(error) => {
                tracing::error!("用量存储不可用: {}", error);
                HealthLevel::Unhealthy
            }
        };
        components.insert("usage_store".to_string(), store_level);

        let snapshot = self.stats.snapshot();
        let total_chunks = snapshot.chunks_translated + snapshot.chunks_errored;
        let gateway_level = if total_chunks > 0 && snapshot.chunks_errored * 2 > total_chunks {
            HealthLevel::Degraded
        } else {
            HealthLevel::Healthy
        };
        components.insert("gateway".to_string(), gateway_level);

        let overall = if components.values().any(|&level| level == HealthLevel::Unhealthy) {
            HealthLevel::Unhealthy
        } else if components.values().all(|&level| level == HealthLevel::Healthy) {
            HealthLevel::Healthy
        } else {
            HealthLevel::Degraded
        };

        HealthStatus { overall, components }
    }
}

enum Work {
    Chunks(Vec<crate::translation::pipeline::Chunk>),
    Words(Vec<String>),
}

impl Work {
    fn is_empty(&self) -> bool {
        match self {
            Work::Chunks(chunks) => chunks.is_empty(),
            Work::Words(tokens) => tokens.is_empty(),
        }
    }
}

// ============================================================================
// 统计与健康检查
// ============================================================================

/// 服务统计信息（线程安全）
#[derive(Debug, Default)]
pub struct ServiceStats {
    pub requests: AtomicUsize,
    /// 额度不足或输入为空
    pub rejected_requests: AtomicUsize,
    /// 后端不可用而中止
    pub failed_requests: AtomicUsize,
    pub chunks_translated: AtomicUsize,
    pub chunks_errored: AtomicUsize,
    pub words_looked_up: AtomicUsize,
    pub characters_billed: AtomicU64,
    /// 微秒
    pub processing_time: AtomicU64,
}

impl ServiceStats {
    pub fn add_processing_time(&self, duration: Duration) {
        self.processing_time
            .fetch_add(duration.as_micros() as u64, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> ServiceStatsSnapshot {
        ServiceStatsSnapshot {
            requests: self.requests.load(Ordering::Relaxed),
            rejected_requests: self.rejected_requests.load(Ordering::Relaxed),
            failed_requests: self.failed_requests.load(Ordering::Relaxed),
            chunks_translated: self.chunks_translated.load(Ordering::Relaxed),
            chunks_errored: self.chunks_errored.load(Ordering::Relaxed),
            words_looked_up: self.words_looked_up.load(Ordering::Relaxed),
            characters_billed: self.characters_billed.load(Ordering::Relaxed),
            processing_time: Duration::from_micros(self.processing_time.load(Ordering::Relaxed)),
        }
    }

    pub fn reset(&self) {
        self.requests.store(0, Ordering::Relaxed);
        self.rejected_requests.store(0, Ordering::Relaxed);
        self.failed_requests.store(0, Ordering::Relaxed);
        self.chunks_translated.store(0, Ordering::Relaxed);
        self.chunks_errored.store(0, Ordering::Relaxed);
        self.words_looked_up.store(0, Ordering::Relaxed);
        self.characters_billed.store(0, Ordering::Relaxed);
        self.processing_time.store(0, Ordering::Relaxed);
    }
}

/// 统计数据快照
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServiceStatsSnapshot {
    pub requests: usize,
    pub rejected_requests: usize,
    pub failed_requests: usize,
    pub chunks_translated: usize,
    pub chunks_errored: usize,
    pub words_looked_up: usize,
    pub characters_billed: u64,
    pub processing_time: Duration,
}

/// 健康状态
#[derive(Debug, Clone)]
pub struct HealthStatus {
    pub overall: HealthLevel,
    pub components: HashMap<String, HealthLevel>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthLevel {
    Healthy,
    Degraded,
    Unhealthy,
}
