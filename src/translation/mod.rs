//! 中文文本翻译
//!
//! - **config**: 配置、语言表与访问凭据
//! - **core**: 生成后端、翻译网关与服务根对象
//! - **pipeline**: 分段、并发编排与结果组装
//! - **storage**: 翻译缓存与用量存储
//! - **metering**: 按日额度计量
//! - **phonetic**: 离线拼音标注
//! - **error**: 错误处理
//!
//! # 基本用法
//!
//! ```rust,no_run
//! use hanzi_bridge::translation::{ConfigManager, TranslateRequest, TranslationService};
//! use hanzi_bridge::translation::pipeline::NoProgress;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let service = TranslationService::from_config(ConfigManager::new()?.into_config())?;
//! let request = TranslateRequest::new("reader-secret", "你好。", "Vietnamese");
//! let outcome = service.translate(&request, &NoProgress).await?;
//! for record in outcome.document.records() {
//!     println!("{} → {}", record.source, record.primary);
//! }
//! # Ok(())
//! # }
//! ```

// ============================================================================
// 子模块声明
// ============================================================================

pub mod config;
pub mod core;
pub mod error;
pub mod metering;
pub mod phonetic;
pub mod pipeline;
pub mod storage;

// ============================================================================
// 公共类型重新导出
// ============================================================================

pub use config::{AccessConfig, AppConfig, ConfigManager, Language, TranslationConfig, LANGUAGES};
pub use self::core::{
    GeminiBackend, GenerationBackend, TranslateRequest, TranslationGateway, TranslationMode, TranslationOutcome,
    TranslationService,
};
pub use error::{TranslationError, TranslationResult};
pub use metering::{StatsSnapshot, Tier, UsageMeter, UsageReport};
pub use phonetic::{annotate, PhoneticStyle};
pub use pipeline::{Document, Segmenter};
pub use storage::{InMemoryUsageStore, RedbUsageStore, UsageStore};
