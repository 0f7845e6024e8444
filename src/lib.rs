//! # Hanzi Bridge
//!
//! 中文文本翻译库：按句或按块切分原文，并发调用生成服务翻译为目标语言（可附带英文），
//! 离线标注拼音，并按密钥计量每日字符额度。
//!
//! ## 模块组织
//!
//! - `translation` - 分段、翻译网关、并发编排、用量计量与结果组装
//! - `env` - 类型安全的环境变量
//! - `utils` - 输入解码等工具函数

pub mod env;
pub mod translation;
pub mod utils;

pub use translation::{
    ConfigManager, Document, TranslateRequest, TranslationError, TranslationMode, TranslationResult,
    TranslationService,
};
