//! 翻译模块统一错误处理
//!
//! 提供结构化错误类型和错误处理机制。每个错误都能给出
//! 严重程度、类别以及是否值得重试，供网关重试策略和编排器占位结果使用。

use std::fmt;

use thiserror::Error;

/// 翻译错误类型
#[derive(Error, Debug, Clone)]
pub enum TranslationError {
    /// 配置错误
    #[error("配置错误: {0}")]
    ConfigError(String),

    /// 当日额度不足
    #[error("额度不足: {key_name} 今日已用 {used}，本次需要 {requested}，上限 {limit}")]
    QuotaExceeded {
        key_name: String,
        used: u64,
        requested: u64,
        limit: u64,
    },

    /// 输入切分后没有任何片段
    #[error("输入文本为空，无法切分")]
    SegmentationEmpty,

    /// 生成服务限流
    #[error("请求速率过快，已达到限制: {0}")]
    RateLimited(String),

    /// 生成服务因内容策略拒绝
    #[error("内容被安全策略拦截: {0}")]
    PolicyBlocked(String),

    /// 响应结构不符合预期
    #[error("响应格式错误: {0}")]
    MalformedResponse(String),

    /// 超时错误
    #[error("操作超时: {0}")]
    TimeoutError(String),

    /// 重试次数耗尽
    #[error("重试 {attempts} 次后仍然失败: {last}")]
    GatewayExhausted {
        attempts: usize,
        last: Box<TranslationError>,
    },

    /// 生成服务原样返回了输入
    #[error("译文与原文相同，疑似未翻译")]
    EchoedSource,

    /// 网络错误
    #[error("网络错误: {0}")]
    NetworkError(String),

    /// 用量存储错误
    #[error("存储错误: {0}")]
    StorageError(String),

    /// 请求已取消
    #[error("请求已取消")]
    Cancelled,

    /// 输入验证错误
    #[error("输入无效: {0}")]
    InvalidInput(String),

    /// 内部错误
    #[error("内部错误: {0}")]
    InternalError(String),
}

impl TranslationError {
    /// 检查错误是否可重试
    ///
    /// 只有限流、超时和网络类错误会进入退避重试，策略拦截永不重试
    pub fn is_retryable(&self) -> bool {
        match self {
            TranslationError::RateLimited(_) => true,
            TranslationError::TimeoutError(_) => true,
            TranslationError::NetworkError(_) => true,
            TranslationError::PolicyBlocked(_) => false,
            TranslationError::MalformedResponse(_) => false,
            TranslationError::EchoedSource => false,
            TranslationError::GatewayExhausted { .. } => false,
            TranslationError::QuotaExceeded { .. } => false,
            TranslationError::SegmentationEmpty => false,
            TranslationError::ConfigError(_) => false,
            TranslationError::StorageError(_) => false,
            TranslationError::Cancelled => false,
            TranslationError::InvalidInput(_) => false,
            TranslationError::InternalError(_) => false,
        }
    }

    /// 获取错误的严重程度
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            TranslationError::ConfigError(_) => ErrorSeverity::Critical,
            TranslationError::QuotaExceeded { .. } => ErrorSeverity::Info,
            TranslationError::SegmentationEmpty => ErrorSeverity::Info,
            TranslationError::RateLimited(_) => ErrorSeverity::Warning,
            TranslationError::PolicyBlocked(_) => ErrorSeverity::Warning,
            TranslationError::MalformedResponse(_) => ErrorSeverity::Warning,
            TranslationError::TimeoutError(_) => ErrorSeverity::Warning,
            TranslationError::GatewayExhausted { .. } => ErrorSeverity::Error,
            TranslationError::EchoedSource => ErrorSeverity::Warning,
            TranslationError::NetworkError(_) => ErrorSeverity::Warning,
            TranslationError::StorageError(_) => ErrorSeverity::Critical,
            TranslationError::Cancelled => ErrorSeverity::Info,
            TranslationError::InvalidInput(_) => ErrorSeverity::Info,
            TranslationError::InternalError(_) => ErrorSeverity::Critical,
        }
    }

    /// 获取错误类别
    pub fn category(&self) -> ErrorCategory {
        match self {
            TranslationError::ConfigError(_) => ErrorCategory::Configuration,
            TranslationError::QuotaExceeded { .. } => ErrorCategory::Quota,
            TranslationError::SegmentationEmpty => ErrorCategory::Input,
            TranslationError::RateLimited(_) => ErrorCategory::RateLimit,
            TranslationError::PolicyBlocked(_) => ErrorCategory::Policy,
            TranslationError::MalformedResponse(_) => ErrorCategory::Parsing,
            TranslationError::TimeoutError(_) => ErrorCategory::Timeout,
            TranslationError::GatewayExhausted { last, .. } => last.category(),
            TranslationError::EchoedSource => ErrorCategory::Parsing,
            TranslationError::NetworkError(_) => ErrorCategory::Network,
            TranslationError::StorageError(_) => ErrorCategory::Storage,
            TranslationError::Cancelled => ErrorCategory::Cancellation,
            TranslationError::InvalidInput(_) => ErrorCategory::Input,
            TranslationError::InternalError(_) => ErrorCategory::Internal,
        }
    }

    /// 配置或凭据错误会让所有片段以同样方式失败
    pub fn is_fatal(&self) -> bool {
        self.category() == ErrorCategory::Configuration
    }

    /// 对终端用户展示的占位文本
    ///
    /// "被拦截" 与 "失败" 必须在文档中可区分
    pub fn user_message(&self) -> String {
        match self {
            TranslationError::PolicyBlocked(_) => {
                "[Blocked: content rejected by the translation service's safety policy]".to_string()
            }
            TranslationError::GatewayExhausted { last, .. }
                if matches!(**last, TranslationError::PolicyBlocked(_)) =>
            {
                last.user_message()
            }
            TranslationError::Cancelled => "[Cancelled]".to_string(),
            TranslationError::QuotaExceeded {
                used, limit, requested, ..
            } => format!(
                "[Quota exceeded: {}/{} used today, {} more requested]",
                used, limit, requested
            ),
            other => format!("[Err: {}]", other),
        }
    }

    /// 是否为策略拦截（包括重试耗尽前最后一次为拦截的情况）
    pub fn is_policy_block(&self) -> bool {
        match self {
            TranslationError::PolicyBlocked(_) => true,
            TranslationError::GatewayExhausted { last, .. } => last.is_policy_block(),
            _ => false,
        }
    }

    /// 创建带上下文的错误
    pub fn with_context<T: fmt::Display>(mut self, context: T) -> Self {
        let new_msg = |msg: &str| format!("{} (上下文: {})", msg, context);

        match &mut self {
            TranslationError::ConfigError(msg)
            | TranslationError::RateLimited(msg)
            | TranslationError::PolicyBlocked(msg)
            | TranslationError::MalformedResponse(msg)
            | TranslationError::TimeoutError(msg)
            | TranslationError::NetworkError(msg)
            | TranslationError::StorageError(msg)
            | TranslationError::InvalidInput(msg)
            | TranslationError::InternalError(msg) => *msg = new_msg(msg),
            TranslationError::QuotaExceeded { .. }
            | TranslationError::SegmentationEmpty
            | TranslationError::GatewayExhausted { .. }
            | TranslationError::EchoedSource
            | TranslationError::Cancelled => {}
        }

        self
    }
}

/// 错误严重程度
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ErrorSeverity {
    Info,
    Warning,
    Error,
    Critical,
}

/// 错误类别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    Configuration,
    Quota,
    Input,
    RateLimit,
    Policy,
    Parsing,
    Timeout,
    Network,
    Storage,
    Cancellation,
    Internal,
}

// ============================================================================
// 标准错误转换
// ============================================================================

impl From<std::io::Error> for TranslationError {
    fn from(error: std::io::Error) -> Self {
        TranslationError::StorageError(format!("IO错误: {}", error))
    }
}

impl From<serde_json::Error> for TranslationError {
    fn from(error: serde_json::Error) -> Self {
        TranslationError::MalformedResponse(format!("JSON解析错误: {}", error))
    }
}

impl From<toml::de::Error> for TranslationError {
    fn from(error: toml::de::Error) -> Self {
        TranslationError::ConfigError(format!("TOML解析错误: {}", error))
    }
}

impl From<toml::ser::Error> for TranslationError {
    fn from(error: toml::ser::Error) -> Self {
        TranslationError::ConfigError(format!("TOML序列化错误: {}", error))
    }
}

impl From<config::ConfigError> for TranslationError {
    fn from(error: config::ConfigError) -> Self {
        TranslationError::ConfigError(error.to_string())
    }
}

impl From<reqwest::Error> for TranslationError {
    fn from(error: reqwest::Error) -> Self {
        let error = error.without_url();
        if error.is_timeout() {
            TranslationError::TimeoutError(format!("HTTP请求超时: {}", error))
        } else if error.is_decode() {
            TranslationError::MalformedResponse(format!("响应解码失败: {}", error))
        } else {
            TranslationError::NetworkError(error.to_string())
        }
    }
}

impl From<tokio::time::error::Elapsed> for TranslationError {
    fn from(error: tokio::time::error::Elapsed) -> Self {
        TranslationError::TimeoutError(format!("异步操作超时: {}", error))
    }
}

macro_rules! storage_error_from {
    ($($ty:ty),* $(,)?) => {
        $(
            impl From<$ty> for TranslationError {
                fn from(error: $ty) -> Self {
                    TranslationError::StorageError(error.to_string())
                }
            }
        )*
    };
}

storage_error_from!(
    redb::Error,
    redb::DatabaseError,
    redb::TransactionError,
    redb::TableError,
    redb::StorageError,
    redb::CommitError,
);

/// 错误结果类型别名
pub type TranslationResult<T> = Result<T, TranslationError>;

/// 错误统计信息
#[derive(Debug, Clone, Default)]
pub struct ErrorStats {
    pub total_errors: usize,
    pub by_category: std::collections::HashMap<ErrorCategory, usize>,
    pub by_severity: std::collections::HashMap<ErrorSeverity, usize>,
    pub retryable_errors: usize,
    pub critical_errors: usize,
}

impl ErrorStats {
    /// 记录错误
    pub fn record_error(&mut self, error: &TranslationError) {
        self.total_errors += 1;

        let category = error.category();
        *self.by_category.entry(category).or_insert(0) += 1;

        let severity = error.severity();
        *self.by_severity.entry(severity).or_insert(0) += 1;

        if error.is_retryable() {
            self.retryable_errors += 1;
        }

        if severity == ErrorSeverity::Critical {
            self.critical_errors += 1;
        }
    }

    /// 重置统计
    pub fn reset(&mut self) {
        *self = Default::default();
    }

    /// 获取错误率
    pub fn error_rate(&self, total_operations: usize) -> f64 {
        if total_operations == 0 {
            0.0
        } else {
            self.total_errors as f64 / total_operations as f64
        }
    }
}

/// 错误处理助手函数
pub mod helpers {
    use super::*;

    /// 记录并返回错误
    pub fn log_error<T>(error: TranslationError) -> TranslationResult<T> {
        match error.severity() {
            ErrorSeverity::Info => tracing::info!("翻译信息: {}", error),
            ErrorSeverity::Warning => tracing::warn!("翻译警告: {}", error),
            ErrorSeverity::Error => tracing::error!("翻译错误: {}", error),
            ErrorSeverity::Critical => tracing::error!("翻译严重错误: {}", error),
        }

        Err(error)
    }

    /// 创建配置错误
    pub fn config_error<T: fmt::Display>(msg: T) -> TranslationError {
        TranslationError::ConfigError(msg.to_string())
    }

    /// 创建输入验证错误
    pub fn validation_error<T: fmt::Display>(msg: T) -> TranslationError {
        TranslationError::InvalidInput(msg.to_string())
    }

    /// 创建存储错误
    pub fn storage_error<T: fmt::Display>(msg: T) -> TranslationError {
        TranslationError::StorageError(msg.to_string())
    }

    /// 创建内部错误
    pub fn internal_error<T: fmt::Display>(msg: T) -> TranslationError {
        TranslationError::InternalError(msg.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(TranslationError::RateLimited("429".into()).is_retryable());
        assert!(TranslationError::TimeoutError("slow".into()).is_retryable());
        assert!(!TranslationError::PolicyBlocked("SAFETY".into()).is_retryable());
        assert!(!TranslationError::SegmentationEmpty.is_retryable());
    }

    #[test]
    fn test_blocked_and_failed_messages_differ() {
        let blocked = TranslationError::PolicyBlocked("SAFETY".into()).user_message();
        let failed = TranslationError::NetworkError("reset".into()).user_message();
        assert!(blocked.starts_with("[Blocked"));
        assert!(failed.starts_with("[Err"));
        assert_ne!(blocked, failed);
    }

    #[test]
    fn test_exhausted_keeps_inner_category() {
        let err = TranslationError::GatewayExhausted {
            attempts: 3,
            last: Box::new(TranslationError::RateLimited("429".into())),
        };
        assert_eq!(err.category(), ErrorCategory::RateLimit);
        assert!(!err.is_retryable());
        assert!(err.to_string().contains('3'));
    }

    #[test]
    fn test_with_context() {
        let err = helpers::config_error("missing key").with_context("loading");
        assert!(err.to_string().contains("loading"));

        let unchanged = TranslationError::EchoedSource.with_context("ignored");
        assert!(matches!(unchanged, TranslationError::EchoedSource));
    }

    #[test]
    fn test_error_stats() {
        let mut stats = ErrorStats::default();
        stats.record_error(&TranslationError::RateLimited("a".into()));
        stats.record_error(&TranslationError::InternalError("b".into()));

        assert_eq!(stats.total_errors, 2);
        assert_eq!(stats.retryable_errors, 1);
        assert_eq!(stats.critical_errors, 1);
        assert_eq!(stats.error_rate(4), 0.5);
        assert_eq!(stats.error_rate(0), 0.0);

        stats.reset();
        assert_eq!(stats.total_errors, 0);
    }
}
