//! 通用重试策略
//!
//! 指数退避：第 n 次重试前等待 `base_delay * 2^n`，上限 `max_delay`。

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::translation::config::TranslationConfig;
use crate::translation::error::{TranslationError, TranslationResult};

type RetryPredicate = Arc<dyn Fn(&TranslationError) -> bool + Send + Sync>;

/// 重试策略
#[derive(Clone)]
pub struct RetryPolicy {
    max_attempts: usize,
    base_delay: Duration,
    max_delay: Duration,
    retryable: RetryPredicate,
}

impl std::fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("max_attempts", &self.max_attempts)
            .field("base_delay", &self.base_delay)
            .field("max_delay", &self.max_delay)
            .finish()
    }
}

impl RetryPolicy {
    /// 默认只重试 `is_retryable()` 为真的错误
    pub fn new(max_attempts: usize, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay: Duration::from_secs(30),
            retryable: Arc::new(TranslationError::is_retryable),
        }
    }

    pub fn from_config(config: &TranslationConfig) -> Self {
        Self::new(config.max_retry_attempts, config.retry_base_delay())
    }

    /// 不重试
    pub fn none() -> Self {
        Self::new(1, Duration::ZERO)
    }

    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }

    pub fn with_predicate<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&TranslationError) -> bool + Send + Sync + 'static,
    {
        self.retryable = Arc::new(predicate);
        self
    }

    pub fn max_attempts(&self) -> usize {
        self.max_attempts
    }

    /// 第 `attempt` 次失败（从 0 开始）之后的等待时间
    pub fn delay_for(&self, attempt: usize) -> Duration {
        let factor = 2u32.saturating_pow(attempt.min(16) as u32);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }

    /// 执行操作，可重试错误耗尽次数后包装为 `GatewayExhausted`
    pub async fn run<T, F, Fut>(&self, mut operation: F) -> TranslationResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = TranslationResult<T>>,
    {
        let mut attempt = 0;
        loop {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(error) if !(self.retryable)(&error) => return Err(error),
                Err(error) => {
                    attempt += 1;
                    if attempt >= self.max_attempts {
                        tracing::warn!("重试 {} 次后放弃: {}", attempt, error);
                        return Err(TranslationError::GatewayExhausted {
                            attempts: attempt,
                            last: Box::new(error),
                        });
                    }

                    let delay = self.delay_for(attempt - 1);
                    tracing::warn!(
                        "第 {}/{} 次尝试失败: {}，{}ms 后重试",
                        attempt,
                        self.max_attempts,
                        error,
                        delay.as_millis()
                    );
                    metrics::counter!("translation_retries").increment(1);
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}
