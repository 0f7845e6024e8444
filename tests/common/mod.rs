// 集成测试公共模块
//
// 提供可编程的生成后端和测试环境构建器

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;

use hanzi_bridge::translation::config::{AccessConfig, AppConfig, TranslationConfig, UsageLimits};
use hanzi_bridge::translation::core::backend::{GenerationBackend, GenerationOptions};
use hanzi_bridge::translation::core::gateway::TranslationGateway;
use hanzi_bridge::translation::core::retry::RetryPolicy;
use hanzi_bridge::translation::error::{TranslationError, TranslationResult};
use hanzi_bridge::translation::metering::{Tier, UsageMeter};
use hanzi_bridge::translation::pipeline::Chunk;
use hanzi_bridge::translation::storage::usage::{InMemoryUsageStore, UsageStore};
use hanzi_bridge::translation::TranslationService;

pub const ADMIN_SECRET: &str = "admin-secret";
pub const READER_SECRET: &str = "reader-secret";
pub const GUEST_SECRET: &str = "guest-secret";

/// 测试中固定的 "今天"
pub fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 5, 1).unwrap()
}

/// 提示词以空行后的原文结尾
pub fn source_of(prompt: &str) -> &str {
    prompt.rsplit("\n\n").next().unwrap_or(prompt).trim()
}

/// 单词查询提示词中引号内的词
fn word_of(prompt: &str) -> Option<&str> {
    prompt
        .strip_prefix("Analyze this")
        .and_then(|rest| rest.split('"').nth(1))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EchoMode {
    Never,
    /// 直到收到强制提示词之前都原样返回
    UntilForced,
    Always,
}

/// 可编程的生成后端
///
/// 默认返回 `prefix + 原文`；结构化请求返回 JSON，英文译文为 `EN + 原文`
pub struct ScriptedBackend {
    prefix: String,
    structured: bool,
    echo: EchoMode,
    jitter: bool,
    failing_on: Vec<(String, TranslationError)>,
    failing_next: Mutex<VecDeque<TranslationError>>,
    calls: AtomicUsize,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedBackend {
    pub fn prefix(prefix: &str) -> Self {
        Self {
            prefix: prefix.to_string(),
            structured: true,
            echo: EchoMode::Never,
            jitter: false,
            failing_on: Vec::new(),
            failing_next: Mutex::new(VecDeque::new()),
            calls: AtomicUsize::new(0),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// 结构化请求也只返回纯文本
    pub fn free_text_only(mut self) -> Self {
        self.structured = false;
        self
    }

    pub fn echoing(mut self, mode: EchoMode) -> Self {
        self.echo = mode;
        self
    }

    /// 每次调用按原文长度等待不同时间，使完成顺序被打乱
    pub fn with_jitter(mut self) -> Self {
        self.jitter = true;
        self
    }

    /// 原文包含 `marker` 的请求总是失败
    pub fn failing_on(mut self, marker: &str, error: TranslationError) -> Self {
        self.failing_on.push((marker.to_string(), error));
        self
    }

    /// 接下来的若干次调用依次失败
    pub fn failing_next(self, errors: Vec<TranslationError>) -> Self {
        *self.failing_next.lock().unwrap() = errors.into();
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl GenerationBackend for ScriptedBackend {
    async fn generate(&self, prompt: &str, options: &GenerationOptions) -> TranslationResult<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().unwrap().push(prompt.to_string());

        if let Some(error) = self.failing_next.lock().unwrap().pop_front() {
            return Err(error);
        }

        let subject = word_of(prompt).unwrap_or_else(|| source_of(prompt));
        if let Some((_, error)) = self.failing_on.iter().find(|(marker, _)| subject.contains(marker.as_str())) {
            return Err(error.clone());
        }

        if let Some(word) = word_of(prompt) {
            return Ok(serde_json::json!({
                "word": word,
                "pinyin": "",
                "translations": [format!("{}{}", self.prefix, word)],
            })
            .to_string());
        }

        let source = source_of(prompt);
        if self.jitter {
            let delay = (source.chars().count() as u64 * 7) % 20;
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }

        let forced = prompt.contains("previous answer repeated");
        let primary = match self.echo {
            EchoMode::Always => source.to_string(),
            EchoMode::UntilForced if !forced => source.to_string(),
            _ => format!("{}{}", self.prefix, source),
        };
        let secondary = format!("EN {}", source);

        if options.is_structured() && self.structured {
            Ok(serde_json::json!({ "primary": primary, "secondary": secondary }).to_string())
        } else if prompt.contains("exactly two lines") {
            Ok(format!("{}\n{}", primary, secondary))
        } else {
            Ok(primary)
        }
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

/// 测试环境构建器
pub struct TestEnvironment {
    pub backend: Arc<ScriptedBackend>,
    pub store: Arc<InMemoryUsageStore>,
    pub config: AppConfig,
}

impl TestEnvironment {
    pub fn new(backend: ScriptedBackend) -> Self {
        let translation = TranslationConfig {
            min_chunk_chars: 1,
            ..TranslationConfig::default()
        };
        let access = AccessConfig {
            admin_secret: Some(ADMIN_SECRET.to_string()),
            api_keys: HashMap::from([
                ("reader".to_string(), READER_SECRET.to_string()),
                ("guest".to_string(), GUEST_SECRET.to_string()),
            ]),
            user_tiers: HashMap::from([("reader".to_string(), Tier::Premium)]),
            usage_limits: UsageLimits::default(),
        };

        Self {
            backend: Arc::new(backend),
            store: Arc::new(InMemoryUsageStore::new()),
            config: AppConfig { translation, access },
        }
    }

    pub fn with_limits(mut self, default_daily_limit: u64, premium_daily_limit: u64) -> Self {
        self.config.access.usage_limits = UsageLimits {
            default_daily_limit,
            premium_daily_limit,
        };
        self
    }

    pub fn with_translation<F>(mut self, configure: F) -> Self
    where
        F: FnOnce(&mut TranslationConfig),
    {
        configure(&mut self.config.translation);
        self
    }

    /// 重试不等待
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.config.translation.max_retry_attempts, Duration::ZERO)
    }

    pub fn service(&self) -> TranslationService {
        let retry = self.retry_policy();
        TranslationService::new(
            self.config.clone(),
            self.backend.clone(),
            self.store.clone() as Arc<dyn UsageStore>,
        )
        .unwrap()
        .with_gateway(|gateway| gateway.with_retry_policy(retry))
        .with_clock(today)
    }

    pub fn gateway(&self) -> TranslationGateway {
        TranslationGateway::new(self.backend.clone(), &self.config.translation).with_retry_policy(self.retry_policy())
    }

    pub fn meter(&self) -> UsageMeter {
        UsageMeter::new(self.config.access.clone(), self.store.clone()).with_clock(today)
    }
}

pub fn chunks(texts: &[&str]) -> Vec<Chunk> {
    texts
        .iter()
        .enumerate()
        .map(|(index, text)| Chunk::new(index, *text, "zh"))
        .collect()
}
