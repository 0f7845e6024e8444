//! 配置管理器
//!
//! 提供统一的配置接口，按 默认值 → 配置文件 → 环境变量 的顺序合并

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

use super::constants;
use crate::translation::error::{TranslationError, TranslationResult};
use crate::translation::metering::Tier;

/// 翻译配置
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TranslationConfig {
    // 语言配置
    pub source_lang: String,
    pub target_lang: String,
    /// 是否同时给出英文译文
    pub include_secondary: bool,
    pub secondary_lang: String,

    // 生成服务配置
    pub api_url: String,
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    pub model: String,
    /// 关闭生成服务的安全过滤阈值
    pub safety_bypass: bool,
    pub request_timeout_secs: u64,
    pub max_retry_attempts: usize,
    pub retry_base_delay_ms: u64,

    // 并发配置
    pub max_concurrent_requests: usize,
    pub block_concurrency: usize,
    pub interactive_concurrency: usize,

    // 切分配置
    pub min_chunk_chars: usize,
    pub block_target_chars: usize,

    // 缓存配置
    pub cache_enabled: bool,
    pub cache_ttl_secs: u64,
    pub local_cache_size: usize,

    // 用量存储
    pub usage_store_path: Option<String>,
}

impl Default for TranslationConfig {
    fn default() -> Self {
        Self {
            source_lang: "zh".to_string(),
            target_lang: "vi".to_string(),
            include_secondary: true,
            secondary_lang: "en".to_string(),

            api_url: constants::DEFAULT_API_URL.to_string(),
            api_key: None,
            model: constants::DEFAULT_MODEL.to_string(),
            safety_bypass: true,
            request_timeout_secs: constants::DEFAULT_REQUEST_TIMEOUT.as_secs(),
            max_retry_attempts: constants::DEFAULT_MAX_RETRY_ATTEMPTS,
            retry_base_delay_ms: constants::DEFAULT_RETRY_BASE_DELAY_MS,

            max_concurrent_requests: constants::DEFAULT_MAX_CONCURRENT_REQUESTS,
            block_concurrency: constants::DEFAULT_BLOCK_CONCURRENCY,
            interactive_concurrency: constants::DEFAULT_INTERACTIVE_CONCURRENCY,

            min_chunk_chars: constants::DEFAULT_MIN_CHUNK_CHARS,
            block_target_chars: constants::DEFAULT_BLOCK_TARGET_CHARS,

            cache_enabled: true,
            cache_ttl_secs: constants::DEFAULT_CACHE_TTL.as_secs(),
            local_cache_size: constants::DEFAULT_LOCAL_CACHE_SIZE,

            usage_store_path: None,
        }
    }
}

impl TranslationConfig {
    /// 创建带指定目标语言的默认配置
    pub fn default_with_lang(target_lang: &str) -> Self {
        Self {
            target_lang: target_lang.to_string(),
            ..Self::default()
        }
    }

    /// 验证配置
    pub fn validate(&self) -> TranslationResult<()> {
        if self.max_concurrent_requests == 0
            || self.block_concurrency == 0
            || self.interactive_concurrency == 0
        {
            return Err(TranslationError::ConfigError("并发数不能为0".to_string()));
        }

        if self.max_retry_attempts == 0 {
            return Err(TranslationError::ConfigError("重试次数至少为1".to_string()));
        }

        if self.min_chunk_chars > self.block_target_chars {
            return Err(TranslationError::ConfigError(format!(
                "最小片段长度 {} 不能大于块目标长度 {}",
                self.min_chunk_chars, self.block_target_chars
            )));
        }

        if self.model.trim().is_empty() {
            return Err(TranslationError::ConfigError("模型名称不能为空".to_string()));
        }

        if self.request_timeout_secs == 0 {
            return Err(TranslationError::ConfigError("请求超时必须大于0".to_string()));
        }

        if self.cache_enabled && self.local_cache_size == 0 {
            return Err(TranslationError::ConfigError(
                "启用缓存时缓存大小不能为0".to_string(),
            ));
        }

        Ok(())
    }

    /// 应用类型安全的环境变量覆盖，只有显式设置的变量生效
    pub fn apply_env_overrides(&mut self) {
        use crate::env::{cache, translation, usage, EnvVar};

        if let Some(source_lang) = translation::SourceLang::get_if_set() {
            self.source_lang = source_lang;
        }

        if let Some(target_lang) = translation::TargetLang::get_if_set() {
            self.target_lang = target_lang;
        }

        if let Some(api_url) = translation::ApiUrl::get_if_set() {
            self.api_url = api_url;
            tracing::info!("环境变量覆盖 API URL: {}", self.api_url);
        }

        if let Some(api_key) = translation::GeminiApiKey::get_if_set() {
            self.api_key = Some(api_key);
        }

        if let Some(model) = translation::Model::get_if_set() {
            self.model = model;
        }

        if let Some(max_concurrent) = translation::MaxConcurrentRequests::get_if_set() {
            self.max_concurrent_requests = max_concurrent;
        }

        if let Some(attempts) = translation::MaxRetryAttempts::get_if_set() {
            self.max_retry_attempts = attempts;
        }

        if let Some(timeout) = translation::RequestTimeout::get_if_set() {
            self.request_timeout_secs = timeout.as_secs();
        }

        if let Some(cache_enabled) = cache::Enabled::get_if_set() {
            self.cache_enabled = cache_enabled;
        }

        if let Some(cache_size) = cache::LocalCacheSize::get_if_set() {
            self.local_cache_size = cache_size;
        }

        if let Some(path) = usage::StorePath::get_if_set() {
            self.usage_store_path = Some(path);
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn retry_base_delay(&self) -> Duration {
        Duration::from_millis(self.retry_base_delay_ms)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    /// 是否需要单独请求英文译文
    ///
    /// 目标语言本身就是英文时只翻译一次
    pub fn wants_secondary(&self) -> bool {
        self.wants_secondary_for(&self.target_lang, self.include_secondary)
    }

    /// 按请求的目标语言判断
    pub fn wants_secondary_for(&self, target_code: &str, include_secondary: bool) -> bool {
        include_secondary && !target_code.eq_ignore_ascii_case(&self.secondary_lang)
    }
}

/// 每日额度
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct UsageLimits {
    pub default_daily_limit: u64,
    pub premium_daily_limit: u64,
}

impl Default for UsageLimits {
    fn default() -> Self {
        Self {
            default_daily_limit: constants::DEFAULT_DAILY_LIMIT,
            premium_daily_limit: constants::PREMIUM_DAILY_LIMIT,
        }
    }
}

/// 访问凭据与额度配置
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct AccessConfig {
    /// 管理员密钥，解析为 `admin`
    pub admin_secret: Option<String>,
    /// 标签 → 密钥
    pub api_keys: HashMap<String, String>,
    /// 标签 → 等级
    pub user_tiers: HashMap<String, Tier>,
    pub usage_limits: UsageLimits,
}

impl AccessConfig {
    pub fn apply_env_overrides(&mut self) {
        use crate::env::{usage, EnvVar};

        if let Some(secret) = usage::AdminPassword::get_if_set() {
            self.admin_secret = Some(secret);
        }
    }

    pub fn validate(&self) -> TranslationResult<()> {
        if self.usage_limits.default_daily_limit == 0 {
            return Err(TranslationError::ConfigError("默认每日额度不能为0".to_string()));
        }

        if let Some((label, _)) = self.api_keys.iter().find(|(_, secret)| secret.is_empty()) {
            return Err(TranslationError::ConfigError(format!("密钥 {} 为空", label)));
        }

        Ok(())
    }
}

/// 完整配置文件结构
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct AppConfig {
    pub translation: TranslationConfig,
    pub access: AccessConfig,
}

/// 配置管理器
pub struct ConfigManager {
    config: AppConfig,
    source: Option<String>,
}

impl ConfigManager {
    /// 搜索默认路径创建配置管理器
    pub fn new() -> TranslationResult<Self> {
        Self::load_dotenv();

        let explicit = {
            use crate::env::{core::ConfigPath, EnvVar};
            ConfigPath::get_if_set()
        };

        let path = match explicit {
            Some(path) => Some(shellexpand::tilde(&path).into_owned()),
            None => Self::find_config_file(),
        };

        Self::build(path)
    }

    /// 从指定文件创建配置管理器
    pub fn from_path<P: AsRef<Path>>(path: P) -> TranslationResult<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(TranslationError::ConfigError(format!(
                "配置文件不存在: {}",
                path.display()
            )));
        }
        Self::build(Some(path.to_string_lossy().into_owned()))
    }

    /// 直接使用给定配置（测试和嵌入场景）
    pub fn from_config(config: AppConfig) -> TranslationResult<Self> {
        config.translation.validate()?;
        config.access.validate()?;
        Ok(Self { config, source: None })
    }

    fn build(path: Option<String>) -> TranslationResult<Self> {
        let mut builder = Config::builder().add_source(Config::try_from(&AppConfig::default())?);

        if let Some(path) = &path {
            tracing::info!("加载配置文件: {}", path);
            builder = builder.add_source(File::with_name(path));
        } else {
            tracing::info!("未找到配置文件，使用默认配置");
        }

        // HANZI_BRIDGE_TRANSLATION__TARGET_LANG 形式的嵌套覆盖
        builder = builder.add_source(
            Environment::with_prefix("HANZI_BRIDGE")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let mut config: AppConfig = builder.build()?.try_deserialize()?;

        config.translation.apply_env_overrides();
        config.access.apply_env_overrides();
        config.translation.validate()?;
        config.access.validate()?;

        Ok(Self { config, source: path })
    }

    fn find_config_file() -> Option<String> {
        constants::CONFIG_PATHS
            .iter()
            .map(|path| shellexpand::tilde(path).into_owned())
            .find(|path| Path::new(path).exists())
    }

    /// 加载 .env 文件
    fn load_dotenv() {
        let env_files = [".env.local", ".env"];

        for env_file in &env_files {
            if Path::new(env_file).exists() && dotenv::from_filename(env_file).is_ok() {
                tracing::info!("已加载环境变量文件: {}", env_file);
                break;
            }
        }
    }

    pub fn get_config(&self) -> &AppConfig {
        &self.config
    }

    pub fn translation(&self) -> &TranslationConfig {
        &self.config.translation
    }

    pub fn access(&self) -> &AccessConfig {
        &self.config.access
    }

    /// 实际加载的配置文件路径
    pub fn source(&self) -> Option<&str> {
        self.source.as_deref()
    }

    pub fn into_config(self) -> AppConfig {
        self.config
    }

    /// 生成示例配置文件
    pub fn generate_example_config<P: AsRef<Path>>(path: P) -> TranslationResult<()> {
        let mut example = AppConfig::default();
        example.translation.usage_store_path = Some(constants::DEFAULT_USAGE_STORE_FILE.to_string());
        example.access.admin_secret = Some("change-me".to_string());
        example
            .access
            .api_keys
            .insert("reader".to_string(), "reader-secret".to_string());
        example
            .access
            .user_tiers
            .insert("reader".to_string(), Tier::Premium);

        let content = toml::to_string_pretty(&example)?;
        std::fs::write(path.as_ref(), content)
            .map_err(|e| TranslationError::ConfigError(format!("写入配置文件失败: {}", e)))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config_is_valid() {
        let config = TranslationConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.model, "gemini-2.5-flash");
        assert_eq!(config.min_chunk_chars, 100);
        assert!(config.wants_secondary());
    }

    #[test]
    fn test_validation_failures() {
        let mut config = TranslationConfig::default();
        config.block_concurrency = 0;
        assert!(config.validate().is_err());

        let mut config = TranslationConfig::default();
        config.max_retry_attempts = 0;
        assert!(config.validate().is_err());

        let mut config = TranslationConfig::default();
        config.min_chunk_chars = 5000;
        assert!(config.validate().is_err());

        let mut config = TranslationConfig::default();
        config.model = "  ".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_english_target_collapses_secondary() {
        let config = TranslationConfig::default_with_lang("en");
        assert!(!config.wants_secondary());
    }

    #[test]
    fn test_generate_and_load_example_config() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("hanzi-bridge.toml");

        ConfigManager::generate_example_config(&path).unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("[translation]"));
        assert!(!content.contains("api_key ="));

        let manager = ConfigManager::from_path(&path).unwrap();
        assert_eq!(manager.access().usage_limits.premium_daily_limit, 50_000);
        assert_eq!(manager.access().user_tiers.get("reader"), Some(&Tier::Premium));
        assert_eq!(manager.source(), path.to_str());
        assert_eq!(
            manager.translation().usage_store_path.as_deref(),
            Some(constants::DEFAULT_USAGE_STORE_FILE)
        );
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("partial.toml");
        std::fs::write(&path, "[translation]\nmin_chunk_chars = 1\n").unwrap();

        let manager = ConfigManager::from_path(&path).unwrap();
        assert_eq!(manager.translation().min_chunk_chars, 1);
        assert_eq!(manager.translation().block_target_chars, 1800);
        assert_eq!(manager.access().usage_limits.default_daily_limit, 30_000);
    }

    #[test]
    fn test_missing_file_is_config_error() {
        let err = ConfigManager::from_path("/definitely/not/here.toml").err().unwrap();
        assert!(matches!(err, TranslationError::ConfigError(_)));
    }
}
