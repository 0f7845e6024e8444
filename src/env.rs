//! 统一的环境变量管理系统
//!
//! 所有变量都以 `HANZI_BRIDGE_` 为前缀，设置后覆盖配置文件中的同名项

use std::env;
use std::fmt;
use std::time::Duration;

/// 环境变量解析错误
#[derive(Debug, Clone)]
pub struct EnvError {
    pub variable: &'static str,
    pub message: String,
}

impl EnvError {
    fn new(variable: &'static str, message: impl Into<String>) -> Self {
        Self {
            variable,
            message: message.into(),
        }
    }
}

impl fmt::Display for EnvError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.variable, self.message)
    }
}

impl std::error::Error for EnvError {}

pub type EnvResult<T> = Result<T, EnvError>;

/// 环境变量访问器特性
pub trait EnvVar<T> {
    const NAME: &'static str;

    fn parse(value: &str) -> EnvResult<T>;

    /// 未设置时返回错误
    fn get() -> EnvResult<T> {
        let value = env::var(Self::NAME).map_err(|_| EnvError::new(Self::NAME, "not set"))?;
        Self::parse(&value)
    }

    fn get_or_default(default: T) -> T {
        Self::get().unwrap_or(default)
    }

    /// 仅当变量被显式设置且合法时返回值
    fn get_if_set() -> Option<T> {
        let value = env::var(Self::NAME).ok()?;
        match Self::parse(&value) {
            Ok(parsed) => Some(parsed),
            Err(e) => {
                tracing::warn!("忽略无效的环境变量 {}", e);
                None
            }
        }
    }
}

pub mod core {
    use super::*;

    /// 日志级别
    pub struct LogLevel;
    impl EnvVar<String> for LogLevel {
        const NAME: &'static str = "HANZI_BRIDGE_LOG_LEVEL";

        fn parse(value: &str) -> EnvResult<String> {
            let level = value.trim().to_lowercase();
            match level.as_str() {
                "trace" | "debug" | "info" | "warn" | "error" => Ok(level),
                _ => Err(EnvError::new(Self::NAME, format!("unknown level '{}'", value))),
            }
        }
    }

    /// 配置文件路径，跳过默认搜索
    pub struct ConfigPath;
    impl EnvVar<String> for ConfigPath {
        const NAME: &'static str = "HANZI_BRIDGE_CONFIG";

        fn parse(value: &str) -> EnvResult<String> {
            non_blank(value, Self::NAME)
        }
    }
}

pub mod translation {
    use super::*;

    pub struct TargetLang;
    impl EnvVar<String> for TargetLang {
        const NAME: &'static str = "HANZI_BRIDGE_TARGET_LANG";

        fn parse(value: &str) -> EnvResult<String> {
            language_code(value, Self::NAME)
        }
    }

    pub struct SourceLang;
    impl EnvVar<String> for SourceLang {
        const NAME: &'static str = "HANZI_BRIDGE_SOURCE_LANG";

        fn parse(value: &str) -> EnvResult<String> {
            language_code(value, Self::NAME)
        }
    }

    pub struct ApiUrl;
    impl EnvVar<String> for ApiUrl {
        const NAME: &'static str = "HANZI_BRIDGE_API_URL";

        fn parse(value: &str) -> EnvResult<String> {
            let url = value.trim().trim_end_matches('/');
            if url.starts_with("http://") || url.starts_with("https://") {
                Ok(url.to_string())
            } else {
                Err(EnvError::new(Self::NAME, "expected an http:// or https:// URL"))
            }
        }
    }

    /// 生成服务密钥，无默认值
    pub struct GeminiApiKey;
    impl EnvVar<String> for GeminiApiKey {
        const NAME: &'static str = "HANZI_BRIDGE_GEMINI_API_KEY";

        fn parse(value: &str) -> EnvResult<String> {
            let key = value.trim();
            if key.len() < 8 {
                return Err(EnvError::new(Self::NAME, "key is too short"));
            }
            Ok(key.to_string())
        }
    }

    pub struct Model;
    impl EnvVar<String> for Model {
        const NAME: &'static str = "HANZI_BRIDGE_MODEL";

        fn parse(value: &str) -> EnvResult<String> {
            non_blank(value, Self::NAME)
        }
    }

    /// 句子模式的并发数
    pub struct MaxConcurrentRequests;
    impl EnvVar<usize> for MaxConcurrentRequests {
        const NAME: &'static str = "HANZI_BRIDGE_MAX_CONCURRENT_REQUESTS";

        fn parse(value: &str) -> EnvResult<usize> {
            bounded_usize(value, Self::NAME, 1, 32)
        }
    }

    pub struct MaxRetryAttempts;
    impl EnvVar<usize> for MaxRetryAttempts {
        const NAME: &'static str = "HANZI_BRIDGE_MAX_RETRY_ATTEMPTS";

        fn parse(value: &str) -> EnvResult<usize> {
            bounded_usize(value, Self::NAME, 1, 10)
        }
    }

    /// 单次生成调用超时（秒）
    pub struct RequestTimeout;
    impl EnvVar<Duration> for RequestTimeout {
        const NAME: &'static str = "HANZI_BRIDGE_REQUEST_TIMEOUT";

        fn parse(value: &str) -> EnvResult<Duration> {
            bounded_usize(value, Self::NAME, 1, 300).map(|seconds| Duration::from_secs(seconds as u64))
        }
    }
}

pub mod cache {
    use super::*;

    pub struct Enabled;
    impl EnvVar<bool> for Enabled {
        const NAME: &'static str = "HANZI_BRIDGE_CACHE_ENABLED";

        fn parse(value: &str) -> EnvResult<bool> {
            match value.trim().to_lowercase().as_str() {
                "true" | "1" | "yes" | "on" => Ok(true),
                "false" | "0" | "no" | "off" => Ok(false),
                _ => Err(EnvError::new(Self::NAME, format!("'{}' is not a boolean", value))),
            }
        }
    }

    /// 缓存条目上限
    pub struct LocalCacheSize;
    impl EnvVar<usize> for LocalCacheSize {
        const NAME: &'static str = "HANZI_BRIDGE_CACHE_SIZE";

        fn parse(value: &str) -> EnvResult<usize> {
            bounded_usize(value, Self::NAME, 10, 100_000)
        }
    }
}

pub mod usage {
    use super::*;

    pub struct AdminPassword;
    impl EnvVar<String> for AdminPassword {
        const NAME: &'static str = "HANZI_BRIDGE_ADMIN_PASSWORD";

        fn parse(value: &str) -> EnvResult<String> {
            non_blank(value, Self::NAME)
        }
    }

    /// redb 用量数据库路径，未设置时用量只保存在进程内
    pub struct StorePath;
    impl EnvVar<String> for StorePath {
        const NAME: &'static str = "HANZI_BRIDGE_USAGE_DB";

        fn parse(value: &str) -> EnvResult<String> {
            non_blank(value, Self::NAME).map(|path| shellexpand::tilde(&path).into_owned())
        }
    }
}

fn non_blank(value: &str, name: &'static str) -> EnvResult<String> {
    let value = value.trim();
    if value.is_empty() {
        return Err(EnvError::new(name, "must not be empty"));
    }
    Ok(value.to_string())
}

/// ISO 639-1 两字母代码
fn language_code(value: &str, name: &'static str) -> EnvResult<String> {
    let code = value.trim().to_lowercase();
    if code.len() == 2 && code.chars().all(|ch| ch.is_ascii_alphabetic()) {
        Ok(code)
    } else {
        Err(EnvError::new(name, format!("'{}' is not a two-letter language code", value)))
    }
}

fn bounded_usize(value: &str, name: &'static str, min: usize, max: usize) -> EnvResult<usize> {
    let number: usize = value
        .trim()
        .parse()
        .map_err(|_| EnvError::new(name, format!("'{}' is not a number", value)))?;
    if !(min..=max).contains(&number) {
        return Err(EnvError::new(name, format!("{} is outside {}..={}", number, min, max)));
    }
    Ok(number)
}
