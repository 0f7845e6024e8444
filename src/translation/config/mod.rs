//! 翻译配置管理模块
//!
//! 提供简化的配置管理，支持环境变量、配置文件和默认值

pub mod languages;
pub mod manager;

// 重新导出主要类型
pub use languages::{Language, LANGUAGES};
pub use manager::{AccessConfig, AppConfig, ConfigManager, TranslationConfig, UsageLimits};

/// 配置常量
pub mod constants {
    use std::time::Duration;

    // 切分相关
    pub const DEFAULT_MIN_CHUNK_CHARS: usize = 100;
    pub const DEFAULT_BLOCK_TARGET_CHARS: usize = 1800;

    // 默认API设置
    pub const DEFAULT_API_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
    pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";
    pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
    pub const DEFAULT_MAX_RETRY_ATTEMPTS: usize = 3;
    pub const DEFAULT_RETRY_BASE_DELAY_MS: u64 = 500;

    // 并发设置
    pub const DEFAULT_MAX_CONCURRENT_REQUESTS: usize = 5;
    pub const DEFAULT_BLOCK_CONCURRENCY: usize = 2;
    pub const DEFAULT_INTERACTIVE_CONCURRENCY: usize = 5;

    // 缓存设置
    pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(3600); // 1小时
    pub const DEFAULT_LOCAL_CACHE_SIZE: usize = 1000;

    // 额度设置
    pub const DEFAULT_DAILY_LIMIT: u64 = 30_000;
    pub const PREMIUM_DAILY_LIMIT: u64 = 50_000;
    pub const ADMIN_KEY_NAME: &str = "admin";
    pub const DEFAULT_USAGE_STORE_FILE: &str = "hanzi-bridge-usage.redb";

    // 译文不可用时的占位
    pub const UNAVAILABLE_PLACEHOLDER: &str = "...";

    // 配置文件搜索路径
    pub const CONFIG_PATHS: &[&str] = &[
        "hanzi-bridge.toml",
        ".hanzi-bridge.toml",
        "~/.config/hanzi-bridge/config.toml",
        "/etc/hanzi-bridge/config.toml",
    ];
}

/// 便利函数
pub fn config_file_exists() -> bool {
    constants::CONFIG_PATHS
        .iter()
        .any(|path| std::path::Path::new(shellexpand::tilde(path).as_ref()).exists())
}
