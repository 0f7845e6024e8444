//! 翻译核心模块
//!
//! ```text
//! TranslationService (service.rs)
//!     ├── UsageMeter (metering.rs)
//!     ├── Segmenter / ChunkOrchestrator / assembler (pipeline/)
//!     └── TranslationGateway (gateway.rs)
//!             ├── RetryPolicy (retry.rs)
//!             ├── ResponseParser 策略 (parsers.rs)
//!             ├── TranslationCache (storage/cache.rs)
//!             └── GenerationBackend (backend.rs)
//! ```

pub mod backend;
pub mod gateway;
pub mod parsers;
pub mod retry;
pub mod service;

pub use backend::{GeminiBackend, GenerationBackend, GenerationOptions};
pub use gateway::{GatewayStatsSnapshot, TranslationGateway};
pub use parsers::{ParsedTranslation, ResponseParser};
pub use retry::RetryPolicy;
pub use service::{
    HealthLevel, HealthStatus, ServiceStats, TranslateRequest, TranslationMode, TranslationOutcome,
    TranslationService,
};
