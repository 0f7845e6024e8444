//! 翻译网关集成测试
//!
//! 缓存、解析策略回退、回显检测与重试

use hanzi_bridge::translation::error::TranslationError;
use hanzi_bridge::translation::pipeline::Chunk;

mod common {
    include!("common/mod.rs");
}

use common::{EchoMode, ScriptedBackend, TestEnvironment};

#[tokio::test]
async fn test_repeated_translation_hits_cache() {
    let env = TestEnvironment::new(ScriptedBackend::prefix("X"));
    let gateway = env.gateway();

    let first = gateway.translate("你好", "zh", "vi", false).await.unwrap();
    let second = gateway.translate("你好", "zh", "vi", false).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(first.primary, "X你好");
    assert_eq!(env.backend.calls(), 1);
    assert_eq!(gateway.stats().cache_hits, 1);
}

#[tokio::test]
async fn test_cache_key_includes_secondary_and_target() {
    let env = TestEnvironment::new(ScriptedBackend::prefix("X"));
    let gateway = env.gateway();

    gateway.translate("你好", "zh", "vi", false).await.unwrap();
    let with_english = gateway.translate("你好", "zh", "vi", true).await.unwrap();
    gateway.translate("你好", "zh", "fr", false).await.unwrap();

    assert_eq!(with_english.secondary.as_deref(), Some("EN 你好"));
    assert_eq!(env.backend.calls(), 3);
}

#[tokio::test]
async fn test_disabled_cache_calls_backend_every_time() {
    let env = TestEnvironment::new(ScriptedBackend::prefix("X")).with_translation(|config| config.cache_enabled = false);
    let gateway = env.gateway();

    gateway.translate("你好", "zh", "vi", false).await.unwrap();
    gateway.translate("你好", "zh", "vi", false).await.unwrap();

    assert_eq!(env.backend.calls(), 2);
}

#[tokio::test]
async fn test_unstructured_reply_falls_back_to_free_text() {
    let env = TestEnvironment::new(ScriptedBackend::prefix("X").free_text_only());
    let gateway = env.gateway();

    let parsed = gateway.translate("你好", "zh", "vi", true).await.unwrap();

    assert_eq!(parsed.primary, "X你好");
    assert_eq!(parsed.secondary.as_deref(), Some("EN 你好"));
    // 结构化一次，自由文本一次
    assert_eq!(env.backend.calls(), 2);
    assert_eq!(gateway.stats().structured_fallbacks, 1);

    let prompts = env.backend.prompts();
    assert!(prompts[1].contains("exactly two lines"));
}

#[tokio::test]
async fn test_echoed_source_is_retried_with_forceful_prompt() {
    let env = TestEnvironment::new(ScriptedBackend::prefix("X").echoing(EchoMode::UntilForced));
    let gateway = env.gateway();

    let parsed = gateway.translate("你好", "zh", "vi", false).await.unwrap();

    assert_eq!(parsed.primary, "X你好");
    assert_eq!(gateway.stats().echo_retries, 1);
}

#[tokio::test]
async fn test_persistent_echo_is_a_chunk_error() {
    let env = TestEnvironment::new(ScriptedBackend::prefix("X").echoing(EchoMode::Always));
    let gateway = env.gateway();

    let result = gateway
        .translate_chunk(&Chunk::new(0, "你好", "zh"), "vi", false)
        .await;

    assert!(!result.is_ok());
    assert_eq!(result.source_text, "你好");
    assert!(result.error_detail.is_some());
}

#[tokio::test]
async fn test_rate_limit_is_retried() {
    let backend = ScriptedBackend::prefix("X").failing_next(vec![
        TranslationError::RateLimited("429".into()),
        TranslationError::RateLimited("429".into()),
    ]);
    let env = TestEnvironment::new(backend);
    let gateway = env.gateway();

    let parsed = gateway.translate("你好", "zh", "vi", false).await.unwrap();

    assert_eq!(parsed.primary, "X你好");
    assert_eq!(env.backend.calls(), 3);
}

#[tokio::test]
async fn test_exhausted_retries_stay_on_the_chunk() {
    let backend = ScriptedBackend::prefix("X").failing_next(vec![
        TranslationError::TimeoutError("slow".into()),
        TranslationError::TimeoutError("slow".into()),
        TranslationError::TimeoutError("slow".into()),
    ]);
    let env = TestEnvironment::new(backend);
    let gateway = env.gateway();

    let error = gateway.translate("你好", "zh", "vi", false).await.unwrap_err();
    assert!(matches!(error, TranslationError::GatewayExhausted { attempts: 3, .. }));

    // 失败不进入缓存，下一次重新请求并成功
    let parsed = gateway.translate("你好", "zh", "vi", false).await.unwrap();
    assert_eq!(parsed.primary, "X你好");
    assert_eq!(env.backend.calls(), 4);
}

#[tokio::test]
async fn test_policy_block_is_not_retried() {
    let backend = ScriptedBackend::prefix("X").failing_on("敏感", TranslationError::PolicyBlocked("SAFETY".into()));
    let env = TestEnvironment::new(backend);
    let gateway = env.gateway();

    let blocked = gateway
        .translate_chunk(&Chunk::new(0, "敏感内容", "zh"), "vi", false)
        .await;

    assert!(blocked.primary_text.starts_with("[Blocked"));
    assert_eq!(env.backend.calls(), 1);
    assert_eq!(gateway.stats().policy_blocks, 1);
}

#[tokio::test]
async fn test_word_lookup_is_cached() {
    let env = TestEnvironment::new(ScriptedBackend::prefix("gloss:"));
    let gateway = env.gateway();

    let first = gateway.lookup_word("好", "zh", "vi").await.unwrap();
    let second = gateway.lookup_word("好", "zh", "vi").await.unwrap();

    assert_eq!(first, vec!["gloss:好"]);
    assert_eq!(first, second);
    assert_eq!(env.backend.calls(), 1);
}
