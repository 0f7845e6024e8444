//! 错误处理集成测试
//!
//! 额度、拦截与失败的区分、致命错误中止以及身份解析

use futures::future::join_all;

use hanzi_bridge::translation::error::TranslationError;
use hanzi_bridge::translation::pipeline::{ChunkStatus, NoProgress};
use hanzi_bridge::translation::{TranslateRequest, TranslationMode};

mod common {
    include!("common/mod.rs");
}

use common::{today, ScriptedBackend, TestEnvironment, ADMIN_SECRET, GUEST_SECRET, READER_SECRET};

#[tokio::test]
async fn test_blocked_and_failed_chunks_are_distinguishable() {
    let backend = ScriptedBackend::prefix("X")
        .failing_on("禁", TranslationError::PolicyBlocked("SAFETY".into()))
        .failing_on("断", TranslationError::NetworkError("reset".into()));
    let env = TestEnvironment::new(backend);
    let service = env.service();

    let request = TranslateRequest::new(GUEST_SECRET, "禁止。中断。正常。", "vi").with_secondary(false);
    let outcome = service.translate(&request, &NoProgress).await.unwrap();

    let records = outcome.document.records();
    assert_eq!(records.len(), 3);
    assert!(records[0].primary.starts_with("[Blocked"));
    assert!(records[1].primary.starts_with("[Err"));
    assert_eq!(records[2].primary, "X正常。");
    assert_eq!(records[0].status, ChunkStatus::Errored);
    assert_eq!(records[1].status, ChunkStatus::Errored);
    assert!(outcome.document.is_partial());

    let stats = service.get_stats().snapshot();
    assert_eq!(stats.chunks_translated, 1);
    assert_eq!(stats.chunks_errored, 2);
}

#[tokio::test]
async fn test_quota_is_checked_before_any_backend_call() {
    let env = TestEnvironment::new(ScriptedBackend::prefix("X")).with_limits(5, 50);
    let service = env.service();

    let request = TranslateRequest::new(GUEST_SECRET, "一二三四五六", "vi").with_secondary(false);
    let error = service.translate(&request, &NoProgress).await.unwrap_err();

    match error {
        TranslationError::QuotaExceeded {
            used, requested, limit, ..
        } => {
            assert_eq!(used, 0);
            assert_eq!(requested, 6);
            assert_eq!(limit, 5);
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(env.backend.calls(), 0);
    assert_eq!(service.usage_report(GUEST_SECRET).unwrap().used_today, 0);
    assert_eq!(service.get_stats().snapshot().rejected_requests, 1);
}

#[tokio::test]
async fn test_premium_tier_gets_the_higher_limit() {
    let env = TestEnvironment::new(ScriptedBackend::prefix("X")).with_limits(5, 50);
    let service = env.service();

    let request = TranslateRequest::new(READER_SECRET, "一二三四五六", "vi").with_secondary(false);
    let outcome = service.translate(&request, &NoProgress).await.unwrap();

    assert_eq!(outcome.usage.key_name, "reader");
    assert_eq!(outcome.usage.daily_limit, 50);
    assert_eq!(outcome.usage.used_today, 6);
}

#[tokio::test]
async fn test_quota_boundary_is_inclusive() {
    let env = TestEnvironment::new(ScriptedBackend::prefix("X")).with_limits(100, 200);
    let meter = env.meter();

    meter.record("guest", 90).unwrap();
    assert!(meter.admit("guest", 10).unwrap());
    assert!(!meter.admit("guest", 11).unwrap());

    let report = meter.admit_and_record("guest", 10).await.unwrap();
    assert_eq!(report.used_today, 100);
    assert_eq!(report.remaining(), 0);

    let error = meter.admit_and_record("guest", 1).await.unwrap_err();
    assert!(matches!(error, TranslationError::QuotaExceeded { used: 100, .. }));
    assert_eq!(meter.current_usage("guest").unwrap(), 100);
}

#[tokio::test]
async fn test_usage_appears_in_admin_stats() {
    let env = TestEnvironment::new(ScriptedBackend::prefix("X"));
    let service = env.service();

    service.meter().admit_and_record("userA", 5000).await.unwrap();

    let stats = service.admin_stats(ADMIN_SECRET).unwrap();
    assert_eq!(stats.total_distinct_keys, 1);
    assert_eq!(stats.per_key_per_date_totals["userA"][&today()], 5000);
    assert_eq!(stats.per_date_totals[&today()], 5000);
    assert_eq!(stats.total_characters(), 5000);
}

#[tokio::test]
async fn test_admin_stats_reject_other_credentials() {
    let env = TestEnvironment::new(ScriptedBackend::prefix("X"));
    let service = env.service();

    assert!(matches!(
        service.admin_stats(READER_SECRET),
        Err(TranslationError::InvalidInput(_))
    ));
    assert!(matches!(
        service.admin_stats("not-a-key"),
        Err(TranslationError::InvalidInput(_))
    ));
}

#[test]
fn test_identity_resolution_is_idempotent() {
    let env = TestEnvironment::new(ScriptedBackend::prefix("X"));
    let meter = env.meter();

    assert_eq!(meter.resolve_identity(ADMIN_SECRET), "admin");
    assert_eq!(meter.resolve_identity(READER_SECRET), "reader");
    assert_eq!(meter.resolve_identity(READER_SECRET), meter.resolve_identity(READER_SECRET));
    // 未配置的凭据以自身为身份
    assert_eq!(meter.resolve_identity("raw-token"), "raw-token");
    assert!(meter.is_known_credential(GUEST_SECRET));
    assert!(!meter.is_known_credential("raw-token"));
}

#[tokio::test]
async fn test_credential_failure_aborts_the_request() {
    let backend = ScriptedBackend::prefix("X").failing_on("二", TranslationError::ConfigError("API key rejected".into()));
    let env = TestEnvironment::new(backend).with_translation(|config| config.max_concurrent_requests = 1);
    let service = env.service();

    let request = TranslateRequest::new(GUEST_SECRET, "一。二。三。四。五。", "vi").with_secondary(false);
    let error = service.translate(&request, &NoProgress).await.unwrap_err();

    assert!(matches!(error, TranslationError::ConfigError(_)));
    assert!(error.is_fatal());
    assert_eq!(service.get_stats().snapshot().failed_requests, 1);
    // 中止后剩余片段不再请求
    assert!(env.backend.calls() < 5);
}

#[tokio::test]
async fn test_credential_failure_aborts_interactive_lookup() {
    let backend = ScriptedBackend::prefix("X").failing_on("", TranslationError::ConfigError("API key rejected".into()));
    let env = TestEnvironment::new(backend).with_translation(|config| config.interactive_concurrency = 1);
    let service = env.service();

    let request = TranslateRequest::new(READER_SECRET, "你好。世界。", "vi").with_mode(TranslationMode::Interactive);
    let error = service.translate(&request, &NoProgress).await.unwrap_err();

    assert!(matches!(error, TranslationError::ConfigError(_)));
    assert_eq!(service.get_stats().snapshot().failed_requests, 1);
    assert_eq!(service.get_stats().snapshot().words_looked_up, 0);
    assert_eq!(env.backend.calls(), 1);
}

#[tokio::test]
async fn test_blank_input_is_rejected() {
    let env = TestEnvironment::new(ScriptedBackend::prefix("X"));
    let service = env.service();

    let request = TranslateRequest::new(GUEST_SECRET, "  \n\n \t ", "vi");
    let error = service.translate(&request, &NoProgress).await.unwrap_err();

    assert!(matches!(error, TranslationError::SegmentationEmpty));
    assert_eq!(service.usage_report(GUEST_SECRET).unwrap().used_today, 0);
    assert_eq!(env.backend.calls(), 0);
}

#[tokio::test]
async fn test_unknown_target_language_is_invalid_input() {
    let env = TestEnvironment::new(ScriptedBackend::prefix("X"));
    let service = env.service();

    let request = TranslateRequest::new(GUEST_SECRET, "你好", "Klingon");
    let error = service.translate(&request, &NoProgress).await.unwrap_err();

    assert!(matches!(error, TranslationError::InvalidInput(_)));
    assert_eq!(env.backend.calls(), 0);
}

#[tokio::test]
async fn test_concurrent_requests_share_one_quota() {
    let env = TestEnvironment::new(ScriptedBackend::prefix("X")).with_limits(10, 100);
    let service = env.service();
    let request = TranslateRequest::new(GUEST_SECRET, "一二三", "vi").with_secondary(false);

    let outcomes = join_all((0..6).map(|_| service.translate(&request, &NoProgress))).await;

    let admitted = outcomes.iter().filter(|outcome| outcome.is_ok()).count();
    assert_eq!(admitted, 3);
    assert_eq!(service.usage_report(GUEST_SECRET).unwrap().used_today, 9);
}

#[tokio::test]
async fn test_source_language_is_rejected_as_target() {
    let env = TestEnvironment::new(ScriptedBackend::prefix("X"));
    let service = env.service();

    for target in ["zh", "Chinese"] {
        let request = TranslateRequest::new(GUEST_SECRET, "你好。", target);
        let error = service.translate(&request, &NoProgress).await.unwrap_err();
        assert!(matches!(error, TranslationError::InvalidInput(_)));
    }
    assert!(service.quote("你好", "zh", true).is_err());
    assert_eq!(service.usage_report(GUEST_SECRET).unwrap().used_today, 0);
    assert_eq!(env.backend.calls(), 0);
}
