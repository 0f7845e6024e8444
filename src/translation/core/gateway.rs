//! 翻译网关
//!
//! 与生成服务交互的唯一入口：构造提示词、解析响应、重试、会话内去重缓存，
//! 以及检测 "原样返回输入" 的退化响应。

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use super::backend::{GenerationBackend, GenerationOptions};
use super::parsers::{
    gloss_schema, parse_with, translation_schema, FreeTextGlossParser, FreeTextParser,
    ParsedTranslation, ResponseParser, StructuredGlossParser, StructuredParser,
};
use super::retry::RetryPolicy;
use crate::translation::config::languages::display_name;
use crate::translation::config::TranslationConfig;
use crate::translation::error::{TranslationError, TranslationResult};
use crate::translation::pipeline::types::{Chunk, ChunkResult};
use crate::translation::storage::cache::{CacheKey, TranslationCache};

/// 请求策略
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Strategy {
    Structured,
    FreeText,
}

const STRATEGIES: [Strategy; 2] = [Strategy::Structured, Strategy::FreeText];

/// 网关运行统计
#[derive(Debug, Default)]
pub struct GatewayStats {
    pub backend_calls: AtomicUsize,
    pub cache_hits: AtomicUsize,
    pub structured_fallbacks: AtomicUsize,
    pub echo_retries: AtomicUsize,
    pub policy_blocks: AtomicUsize,
}

/// 网关统计快照
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GatewayStatsSnapshot {
    pub backend_calls: usize,
    pub cache_hits: usize,
    pub structured_fallbacks: usize,
    pub echo_retries: usize,
    pub policy_blocks: usize,
}

impl GatewayStats {
    pub fn snapshot(&self) -> GatewayStatsSnapshot {
        GatewayStatsSnapshot {
            backend_calls: self.backend_calls.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            structured_fallbacks: self.structured_fallbacks.load(Ordering::Relaxed),
            echo_retries: self.echo_retries.load(Ordering::Relaxed),
            policy_blocks: self.policy_blocks.load(Ordering::Relaxed),
        }
    }
}

/// 翻译网关
pub struct TranslationGateway {
    backend: Arc<dyn GenerationBackend>,
    retry: RetryPolicy,
    call_timeout: Duration,
    secondary_lang: String,
    cache: TranslationCache<ParsedTranslation>,
    word_cache: TranslationCache<Vec<String>>,
    stats: GatewayStats,
}

impl TranslationGateway {
    pub fn new(backend: Arc<dyn GenerationBackend>, config: &TranslationConfig) -> Self {
        let (cache, word_cache) = if config.cache_enabled {
            (
                TranslationCache::new(config.local_cache_size, config.cache_ttl()),
                TranslationCache::new(config.local_cache_size, config.cache_ttl()),
            )
        } else {
            (TranslationCache::disabled(), TranslationCache::disabled())
        };

        Self {
            backend,
            retry: RetryPolicy::from_config(config),
            call_timeout: config.request_timeout(),
            secondary_lang: config.secondary_lang.clone(),
            cache,
            word_cache,
            stats: GatewayStats::default(),
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    pub fn stats(&self) -> GatewayStatsSnapshot {
        self.stats.snapshot()
    }

    pub fn cache_stats(&self) -> crate::translation::storage::cache::CacheStats {
        self.cache.get_stats()
    }

    /// 翻译一个片段；失败时返回带占位文本的 Errored 结果，从不丢弃
    pub async fn translate_chunk(&self, chunk: &Chunk, target_lang: &str, want_secondary: bool) -> ChunkResult {
        match self
            .translate(&chunk.source_text, &chunk.source_lang, target_lang, want_secondary)
            .await
        {
            Ok(parsed) => ChunkResult::ok(chunk, parsed.primary, parsed.secondary),
            Err(error) => {
                tracing::warn!("片段 {} 翻译失败: {}", chunk.index, error);
                ChunkResult::errored(chunk, &error)
            }
        }
    }

    /// 翻译一段文本
    pub async fn translate(
        &self,
        text: &str,
        source_lang: &str,
        target_lang: &str,
        want_secondary: bool,
    ) -> TranslationResult<ParsedTranslation> {
        let text = text.trim();
        if text.is_empty() {
            return Err(TranslationError::InvalidInput("待翻译文本为空".to_string()));
        }

        let key = CacheKey::translation(text, source_lang, target_lang, want_secondary);
        if let Some(cached) = self.cache.get(&key) {
            self.stats.cache_hits.fetch_add(1, Ordering::Relaxed);
            tracing::debug!("缓存命中: {}", key.as_str());
            return Ok(cached);
        }

        let parsed = self
            .translate_uncached(text, source_lang, target_lang, want_secondary)
            .await
            .map_err(|error| {
                if error.is_policy_block() {
                    self.stats.policy_blocks.fetch_add(1, Ordering::Relaxed);
                }
                error
            })?;

        self.cache.insert(key, parsed.clone());
        Ok(parsed)
    }

    async fn translate_uncached(
        &self,
        text: &str,
        source_lang: &str,
        target_lang: &str,
        want_secondary: bool,
    ) -> TranslationResult<ParsedTranslation> {
        let mut last_error = None;

        for strategy in STRATEGIES {
            let prompt = self.translation_prompt(text, source_lang, target_lang, want_secondary, strategy, false);
            let options = Self::options_for(strategy);
            let raw = match self.generate(&prompt, &options).await {
                Ok(raw) => raw,
                // 结构化请求被拒或返回空内容时退回自由文本
                Err(error @ (TranslationError::MalformedResponse(_) | TranslationError::InvalidInput(_)))
                    if strategy == Strategy::Structured =>
                {
                    tracing::debug!("结构化请求失败，退回自由文本: {}", error);
                    self.stats.structured_fallbacks.fetch_add(1, Ordering::Relaxed);
                    last_error = Some(error);
                    continue;
                }
                Err(error) => return Err(error),
            };

            match self.parse_translation(&raw, strategy, want_secondary) {
                Some(parsed) => return self.reject_echo(text, source_lang, target_lang, want_secondary, parsed).await,
                None => {
                    tracing::debug!("{:?} 策略解析失败，尝试下一个策略", strategy);
                    if strategy == Strategy::Structured {
                        self.stats.structured_fallbacks.fetch_add(1, Ordering::Relaxed);
                    }
                    last_error = Some(TranslationError::MalformedResponse(format!(
                        "{:?} 响应无法解析: {}",
                        strategy,
                        raw.chars().take(80).collect::<String>()
                    )));
                }
            }
        }

        Err(last_error.unwrap_or_else(|| TranslationError::MalformedResponse("没有可用的解析策略".to_string())))
    }

    fn parse_translation(&self, raw: &str, strategy: Strategy, want_secondary: bool) -> Option<ParsedTranslation> {
        let structured = StructuredParser { want_secondary };
        let free = FreeTextParser { want_secondary };
        let parsers: Vec<&dyn ResponseParser<ParsedTranslation>> = match strategy {
            Strategy::Structured => vec![&structured],
            Strategy::FreeText => vec![&free],
        };
        parse_with(&parsers, raw).map(|(parsed, _)| parsed)
    }

    /// 译文与原文相同时用更强硬的提示词强制重试一次
    async fn reject_echo(
        &self,
        text: &str,
        source_lang: &str,
        target_lang: &str,
        want_secondary: bool,
        parsed: ParsedTranslation,
    ) -> TranslationResult<ParsedTranslation> {
        if !is_echo(text, &parsed.primary, source_lang, target_lang) {
            return Ok(parsed);
        }

        tracing::warn!("生成服务原样返回了输入，强制重试");
        self.stats.echo_retries.fetch_add(1, Ordering::Relaxed);

        let prompt = self.translation_prompt(text, source_lang, target_lang, want_secondary, Strategy::FreeText, true);
        let raw = self.generate(&prompt, &GenerationOptions::free_text()).await?;

        match self.parse_translation(&raw, Strategy::FreeText, want_secondary) {
            Some(retried) if !is_echo(text, &retried.primary, source_lang, target_lang) => Ok(retried),
            _ => Err(TranslationError::EchoedSource),
        }
    }

    /// 交互模式的单词释义
    pub async fn lookup_word(&self, word: &str, source_lang: &str, target_lang: &str) -> TranslationResult<Vec<String>> {
        let key = CacheKey::word(word, source_lang, target_lang);
        if let Some(cached) = self.word_cache.get(&key) {
            self.stats.cache_hits.fetch_add(1, Ordering::Relaxed);
            return Ok(cached);
        }

        let prompt = format!(
            "Analyze this {} word: \"{}\".\n\
             Give its pinyin and its meanings in {}.\n\
             Output JSON only: {{\"word\": \"{}\", \"pinyin\": \"...\", \"translations\": [\"...\"]}}",
            display_name(source_lang),
            word,
            display_name(target_lang),
            word
        );
        let raw = self
            .generate(&prompt, &GenerationOptions::structured(gloss_schema()))
            .await?;

        let parsers: [&dyn ResponseParser<Vec<String>>; 2] = [&StructuredGlossParser, &FreeTextGlossParser];
        let (glosses, parser) = parse_with(&parsers, &raw)
            .ok_or_else(|| TranslationError::MalformedResponse(format!("无法解析 '{}' 的释义", word)))?;
        tracing::debug!("'{}' 释义由 {} 解析", word, parser);

        self.word_cache.insert(key, glosses.clone());
        Ok(glosses)
    }

    /// 带超时和重试的单次生成调用
    async fn generate(&self, prompt: &str, options: &GenerationOptions) -> TranslationResult<String> {
        let backend = &self.backend;
        let stats = &self.stats;
        let timeout = self.call_timeout;

        self.retry
            .run(|| async move {
                stats.backend_calls.fetch_add(1, Ordering::Relaxed);
                tokio::time::timeout(timeout, backend.generate(prompt, options)).await?
            })
            .await
    }

    fn options_for(strategy: Strategy) -> GenerationOptions {
        match strategy {
            Strategy::Structured => GenerationOptions::structured(translation_schema()),
            Strategy::FreeText => GenerationOptions::free_text(),
        }
    }

    fn translation_prompt(
        &self,
        text: &str,
        source_lang: &str,
        target_lang: &str,
        want_secondary: bool,
        strategy: Strategy,
        forceful: bool,
    ) -> String {
        let source = display_name(source_lang);
        let target = display_name(target_lang);
        let secondary = display_name(&self.secondary_lang);

        let mut prompt = String::new();
        if forceful {
            prompt.push_str(&format!(
                "Your previous answer repeated the original text. You MUST translate it into {}. \
                 Never return the {} original unchanged.\n",
                target, source
            ));
        }

        match (strategy, want_secondary) {
            (Strategy::Structured, true) => prompt.push_str(&format!(
                "Translate the following {} text into {} and into {}. \
                 Return a JSON object with \"primary\" set to the {} translation and \
                 \"secondary\" set to the {} translation.\n\n",
                source, target, secondary, target, secondary
            )),
            (Strategy::Structured, false) => prompt.push_str(&format!(
                "Translate the following {} text into {}. \
                 Return a JSON object with \"primary\" set to the {} translation.\n\n",
                source, target, target
            )),
            (Strategy::FreeText, true) => prompt.push_str(&format!(
                "Translate the following {} text. Output exactly two lines: \
                 line 1 is the {} translation, line 2 is the {} translation. \
                 No explanations.\n\n",
                source, target, secondary
            )),
            (Strategy::FreeText, false) => prompt.push_str(&format!(
                "Translate the following {} text into {}. Output only the translation, \
                 no explanations.\n\n",
                source, target
            )),
        }

        prompt.push_str(text);
        prompt
    }
}

/// 译文与原文一致且原文含有可翻译的文字
fn is_echo(source: &str, translated: &str, source_lang: &str, target_lang: &str) -> bool {
    if source_lang.eq_ignore_ascii_case(target_lang) {
        return false;
    }
    source.trim() == translated.trim() && source.chars().any(char::is_alphabetic)
}
