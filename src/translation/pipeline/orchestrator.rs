//! 片段编排器
//!
//! 以有界并发把片段分发给网关，按完成顺序收集结果，最后按索引排序。
//! 每个提交的片段都恰好产生一个结果，失败和取消的片段以占位结果代替。

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use futures::stream::{FuturesUnordered, StreamExt};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

use super::types::{Chunk, ChunkResult, WordEntry};
use crate::translation::config::constants::UNAVAILABLE_PLACEHOLDER;
use crate::translation::core::gateway::TranslationGateway;
use crate::translation::error::{TranslationError, TranslationResult};
use crate::translation::phonetic::{annotate, PhoneticStyle};

/// 进度
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    pub completed: usize,
    pub total: usize,
}

impl Progress {
    /// 0.0 ~ 100.0
    pub fn percent(&self) -> f64 {
        if self.total == 0 {
            100.0
        } else {
            self.completed as f64 * 100.0 / self.total as f64
        }
    }
}

/// 进度接收者，每完成一个片段回调一次
pub trait ProgressSink: Send + Sync {
    fn report(&self, progress: Progress);
}

impl<F> ProgressSink for F
where
    F: Fn(Progress) + Send + Sync,
{
    fn report(&self, progress: Progress) {
        self(progress)
    }
}

/// 忽略进度
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn report(&self, _progress: Progress) {}
}

/// 一批片段共用的翻译参数
#[derive(Debug, Clone)]
pub struct BatchOptions {
    pub target_lang: String,
    pub want_secondary: bool,
    /// 设置时为每个片段附加本地拼音
    pub phonetic: Option<PhoneticStyle>,
}

/// 片段编排器
#[derive(Debug, Clone)]
pub struct ChunkOrchestrator {
    concurrency: usize,
}

impl ChunkOrchestrator {
    pub fn new(concurrency: usize) -> Self {
        Self {
            concurrency: concurrency.max(1),
        }
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// 有界并发执行，结果按索引升序返回
    ///
    /// 取消后尚未完成的条目由 `on_cancel` 生成结果，条目数量保持不变
    pub async fn run_ordered<I, R, W, Fut, C>(
        &self,
        items: Vec<(usize, I)>,
        worker: W,
        on_cancel: C,
        progress: &dyn ProgressSink,
        cancel: &CancellationToken,
    ) -> Vec<R>
    where
        I: Clone,
        W: Fn(I) -> Fut,
        Fut: Future<Output = R>,
        C: Fn(I) -> R,
    {
        let total = items.len();
        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let completed = AtomicUsize::new(0);
        let cancelled = AtomicUsize::new(0);

        let worker = &worker;
        let on_cancel = &on_cancel;
        let semaphore = &semaphore;
        let cancelled_count = &cancelled;

        let mut pending: FuturesUnordered<_> = items
            .into_iter()
            .map(|(index, item)| async move {
                let result = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => None,
                    permit = semaphore.acquire() => match permit {
                        Ok(_permit) if !cancel.is_cancelled() => {
                            // 进行中的请求同样响应取消
                            tokio::select! {
                                biased;
                                _ = cancel.cancelled() => None,
                                result = worker(item.clone()) => Some(result),
                            }
                        }
                        _ => None,
                    },
                };

                let result = result.unwrap_or_else(|| {
                    cancelled_count.fetch_add(1, Ordering::Relaxed);
                    on_cancel(item)
                });
                (index, result)
            })
            .collect();

        let mut results: Vec<(usize, R)> = Vec::with_capacity(total);

        // 完成顺序不确定
        while let Some((index, result)) = pending.next().await {
            results.push((index, result));
            let done = completed.fetch_add(1, Ordering::SeqCst) + 1;
            progress.report(Progress { completed: done, total });
        }

        if total == 0 {
            progress.report(Progress { completed: 0, total: 0 });
        }

        let cancelled = cancelled.load(Ordering::Relaxed);
        if cancelled > 0 {
            tracing::info!("{}/{} 个条目因取消未完成", cancelled, total);
        }

        results.sort_by_key(|(index, _)| *index);
        results.into_iter().map(|(_, result)| result).collect()
    }

    /// 翻译全部片段
    ///
    /// 单个片段失败只影响自身结果；后端配置或凭据错误会取消其余片段并返回错误
    pub async fn translate_all(
        &self,
        gateway: &TranslationGateway,
        chunks: Vec<Chunk>,
        options: &BatchOptions,
        progress: &dyn ProgressSink,
        cancel: &CancellationToken,
    ) -> TranslationResult<Vec<ChunkResult>> {
        let total = chunks.len();
        tracing::info!("开始翻译 {} 个片段 (并发 {})", total, self.concurrency);
        metrics::counter!("translation_chunks_total").increment(total as u64);

        let items: Vec<(usize, Chunk)> = chunks.into_iter().map(|chunk| (chunk.index, chunk)).collect();
        let abort = cancel.child_token();
        let abort_ref = &abort;

        let results = self
            .run_ordered(
                items,
                move |chunk: Chunk| async move {
                    tracing::debug!("翻译片段 {} ({} 字符)", chunk.index, chunk.char_count());
                    let result = gateway
                        .translate_chunk(&chunk, &options.target_lang, options.want_secondary)
                        .await;
                    if result.fatal {
                        abort_ref.cancel();
                    }
                    attach_phonetic(result, &chunk, options.phonetic)
                },
                move |chunk: Chunk| {
                    let result = ChunkResult::errored(&chunk, &TranslationError::Cancelled);
                    attach_phonetic(result, &chunk, options.phonetic)
                },
                progress,
                &abort,
            )
            .await;

        if let Some(fatal) = results.iter().find(|result| result.fatal) {
            let detail = fatal.error_detail.clone().unwrap_or_default();
            tracing::error!("翻译后端不可用，中止请求: {}", detail);
            return Err(TranslationError::ConfigError(detail));
        }

        let errored = results.iter().filter(|result| !result.is_ok()).count();
        metrics::counter!("translation_chunks_errored").increment(errored as u64);
        if errored > 0 {
            tracing::warn!("{}/{} 个片段失败，返回部分结果", errored, total);
        } else {
            tracing::info!("全部 {} 个片段翻译完成", total);
        }

        Ok(results)
    }

    /// 交互模式逐词查询，段落标记原样保留
    ///
    /// 单词查询失败时释义为占位文本；后端配置或凭据错误会取消其余查询并返回错误
    #[allow(clippy::too_many_arguments)]
    pub async fn lookup_all(
        &self,
        gateway: &TranslationGateway,
        tokens: Vec<String>,
        source_lang: &str,
        target_lang: &str,
        style: PhoneticStyle,
        progress: &dyn ProgressSink,
        cancel: &CancellationToken,
    ) -> TranslationResult<Vec<WordEntry>> {
        tracing::info!("开始逐词查询 {} 个词 (并发 {})", tokens.len(), self.concurrency);
        let items: Vec<(usize, String)> = tokens.into_iter().enumerate().collect();
        let abort = cancel.child_token();
        let abort_ref = &abort;

        let results: Vec<Result<WordEntry, TranslationError>> = self
            .run_ordered(
                items,
                move |token: String| async move {
                    if token == super::types::PARAGRAPH_SENTINEL {
                        return Ok(WordEntry::paragraph_break());
                    }
                    let phonetic = annotate(&token, style);
                    match gateway.lookup_word(&token, source_lang, target_lang).await {
                        Ok(glosses) => Ok(WordEntry::new(token, phonetic, glosses)),
                        Err(error) if error.is_fatal() => {
                            abort_ref.cancel();
                            Err(error)
                        }
                        Err(error) => {
                            tracing::warn!("查询 '{}' 失败: {}", token, error);
                            Ok(WordEntry::new(token, phonetic, vec![UNAVAILABLE_PLACEHOLDER.to_string()]))
                        }
                    }
                },
                move |token: String| {
                    if token == super::types::PARAGRAPH_SENTINEL {
                        Ok(WordEntry::paragraph_break())
                    } else {
                        let phonetic = annotate(&token, style);
                        Ok(WordEntry::new(token, phonetic, vec![UNAVAILABLE_PLACEHOLDER.to_string()]))
                    }
                },
                progress,
                &abort,
            )
            .await;

        let entries = results.into_iter().collect::<TranslationResult<Vec<_>>>().map_err(|error| {
            tracing::error!("翻译后端不可用，中止查询: {}", error);
            error
        })?;
        Ok(entries)
    }
}

fn attach_phonetic(result: ChunkResult, chunk: &Chunk, style: Option<PhoneticStyle>) -> ChunkResult {
    match style {
        Some(style) => result.with_phonetic(annotate(&chunk.source_text, style)),
        None => result,
    }
}
