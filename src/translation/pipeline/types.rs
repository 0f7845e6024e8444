//! 管道数据模型

use serde::{Deserialize, Serialize};

use crate::translation::error::TranslationError;

/// 段落分隔标记，交互模式中不参与翻译
pub const PARAGRAPH_SENTINEL: &str = "\n";

/// 待翻译片段，由切分器创建后不再修改
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    /// 在本次请求内唯一且从 0 连续递增，重组时唯一的排序依据
    pub index: usize,
    pub source_text: String,
    pub source_lang: String,
}

impl Chunk {
    pub fn new(index: usize, source_text: impl Into<String>, source_lang: impl Into<String>) -> Self {
        Self {
            index,
            source_text: source_text.into(),
            source_lang: source_lang.into(),
        }
    }

    pub fn char_count(&self) -> usize {
        self.source_text.chars().count()
    }
}

/// 片段处理状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkStatus {
    Ok,
    Errored,
}

/// 单个片段的翻译结果
///
/// 重试时整体替换，创建后不修改
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkResult {
    pub chunk_index: usize,
    pub source_text: String,
    pub primary_text: String,
    pub secondary_text: Option<String>,
    pub phonetic: Option<String>,
    pub status: ChunkStatus,
    pub error_detail: Option<String>,
    /// 后端整体不可用（配置或凭据错误），整个请求应当中止
    #[serde(skip)]
    pub fatal: bool,
}

impl ChunkResult {
    pub fn ok(chunk: &Chunk, primary: String, secondary: Option<String>) -> Self {
        Self {
            chunk_index: chunk.index,
            source_text: chunk.source_text.clone(),
            primary_text: primary,
            secondary_text: secondary,
            phonetic: None,
            status: ChunkStatus::Ok,
            error_detail: None,
            fatal: false,
        }
    }

    /// 失败片段：主译文换成用户可见的占位文本
    pub fn errored(chunk: &Chunk, error: &TranslationError) -> Self {
        Self {
            chunk_index: chunk.index,
            source_text: chunk.source_text.clone(),
            primary_text: error.user_message(),
            secondary_text: None,
            phonetic: None,
            status: ChunkStatus::Errored,
            error_detail: Some(error.to_string()),
            fatal: error.is_fatal(),
        }
    }

    pub fn with_phonetic(self, phonetic: String) -> Self {
        let phonetic = if phonetic.is_empty() { None } else { Some(phonetic) };
        Self { phonetic, ..self }
    }

    pub fn is_ok(&self) -> bool {
        self.status == ChunkStatus::Ok
    }
}

/// 交互模式中的单个词条
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WordEntry {
    pub surface_form: String,
    pub phonetic: String,
    pub glosses: Vec<String>,
}

impl WordEntry {
    pub fn new(surface_form: impl Into<String>, phonetic: impl Into<String>, glosses: Vec<String>) -> Self {
        Self {
            surface_form: surface_form.into(),
            phonetic: phonetic.into(),
            glosses,
        }
    }

    pub fn paragraph_break() -> Self {
        Self {
            surface_form: PARAGRAPH_SENTINEL.to_string(),
            phonetic: String::new(),
            glosses: Vec::new(),
        }
    }

    pub fn is_paragraph_break(&self) -> bool {
        self.surface_form == PARAGRAPH_SENTINEL
    }
}
