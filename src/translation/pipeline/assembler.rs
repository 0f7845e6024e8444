//! 结果组装
//!
//! 把有序的片段结果或词条合并成与渲染格式无关的文档结构。

use serde::Serialize;

use super::types::{ChunkResult, ChunkStatus, WordEntry};

/// 标准模式的一条记录
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DocumentRecord {
    pub index: usize,
    pub source: String,
    pub phonetic: Option<String>,
    pub secondary: Option<String>,
    pub primary: String,
    pub status: ChunkStatus,
}

/// 交互模式的一个段落
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Paragraph {
    pub words: Vec<WordEntry>,
}

/// 组装后的文档
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "body", rename_all = "lowercase")]
pub enum Document {
    Standard(Vec<DocumentRecord>),
    Interactive(Vec<Paragraph>),
}

impl Document {
    pub fn records(&self) -> &[DocumentRecord] {
        match self {
            Document::Standard(records) => records,
            Document::Interactive(_) => &[],
        }
    }

    pub fn paragraphs(&self) -> &[Paragraph] {
        match self {
            Document::Standard(_) => &[],
            Document::Interactive(paragraphs) => paragraphs,
        }
    }

    pub fn primary_texts(&self) -> Vec<&str> {
        self.records().iter().map(|record| record.primary.as_str()).collect()
    }

    /// 出错记录的索引，部分失败时文档仍然完整
    pub fn errored_indices(&self) -> Vec<usize> {
        self.records()
            .iter()
            .filter(|record| record.status == ChunkStatus::Errored)
            .map(|record| record.index)
            .collect()
    }

    pub fn is_partial(&self) -> bool {
        !self.errored_indices().is_empty()
    }
}

/// 标准模式组装，保持输入顺序
pub fn assemble(results: Vec<ChunkResult>) -> Document {
    debug_assert!(
        results.windows(2).all(|pair| pair[0].chunk_index < pair[1].chunk_index),
        "results must be ordered by chunk index"
    );

    Document::Standard(
        results
            .into_iter()
            .map(|result| DocumentRecord {
                index: result.chunk_index,
                source: result.source_text,
                phonetic: result.phonetic,
                secondary: result.secondary_text,
                primary: result.primary_text,
                status: result.status,
            })
            .collect(),
    )
}

/// 交互模式组装，在换行标记处分段，标记本身不进入段落
pub fn assemble_interactive(words: Vec<WordEntry>) -> Document {
    let mut paragraphs = Vec::new();
    let mut current = Vec::new();

    for word in words {
        if word.is_paragraph_break() {
            if !current.is_empty() {
                paragraphs.push(Paragraph {
                    words: std::mem::take(&mut current),
                });
            }
        } else {
            current.push(word);
        }
    }

    if !current.is_empty() {
        paragraphs.push(Paragraph { words: current });
    }

    Document::Interactive(paragraphs)
}
