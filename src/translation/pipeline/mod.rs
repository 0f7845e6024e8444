//! 翻译管道模块
//!
//! 分段 → 并发翻译 → 组装

pub mod assembler;
pub mod orchestrator;
pub mod segmenter;
pub mod types;

// 重新导出主要类型
pub use assembler::{assemble, assemble_interactive, Document, DocumentRecord, Paragraph};
pub use orchestrator::{BatchOptions, ChunkOrchestrator, NoProgress, Progress, ProgressSink};
pub use segmenter::{SegmentMode, Segmenter};
pub use types::{Chunk, ChunkResult, ChunkStatus, WordEntry, PARAGRAPH_SENTINEL};
