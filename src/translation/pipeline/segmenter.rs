//! 文本切分器
//!
//! 把原始输入切成适合独立翻译的片段：
//! - 句子模式：按中英文句末/分句标点切分，引号内部不切，过短的片段向后合并
//! - 块模式：先做 OCR 噪声清理，再按句子累积到目标长度，句子不跨块

use std::sync::OnceLock;

use regex::Regex;

use super::types::{Chunk, PARAGRAPH_SENTINEL};
use crate::translation::config::TranslationConfig;

/// 切分模式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentMode {
    Sentence,
    Block,
}

/// 文本切分器
#[derive(Debug, Clone)]
pub struct Segmenter {
    min_chunk_chars: usize,
    block_target_chars: usize,
    source_lang: String,
}

impl Segmenter {
    pub fn new(min_chunk_chars: usize, block_target_chars: usize) -> Self {
        Self {
            min_chunk_chars,
            block_target_chars,
            source_lang: "zh".to_string(),
        }
    }

    pub fn from_config(config: &TranslationConfig) -> Self {
        Self::new(config.min_chunk_chars, config.block_target_chars)
            .with_source_lang(&config.source_lang)
    }

    pub fn with_source_lang(mut self, lang: &str) -> Self {
        self.source_lang = lang.to_string();
        self
    }

    /// 切分文本，返回从 0 连续编号的片段；空白输入返回空序列
    pub fn segment(&self, text: &str, mode: SegmentMode) -> Vec<Chunk> {
        let pieces = match mode {
            SegmentMode::Sentence => self.segment_sentences(text),
            SegmentMode::Block => self.segment_blocks(text),
        };

        let chunks: Vec<Chunk> = pieces
            .into_iter()
            .map(|piece| piece.trim().to_string())
            .filter(|piece| !piece.is_empty())
            .enumerate()
            .map(|(index, piece)| Chunk::new(index, piece, self.source_lang.as_str()))
            .collect();

        tracing::debug!("切分完成: {:?} 模式产生 {} 个片段", mode, chunks.len());
        chunks
    }

    /// 交互模式的逐字切分，段落之间插入换行标记
    pub fn tokenize_words(&self, text: &str) -> Vec<String> {
        let mut tokens = Vec::new();

        for paragraph in text.lines().filter(|line| !line.trim().is_empty()) {
            if !tokens.is_empty() {
                tokens.push(PARAGRAPH_SENTINEL.to_string());
            }
            tokens.extend(
                paragraph
                    .chars()
                    .filter(|ch| !ch.is_whitespace())
                    .map(|ch| ch.to_string()),
            );
        }

        tokens
    }

    // ========================================================================
    // 句子模式
    // ========================================================================

    fn segment_sentences(&self, text: &str) -> Vec<String> {
        let normalized = whitespace_regex().replace_all(text.trim(), " ");
        if normalized.is_empty() {
            return Vec::new();
        }

        let fragments = split_on_punctuation(&normalized);

        // 没有任何可用边界时退回按空白切分
        if fragments.len() <= 1 && char_len(&normalized) > self.min_chunk_chars {
            let words: Vec<String> = normalized
                .split(' ')
                .enumerate()
                .map(|(i, word)| if i == 0 { word.to_string() } else { format!(" {}", word) })
                .collect();
            return merge_short(words, self.min_chunk_chars);
        }

        merge_short(fragments, self.min_chunk_chars)
    }

    // ========================================================================
    // 块模式
    // ========================================================================

    fn segment_blocks(&self, text: &str) -> Vec<String> {
        let cleaned = denoise(text);
        if cleaned.is_empty() {
            return Vec::new();
        }

        let mut blocks = Vec::new();
        let mut current = String::new();
        let mut current_len = 0;

        for sentence in split_block_sentences(&cleaned) {
            let len = char_len(sentence);
            if current_len > 0 && current_len + len > self.block_target_chars {
                blocks.push(std::mem::take(&mut current));
                current_len = 0;
            }
            current.push_str(sentence);
            current_len += len;
        }

        if !current.trim().is_empty() {
            blocks.push(current);
        }

        blocks
    }
}

fn char_len(text: &str) -> usize {
    text.chars().count()
}

fn whitespace_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s+").expect("static whitespace pattern"))
}

fn paragraph_break_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\n[^\S\n]*\n\s*").expect("static paragraph pattern"))
}

fn glued_sentence_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"([a-z])\.([A-Za-z])").expect("static ocr pattern"))
}

fn block_sentence_end_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"[.!?]+["')\]]*\s+|[。！？]+[」』”）)]*\s*"#).expect("static sentence pattern")
    })
}

fn is_terminal(ch: char) -> bool {
    matches!(ch, '。' | '！' | '？' | '，' | '：' | '；' | '.' | '!' | '?' | ',')
}

fn is_open_quote(ch: char) -> bool {
    matches!(ch, '「' | '『' | '“')
}

fn is_close_quote(ch: char) -> bool {
    matches!(ch, '」' | '』' | '”')
}

fn is_close_bracket(ch: char) -> bool {
    matches!(ch, ')' | '）')
}

/// 按标点切分，引号内部的标点不产生边界
///
/// 片段保留原有的空白，拼接后与输入相同
fn split_on_punctuation(text: &str) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    let mut fragments = Vec::new();
    let mut current = String::new();

    let mut depth: usize = 0;
    let mut ascii_quote_open = false;
    // 引号内最后一个有效字符是否为句末标点
    let mut terminal_in_quote = false;

    let mut i = 0;
    while i < chars.len() {
        let ch = chars[i];
        current.push(ch);
        let quoted = depth > 0 || ascii_quote_open;

        let boundary = if is_terminal(ch) {
            if quoted {
                terminal_in_quote = true;
                false
            } else {
                !is_numeric_separator(&chars, i)
            }
        } else if is_open_quote(ch) {
            depth += 1;
            terminal_in_quote = false;
            false
        } else if is_close_quote(ch) {
            depth = depth.saturating_sub(1);
            depth == 0 && !ascii_quote_open && terminal_in_quote
        } else if ch == '"' {
            if ascii_quote_open {
                ascii_quote_open = false;
                depth == 0 && terminal_in_quote
            } else {
                ascii_quote_open = true;
                terminal_in_quote = false;
                false
            }
        } else {
            if !ch.is_whitespace() {
                terminal_in_quote = false;
            }
            false
        };

        if boundary {
            // 连续标点和右括号归入当前片段
            while let Some(&next) = chars.get(i + 1) {
                if is_terminal(next) || is_close_bracket(next) {
                    current.push(next);
                    i += 1;
                } else {
                    break;
                }
            }
            fragments.push(std::mem::take(&mut current));
            terminal_in_quote = false;
        }

        i += 1;
    }

    if !current.is_empty() {
        fragments.push(current);
    }

    fragments
}

/// 数字中的小数点和千分位不是边界
fn is_numeric_separator(chars: &[char], i: usize) -> bool {
    matches!(chars[i], '.' | ',')
        && i > 0
        && chars[i - 1].is_ascii_digit()
        && chars.get(i + 1).map_or(false, |c| c.is_ascii_digit())
}

/// 合并过短片段：当前长度加上新片段仍小于阈值时继续拼接
fn merge_short(fragments: Vec<String>, min_chars: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;

    for fragment in fragments {
        if fragment.trim().is_empty() {
            current.push_str(&fragment);
            continue;
        }

        let len = char_len(&fragment);
        if current_len + len < min_chars {
            current.push_str(&fragment);
            current_len += len;
        } else {
            if !current.trim().is_empty() {
                chunks.push(std::mem::take(&mut current));
            } else {
                current.clear();
            }
            current.push_str(&fragment);
            current_len = len;
        }
    }

    if !current.trim().is_empty() {
        chunks.push(current);
    }

    chunks
}

/// OCR 噪声清理
///
/// 单个换行视为折行并替换为空格，空行保留为段落分隔
fn denoise(text: &str) -> String {
    let text = text.replace("\r\n", "\n");

    paragraph_break_regex()
        .split(text.trim())
        .map(|paragraph| whitespace_regex().replace_all(paragraph.trim(), " "))
        .map(|paragraph| glued_sentence_regex().replace_all(&paragraph, "$1. $2").into_owned())
        .filter(|paragraph| !paragraph.is_empty())
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// 按句末标点切句，切出的句子首尾相接可还原输入
fn split_block_sentences(text: &str) -> Vec<&str> {
    let mut sentences = Vec::new();
    let mut last = 0;

    for m in block_sentence_end_regex().find_iter(text) {
        sentences.push(&text[last..m.end()]);
        last = m.end();
    }

    if last < text.len() {
        sentences.push(&text[last..]);
    }

    sentences
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texts(chunks: &[Chunk]) -> Vec<&str> {
        chunks.iter().map(|c| c.source_text.as_str()).collect()
    }

    #[test]
    fn test_three_sentences_with_threshold_one() {
        let segmenter = Segmenter::new(1, 1800);
        let chunks = segmenter.segment("第一句。第二句！第三句？", SegmentMode::Sentence);
        assert_eq!(texts(&chunks), vec!["第一句。", "第二句！", "第三句？"]);
        assert_eq!(chunks.iter().map(|c| c.index).collect::<Vec<_>>(), vec![0, 1, 2]);
        assert!(chunks.iter().all(|c| c.source_lang == "zh"));
    }

    #[test]
    fn test_quoted_span_is_never_split() {
        let segmenter = Segmenter::new(1, 1800);
        let chunks = segmenter.segment("内容\"A。B\"结束。", SegmentMode::Sentence);
        assert_eq!(texts(&chunks), vec!["内容\"A。B\"结束。"]);
    }

    #[test]
    fn test_corner_brackets_split_after_closing_quote() {
        let segmenter = Segmenter::new(1, 1800);
        let chunks = segmenter.segment("他说：「走吧。」我们走了。", SegmentMode::Sentence);
        assert_eq!(texts(&chunks), vec!["他说：", "「走吧。」", "我们走了。"]);
    }

    #[test]
    fn test_ascii_quotes_nested_in_cjk_quotes() {
        let segmenter = Segmenter::new(1, 1800);

        let chunks = segmenter.segment("他说：“她喊\"站住！\"就跑了。”然后安静了。", SegmentMode::Sentence);
        assert_eq!(texts(&chunks), vec!["他说：", "“她喊\"站住！\"就跑了。”", "然后安静了。"]);

        let chunks = segmenter.segment("\"他说「好。」\"然后走了。", SegmentMode::Sentence);
        assert_eq!(texts(&chunks), vec!["\"他说「好。」\"", "然后走了。"]);
    }

    #[test]
    fn test_short_fragments_are_merged() {
        let segmenter = Segmenter::new(100, 1800);
        let chunks = segmenter.segment("你好。我很好。谢谢！", SegmentMode::Sentence);
        assert_eq!(texts(&chunks), vec!["你好。我很好。谢谢！"]);
    }

    #[test]
    fn test_merge_threshold_is_strict() {
        let segmenter = Segmenter::new(6, 1800);
        // 3 + 3 == 6 不小于阈值，因此不合并
        let chunks = segmenter.segment("一二。三四。", SegmentMode::Sentence);
        assert_eq!(texts(&chunks), vec!["一二。", "三四。"]);
    }

    #[test]
    fn test_trailing_fragment_is_flushed() {
        let segmenter = Segmenter::new(1, 1800);
        let chunks = segmenter.segment("完整的一句。残句", SegmentMode::Sentence);
        assert_eq!(texts(&chunks), vec!["完整的一句。", "残句"]);
    }

    #[test]
    fn test_decimal_numbers_are_not_boundaries() {
        let segmenter = Segmenter::new(1, 1800);
        let chunks = segmenter.segment("Pi is 3.14, roughly.", SegmentMode::Sentence);
        assert_eq!(texts(&chunks), vec!["Pi is 3.14,", "roughly."]);
    }

    #[test]
    fn test_whitespace_fallback_without_punctuation() {
        let segmenter = Segmenter::new(10, 1800);
        let chunks = segmenter.segment("alpha beta gamma delta epsilon", SegmentMode::Sentence);
        assert!(chunks.len() > 1);
        assert!(chunks.iter().all(|c| !c.source_text.starts_with(' ')));
        let rejoined = texts(&chunks).join(" ");
        assert_eq!(rejoined, "alpha beta gamma delta epsilon");
    }

    #[test]
    fn test_blank_input_yields_nothing() {
        let segmenter = Segmenter::new(1, 1800);
        assert!(segmenter.segment("  \n\t ", SegmentMode::Sentence).is_empty());
        assert!(segmenter.segment("", SegmentMode::Block).is_empty());
    }

    #[test]
    fn test_block_mode_denoises_line_breaks() {
        let segmenter = Segmenter::new(1, 1800);
        let chunks = segmenter.segment("This is a\nbroken   line.Next one.\n\nNew paragraph.", SegmentMode::Block);
        assert_eq!(chunks.len(), 1);
        assert_eq!(
            chunks[0].source_text,
            "This is a broken line. Next one.\n\nNew paragraph."
        );
    }

    #[test]
    fn test_block_mode_respects_budget_and_sentences() {
        let segmenter = Segmenter::new(1, 20);
        let chunks = segmenter.segment("One sentence here. Another sentence. Third.", SegmentMode::Block);
        assert_eq!(
            texts(&chunks),
            vec!["One sentence here.", "Another sentence.", "Third."]
        );
    }

    #[test]
    fn test_block_mode_without_punctuation_is_single_chunk() {
        let segmenter = Segmenter::new(1, 10);
        let chunks = segmenter.segment("没有任何标点的一段很长的文字", SegmentMode::Block);
        assert_eq!(chunks.len(), 1);
    }

    #[test]
    fn test_tokenize_words_inserts_paragraph_sentinels() {
        let segmenter = Segmenter::new(1, 1800);
        let tokens = segmenter.tokenize_words("你好\n\n世 界\n");
        assert_eq!(tokens, vec!["你", "好", "\n", "世", "界"]);
    }
}
