//! 拼音标注
//!
//! 纯本地、确定性的读音转写，不发起网络请求。
//! 数字声调风格由声调符号风格的输出逐字符替换得到。

use pinyin::ToPinyin;
use serde::{Deserialize, Serialize};

/// 拼音风格
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PhoneticStyle {
    /// nǐ hǎo
    #[default]
    ToneMarks,
    /// ni3 hao3
    ToneNumbers,
}

impl std::str::FromStr for PhoneticStyle {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('_', "-").as_str() {
            "tone-marks" | "marks" => Ok(PhoneticStyle::ToneMarks),
            "tone-numbers" | "numbers" => Ok(PhoneticStyle::ToneNumbers),
            other => Err(format!("unknown pinyin style '{}'", other)),
        }
    }
}

/// 标注一个词或一段文本
///
/// 汉字转为带调拼音，其余非空白字符按原样成组保留；不含汉字时返回空串
pub fn annotate(token: &str, style: PhoneticStyle) -> String {
    let marked = annotate_marks(token);
    match style {
        PhoneticStyle::ToneMarks => marked,
        PhoneticStyle::ToneNumbers => to_tone_numbers(&marked),
    }
}

fn annotate_marks(token: &str) -> String {
    let mut parts: Vec<String> = Vec::new();
    let mut passthrough = String::new();
    let mut has_han = false;

    for ch in token.chars() {
        match ch.to_pinyin() {
            Some(pinyin) => {
                has_han = true;
                if !passthrough.is_empty() {
                    parts.push(std::mem::take(&mut passthrough));
                }
                parts.push(pinyin.with_tone().to_string());
            }
            None if ch.is_whitespace() => {
                if !passthrough.is_empty() {
                    parts.push(std::mem::take(&mut passthrough));
                }
            }
            None => passthrough.push(ch),
        }
    }

    if !has_han {
        return String::new();
    }

    if !passthrough.is_empty() {
        parts.push(passthrough);
    }

    parts.join(" ")
}

/// 声调符号 → 数字声调
///
/// 每个音节的调号字母还原为基础字母，声调数字追加在音节末尾；ü 写作 v，轻声不加数字
pub fn to_tone_numbers(marked: &str) -> String {
    marked
        .split(' ')
        .map(convert_syllable)
        .collect::<Vec<_>>()
        .join(" ")
}

fn convert_syllable(syllable: &str) -> String {
    let mut out = String::with_capacity(syllable.len() + 1);
    let mut tone = None;

    for ch in syllable.chars() {
        if let Some((base, digit)) = split_tone(ch) {
            out.push(base);
            tone = Some(digit);
        } else if let Some(digit) = combining_tone(ch) {
            tone = Some(digit);
        } else if ch == 'ü' {
            out.push('v');
        } else {
            out.push(ch);
        }
    }

    if let Some(digit) = tone {
        out.push(digit);
    }

    out
}

fn split_tone(ch: char) -> Option<(char, char)> {
    let pair = match ch {
        'ā' => ('a', '1'),
        'á' => ('a', '2'),
        'ǎ' => ('a', '3'),
        'à' => ('a', '4'),
        'ō' => ('o', '1'),
        'ó' => ('o', '2'),
        'ǒ' => ('o', '3'),
        'ò' => ('o', '4'),
        'ē' => ('e', '1'),
        'é' => ('e', '2'),
        'ě' => ('e', '3'),
        'è' => ('e', '4'),
        'ī' => ('i', '1'),
        'í' => ('i', '2'),
        'ǐ' => ('i', '3'),
        'ì' => ('i', '4'),
        'ū' => ('u', '1'),
        'ú' => ('u', '2'),
        'ǔ' => ('u', '3'),
        'ù' => ('u', '4'),
        'ǖ' => ('v', '1'),
        'ǘ' => ('v', '2'),
        'ǚ' => ('v', '3'),
        'ǜ' => ('v', '4'),
        'ń' => ('n', '2'),
        'ň' => ('n', '3'),
        'ǹ' => ('n', '4'),
        'ḿ' => ('m', '2'),
        _ => return None,
    };
    Some(pair)
}

/// 分解形式的组合调号（m̄、ê̌ 等）
fn combining_tone(ch: char) -> Option<char> {
    match ch {
        '\u{0304}' => Some('1'),
        '\u{0301}' => Some('2'),
        '\u{030C}' => Some('3'),
        '\u{0300}' => Some('4'),
        _ => None,
    }
}
