//! 响应解析策略
//!
//! 同一次请求的原始响应按优先级依次交给解析器，第一个成功的结果生效。

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// 解析后的整段译文
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedTranslation {
    pub primary: String,
    /// 请求了英文但响应中缺失时为 None
    pub secondary: Option<String>,
}

/// 响应解析器
pub trait ResponseParser<T>: Send + Sync {
    fn name(&self) -> &'static str;

    fn try_parse(&self, raw: &str) -> Option<T>;
}

/// 依次尝试解析器，返回第一个成功的结果及解析器名称
pub fn parse_with<T>(parsers: &[&dyn ResponseParser<T>], raw: &str) -> Option<(T, &'static str)> {
    parsers
        .iter()
        .find_map(|parser| parser.try_parse(raw).map(|parsed| (parsed, parser.name())))
}

/// 去掉 ```json ... ``` 代码块包裹
pub fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|text| text.trim().to_string())
        .filter(|text| !text.is_empty())
}

// ============================================================================
// 整段翻译
// ============================================================================

#[derive(Debug, Deserialize)]
struct StructuredTranslation {
    primary: Option<String>,
    secondary: Option<String>,
}

/// 整段翻译结构化请求使用的 schema
pub fn translation_schema() -> Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "primary": { "type": "STRING" },
            "secondary": { "type": "STRING" }
        },
        "required": ["primary"]
    })
}

/// 结构化策略：`{"primary": ..., "secondary": ...}`
#[derive(Debug, Clone, Copy)]
pub struct StructuredParser {
    pub want_secondary: bool,
}

impl ResponseParser<ParsedTranslation> for StructuredParser {
    fn name(&self) -> &'static str {
        "structured"
    }

    fn try_parse(&self, raw: &str) -> Option<ParsedTranslation> {
        let parsed: StructuredTranslation = serde_json::from_str(strip_code_fence(raw)).ok()?;
        let primary = non_empty(parsed.primary)?;
        let secondary = if self.want_secondary {
            non_empty(parsed.secondary)
        } else {
            None
        };
        Some(ParsedTranslation { primary, secondary })
    }
}

/// 自由文本策略：第一行为目标语言译文，第二行为英文译文
#[derive(Debug, Clone, Copy)]
pub struct FreeTextParser {
    pub want_secondary: bool,
}

impl ResponseParser<ParsedTranslation> for FreeTextParser {
    fn name(&self) -> &'static str {
        "free-text"
    }

    fn try_parse(&self, raw: &str) -> Option<ParsedTranslation> {
        let text = strip_code_fence(raw);
        if !self.want_secondary {
            let primary = text.trim();
            return (!primary.is_empty()).then(|| ParsedTranslation {
                primary: primary.to_string(),
                secondary: None,
            });
        }

        let mut lines = text.lines().map(str::trim).filter(|line| !line.is_empty());
        let primary = lines.next()?.to_string();
        let secondary = lines.next().map(str::to_string);
        Some(ParsedTranslation { primary, secondary })
    }
}

// ============================================================================
// 单词查询
// ============================================================================

#[derive(Debug, Deserialize)]
struct StructuredGloss {
    #[serde(default)]
    translations: Vec<String>,
    translation: Option<String>,
}

/// 单词查询结构化请求使用的 schema
pub fn gloss_schema() -> Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "word": { "type": "STRING" },
            "pinyin": { "type": "STRING" },
            "translations": { "type": "ARRAY", "items": { "type": "STRING" } }
        },
        "required": ["word", "translations"]
    })
}

/// `{"word", "pinyin", "translations": [...]}`，兼容单个 `translation` 字段
#[derive(Debug, Clone, Copy)]
pub struct StructuredGlossParser;

impl ResponseParser<Vec<String>> for StructuredGlossParser {
    fn name(&self) -> &'static str {
        "structured-gloss"
    }

    fn try_parse(&self, raw: &str) -> Option<Vec<String>> {
        let parsed: StructuredGloss = serde_json::from_str(strip_code_fence(raw)).ok()?;
        let glosses: Vec<String> = parsed
            .translations
            .into_iter()
            .chain(parsed.translation)
            .filter_map(|gloss| non_empty(Some(gloss)))
            .collect();
        (!glosses.is_empty()).then_some(glosses)
    }
}

/// 整个响应作为唯一释义
///
/// JSON 对象不是自由文本：释义为空的结构化响应不会原样变成释义
#[derive(Debug, Clone, Copy)]
pub struct FreeTextGlossParser;

impl ResponseParser<Vec<String>> for FreeTextGlossParser {
    fn name(&self) -> &'static str {
        "free-text-gloss"
    }

    fn try_parse(&self, raw: &str) -> Option<Vec<String>> {
        let text = strip_code_fence(raw);
        if matches!(serde_json::from_str::<Value>(text), Ok(Value::Object(_) | Value::Array(_))) {
            return None;
        }
        non_empty(Some(text.to_string())).map(|gloss| vec![gloss])
    }
}
