//! 支持的目标语言表
//!
//! 按显示名称或 ISO 639-1 代码查找，大小写不敏感

use serde::Serialize;

/// 语言条目
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Language {
    /// 显示名称（英文）
    pub name: &'static str,
    /// ISO 639-1 代码
    pub code: &'static str,
}

pub const LANGUAGES: &[Language] = &[
    Language { name: "Arabic", code: "ar" },
    Language { name: "English", code: "en" },
    Language { name: "French", code: "fr" },
    Language { name: "Indonesian", code: "id" },
    Language { name: "Italian", code: "it" },
    Language { name: "Japanese", code: "ja" },
    Language { name: "Korean", code: "ko" },
    Language { name: "Persian", code: "fa" },
    Language { name: "Portuguese", code: "pt" },
    Language { name: "Russian", code: "ru" },
    Language { name: "Spanish", code: "es" },
    Language { name: "Thai", code: "th" },
    Language { name: "Uzbek", code: "uz" },
    Language { name: "Vietnamese", code: "vi" },
];

/// 源语言（中文）不在目标语言表中，单独列出
pub const CHINESE: Language = Language { name: "Chinese", code: "zh" };

pub const ENGLISH_CODE: &str = "en";

impl Language {
    /// 按名称或代码查找，包括源语言
    pub fn lookup(query: &str) -> Option<Language> {
        let query = query.trim();
        if query.eq_ignore_ascii_case(CHINESE.code) || query.eq_ignore_ascii_case(CHINESE.name) {
            return Some(CHINESE);
        }
        LANGUAGES
            .iter()
            .find(|lang| lang.code.eq_ignore_ascii_case(query) || lang.name.eq_ignore_ascii_case(query))
            .copied()
    }

    /// 只在目标语言表中查找，源语言不能作为目标
    pub fn target(query: &str) -> Option<Language> {
        Self::lookup(query).filter(|lang| *lang != CHINESE)
    }

    pub fn is_english(&self) -> bool {
        self.code == ENGLISH_CODE
    }
}

/// 语言代码对应的显示名称，未知代码原样返回
pub fn display_name(code: &str) -> &str {
    match Language::lookup(code) {
        Some(lang) => lang.name,
        None => code,
    }
}
