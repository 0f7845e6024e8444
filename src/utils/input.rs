//! 输入文本解码
//!
//! 依次尝试：BOM 指定的编码 → UTF-8 → GB18030。

use std::fs;
use std::path::Path;

use encoding_rs::{Encoding, GB18030, UTF_8};

use crate::translation::error::{TranslationError, TranslationResult};

/// 解码结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedText {
    pub text: String,
    /// 实际使用的编码名称
    pub encoding: &'static str,
}

/// 把原始字节解码为文本
pub fn decode_text(bytes: &[u8]) -> DecodedText {
    if let Some((encoding, bom_length)) = Encoding::for_bom(bytes) {
        let (text, _) = encoding.decode_without_bom_handling(&bytes[bom_length..]);
        return DecodedText {
            text: text.into_owned(),
            encoding: encoding.name(),
        };
    }

    if let Some(text) = UTF_8.decode_without_bom_handling_and_without_replacement(bytes) {
        return DecodedText {
            text: text.into_owned(),
            encoding: UTF_8.name(),
        };
    }

    let (text, _, had_errors) = GB18030.decode(bytes);
    if had_errors {
        tracing::warn!("输入不是有效的 GB18030 文本，无法识别的字节已被替换");
    }
    DecodedText {
        text: text.into_owned(),
        encoding: GB18030.name(),
    }
}

/// 读取并解码文本文件
pub fn read_text_file<P: AsRef<Path>>(path: P) -> TranslationResult<DecodedText> {
    let path = path.as_ref();
    let bytes = fs::read(path)
        .map_err(|e| TranslationError::InvalidInput(format!("无法读取 {}: {}", path.display(), e)))?;
    let decoded = decode_text(&bytes);
    tracing::debug!("{} 按 {} 解码", path.display(), decoded.encoding);
    Ok(decoded)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_utf8_with_and_without_bom() {
        let plain = decode_text("你好".as_bytes());
        assert_eq!(plain.text, "你好");
        assert_eq!(plain.encoding, "UTF-8");

        let mut with_bom = vec![0xEF, 0xBB, 0xBF];
        with_bom.extend_from_slice("你好".as_bytes());
        assert_eq!(decode_text(&with_bom).text, "你好");
    }

    #[test]
    fn test_gb18030_fallback() {
        let (bytes, _, _) = GB18030.encode("第一句。");
        let decoded = decode_text(&bytes);
        assert_eq!(decoded.text, "第一句。");
        assert_eq!(decoded.encoding, "gb18030");
    }

    #[test]
    fn test_read_missing_file() {
        assert!(matches!(
            read_text_file("/nonexistent/input.txt"),
            Err(TranslationError::InvalidInput(_))
        ));
    }
}
