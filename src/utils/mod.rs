//! # 工具模块
//!
//! - `input` - 输入文件的字符集识别与解码

pub mod input;

pub use input::{decode_text, read_text_file, DecodedText};
