//! 伺服器文字編碼模組
//!
//! 預設 UTF-8，另支援台灣 MUD 伺服器常用的 Big5。
//! 解碼採嚴格模式：無法解碼的位元組會回報錯誤而不是替換字元。

use encoding_rs::{Encoding, BIG5, UTF_8};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// 解碼失敗
#[derive(Debug, Error)]
#[error("無法以 {charset} 解碼 {len} 位元組")]
pub struct DecodeError {
    pub charset: &'static str,
    pub len: usize,
}

/// 伺服器使用的字元集
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Charset {
    #[default]
    #[serde(rename = "utf-8", alias = "utf8")]
    Utf8,
    #[serde(rename = "big5")]
    Big5,
}

impl Charset {
    fn encoding(self) -> &'static Encoding {
        match self {
            Charset::Utf8 => UTF_8,
            Charset::Big5 => BIG5,
        }
    }

    /// 將一行位元組解碼為字串
    ///
    /// # Example
    /// ```
    /// use mudcore::encoding::Charset;
    ///
    /// let text = Charset::Big5.decode(&[0xa7, 0x41, 0xa6, 0x6e]).unwrap();
    /// assert_eq!(text, "你好");
    /// ```
    pub fn decode(self, bytes: &[u8]) -> Result<String, DecodeError> {
        self.encoding()
            .decode_without_bom_handling_and_without_replacement(bytes)
            .map(|text| text.into_owned())
            .ok_or(DecodeError {
                charset: self.encoding().name(),
                len: bytes.len(),
            })
    }

    /// 將字串編碼為送往伺服器的位元組（無法編碼的字元會被替換）
    pub fn encode(self, text: &str) -> Vec<u8> {
        let (encoded, _, _) = self.encoding().encode(text);
        encoded.into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_big5_chinese() {
        // "你好" in Big5: 0xa7 0x41 0xa6 0x6e
        let result = Charset::Big5.decode(&[0xa7, 0x41, 0xa6, 0x6e]).unwrap();
        assert_eq!(result, "你好");
    }

    #[test]
    fn test_decode_utf8_ascii() {
        let result = Charset::Utf8.decode(b"Hello World").unwrap();
        assert_eq!(result, "Hello World");
    }

    #[test]
    fn test_decode_utf8_rejects_invalid_bytes() {
        let err = Charset::Utf8.decode(&[b'a', 0xc3]).unwrap_err();
        assert_eq!(err.len, 2);
    }

    #[test]
    fn test_encode_big5_chinese() {
        assert_eq!(Charset::Big5.encode("你好"), vec![0xa7, 0x41, 0xa6, 0x6e]);
    }

    #[test]
    fn test_ascii_is_identical_in_both_charsets() {
        assert_eq!(Charset::Utf8.encode("north"), b"north");
        assert_eq!(Charset::Big5.encode("north"), b"north");
    }

    #[test]
    fn test_charset_from_config_name() {
        let charset: Charset = serde_json::from_str("\"big5\"").unwrap();
        assert_eq!(charset, Charset::Big5);
        let charset: Charset = serde_json::from_str("\"utf-8\"").unwrap();
        assert_eq!(charset, Charset::Utf8);
    }
}
