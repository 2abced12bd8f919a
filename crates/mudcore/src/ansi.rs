//! ANSI 轉義碼解析模組
//!
//! 解析 MUD 伺服器發送的 `ESC [ <n>(;<n>)* m` 顏色碼。
//! 只保留前景色（8 色）與高亮位元，其餘屬性忽略；
//! 非 SGR 的 CSI 序列會從文字中移除。

/// 標準 8 色
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Color {
    Black,
    Red,
    Green,
    Yellow,
    Blue,
    Magenta,
    Cyan,
    White,
}

impl Color {
    /// 由 0-7 的索引取得顏色
    pub fn from_index(index: u8) -> Option<Self> {
        match index {
            0 => Some(Self::Black),
            1 => Some(Self::Red),
            2 => Some(Self::Green),
            3 => Some(Self::Yellow),
            4 => Some(Self::Blue),
            5 => Some(Self::Magenta),
            6 => Some(Self::Cyan),
            7 => Some(Self::White),
            _ => None,
        }
    }

    /// 顏色索引（SGR 30 + index）
    pub fn index(self) -> u8 {
        self as u8
    }
}

/// 顯示屬性
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct Style {
    /// 前景色，`None` 為終端機預設色
    pub color: Option<Color>,
    /// 高亮 / 粗體
    pub bright: bool,
}

impl Style {
    pub fn new(color: Color, bright: bool) -> Self {
        Self {
            color: Some(color),
            bright,
        }
    }
}

/// ANSI 顏色解析後的文字片段
#[derive(Debug, Clone, PartialEq)]
pub struct AnsiSpan {
    pub text: String,
    pub style: Style,
}

/// ANSI 解析器狀態
#[derive(Default)]
struct AnsiState {
    style: Style,
}

impl AnsiState {
    fn reset(&mut self) {
        self.style = Style::default();
    }

    fn apply_code(&mut self, codes: &[u16]) {
        for &code in codes {
            match code {
                0 => self.reset(),
                1 => self.style.bright = true,
                22 => self.style.bright = false,
                // 前景色
                30..=37 => self.style.color = Color::from_index((code - 30) as u8),
                39 => self.style.color = None,
                // 高亮前景色 (90-97)
                90..=97 => {
                    self.style.color = Color::from_index((code - 90) as u8);
                    self.style.bright = true;
                }
                _ => {}
            }
        }
    }
}

/// 解析 ANSI 轉義碼，返回帶顏色的文字片段
pub fn parse_ansi(input: &str) -> Vec<AnsiSpan> {
    let mut spans = Vec::new();
    let mut state = AnsiState::default();
    let mut current = String::new();

    let mut chars = input.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '\x1b' {
            // 其他控制字元不可見，直接略過
            if !c.is_control() {
                current.push(c);
            }
            continue;
        }
        if chars.peek() != Some(&'[') {
            // 其他 ESC 序列暫不處理，只去掉 ESC 本身
            continue;
        }
        chars.next();

        // 提取序列內容直至終止符 (0x40-0x7E)
        let mut params = String::new();
        let mut command = None;
        for ch in chars.by_ref() {
            if ('\x40'..='\x7e').contains(&ch) {
                command = Some(ch);
                break;
            }
            params.push(ch);
        }

        if command == Some('m') {
            if !current.is_empty() {
                spans.push(AnsiSpan {
                    text: std::mem::take(&mut current),
                    style: state.style,
                });
            }
            // 空參數（ESC[m）視同 0
            let codes: Vec<u16> = params
                .split(';')
                .map(|p| p.parse::<u16>().unwrap_or(0))
                .collect();
            state.apply_code(&codes);
        }
    }

    if !current.is_empty() {
        spans.push(AnsiSpan {
            text: current,
            style: state.style,
        });
    }
    spans
}

/// 移除 ANSI 轉義碼，只保留純文字
pub fn strip_ansi(input: &str) -> String {
    parse_ansi(input).into_iter().map(|span| span.text).collect()
}

/// 以指定顏色包住文字，結尾重設顏色
///
/// # Example
/// ```
/// use mudcore::ansi::{colorify, Color};
///
/// assert_eq!(colorify("hi", Color::Cyan, true), "\x1b[36;1mhi\x1b[0m");
/// assert_eq!(colorify("hi", Color::Yellow, false), "\x1b[33mhi\x1b[0m");
/// ```
pub fn colorify(text: &str, color: Color, bright: bool) -> String {
    let code = 30 + color.index();
    if bright {
        format!("\x1b[{};1m{}\x1b[0m", code, text)
    } else {
        format!("\x1b[{}m{}\x1b[0m", code, text)
    }
}
