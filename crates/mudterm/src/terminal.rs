//! crossterm 終端機
//!
//! 提供窗格繪製用的 [`Surface`] 實作、原始模式的進出，以及按鍵轉換。
//! 許多終端機在最右欄寫字會換行或捲動，可用寬度一律少算一欄。

use std::io::{self, Write};

use crossterm::event::{KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::style::{self, Attribute, Print, SetAttribute, SetForegroundColor};
use crossterm::terminal::{self, Clear, ClearType, EnterAlternateScreen, LeaveAlternateScreen};
use crossterm::{cursor, execute, queue};
use mudcore::{Color, Key, Style, Surface};
use tracing::warn;
use unicode_width::UnicodeWidthStr;

/// 進入原始模式與替代畫面，drop 時還原
pub struct TerminalGuard;

impl TerminalGuard {
    pub fn enter() -> io::Result<Self> {
        terminal::enable_raw_mode()?;
        if let Err(e) = execute!(io::stdout(), EnterAlternateScreen, cursor::Show) {
            let _ = terminal::disable_raw_mode();
            return Err(e);
        }
        Ok(TerminalGuard)
    }
}

impl Drop for TerminalGuard {
    fn drop(&mut self) {
        if let Err(e) = execute!(io::stdout(), SetAttribute(Attribute::Reset), LeaveAlternateScreen) {
            warn!("離開替代畫面失敗: {}", e);
        }
        if let Err(e) = terminal::disable_raw_mode() {
            warn!("關閉原始模式失敗: {}", e);
        }
    }
}

/// 以 crossterm 繪製的表面
pub struct CrosstermSurface<W: Write> {
    out: W,
    lines: u16,
    cols: u16,
}

impl<W: Write> CrosstermSurface<W> {
    /// `cols`、`rows` 是終端機回報的大小
    pub fn new(out: W, cols: u16, rows: u16) -> Self {
        let mut surface = Self {
            out,
            lines: 0,
            cols: 0,
        };
        surface.set_size(cols, rows);
        surface
    }

    /// 終端機大小改變時呼叫
    pub fn set_size(&mut self, cols: u16, rows: u16) {
        self.lines = rows;
        self.cols = cols.saturating_sub(1);
    }

    fn out_of_range(row: u16, col: u16) -> io::Error {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("({}, {}) 超出可用範圍", row, col),
        )
    }
}

/// 8 色對應到終端機顏色；高亮使用亮色版本
fn terminal_color(color: Color, bright: bool) -> style::Color {
    use style::Color as C;
    match (color, bright) {
        (Color::Black, false) => C::Black,
        (Color::Black, true) => C::DarkGrey,
        (Color::Red, false) => C::DarkRed,
        (Color::Red, true) => C::Red,
        (Color::Green, false) => C::DarkGreen,
        (Color::Green, true) => C::Green,
        (Color::Yellow, false) => C::DarkYellow,
        (Color::Yellow, true) => C::Yellow,
        (Color::Blue, false) => C::DarkBlue,
        (Color::Blue, true) => C::Blue,
        (Color::Magenta, false) => C::DarkMagenta,
        (Color::Magenta, true) => C::Magenta,
        (Color::Cyan, false) => C::DarkCyan,
        (Color::Cyan, true) => C::Cyan,
        (Color::White, false) => C::Grey,
        (Color::White, true) => C::White,
    }
}

impl<W: Write> Surface for CrosstermSurface<W> {
    fn size(&self) -> (u16, u16) {
        (self.lines, self.cols)
    }

    fn put_str(&mut self, row: u16, col: u16, text: &str, style: Style) -> io::Result<()> {
        if row >= self.lines || col as usize + text.width() > self.cols as usize {
            return Err(Self::out_of_range(row, col));
        }
        queue!(self.out, cursor::MoveTo(col, row))?;
        match style.color {
            Some(color) => queue!(self.out, SetForegroundColor(terminal_color(color, style.bright)))?,
            None if style.bright => queue!(self.out, SetAttribute(Attribute::Bold))?,
            None => {}
        }
        queue!(self.out, Print(text))?;
        if style != Style::default() {
            queue!(self.out, SetAttribute(Attribute::Reset), style::ResetColor)?;
        }
        Ok(())
    }

    fn clear(&mut self) -> io::Result<()> {
        queue!(self.out, Clear(ClearType::All))
    }

    fn place_cursor(&mut self, row: u16, col: u16) -> io::Result<()> {
        queue!(self.out, cursor::MoveTo(col, row))
    }

    fn flush(&mut self) -> io::Result<()> {
        self.out.flush()
    }
}

/// 把 crossterm 按鍵轉成窗格按鍵
///
/// Alt+字元 視同先按 Esc 再按該字元；放開按鍵的事件不處理。
pub fn map_key(event: KeyEvent) -> Vec<Key> {
    if event.kind == KeyEventKind::Release {
        return Vec::new();
    }
    let key = match event.code {
        KeyCode::Char(c) if event.modifiers.contains(KeyModifiers::ALT) => {
            return vec![Key::Escape, Key::Char(c)];
        }
        KeyCode::Char(c) if event.modifiers.contains(KeyModifiers::CONTROL) => Key::Ctrl(c),
        KeyCode::Char(c) => Key::Char(c),
        KeyCode::Enter => Key::Enter,
        KeyCode::Backspace => Key::Backspace,
        KeyCode::Delete => Key::Delete,
        KeyCode::Esc => Key::Escape,
        KeyCode::PageUp => Key::PageUp,
        KeyCode::PageDown => Key::PageDown,
        KeyCode::Up => Key::Up,
        KeyCode::Down => Key::Down,
        KeyCode::Left => Key::Left,
        KeyCode::Right => Key::Right,
        KeyCode::Home => Key::Home,
        KeyCode::End => Key::End,
        KeyCode::Insert => Key::Insert,
        KeyCode::Tab => Key::Tab,
        KeyCode::F(n) => Key::Function(n),
        other => Key::Unknown(format!("{:?}", other)),
    };
    vec![key]
}
