//! 窗格模組
//!
//! 三種窗格：
//! - `BufferedTextWindow`: 可捲動的歷史文字，支援 ANSI 顏色
//! - `StaticWindow`: 整批取代的內容，無歷史
//! - `InputWindow`: 單行編輯，送出時產生輸入事件
//!
//! 窗格以名稱識別；[`PaneSet`] 依名稱投遞變更，找不到名稱時退回主窗格。

use std::collections::HashMap;
use std::fmt;

use thiserror::Error;
use tracing::{debug, trace};
use unicode_width::UnicodeWidthChar;

use crate::ansi::{parse_ansi, Style};
use crate::bridge::{PaneMutation, PaneOp};
use crate::layout::{LayoutNode, Rect};
use crate::surface::Surface;

/// 窗格種類
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PaneKind {
    BufferedText,
    Static,
    Input,
}

/// 鍵盤按鍵
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Key {
    Char(char),
    Enter,
    Backspace,
    Delete,
    Escape,
    PageUp,
    PageDown,
    Up,
    Down,
    Left,
    Right,
    Home,
    End,
    Insert,
    Tab,
    Function(u8),
    Ctrl(char),
    Unknown(String),
}

impl Key {
    /// 由設定檔中的按鍵名稱取得按鍵（不分大小寫）
    pub fn from_name(name: &str) -> Option<Key> {
        let lower = name.trim().to_ascii_lowercase();
        let key = match lower.as_str() {
            "up" => Key::Up,
            "down" => Key::Down,
            "left" => Key::Left,
            "right" => Key::Right,
            "home" => Key::Home,
            "end" => Key::End,
            "insert" => Key::Insert,
            "tab" => Key::Tab,
            "pageup" => Key::PageUp,
            "pagedown" => Key::PageDown,
            other => {
                let n: u8 = other.strip_prefix('f')?.parse().ok()?;
                if !(1..=12).contains(&n) {
                    return None;
                }
                Key::Function(n)
            }
        };
        Some(key)
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Char(c) => write!(f, "{:?}", c),
            Key::Function(n) => write!(f, "F{}", n),
            Key::Ctrl(c) => write!(f, "Ctrl+{}", c),
            Key::Unknown(name) => write!(f, "{}", name),
            other => write!(f, "{:?}", other),
        }
    }
}

/// 輸入窗格處理按鍵的結果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyOutcome {
    /// 編輯緩衝已更新
    Consumed,
    /// 送出一行
    Submit(String),
    /// 不認得的按鍵，緩衝未改變
    Unhandled(Key),
}

/// 在一列中畫出帶 ANSI 顏色的文字，超過寬度的部分截斷
fn draw_line(surface: &mut dyn Surface, rect: Rect, offset: u16, text: &str) {
    if offset >= rect.lines {
        return;
    }
    let row = rect.row + offset;
    let mut col = 0u16;
    for span in parse_ansi(text) {
        let mut piece = String::new();
        let mut width = 0u16;
        for ch in span.text.chars() {
            let w = ch.width().unwrap_or(0) as u16;
            if col + width + w > rect.cols {
                break;
            }
            piece.push(ch);
            width += w;
        }
        if !piece.is_empty() {
            put(surface, row, rect.col + col, &piece, span.style);
        }
        col += width;
        if col >= rect.cols || piece.len() < span.text.len() {
            break;
        }
    }
}

fn put(surface: &mut dyn Surface, row: u16, col: u16, text: &str, style: Style) {
    if let Err(err) = surface.put_str(row, col, text, style) {
        trace!("窗格寫入失敗 ({}, {}): {}", row, col, err);
    }
}

fn clear(surface: &mut dyn Surface, rect: Rect) {
    if let Err(err) = surface.clear_rect(rect.row, rect.col, rect.lines, rect.cols) {
        trace!("清除窗格失敗: {}", err);
    }
}

/// 捲動歷史窗格
#[derive(Debug, Clone)]
pub struct BufferedTextWindow {
    name: String,
    rect: Rect,
    buffer: Vec<String>,
    /// 0 表示停在最新一行
    buffer_pos: usize,
}

impl BufferedTextWindow {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            rect: Rect::default(),
            buffer: Vec::new(),
            buffer_pos: 0,
        }
    }

    pub fn buffer(&self) -> &[String] {
        &self.buffer
    }

    pub fn buffer_pos(&self) -> usize {
        self.buffer_pos
    }

    /// 追加一行；正在看歷史時只推進位置，不重繪
    pub fn append(&mut self, text: String, surface: &mut dyn Surface) {
        self.buffer.push(text);
        if self.buffer_pos == 0 {
            self.redraw(surface);
        } else {
            self.buffer_pos += 1;
        }
    }

    /// 取代全部內容並回到最新位置
    pub fn set_text(&mut self, lines: Vec<String>, surface: &mut dyn Surface) {
        self.buffer = lines;
        self.buffer_pos = 0;
        self.redraw(surface);
    }

    /// 依 `buffer_pos` 重繪，最後一行貼齊窗格底部
    pub fn redraw(&self, surface: &mut dyn Surface) {
        clear(surface, self.rect);
        if self.buffer.is_empty() || self.rect.lines == 0 {
            return;
        }
        let end = self.buffer.len() - self.buffer_pos;
        let height = self.rect.lines as usize;
        let start = end.saturating_sub(height);
        let top = height - (end - start);
        for (i, line) in self.buffer[start..end].iter().enumerate() {
            draw_line(surface, self.rect, (top + i) as u16, line);
        }
    }

    /// 捲動：負值往舊的方向，位置限制在 `[0, 行數)`
    pub fn scroll(&mut self, delta: i32, surface: &mut dyn Surface) {
        let max = self.buffer.len().saturating_sub(1) as i64;
        let pos = (self.buffer_pos as i64 - delta as i64).clamp(0, max);
        self.buffer_pos = pos as usize;
        self.redraw(surface);
    }
}

/// 整批取代內容的窗格
#[derive(Debug, Clone)]
pub struct StaticWindow {
    name: String,
    rect: Rect,
    lines: Vec<String>,
}

impl StaticWindow {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            rect: Rect::default(),
            lines: Vec::new(),
        }
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn set_text(&mut self, lines: Vec<String>, surface: &mut dyn Surface) {
        self.lines = lines;
        self.redraw(surface);
    }

    pub fn append(&mut self, text: String, surface: &mut dyn Surface) {
        self.lines.push(text);
        self.redraw(surface);
    }

    pub fn redraw(&self, surface: &mut dyn Surface) {
        clear(surface, self.rect);
        for (i, line) in self.lines.iter().enumerate().take(self.rect.lines as usize) {
            draw_line(surface, self.rect, i as u16, line);
        }
    }
}

/// 單行輸入窗格
#[derive(Debug, Clone)]
pub struct InputWindow {
    name: String,
    rect: Rect,
    buffer: String,
    shortcuts: HashMap<Key, String>,
}

impl InputWindow {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            rect: Rect::default(),
            buffer: String::new(),
            shortcuts: HashMap::new(),
        }
    }

    /// 設定單鍵快捷命令
    pub fn set_shortcuts(&mut self, shortcuts: HashMap<Key, String>) {
        self.shortcuts = shortcuts;
    }

    pub fn buffer(&self) -> &str {
        &self.buffer
    }

    /// 處理一個按鍵；會改變緩衝的按鍵都會重繪
    pub fn process_key(&mut self, key: Key, surface: &mut dyn Surface) -> KeyOutcome {
        if let Some(command) = self.shortcuts.get(&key) {
            return KeyOutcome::Submit(command.clone());
        }
        let outcome = match key {
            Key::Enter => KeyOutcome::Submit(std::mem::take(&mut self.buffer)),
            Key::Backspace | Key::Delete => {
                self.buffer.pop();
                KeyOutcome::Consumed
            }
            Key::Char(c) if !c.is_control() => {
                self.buffer.push(c);
                KeyOutcome::Consumed
            }
            other => return KeyOutcome::Unhandled(other),
        };
        self.redraw(surface);
        outcome
    }

    /// 重繪；超過寬度時顯示結尾的部分，游標放在文字後
    pub fn redraw(&self, surface: &mut dyn Surface) {
        clear(surface, self.rect);
        if self.rect.lines == 0 || self.rect.cols == 0 {
            return;
        }
        let limit = self.rect.cols - 1;
        let mut width = 0u16;
        let mut start = self.buffer.len();
        for (idx, ch) in self.buffer.char_indices().rev() {
            let w = ch.width().unwrap_or(0) as u16;
            if width + w > limit {
                break;
            }
            width += w;
            start = idx;
        }
        put(surface, self.rect.row, self.rect.col, &self.buffer[start..], Style::default());
        if let Err(err) = surface.place_cursor(self.rect.row, self.rect.col + width) {
            trace!("移動游標失敗: {}", err);
        }
    }
}

/// 任一種窗格
#[derive(Debug, Clone)]
pub enum Pane {
    BufferedText(BufferedTextWindow),
    Static(StaticWindow),
    Input(InputWindow),
}

impl Pane {
    pub fn new(kind: PaneKind, name: impl Into<String>) -> Self {
        match kind {
            PaneKind::BufferedText => Pane::BufferedText(BufferedTextWindow::new(name)),
            PaneKind::Static => Pane::Static(StaticWindow::new(name)),
            PaneKind::Input => Pane::Input(InputWindow::new(name)),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Pane::BufferedText(p) => &p.name,
            Pane::Static(p) => &p.name,
            Pane::Input(p) => &p.name,
        }
    }

    pub fn kind(&self) -> PaneKind {
        match self {
            Pane::BufferedText(_) => PaneKind::BufferedText,
            Pane::Static(_) => PaneKind::Static,
            Pane::Input(_) => PaneKind::Input,
        }
    }

    pub fn rect(&self) -> Rect {
        match self {
            Pane::BufferedText(p) => p.rect,
            Pane::Static(p) => p.rect,
            Pane::Input(p) => p.rect,
        }
    }

    pub fn set_rect(&mut self, rect: Rect) {
        match self {
            Pane::BufferedText(p) => p.rect = rect,
            Pane::Static(p) => p.rect = rect,
            Pane::Input(p) => p.rect = rect,
        }
    }

    pub fn redraw(&self, surface: &mut dyn Surface) {
        match self {
            Pane::BufferedText(p) => p.redraw(surface),
            Pane::Static(p) => p.redraw(surface),
            Pane::Input(p) => p.redraw(surface),
        }
    }

    /// 套用一個窗格操作
    pub fn apply(&mut self, op: PaneOp, surface: &mut dyn Surface) {
        match (self, op) {
            (Pane::BufferedText(p), PaneOp::AppendText(text)) => p.append(text, surface),
            (Pane::BufferedText(p), PaneOp::SetText(lines)) => p.set_text(lines, surface),
            (Pane::BufferedText(p), PaneOp::Scroll(delta)) => p.scroll(delta, surface),
            (Pane::Static(p), PaneOp::AppendText(text)) => p.append(text, surface),
            (Pane::Static(p), PaneOp::SetText(lines)) => p.set_text(lines, surface),
            (pane, PaneOp::Redraw) => pane.redraw(surface),
            (pane, op) => debug!("窗格 {} 不支援操作 {:?}", pane.name(), op),
        }
    }
}

/// 建立窗格集合時的錯誤
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PaneSetError {
    #[error("找不到主窗格: {0}")]
    MissingMain(String),

    #[error("主窗格 {0} 必須是 BufferedTextWindow")]
    MainNotBuffered(String),
}

/// 依名稱管理所有窗格
#[derive(Debug)]
pub struct PaneSet {
    panes: HashMap<String, Pane>,
    /// 建立順序，用於依序重繪
    order: Vec<String>,
    main: String,
}

impl PaneSet {
    /// 建立窗格集合，主窗格必須存在且為捲動窗格
    pub fn new(panes: Vec<Pane>, main: impl Into<String>) -> Result<Self, PaneSetError> {
        let main = main.into();
        match panes.iter().find(|p| p.name() == main) {
            None => return Err(PaneSetError::MissingMain(main)),
            Some(pane) if pane.kind() != PaneKind::BufferedText => {
                return Err(PaneSetError::MainNotBuffered(main))
            }
            Some(_) => {}
        }
        let order = panes.iter().map(|p| p.name().to_string()).collect();
        let panes = panes
            .into_iter()
            .map(|p| (p.name().to_string(), p))
            .collect();
        Ok(Self { panes, order, main })
    }

    pub fn main_name(&self) -> &str {
        &self.main
    }

    pub fn get(&self, name: &str) -> Option<&Pane> {
        self.panes.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Pane> {
        self.panes.get_mut(name)
    }

    pub fn input_mut(&mut self, name: &str) -> Option<&mut InputWindow> {
        match self.panes.get_mut(name) {
            Some(Pane::Input(input)) => Some(input),
            _ => None,
        }
    }

    pub fn main_window(&self) -> Option<&BufferedTextWindow> {
        match self.panes.get(&self.main) {
            Some(Pane::BufferedText(p)) => Some(p),
            _ => None,
        }
    }

    /// 投遞變更，找不到目標名稱時送往主窗格
    pub fn deliver(&mut self, mutation: PaneMutation, surface: &mut dyn Surface) {
        let target = if self.panes.contains_key(&mutation.pane) {
            mutation.pane
        } else {
            debug!("找不到窗格 {}，改送主窗格", mutation.pane);
            self.main.clone()
        };
        if let Some(pane) = self.panes.get_mut(&target) {
            pane.apply(mutation.op, surface);
        }
    }

    /// 在主窗格追加一行
    pub fn write_main(&mut self, text: impl Into<String>, surface: &mut dyn Surface) {
        let mutation = PaneMutation::append(self.main.clone(), text);
        self.deliver(mutation, surface);
    }

    /// 依版面樹更新每個窗格的矩形
    pub fn apply_layout(&mut self, root: &LayoutNode) {
        for (name, _, rect) in root.leaves() {
            if let Some(pane) = self.panes.get_mut(name) {
                pane.set_rect(rect);
            }
        }
    }

    /// 依建立順序重繪全部窗格
    pub fn redraw_all(&self, surface: &mut dyn Surface) {
        for name in &self.order {
            if let Some(pane) = self.panes.get(name) {
                pane.redraw(surface);
            }
        }
    }

    pub fn names(&self) -> &[String] {
        &self.order
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ansi::{colorify, Color};
    use crate::surface::MemorySurface;

    fn buffered(lines: u16, cols: u16) -> (BufferedTextWindow, MemorySurface) {
        let mut window = BufferedTextWindow::new("MainWindow");
        window.rect = Rect::new(0, 0, lines, cols);
        (window, MemorySurface::new(lines, cols))
    }

    #[test]
    fn test_key_from_name() {
        assert_eq!(Key::from_name("up"), Some(Key::Up));
        assert_eq!(Key::from_name("F5"), Some(Key::Function(5)));
        assert_eq!(Key::from_name("f13"), None);
        assert_eq!(Key::from_name("hyper"), None);
    }

    #[test]
    fn test_append_draws_bottom_aligned() {
        let (mut window, mut surface) = buffered(3, 10);
        window.append("one".into(), &mut surface);
        window.append("two".into(), &mut surface);
        assert_eq!(surface.row_text(0).trim_end(), "");
        assert_eq!(surface.row_text(1).trim_end(), "one");
        assert_eq!(surface.row_text(2).trim_end(), "two");
    }

    #[test]
    fn test_append_while_scrolled_keeps_view() {
        let (mut window, mut surface) = buffered(2, 10);
        for i in 0..5 {
            window.append(format!("line{}", i), &mut surface);
        }
        window.scroll(-2, &mut surface);
        assert_eq!(window.buffer_pos(), 2);
        assert_eq!(surface.row_text(1).trim_end(), "line2");

        window.append("line5".into(), &mut surface);
        assert_eq!(window.buffer_pos(), 3);
        // 畫面不受新行影響
        assert_eq!(surface.row_text(0).trim_end(), "line1");
        assert_eq!(surface.row_text(1).trim_end(), "line2");
    }

    #[test]
    fn test_scroll_on_empty_buffer_stays_zero() {
        let (mut window, mut surface) = buffered(3, 10);
        window.scroll(-10, &mut surface);
        window.scroll(10, &mut surface);
        assert_eq!(window.buffer_pos(), 0);
    }

    #[test]
    fn test_scroll_is_clamped_to_buffer() {
        let (mut window, mut surface) = buffered(3, 10);
        for i in 0..4 {
            window.append(i.to_string(), &mut surface);
        }
        window.scroll(-100, &mut surface);
        assert_eq!(window.buffer_pos(), 3);
        assert_eq!(surface.row_text(2).trim_end(), "0");
        window.scroll(100, &mut surface);
        assert_eq!(window.buffer_pos(), 0);
        assert_eq!(surface.row_text(2).trim_end(), "3");
    }

    #[test]
    fn test_ansi_is_not_rendered_as_text() {
        let (mut window, mut surface) = buffered(1, 10);
        window.append(colorify("x", Color::Red, false), &mut surface);
        assert_eq!(surface.row_text(0).trim_end(), "x");
        assert_eq!(surface.cell(0, 0), Some(('x', Style::new(Color::Red, false))));
    }

    #[test]
    fn test_long_line_is_clipped() {
        let (mut window, mut surface) = buffered(1, 4);
        window.append("abcdefgh".into(), &mut surface);
        assert_eq!(surface.row_text(0), "abcd");
    }

    #[test]
    fn test_static_window_replaces_lines() {
        let mut window = StaticWindow::new("StatsWindow");
        window.rect = Rect::new(0, 0, 3, 8);
        let mut surface = MemorySurface::new(3, 8);
        window.set_text(vec!["a".into(), "b".into(), "c".into()], &mut surface);
        window.set_text(vec!["z".into()], &mut surface);
        assert_eq!(window.lines(), ["z".to_string()]);
        assert_eq!(surface.row_text(0).trim_end(), "z");
        assert_eq!(surface.row_text(1).trim_end(), "");
    }

    #[test]
    fn test_input_editing_and_submit() {
        let mut input = InputWindow::new("InputWindow");
        input.rect = Rect::new(0, 0, 1, 20);
        let mut surface = MemorySurface::new(1, 20);

        for c in "look".chars() {
            assert_eq!(input.process_key(Key::Char(c), &mut surface), KeyOutcome::Consumed);
        }
        input.process_key(Key::Backspace, &mut surface);
        assert_eq!(input.buffer(), "loo");
        assert_eq!(surface.row_text(0).trim_end(), "loo");
        assert_eq!(surface.cursor(), (0, 3));

        assert_eq!(
            input.process_key(Key::Enter, &mut surface),
            KeyOutcome::Submit("loo".into())
        );
        assert_eq!(input.buffer(), "");
    }

    #[test]
    fn test_backspace_on_empty_is_noop() {
        let mut input = InputWindow::new("InputWindow");
        let mut surface = MemorySurface::new(1, 1);
        assert_eq!(input.process_key(Key::Delete, &mut surface), KeyOutcome::Consumed);
        assert_eq!(input.buffer(), "");
    }

    #[test]
    fn test_shortcut_does_not_touch_buffer() {
        let mut input = InputWindow::new("InputWindow");
        let mut surface = MemorySurface::new(1, 10);
        input.set_shortcuts(HashMap::from([(Key::Up, "north".to_string())]));
        input.process_key(Key::Char('x'), &mut surface);
        assert_eq!(
            input.process_key(Key::Up, &mut surface),
            KeyOutcome::Submit("north".into())
        );
        assert_eq!(input.buffer(), "x");
    }

    #[test]
    fn test_unhandled_key_leaves_buffer() {
        let mut input = InputWindow::new("InputWindow");
        let mut surface = MemorySurface::new(1, 10);
        input.process_key(Key::Char('a'), &mut surface);
        assert_eq!(
            input.process_key(Key::Function(3), &mut surface),
            KeyOutcome::Unhandled(Key::Function(3))
        );
        assert_eq!(input.buffer(), "a");
    }

    #[test]
    fn test_input_shows_tail_when_too_long() {
        let mut input = InputWindow::new("InputWindow");
        input.rect = Rect::new(0, 0, 1, 4);
        let mut surface = MemorySurface::new(1, 4);
        for c in "abcdef".chars() {
            input.process_key(Key::Char(c), &mut surface);
        }
        assert_eq!(surface.row_text(0), "def ");
        assert_eq!(surface.cursor(), (0, 3));
    }

    #[test]
    fn test_pane_set_requires_buffered_main() {
        let panes = vec![Pane::new(PaneKind::Static, "MainWindow")];
        assert_eq!(
            PaneSet::new(panes, "MainWindow").unwrap_err(),
            PaneSetError::MainNotBuffered("MainWindow".into())
        );
        assert_eq!(
            PaneSet::new(vec![], "MainWindow").unwrap_err(),
            PaneSetError::MissingMain("MainWindow".into())
        );
    }

    #[test]
    fn test_unknown_pane_falls_back_to_main() {
        let panes = vec![
            Pane::new(PaneKind::BufferedText, "MainWindow"),
            Pane::new(PaneKind::BufferedText, "ChatWindow"),
        ];
        let mut set = PaneSet::new(panes, "MainWindow").unwrap();
        let mut surface = MemorySurface::new(10, 10);
        set.deliver(PaneMutation::append("ChatWindow", "hi"), &mut surface);
        set.deliver(PaneMutation::append("NoSuchWindow", "lost"), &mut surface);

        let main = set.main_window().unwrap();
        assert_eq!(main.buffer(), ["lost".to_string()]);
        match set.get("ChatWindow") {
            Some(Pane::BufferedText(chat)) => assert_eq!(chat.buffer(), ["hi".to_string()]),
            other => panic!("unexpected pane {:?}", other),
        }
    }
}
