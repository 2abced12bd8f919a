//! 繪製表面抽象
//!
//! 窗格只透過 [`Surface`] 畫字；實際的終端機實作在前端 crate，
//! 測試則使用記憶體中的 [`MemorySurface`]。

use std::io;

use crate::ansi::Style;

/// 以字元格為單位的繪製目標
pub trait Surface {
    /// 目前可用的大小 `(lines, columns)`
    fn size(&self) -> (u16, u16);

    /// 在 `(row, col)` 寫入一段文字
    fn put_str(&mut self, row: u16, col: u16, text: &str, style: Style) -> io::Result<()>;

    /// 在 `(row, col)` 寫入單一字元
    fn put_char(&mut self, row: u16, col: u16, ch: char, style: Style) -> io::Result<()> {
        let mut buf = [0u8; 4];
        self.put_str(row, col, ch.encode_utf8(&mut buf), style)
    }

    /// 以空白清除矩形區域
    fn clear_rect(&mut self, row: u16, col: u16, lines: u16, cols: u16) -> io::Result<()> {
        let blank = " ".repeat(cols as usize);
        for r in row..row.saturating_add(lines) {
            self.put_str(r, col, &blank, Style::default())?;
        }
        Ok(())
    }

    /// 清除整個畫面
    fn clear(&mut self) -> io::Result<()>;

    /// 移動游標
    fn place_cursor(&mut self, row: u16, col: u16) -> io::Result<()>;

    /// 把緩衝中的輸出送出
    fn flush(&mut self) -> io::Result<()>;
}

/// 記憶體中的字元格，用於測試窗格與邊框的繪製結果
#[derive(Debug, Clone)]
pub struct MemorySurface {
    lines: u16,
    cols: u16,
    cells: Vec<Vec<(char, Style)>>,
    cursor: (u16, u16),
}

impl MemorySurface {
    pub fn new(lines: u16, cols: u16) -> Self {
        Self {
            lines,
            cols,
            cells: vec![vec![(' ', Style::default()); cols as usize]; lines as usize],
            cursor: (0, 0),
        }
    }

    /// 取得一列的文字（不含顏色）
    pub fn row_text(&self, row: u16) -> String {
        self.cells
            .get(row as usize)
            .map(|cells| cells.iter().map(|(ch, _)| *ch).collect())
            .unwrap_or_default()
    }

    /// 取得單一格
    pub fn cell(&self, row: u16, col: u16) -> Option<(char, Style)> {
        self.cells.get(row as usize)?.get(col as usize).copied()
    }

    pub fn cursor(&self) -> (u16, u16) {
        self.cursor
    }

    fn out_of_bounds(row: u16, col: u16) -> io::Error {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("({}, {}) 超出繪製範圍", row, col),
        )
    }
}

impl Surface for MemorySurface {
    fn size(&self) -> (u16, u16) {
        (self.lines, self.cols)
    }

    fn put_str(&mut self, row: u16, col: u16, text: &str, style: Style) -> io::Result<()> {
        let cells = self
            .cells
            .get_mut(row as usize)
            .ok_or_else(|| Self::out_of_bounds(row, col))?;
        let mut c = col as usize;
        for ch in text.chars() {
            // 寫到一半超出右邊界時與真實終端機一樣回報錯誤，已寫入的保留
            let cell = cells
                .get_mut(c)
                .ok_or_else(|| Self::out_of_bounds(row, c as u16))?;
            *cell = (ch, style);
            c += 1;
        }
        Ok(())
    }

    fn clear(&mut self) -> io::Result<()> {
        for row in &mut self.cells {
            row.fill((' ', Style::default()));
        }
        Ok(())
    }

    fn place_cursor(&mut self, row: u16, col: u16) -> io::Result<()> {
        self.cursor = (row, col);
        Ok(())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
