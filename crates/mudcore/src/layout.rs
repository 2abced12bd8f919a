//! 版面配置引擎
//!
//! 由宣告式的版面樹建立節點，每次終端機大小改變時重新計算矩形，
//! 再依窗格之間的相鄰關係合成邊框字元。
//!
//! 每個節點的外框矩形包含一圈邊框，相鄰的兄弟節點共用分隔線：
//! n 個子節點的堆疊在主軸上需要 n + 1 格邊框。

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;
use tracing::trace;

use crate::ansi::Style;
use crate::pane::{Pane, PaneKind};
use crate::surface::Surface;

/// 版面錯誤，皆為啟動時的設定錯誤
#[derive(Debug, Error, PartialEq, Eq)]
pub enum LayoutError {
    #[error("窗格名稱重複: {0}")]
    DuplicateName(String),

    #[error("堆疊有 {sizes} 個大小設定但有 {children} 個子節點")]
    SizeMismatch { sizes: usize, children: usize },

    #[error("堆疊沒有任何子節點")]
    EmptyStack,

    #[error("無效的大小設定: {0:?}")]
    BadSize(String),
}

/// 子節點大小：固定格數或比例權重（"3*"）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SizeSpec {
    Absolute(u16),
    Weight(u16),
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum RawSize {
    Number(u16),
    Text(String),
}

impl FromStr for SizeSpec {
    type Err = LayoutError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bad = || LayoutError::BadSize(s.to_string());
        let trimmed = s.trim();
        match trimmed.strip_suffix('*') {
            Some(weight) => {
                let weight: u16 = weight.trim().parse().map_err(|_| bad())?;
                if weight == 0 {
                    return Err(bad());
                }
                Ok(SizeSpec::Weight(weight))
            }
            None => trimmed.parse().map(SizeSpec::Absolute).map_err(|_| bad()),
        }
    }
}

/// 設定檔中可寫成整數 `12`、字串 `"12"` 或權重 `"3*"`
impl<'de> Deserialize<'de> for SizeSpec {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match RawSize::deserialize(deserializer)? {
            RawSize::Number(n) => Ok(SizeSpec::Absolute(n)),
            RawSize::Text(text) => text.parse().map_err(de::Error::custom),
        }
    }
}

impl Serialize for SizeSpec {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            SizeSpec::Absolute(n) => RawSize::Number(*n),
            SizeSpec::Weight(_) => RawSize::Text(self.to_string()),
        }
        .serialize(serializer)
    }
}

impl fmt::Display for SizeSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SizeSpec::Absolute(n) => write!(f, "{}", n),
            SizeSpec::Weight(w) => write!(f, "{}*", w),
        }
    }
}

/// 設定檔中的版面樹
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum LayoutSpec {
    BufferedTextWindow {
        name: String,
    },
    StaticWindow {
        name: String,
    },
    InputWindow {
        name: String,
    },
    VerticalStack {
        sizes: Vec<SizeSpec>,
        children: Vec<LayoutSpec>,
    },
    HorizontalStack {
        sizes: Vec<SizeSpec>,
        children: Vec<LayoutSpec>,
    },
}

/// 以字元格為單位的矩形
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Rect {
    pub row: u16,
    pub col: u16,
    pub lines: u16,
    pub cols: u16,
}

impl Rect {
    pub fn new(row: u16, col: u16, lines: u16, cols: u16) -> Self {
        Self {
            row,
            col,
            lines,
            cols,
        }
    }

    /// 四邊各內縮一格
    pub fn inset(self) -> Self {
        Self {
            row: self.row.saturating_add(1),
            col: self.col.saturating_add(1),
            lines: self.lines.saturating_sub(2),
            cols: self.cols.saturating_sub(2),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Axis {
    Vertical,
    Horizontal,
}

/// 建立後形狀不變的版面節點，只有矩形會在 resize 時更新
#[derive(Debug, Clone, PartialEq)]
pub enum LayoutNode {
    Leaf {
        kind: PaneKind,
        name: String,
        /// 窗格內容區（不含邊框）
        rect: Rect,
    },
    VStack {
        sizes: Vec<SizeSpec>,
        children: Vec<LayoutNode>,
        /// 外框（含邊框）
        rect: Rect,
    },
    HStack {
        sizes: Vec<SizeSpec>,
        children: Vec<LayoutNode>,
        rect: Rect,
    },
}

/// 由版面設定建立節點樹與所有窗格
///
/// # Example
/// ```
/// use mudcore::layout::{build, LayoutSpec, SizeSpec};
///
/// let spec = LayoutSpec::VerticalStack {
///     sizes: vec![SizeSpec::Weight(1), SizeSpec::Absolute(1)],
///     children: vec![
///         LayoutSpec::BufferedTextWindow { name: "MainWindow".into() },
///         LayoutSpec::InputWindow { name: "InputWindow".into() },
///     ],
/// };
/// let (_root, panes) = build(&spec).unwrap();
/// assert_eq!(panes.len(), 2);
/// ```
pub fn build(spec: &LayoutSpec) -> Result<(LayoutNode, Vec<Pane>), LayoutError> {
    let mut panes = Vec::new();
    let mut names = HashSet::new();
    let root = build_node(spec, &mut panes, &mut names)?;
    Ok((root, panes))
}

fn build_node(
    spec: &LayoutSpec,
    panes: &mut Vec<Pane>,
    names: &mut HashSet<String>,
) -> Result<LayoutNode, LayoutError> {
    let leaf = |kind: PaneKind, name: &str, panes: &mut Vec<Pane>, names: &mut HashSet<String>| {
        if !names.insert(name.to_string()) {
            return Err(LayoutError::DuplicateName(name.to_string()));
        }
        panes.push(Pane::new(kind, name));
        Ok(LayoutNode::Leaf {
            kind,
            name: name.to_string(),
            rect: Rect::default(),
        })
    };

    match spec {
        LayoutSpec::BufferedTextWindow { name } => leaf(PaneKind::BufferedText, name, panes, names),
        LayoutSpec::StaticWindow { name } => leaf(PaneKind::Static, name, panes, names),
        LayoutSpec::InputWindow { name } => leaf(PaneKind::Input, name, panes, names),
        LayoutSpec::VerticalStack { sizes, children } => {
            let children = build_children(sizes, children, panes, names)?;
            Ok(LayoutNode::VStack {
                sizes: sizes.clone(),
                children,
                rect: Rect::default(),
            })
        }
        LayoutSpec::HorizontalStack { sizes, children } => {
            let children = build_children(sizes, children, panes, names)?;
            Ok(LayoutNode::HStack {
                sizes: sizes.clone(),
                children,
                rect: Rect::default(),
            })
        }
    }
}

fn build_children(
    sizes: &[SizeSpec],
    children: &[LayoutSpec],
    panes: &mut Vec<Pane>,
    names: &mut HashSet<String>,
) -> Result<Vec<LayoutNode>, LayoutError> {
    if children.is_empty() {
        return Err(LayoutError::EmptyStack);
    }
    if sizes.len() != children.len() {
        return Err(LayoutError::SizeMismatch {
            sizes: sizes.len(),
            children: children.len(),
        });
    }
    children
        .iter()
        .map(|child| build_node(child, panes, names))
        .collect()
}

/// 將主軸長度分配給子節點
///
/// 先扣除 n + 1 格邊框，固定大小的子節點先取，剩下的依權重分：
/// 第 i 個子節點的右界為 `floor(累計權重 * 剩餘 / 總權重)`，
/// 大小為相鄰右界之差，因此剩餘空間剛好分完。
pub fn distribute(span: u16, sizes: &[SizeSpec]) -> Vec<u16> {
    let borders = u16::try_from(sizes.len()).unwrap_or(u16::MAX).saturating_add(1);
    let mut unallocated = span.saturating_sub(borders);

    let mut result = vec![0u16; sizes.len()];
    for (slot, size) in result.iter_mut().zip(sizes) {
        if let SizeSpec::Absolute(n) = size {
            *slot = (*n).min(unallocated);
            unallocated -= *slot;
        }
    }

    // u16 權重乘上 u16 長度再累加，以 u64 計算不會溢位
    let total_weight: u64 = sizes
        .iter()
        .map(|size| match size {
            SizeSpec::Weight(w) => u64::from(*w),
            SizeSpec::Absolute(_) => 0,
        })
        .sum();
    if total_weight == 0 {
        return result;
    }

    let mut cumulative = 0u64;
    let mut previous = 0u64;
    for (slot, size) in result.iter_mut().zip(sizes) {
        if let SizeSpec::Weight(w) = size {
            cumulative += u64::from(*w);
            let boundary = cumulative * u64::from(unallocated) / total_weight;
            *slot = (boundary - previous) as u16;
            previous = boundary;
        }
    }
    result
}

impl LayoutNode {
    /// 以終端機可用大小重新計算所有矩形
    ///
    /// `cols` 應為已扣除最右欄之後的可用寬度。
    pub fn resize(&mut self, lines: u16, cols: u16) {
        self.place(Rect::new(0, 0, lines, cols));
    }

    fn place(&mut self, outer: Rect) {
        match self {
            LayoutNode::Leaf { rect, .. } => *rect = outer.inset(),
            LayoutNode::VStack {
                sizes,
                children,
                rect,
            } => {
                *rect = outer;
                place_children(outer, Axis::Vertical, sizes, children);
            }
            LayoutNode::HStack {
                sizes,
                children,
                rect,
            } => {
                *rect = outer;
                place_children(outer, Axis::Horizontal, sizes, children);
            }
        }
    }

    pub fn rect(&self) -> Rect {
        match self {
            LayoutNode::Leaf { rect, .. }
            | LayoutNode::VStack { rect, .. }
            | LayoutNode::HStack { rect, .. } => *rect,
        }
    }

    /// 所有葉節點（窗格名稱、種類、內容矩形），依樹的順序
    pub fn leaves(&self) -> Vec<(&str, PaneKind, Rect)> {
        let mut out = Vec::new();
        self.collect_leaves(&mut out);
        out
    }

    fn collect_leaves<'a>(&'a self, out: &mut Vec<(&'a str, PaneKind, Rect)>) {
        match self {
            LayoutNode::Leaf { kind, name, rect } => out.push((name.as_str(), *kind, *rect)),
            LayoutNode::VStack { children, .. } | LayoutNode::HStack { children, .. } => {
                for child in children {
                    child.collect_leaves(out);
                }
            }
        }
    }
}

fn place_children(outer: Rect, axis: Axis, sizes: &[SizeSpec], children: &mut [LayoutNode]) {
    let (start, span) = match axis {
        Axis::Vertical => (outer.row, outer.lines),
        Axis::Horizontal => (outer.col, outer.cols),
    };
    let allocated = distribute(span, sizes);

    // 內容起點 = start + 1 + 先前大小總和 + 先前的分隔線數
    let mut offset = start.saturating_add(1);
    for (child, size) in children.iter_mut().zip(allocated) {
        let child_outer = match axis {
            Axis::Vertical => Rect::new(offset - 1, outer.col, size + 2, outer.cols),
            Axis::Horizontal => Rect::new(outer.row, offset - 1, outer.lines, size + 2),
        };
        child.place(child_outer);
        offset = offset.saturating_add(size).saturating_add(1);
    }
}

const UP: u8 = 1;
const RIGHT: u8 = 2;
const DOWN: u8 = 4;
const LEFT: u8 = 8;

/// 無對應線條字元時使用
pub const FALLBACK_GLYPH: char = '#';

/// 相鄰碼對應的線條字元，索引為 上=1 右=2 下=4 左=8 的組合
const GLYPHS: [char; 16] = [
    FALLBACK_GLYPH, // 孤立
    '│',            // 上
    '─',            // 右
    '└',            // 上右
    '│',            // 下
    '│',            // 上下
    '┌',            // 右下
    '├',            // 上右下
    '─',            // 左
    '┘',            // 上左
    '─',            // 左右
    '┴',            // 上右左
    '┐',            // 下左
    '┤',            // 上下左
    '┬',            // 右下左
    '┼',
];

/// 由 4 位元相鄰碼選擇線條字元
pub fn border_glyph(code: u8) -> char {
    GLYPHS[(code & 0x0f) as usize]
}

/// 一格邊框
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BorderCell {
    pub row: u16,
    pub col: u16,
    pub glyph: char,
}

/// 依窗格占用情況合成邊框
///
/// 沒有被任何窗格內容覆蓋的格子都是邊框；
/// 相鄰碼取自上右下左四個方向是否也是邊框格。
pub fn synthesize_borders(root: &LayoutNode, lines: u16, cols: u16) -> Vec<BorderCell> {
    let (h, w) = (lines as usize, cols as usize);
    let mut used = vec![false; h * w];
    for (_, _, rect) in root.leaves() {
        let row_end = (rect.row as usize + rect.lines as usize).min(h);
        let col_end = (rect.col as usize + rect.cols as usize).min(w);
        for row in rect.row as usize..row_end {
            for col in rect.col as usize..col_end {
                used[row * w + col] = true;
            }
        }
    }

    let is_border = |row: usize, col: usize| !used[row * w + col];
    let mut cells = Vec::new();
    for row in 0..h {
        for col in 0..w {
            if !is_border(row, col) {
                continue;
            }
            let mut code = 0;
            if row > 0 && is_border(row - 1, col) {
                code |= UP;
            }
            if col + 1 < w && is_border(row, col + 1) {
                code |= RIGHT;
            }
            if row + 1 < h && is_border(row + 1, col) {
                code |= DOWN;
            }
            if col > 0 && is_border(row, col - 1) {
                code |= LEFT;
            }
            cells.push(BorderCell {
                row: row as u16,
                col: col as u16,
                glyph: border_glyph(code),
            });
        }
    }
    cells
}

/// 畫出邊框；寫入失敗（通常是最右欄或最底列）直接略過
pub fn draw_borders(cells: &[BorderCell], surface: &mut dyn Surface) {
    for cell in cells {
        if let Err(err) = surface.put_char(cell.row, cell.col, cell.glyph, Style::default()) {
            trace!("邊框寫入失敗 ({}, {}): {}", cell.row, cell.col, err);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::surface::MemorySurface;

    fn main_and_input() -> LayoutSpec {
        LayoutSpec::VerticalStack {
            sizes: vec![SizeSpec::Weight(1), SizeSpec::Absolute(1)],
            children: vec![
                LayoutSpec::BufferedTextWindow {
                    name: "MainWindow".into(),
                },
                LayoutSpec::InputWindow {
                    name: "InputWindow".into(),
                },
            ],
        }
    }

    fn two_columns() -> LayoutSpec {
        LayoutSpec::HorizontalStack {
            sizes: vec![SizeSpec::Weight(2), SizeSpec::Weight(1)],
            children: vec![
                main_and_input(),
                LayoutSpec::BufferedTextWindow {
                    name: "ChatWindow".into(),
                },
            ],
        }
    }

    #[test]
    fn test_parse_size_specs() {
        assert_eq!("3*".parse::<SizeSpec>(), Ok(SizeSpec::Weight(3)));
        assert_eq!("12".parse::<SizeSpec>(), Ok(SizeSpec::Absolute(12)));
        assert!("0*".parse::<SizeSpec>().is_err());
        assert!("abc".parse::<SizeSpec>().is_err());
    }

    #[test]
    fn test_layout_spec_from_json() {
        let json = r#"{
            "type": "VerticalStack",
            "sizes": ["1*", 1],
            "children": [
                {"type": "BufferedTextWindow", "name": "MainWindow"},
                {"type": "InputWindow", "name": "InputWindow"}
            ]
        }"#;
        let spec: LayoutSpec = serde_json::from_str(json).unwrap();
        assert_eq!(spec, main_and_input());
    }

    #[test]
    fn test_unknown_node_type_rejected() {
        let json = r#"{"type": "FancyWindow", "name": "x"}"#;
        assert!(serde_json::from_str::<LayoutSpec>(json).is_err());
    }

    #[test]
    fn test_build_rejects_duplicate_names() {
        let spec = LayoutSpec::HorizontalStack {
            sizes: vec![SizeSpec::Weight(1), SizeSpec::Weight(1)],
            children: vec![
                LayoutSpec::StaticWindow { name: "A".into() },
                LayoutSpec::BufferedTextWindow { name: "A".into() },
            ],
        };
        assert_eq!(build(&spec).unwrap_err(), LayoutError::DuplicateName("A".into()));
    }

    #[test]
    fn test_build_rejects_size_mismatch_and_empty_stack() {
        let spec = LayoutSpec::VerticalStack {
            sizes: vec![SizeSpec::Weight(1)],
            children: vec![],
        };
        assert_eq!(build(&spec).unwrap_err(), LayoutError::EmptyStack);

        let spec = LayoutSpec::VerticalStack {
            sizes: vec![SizeSpec::Weight(1)],
            children: vec![
                LayoutSpec::StaticWindow { name: "A".into() },
                LayoutSpec::StaticWindow { name: "B".into() },
            ],
        };
        assert_eq!(
            build(&spec).unwrap_err(),
            LayoutError::SizeMismatch {
                sizes: 1,
                children: 2
            }
        );
    }

    #[test]
    fn test_equal_weights_split_evenly() {
        let sizes = distribute(100, &[SizeSpec::Weight(1), SizeSpec::Weight(1)]);
        assert_eq!(sizes.iter().sum::<u16>(), 97);
        assert_eq!(sizes, vec![48, 49]);
    }

    #[test]
    fn test_absolute_sizes_taken_first() {
        let sizes = distribute(50, &[SizeSpec::Weight(1), SizeSpec::Absolute(1)]);
        assert_eq!(sizes, vec![46, 1]);
    }

    #[test]
    fn test_weights_fill_whole_span() {
        for span in 0..60 {
            let sizes = distribute(
                span,
                &[SizeSpec::Weight(3), SizeSpec::Absolute(4), SizeSpec::Weight(2)],
            );
            let expected = span.saturating_sub(4);
            assert_eq!(sizes.iter().sum::<u16>(), expected, "span {}", span);
        }
    }

    #[test]
    fn test_large_weights_do_not_overflow() {
        let sizes = vec![SizeSpec::Weight(u16::MAX); 4];
        let result = distribute(u16::MAX, &sizes);
        assert_eq!(result.iter().map(|&n| n as u32).sum::<u32>(), u16::MAX as u32 - 5);
        let (min, max) = (result.iter().min().unwrap(), result.iter().max().unwrap());
        assert!(max - min <= 1, "{:?}", result);
    }

    #[test]
    fn test_resize_leaf_rects() {
        let (mut root, _) = build(&main_and_input()).unwrap();
        root.resize(24, 79);
        let leaves = root.leaves();
        assert_eq!(leaves[0], ("MainWindow", PaneKind::BufferedText, Rect::new(1, 1, 20, 77)));
        assert_eq!(leaves[1], ("InputWindow", PaneKind::Input, Rect::new(22, 1, 1, 77)));
    }

    #[test]
    fn test_nested_stack_shares_borders() {
        let (mut root, _) = build(&two_columns()).unwrap();
        root.resize(24, 79);
        let leaves = root.leaves();
        // 可用欄 79 - 3 = 76，依 2:1 分為 50 / 26
        assert_eq!(leaves[0].2, Rect::new(1, 1, 20, 50));
        assert_eq!(leaves[1].2, Rect::new(22, 1, 1, 50));
        assert_eq!(leaves[2].2, Rect::new(1, 52, 22, 26));
    }

    #[test]
    fn test_resize_is_idempotent() {
        let (mut root, _) = build(&two_columns()).unwrap();
        root.resize(40, 120);
        let first = root.clone();
        root.resize(40, 120);
        assert_eq!(root, first);
    }

    #[test]
    fn test_tiny_terminal_does_not_panic() {
        let (mut root, _) = build(&two_columns()).unwrap();
        for lines in 0..6 {
            for cols in 0..6 {
                root.resize(lines, cols);
                synthesize_borders(&root, lines, cols);
            }
        }
    }

    #[test]
    fn test_border_glyphs() {
        assert_eq!(border_glyph(RIGHT | DOWN), '┌');
        assert_eq!(border_glyph(UP | RIGHT | DOWN | LEFT), '┼');
        assert_eq!(border_glyph(UP | DOWN), '│');
        assert_eq!(border_glyph(0), FALLBACK_GLYPH);
    }

    #[test]
    fn test_synthesized_frame() {
        let (mut root, _) = build(&main_and_input()).unwrap();
        root.resize(6, 5);
        let mut surface = MemorySurface::new(6, 5);
        draw_borders(&synthesize_borders(&root, 6, 5), &mut surface);
        assert_eq!(surface.row_text(0), "┌───┐");
        assert_eq!(surface.row_text(1), "│   │");
        assert_eq!(surface.row_text(2), "│   │");
        assert_eq!(surface.row_text(3), "├───┤");
        assert_eq!(surface.row_text(4), "│   │");
        assert_eq!(surface.row_text(5), "└───┘");
    }

    #[test]
    fn test_synthesized_tees_between_columns() {
        let (mut root, _) = build(&two_columns()).unwrap();
        root.resize(6, 8);
        let mut surface = MemorySurface::new(6, 8);
        draw_borders(&synthesize_borders(&root, 6, 8), &mut surface);
        // 可用欄 8 - 3 = 5，依 2:1 分為 3 / 2
        assert_eq!(surface.row_text(0), "┌───┬──┐");
        assert_eq!(surface.row_text(3), "├───┤  │");
        assert_eq!(surface.row_text(5), "└───┴──┘");
    }
}
