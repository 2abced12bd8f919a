//! MUD Core Library
//!
//! 終端機 MUD 客戶端的核心功能，不依賴任何終端機函式庫：
//! - `telnet`: Telnet 協定、MCCP2 壓縮與連線管理
//! - `encoding`: UTF-8 / Big5 編解碼
//! - `buffer`: 依換行切割的行緩衝
//! - `ansi`: ANSI 顏色碼解析
//! - `bridge`: 網路與繪製執行環境之間的事件橋接
//! - `router`: 依序把行交給外掛的路由器
//! - `plugins`: 內建外掛（聊天、小地圖、狀態列、自動登入）
//! - `layout`: 版面配置與邊框合成
//! - `surface`: 繪製表面抽象
//! - `pane`: 捲動、靜態與輸入窗格

pub mod ansi;
pub mod bridge;
pub mod buffer;
pub mod encoding;
pub mod layout;
pub mod pane;
pub mod plugins;
pub mod router;
pub mod surface;
pub mod telnet;

pub use ansi::{colorify, parse_ansi, strip_ansi, AnsiSpan, Color, Style};
pub use bridge::{BridgeEvent, Command, CommandSender, EventReceiver, NetworkSide, PaneMutation, PaneOp};
pub use buffer::LineBuffer;
pub use encoding::Charset;
pub use layout::{LayoutError, LayoutNode, LayoutSpec, Rect, SizeSpec};
pub use pane::{Key, KeyOutcome, Pane, PaneKind, PaneSet};
pub use plugins::{PluginConfig, PluginConfigError};
pub use router::{Dispatch, LineRouter, Plugin, PluginContext, PluginError};
pub use surface::{MemorySurface, Surface};
pub use telnet::{run_network, ProtocolSession, TelnetClient, TelnetConfig, TelnetError};
