//! 事件橋接模組
//!
//! 網路執行環境與繪製執行環境之間唯一的溝通管道：
//! - 事件（網路 → 繪製）：收到的行、連線狀態、窗格變更
//! - 命令（繪製 → 網路）：連線、送出文字、斷線、結束
//!
//! 兩個方向都是有界的 `tokio::sync::mpsc` 佇列，單一佇列保證送達順序。

use thiserror::Error;
use tokio::sync::mpsc::{self, error::TryRecvError, error::TrySendError};

/// 佇列預設容量
pub const DEFAULT_CAPACITY: usize = 1024;

/// 橋接錯誤
#[derive(Debug, Error, PartialEq, Eq)]
pub enum BridgeError {
    #[error("橋接另一端已關閉")]
    Closed,

    #[error("橋接佇列已滿")]
    Full,
}

impl<T> From<TrySendError<T>> for BridgeError {
    fn from(err: TrySendError<T>) -> Self {
        match err {
            TrySendError::Full(_) => BridgeError::Full,
            TrySendError::Closed(_) => BridgeError::Closed,
        }
    }
}

/// 窗格操作
#[derive(Debug, Clone, PartialEq)]
pub enum PaneOp {
    /// 追加一行（捲動緩衝窗格）
    AppendText(String),
    /// 整批取代內容（靜態窗格）
    SetText(Vec<String>),
    /// 捲動，負值往舊的方向
    Scroll(i32),
    /// 重繪
    Redraw,
}

/// 指定窗格名稱的變更
#[derive(Debug, Clone, PartialEq)]
pub struct PaneMutation {
    pub pane: String,
    pub op: PaneOp,
}

impl PaneMutation {
    pub fn new(pane: impl Into<String>, op: PaneOp) -> Self {
        Self {
            pane: pane.into(),
            op,
        }
    }

    pub fn append(pane: impl Into<String>, text: impl Into<String>) -> Self {
        Self::new(pane, PaneOp::AppendText(text.into()))
    }

    pub fn set_text(pane: impl Into<String>, lines: Vec<String>) -> Self {
        Self::new(pane, PaneOp::SetText(lines))
    }
}

/// 網路端送往繪製端的事件
#[derive(Debug, Clone, PartialEq)]
pub enum BridgeEvent {
    /// 一批解碼完成的行
    LinesReceived(Vec<String>),
    /// 連線建立
    Connected { host: String, port: u16 },
    /// 連線已關閉，之後不會再有該連線的行
    ConnectionClosed,
    /// 直接對窗格的操作
    PaneMutation(PaneMutation),
}

/// 繪製端送往網路端的命令
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Connect { host: String, port: u16 },
    Send(String),
    Disconnect,
    Shutdown,
}

/// 網路端持有的一半
pub struct NetworkSide {
    events: mpsc::Sender<BridgeEvent>,
    commands: mpsc::Receiver<Command>,
}

impl NetworkSide {
    /// 發布事件；佇列滿時等待繪製端消化，繪製端關閉則回傳錯誤
    pub async fn publish(&self, event: BridgeEvent) -> Result<(), BridgeError> {
        self.events.send(event).await.map_err(|_| BridgeError::Closed)
    }

    /// 等待下一個命令；繪製端關閉時回傳 `None`
    pub async fn next_command(&mut self) -> Option<Command> {
        self.commands.recv().await
    }
}

/// 繪製端的事件接收端
pub struct EventReceiver {
    inner: mpsc::Receiver<BridgeEvent>,
}

impl EventReceiver {
    /// 取出目前已到達的事件，最多 `max` 個，不會阻塞
    pub fn drain(&mut self, max: usize) -> Vec<BridgeEvent> {
        let mut events = Vec::new();
        while events.len() < max {
            match self.inner.try_recv() {
                Ok(event) => events.push(event),
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }
        events
    }

    /// 非同步等待下一個事件
    pub async fn next_event(&mut self) -> Option<BridgeEvent> {
        self.inner.recv().await
    }
}

/// 繪製端不阻塞的命令發送端
#[derive(Clone)]
pub struct CommandSender {
    inner: mpsc::Sender<Command>,
}

impl CommandSender {
    /// 送出命令，佇列滿或網路端已結束時立即回傳錯誤
    pub fn send(&self, command: Command) -> Result<(), BridgeError> {
        self.inner.try_send(command).map_err(BridgeError::from)
    }
}

/// 建立一組橋接：網路端、繪製端的事件接收端與命令發送端
pub fn pair(capacity: usize) -> (NetworkSide, EventReceiver, CommandSender) {
    let (event_tx, event_rx) = mpsc::channel(capacity);
    let (command_tx, command_rx) = mpsc::channel(capacity);
    (
        NetworkSide {
            events: event_tx,
            commands: command_rx,
        },
        EventReceiver { inner: event_rx },
        CommandSender { inner: command_tx },
    )
}
