//! 行路由模組
//!
//! 每一行依註冊順序交給外掛，第一個認領的外掛之後的外掛不會再看到這一行；
//! 沒有外掛認領的行送往預設窗格。外掛只能透過 [`PluginContext`]
//! 產生效果（送命令、改窗格），不能直接碰窗格或其他外掛。

use std::any::Any;
use std::backtrace::Backtrace;
use std::cell::RefCell;
use std::error::Error as StdError;
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::OnceLock;

use thiserror::Error;
use tracing::{trace, warn};

use crate::ansi::{colorify, Color};
use crate::bridge::PaneMutation;

/// panic 診斷最多顯示的堆疊行數
const MAX_TRACE_LINES: usize = 40;

thread_local! {
    /// 本執行緒最近一次 panic 的堆疊
    static LAST_PANIC_TRACE: RefCell<Option<String>> = const { RefCell::new(None) };
}

/// 外掛執行期錯誤
#[derive(Debug, Error)]
pub enum PluginError {
    #[error("無法讀取帳號檔 {path}")]
    CredentialsIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("帳號檔格式錯誤 {path}")]
    CredentialsFormat {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("{0}")]
    Other(String),
}

/// 外掛處理一行後累積的效果
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PluginContext {
    /// 待送往伺服器的命令
    pub commands: Vec<String>,
    /// 窗格變更
    pub mutations: Vec<PaneMutation>,
}

impl PluginContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn send(&mut self, command: impl Into<String>) {
        self.commands.push(command.into());
    }

    pub fn append(&mut self, pane: impl Into<String>, text: impl Into<String>) {
        self.mutations.push(PaneMutation::append(pane, text));
    }

    pub fn set_text(&mut self, pane: impl Into<String>, lines: Vec<String>) {
        self.mutations.push(PaneMutation::set_text(pane, lines));
    }

    fn merge(&mut self, other: PluginContext) {
        self.commands.extend(other.commands);
        self.mutations.extend(other.mutations);
    }
}

/// 內容處理外掛
pub trait Plugin {
    /// 外掛名稱（用於診斷訊息）
    fn name(&self) -> &str;

    /// 處理一行；回傳 `true` 表示認領，後面的外掛不再處理
    fn handle(&mut self, line: &str, ctx: &mut PluginContext) -> Result<bool, PluginError>;
}

/// 一行的路由結果
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dispatch {
    pub claimed: bool,
    pub effects: PluginContext,
}

/// 依序把行交給外掛的路由器
pub struct LineRouter {
    plugins: Vec<Box<dyn Plugin>>,
    default_pane: String,
}

impl LineRouter {
    pub fn new(default_pane: impl Into<String>) -> Self {
        install_trace_hook();
        Self {
            plugins: Vec::new(),
            default_pane: default_pane.into(),
        }
    }

    /// 註冊外掛；註冊順序即優先順序
    pub fn register(&mut self, plugin: Box<dyn Plugin>) {
        self.plugins.push(plugin);
    }

    pub fn plugin_names(&self) -> Vec<&str> {
        self.plugins.iter().map(|p| p.name()).collect()
    }

    /// 路由一行
    ///
    /// 外掛回傳錯誤或 panic 時，在預設窗格顯示紅色診斷，視為未認領並繼續下一個外掛。
    pub fn dispatch(&mut self, line: &str) -> Dispatch {
        let mut dispatch = Dispatch::default();

        for plugin in &mut self.plugins {
            let mut ctx = PluginContext::new();
            LAST_PANIC_TRACE.with(|trace| trace.borrow_mut().take());
            let result = panic::catch_unwind(AssertUnwindSafe(|| plugin.handle(line, &mut ctx)));
            match result {
                Ok(Ok(claimed)) => {
                    dispatch.effects.merge(ctx);
                    if claimed {
                        trace!("{} 認領: {}", plugin.name(), line);
                        dispatch.claimed = true;
                        break;
                    }
                }
                Ok(Err(err)) => {
                    warn!("外掛 {} 失敗: {}", plugin.name(), err);
                    // 錯誤前已產生的效果照樣生效
                    dispatch.effects.merge(ctx);
                    for text in error_report(plugin.name(), &err) {
                        dispatch.effects.append(&self.default_pane, text);
                    }
                }
                Err(payload) => {
                    let message = panic_message(payload.as_ref());
                    warn!("外掛 {} panic: {}", plugin.name(), message);
                    for text in panic_report(plugin.name(), &message) {
                        dispatch.effects.append(&self.default_pane, text);
                    }
                }
            }
        }

        if !dispatch.claimed {
            dispatch.effects.append(&self.default_pane, line);
        }
        dispatch
    }
}

/// 錯誤訊息與其來源鏈，每層一行，紅色
fn error_report(plugin: &str, err: &dyn StdError) -> Vec<String> {
    let mut lines = vec![colorify(
        &format!("外掛 {} 錯誤: {}", plugin, err),
        Color::Red,
        false,
    )];
    let mut source = err.source();
    while let Some(cause) = source {
        lines.push(colorify(&format!("    原因: {}", cause), Color::Red, false));
        source = cause.source();
    }
    lines
}

/// panic 訊息與堆疊，每行一筆，紅色
fn panic_report(plugin: &str, message: &str) -> Vec<String> {
    let mut lines = vec![format!("外掛 {} panic: {}", plugin, message)];
    if let Some(trace) = LAST_PANIC_TRACE.with(|trace| trace.borrow_mut().take()) {
        let frames: Vec<&str> = trace.lines().collect();
        lines.extend(frames.iter().take(MAX_TRACE_LINES).map(|frame| format!("    {}", frame)));
        if frames.len() > MAX_TRACE_LINES {
            lines.push(format!("    ... 另有 {} 行", frames.len() - MAX_TRACE_LINES));
        }
    }
    lines
        .iter()
        .map(|text| colorify(text, Color::Red, false))
        .collect()
}

/// 在既有的 panic hook 之前記錄堆疊，只安裝一次
fn install_trace_hook() {
    static HOOK: OnceLock<()> = OnceLock::new();
    HOOK.get_or_init(|| {
        let previous = panic::take_hook();
        panic::set_hook(Box::new(move |info| {
            let trace = Backtrace::force_capture().to_string();
            LAST_PANIC_TRACE.with(|last| *last.borrow_mut() = Some(trace));
            previous(info);
        }));
    });
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "未知的 panic".to_string()
    }
}
