//! Session 控制器
//!
//! 在繪製執行環境中擁有版面、窗格與路由器：
//! - 處理按鍵（Esc 前綴、捲動、輸入列）
//! - 把網路事件交給路由器，再把效果套用到窗格
//! - 經由 [`CommandSender`] 對網路端下命令，永不阻塞

use std::panic::{self, AssertUnwindSafe};

use mudcore::bridge::BridgeError;
use mudcore::layout::{self, LayoutNode};
use mudcore::pane::{KeyOutcome, PaneSet};
use mudcore::plugins::build_router;
use mudcore::{colorify, BridgeEvent, Color, Command, CommandSender, Key, LineRouter, PaneMutation, PaneOp, Surface};
use tracing::{debug, error, info, trace, warn};

use crate::config::{AppConfig, ConfigError};

/// 單一連線的控制器
pub struct SessionController {
    root: LayoutNode,
    panes: PaneSet,
    router: LineRouter,
    commands: CommandSender,
    input_pane: String,
    scroll_step: i32,
    host: String,
    port: u16,
    /// 上一個按鍵是 Esc
    escape_pending: bool,
    connected: bool,
    running: bool,
}

impl SessionController {
    /// 依設定建立版面、窗格與外掛；任何設定錯誤都會回傳
    pub fn new(config: &AppConfig, commands: CommandSender) -> Result<Self, ConfigError> {
        let (root, panes) = layout::build(&config.layout)?;
        let mut panes = PaneSet::new(panes, config.keys.main_pane.clone())?;

        let input_pane = config.keys.input_pane.clone();
        let input = panes
            .input_mut(&input_pane)
            .ok_or_else(|| ConfigError::InputPane(input_pane.clone()))?;
        input.set_shortcuts(config.keys.shortcuts()?);

        let router = build_router(&config.plugins, &config.keys.main_pane)?;

        Ok(Self {
            root,
            panes,
            router,
            commands,
            input_pane,
            scroll_step: config.keys.scroll_step,
            host: config.connection.host.clone(),
            port: config.connection.port,
            escape_pending: false,
            connected: false,
            running: true,
        })
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn panes(&self) -> &PaneSet {
        &self.panes
    }

    /// 第一次繪製並要求連線
    pub fn start(&mut self, surface: &mut dyn Surface) {
        self.resize(surface);
        self.connect(surface);
    }

    /// 以表面目前大小重新計算版面並全部重繪
    pub fn resize(&mut self, surface: &mut dyn Surface) {
        let (lines, cols) = surface.size();
        debug!("重新配置版面 {}x{}", cols, lines);
        self.root.resize(lines, cols);
        self.panes.apply_layout(&self.root);

        if let Err(e) = surface.clear() {
            trace!("清除畫面失敗: {}", e);
        }
        layout::draw_borders(&layout::synthesize_borders(&self.root, lines, cols), surface);
        self.panes.redraw_all(surface);
        self.finish_frame(surface);
    }

    /// 處理一個按鍵
    pub fn handle_key(&mut self, key: Key, surface: &mut dyn Surface) {
        if self.escape_pending {
            self.escape_pending = false;
            match key {
                Key::Char('q') => self.quit(),
                Key::Char('r') => self.reconnect(surface),
                other => {
                    let text = format!("未處理的 Esc 按鍵: {}", other);
                    self.diagnostic(colorify(&text, Color::Cyan, true), surface);
                }
            }
            self.finish_frame(surface);
            return;
        }

        match key {
            Key::Escape => self.escape_pending = true,
            Key::PageUp => self.scroll_main(-self.scroll_step, surface),
            Key::PageDown => self.scroll_main(self.scroll_step, surface),
            other => {
                let outcome = match self.panes.input_mut(&self.input_pane) {
                    Some(input) => input.process_key(other, surface),
                    None => return,
                };
                match outcome {
                    KeyOutcome::Consumed => {}
                    KeyOutcome::Submit(text) => self.submit(text, surface),
                    KeyOutcome::Unhandled(key) => {
                        let text = format!("未處理的按鍵: {}", key);
                        self.diagnostic(colorify(&text, Color::Cyan, true), surface);
                    }
                }
            }
        }
        self.finish_frame(surface);
    }

    /// 處理一個網路端事件
    pub fn handle_event(&mut self, event: BridgeEvent, surface: &mut dyn Surface) {
        match event {
            BridgeEvent::LinesReceived(lines) => {
                for line in lines {
                    self.route_line(&line, surface);
                }
            }
            BridgeEvent::Connected { host, port } => {
                info!("已連線到 {}:{}", host, port);
                self.connected = true;
                self.diagnostic(format!(">>> 已連線到 {}:{}", host, port), surface);
            }
            BridgeEvent::ConnectionClosed => {
                self.connected = false;
                self.diagnostic(colorify(">>> 按 Esc r 重新連線", Color::Cyan, true), surface);
            }
            BridgeEvent::PaneMutation(mutation) => self.deliver(mutation, surface),
        }
        self.finish_frame(surface);
    }

    fn route_line(&mut self, line: &str, surface: &mut dyn Surface) {
        let dispatch = self.router.dispatch(line);
        for mutation in dispatch.effects.mutations {
            self.deliver(mutation, surface);
        }
        for command in dispatch.effects.commands {
            // 外掛送出的命令不回顯，可能是密碼
            self.send_command(Command::Send(command), surface);
        }
    }

    /// 投遞窗格變更；窗格 panic 時只影響這一次投遞
    fn deliver(&mut self, mutation: PaneMutation, surface: &mut dyn Surface) {
        let pane = mutation.pane.clone();
        let panes = &mut self.panes;
        let result = panic::catch_unwind(AssertUnwindSafe(|| panes.deliver(mutation, &mut *surface)));
        if result.is_err() {
            error!("窗格 {} 處理變更時 panic", pane);
            let text = colorify(&format!("窗格 {} 發生錯誤", pane), Color::Red, false);
            self.panes.write_main(text, surface);
        }
    }

    fn diagnostic(&mut self, text: String, surface: &mut dyn Surface) {
        let main = self.panes.main_name().to_string();
        self.deliver(PaneMutation::append(main, text), surface);
    }

    fn scroll_main(&mut self, delta: i32, surface: &mut dyn Surface) {
        let main = self.panes.main_name().to_string();
        self.deliver(PaneMutation::new(main, PaneOp::Scroll(delta)), surface);
    }

    /// 回顯使用者輸入（黃色）後送出
    fn submit(&mut self, text: String, surface: &mut dyn Surface) {
        self.diagnostic(colorify(&text, Color::Yellow, false), surface);
        self.send_command(Command::Send(text), surface);
    }

    fn send_command(&mut self, command: Command, surface: &mut dyn Surface) {
        match self.commands.send(command) {
            Ok(()) => {}
            Err(BridgeError::Full) => {
                warn!("命令佇列已滿");
                self.diagnostic(colorify(">>> 命令佇列已滿，已丟棄", Color::Red, false), surface);
            }
            Err(BridgeError::Closed) => {
                warn!("網路端已結束");
                self.diagnostic(colorify(">>> 網路已停止", Color::Red, false), surface);
            }
        }
    }

    fn connect(&mut self, surface: &mut dyn Surface) {
        self.diagnostic(format!(">>> 正在連線到 {}:{} ...", self.host, self.port), surface);
        let command = Command::Connect {
            host: self.host.clone(),
            port: self.port,
        };
        self.send_command(command, surface);
    }

    fn reconnect(&mut self, surface: &mut dyn Surface) {
        if self.connected {
            self.diagnostic(">>> 已在連線中".to_string(), surface);
        } else {
            self.connect(surface);
        }
    }

    /// 停止繪製迴圈並要求網路端結束
    fn quit(&mut self) {
        info!("使用者要求結束");
        self.running = false;
        if let Err(e) = self.commands.send(Command::Shutdown) {
            debug!("送出結束命令失敗: {}", e);
        }
    }

    /// 游標放回輸入列後送出畫面
    fn finish_frame(&mut self, surface: &mut dyn Surface) {
        if let Some(input) = self.panes.input_mut(&self.input_pane) {
            input.redraw(surface);
        }
        if let Err(e) = surface.flush() {
            trace!("輸出失敗: {}", e);
        }
    }
}
