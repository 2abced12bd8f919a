//! 繪製與輸入迴圈
//!
//! 主執行緒輪詢 crossterm 事件，輪詢之間取出網路端事件；
//! 網路端在 tokio 執行環境中執行 [`run_network`]。

use std::io;
use std::time::Duration;

use crossterm::event::{self, Event};
use crossterm::terminal;
use mudcore::bridge::{self, DEFAULT_CAPACITY};
use mudcore::run_network;
use thiserror::Error;
use tokio::runtime::Runtime;
use tracing::{info, warn};

use crate::config::{AppConfig, ConfigError};
use crate::session::SessionController;
use crate::terminal::{map_key, CrosstermSurface, TerminalGuard};

/// 輪詢按鍵的間隔
const POLL_INTERVAL: Duration = Duration::from_millis(30);
/// 每輪最多處理的網路事件數，避免大量輸出時按鍵沒有反應
const MAX_EVENTS_PER_TICK: usize = 256;
/// 結束時等待網路端的時間
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(3);

/// 程式層級錯誤
#[derive(Debug, Error)]
pub enum AppError {
    #[error("終端機錯誤")]
    Io(#[from] io::Error),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// 執行直到使用者結束
pub fn run(config: AppConfig) -> Result<(), AppError> {
    let runtime = Runtime::new()?;
    let (network, mut events, commands) = bridge::pair(DEFAULT_CAPACITY);

    // 設定錯誤要在進入原始模式前回報
    let mut controller = SessionController::new(&config, commands)?;
    let network_task = runtime.spawn(run_network(config.connection.telnet_config(), network));

    let result = {
        let _guard = TerminalGuard::enter()?;
        let (cols, rows) = terminal::size()?;
        let mut surface = CrosstermSurface::new(io::stdout(), cols, rows);
        controller.start(&mut surface);

        let mut result = Ok(());
        while controller.is_running() {
            for event in events.drain(MAX_EVENTS_PER_TICK) {
                controller.handle_event(event, &mut surface);
            }
            if let Err(e) = poll_input(&mut controller, &mut surface) {
                result = Err(e);
                break;
            }
        }
        result
    };

    // 先關閉事件接收端，網路端的發布不會再卡住
    drop(events);
    let joined = runtime.block_on(async { tokio::time::timeout(SHUTDOWN_TIMEOUT, network_task).await });
    match joined {
        Ok(Ok(())) => info!("網路端已結束"),
        Ok(Err(e)) => warn!("網路端異常結束: {}", e),
        Err(_) => warn!("等待網路端逾時"),
    }
    runtime.shutdown_timeout(Duration::from_millis(200));
    result
}

fn poll_input(
    controller: &mut SessionController,
    surface: &mut CrosstermSurface<io::Stdout>,
) -> Result<(), AppError> {
    if !event::poll(POLL_INTERVAL)? {
        return Ok(());
    }
    match event::read()? {
        Event::Key(key) => {
            for key in map_key(key) {
                controller.handle_key(key, surface);
            }
        }
        Event::Resize(cols, rows) => {
            surface.set_size(cols, rows);
            controller.resize(surface);
        }
        _ => {}
    }
    Ok(())
}
