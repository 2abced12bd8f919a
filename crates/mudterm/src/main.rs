//! MUD 終端機客戶端
//!
//! 用法: `mudterm [設定檔路徑]`

mod app;
mod config;
mod session;
mod terminal;

use std::error::Error;
use std::fs::{self, OpenOptions};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Mutex;

use tracing::error;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

fn main() -> ExitCode {
    init_logging();
    install_panic_hook();

    let config_path = std::env::args_os().nth(1).map(PathBuf::from);
    let result = config::load(config_path.as_deref())
        .map_err(app::AppError::from)
        .and_then(app::run);

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("程式結束: {}", e);
            eprintln!("錯誤: {}", e);
            let mut source = e.source();
            while let Some(cause) = source {
                eprintln!("  原因: {}", cause);
                source = cause.source();
            }
            ExitCode::FAILURE
        }
    }
}

/// 日誌寫到資料目錄中的檔案；畫面由介面使用，開不了檔案就不記錄
fn init_logging() {
    let dir = config::log_dir();
    let file = fs::create_dir_all(&dir).and_then(|_| {
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(dir.join("mudterm.log"))
    });
    let layer = file.ok().map(|file| {
        tracing_subscriber::fmt::layer()
            .with_ansi(false)
            .with_writer(Mutex::new(file))
    });

    tracing_subscriber::registry()
        .with(layer)
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
}

/// panic 訊息寫入日誌，不直接印在原始模式的終端機上
fn install_panic_hook() {
    std::panic::set_hook(Box::new(|info| {
        error!("panic: {}", info);
    }));
}
