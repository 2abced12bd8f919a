//! 設定檔模組
//!
//! 單一 JSON 檔：連線設定、版面樹、外掛清單與按鍵設定。
//! 每個欄位都有預設值，只寫部分欄位的檔案也是有效的設定。

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use mudcore::layout::{LayoutError, LayoutSpec, SizeSpec};
use mudcore::pane::PaneSetError;
use mudcore::plugins::{default_plugins, PluginConfig, PluginConfigError};
use mudcore::{Charset, Key, TelnetConfig};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

/// 設定錯誤，啟動時即結束程式
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("無法讀取設定檔 {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("設定檔格式錯誤 {path}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("未知的按鍵名稱: {0}")]
    UnknownKey(String),

    #[error("版面設定錯誤")]
    Layout(#[from] LayoutError),

    #[error("主窗格設定錯誤")]
    MainPane(#[from] PaneSetError),

    #[error("輸入窗格 {0} 不存在或不是 InputWindow")]
    InputPane(String),

    #[error("外掛設定錯誤")]
    Plugin(#[from] PluginConfigError),
}

/// 連線設定
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    pub host: String,
    pub port: u16,
    pub charset: Charset,
    pub connect_timeout_secs: u64,
    pub read_buffer_size: usize,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            host: "aardmud.org".to_string(),
            port: 4000,
            charset: Charset::Utf8,
            connect_timeout_secs: 30,
            read_buffer_size: 8192,
        }
    }
}

impl ConnectionConfig {
    pub fn telnet_config(&self) -> TelnetConfig {
        TelnetConfig {
            connect_timeout: Duration::from_secs(self.connect_timeout_secs),
            read_buffer_size: self.read_buffer_size.max(1),
            charset: self.charset,
        }
    }
}

/// 按鍵設定
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeyConfig {
    /// 預設窗格，未被認領的行與診斷訊息都寫到這裡
    pub main_pane: String,
    pub input_pane: String,
    /// PageUp / PageDown 捲動的行數
    pub scroll_step: i32,
    /// 按鍵名稱 → 直接送出的命令
    pub bindings: BTreeMap<String, String>,
}

impl Default for KeyConfig {
    fn default() -> Self {
        let bindings = [("up", "north"), ("down", "south"), ("left", "west"), ("right", "east")]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Self {
            main_pane: "MainWindow".to_string(),
            input_pane: "InputWindow".to_string(),
            scroll_step: 10,
            bindings,
        }
    }
}

impl KeyConfig {
    /// 把按鍵名稱轉為輸入窗格的快捷鍵表
    pub fn shortcuts(&self) -> Result<HashMap<Key, String>, ConfigError> {
        self.bindings
            .iter()
            .map(|(name, command)| {
                Key::from_name(name)
                    .map(|key| (key, command.clone()))
                    .ok_or_else(|| ConfigError::UnknownKey(name.clone()))
            })
            .collect()
    }
}

/// 完整設定
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub connection: ConnectionConfig,
    pub layout: LayoutSpec,
    pub plugins: Vec<PluginConfig>,
    pub keys: KeyConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            connection: ConnectionConfig::default(),
            layout: default_layout(),
            plugins: default_plugins(),
            keys: KeyConfig::default(),
        }
    }
}

/// 左邊主窗格與輸入列，右邊狀態、聊天與小地圖
pub fn default_layout() -> LayoutSpec {
    let leaf = |name: &str| LayoutSpec::BufferedTextWindow {
        name: name.to_string(),
    };
    LayoutSpec::HorizontalStack {
        sizes: vec![SizeSpec::Weight(2), SizeSpec::Weight(1)],
        children: vec![
            LayoutSpec::VerticalStack {
                sizes: vec![SizeSpec::Weight(1), SizeSpec::Absolute(1)],
                children: vec![
                    leaf("MainWindow"),
                    LayoutSpec::InputWindow {
                        name: "InputWindow".to_string(),
                    },
                ],
            },
            LayoutSpec::VerticalStack {
                sizes: vec![SizeSpec::Absolute(7), SizeSpec::Weight(1), SizeSpec::Absolute(12)],
                children: vec![
                    LayoutSpec::StaticWindow {
                        name: "StatsWindow".to_string(),
                    },
                    leaf("ChatWindow"),
                    LayoutSpec::StaticWindow {
                        name: "MinimapWindow".to_string(),
                    },
                ],
            },
        ],
    }
}

/// 設定目錄
pub fn config_dir() -> PathBuf {
    if let Some(config_dir) = dirs::config_dir() {
        config_dir.join("mudterm")
    } else {
        PathBuf::from(".")
    }
}

/// 預設設定檔路徑
pub fn config_path() -> PathBuf {
    config_dir().join("config.json")
}

/// 日誌目錄
pub fn log_dir() -> PathBuf {
    if let Some(data_dir) = dirs::data_local_dir() {
        data_dir.join("mudterm")
    } else {
        PathBuf::from(".")
    }
}

/// 載入設定
///
/// 指定路徑時檔案必須存在；未指定時讀取預設路徑，不存在就用內建預設值。
pub fn load(path: Option<&Path>) -> Result<AppConfig, ConfigError> {
    let path = match path {
        Some(path) => path.to_path_buf(),
        None => {
            let path = config_path();
            if !path.exists() {
                info!("找不到 {}，使用預設設定", path.display());
                return Ok(AppConfig::default());
            }
            path
        }
    };
    let content = fs::read_to_string(&path).map_err(|source| ConfigError::Io {
        path: path.clone(),
        source,
    })?;
    let config = parse(&content).map_err(|source| ConfigError::Parse {
        path: path.clone(),
        source,
    })?;
    info!("已載入設定 {}", path.display());
    Ok(config)
}

pub fn parse(content: &str) -> Result<AppConfig, serde_json::Error> {
    serde_json::from_str(content)
}
