//! 內建外掛
//!
//! 設定檔中的外掛清單依序建立並註冊到 [`LineRouter`]，
//! 清單順序就是路由的優先順序。

mod auto_login;
mod chat;
mod minimap;
mod stats;

pub use auto_login::{AutoLogin, AutoLoginConfig, Credentials, LoginStep};
pub use chat::{ChatConfig, ChatRouter};
pub use minimap::{MinimapConfig, MinimapRouter};
pub use stats::{AardwolfStats, Stats, StatsConfig};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::router::{LineRouter, Plugin};

/// 外掛設定錯誤，啟動時即失敗
#[derive(Debug, Error)]
pub enum PluginConfigError {
    #[error("未知的外掛種類: {0}")]
    UnknownKind(String),

    #[error("外掛 {plugin} 的設定無效")]
    Invalid {
        plugin: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("無效的正規表示式: {pattern}")]
    BadPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("自動登入的步驟清單是空的")]
    EmptySequence,
}

/// 設定檔中的一個外掛項目
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluginConfig {
    /// 外掛種類：chat_router、minimap_router、aardwolf_stats、auto_login
    pub plugin: String,
    #[serde(default)]
    pub config: serde_json::Value,
}

impl PluginConfig {
    pub fn new(plugin: impl Into<String>) -> Self {
        Self {
            plugin: plugin.into(),
            config: serde_json::Value::Null,
        }
    }

    fn parse<T: DeserializeOwned>(&self) -> Result<T, PluginConfigError> {
        // 沒寫 config 時視為空物件，讓每個欄位取預設值
        let value = match &self.config {
            serde_json::Value::Null => serde_json::Value::Object(Default::default()),
            other => other.clone(),
        };
        serde_json::from_value(value).map_err(|source| PluginConfigError::Invalid {
            plugin: self.plugin.clone(),
            source,
        })
    }
}

/// 預設外掛：聊天、地圖、狀態列
pub fn default_plugins() -> Vec<PluginConfig> {
    vec![
        PluginConfig::new("chat_router"),
        PluginConfig::new("minimap_router"),
        PluginConfig::new("aardwolf_stats"),
    ]
}

/// 依設定建立外掛
pub fn create(config: &PluginConfig) -> Result<Box<dyn Plugin>, PluginConfigError> {
    let plugin: Box<dyn Plugin> = match config.plugin.as_str() {
        "chat_router" => Box::new(ChatRouter::new(config.parse()?)),
        "minimap_router" => Box::new(MinimapRouter::new(config.parse()?)),
        "aardwolf_stats" => Box::new(AardwolfStats::new(config.parse()?)),
        "auto_login" => Box::new(AutoLogin::new(config.parse()?)?),
        other => return Err(PluginConfigError::UnknownKind(other.to_string())),
    };
    Ok(plugin)
}

/// 建立路由器並依序註冊所有外掛
pub fn build_router(
    configs: &[PluginConfig],
    default_pane: &str,
) -> Result<LineRouter, PluginConfigError> {
    let mut router = LineRouter::new(default_pane);
    for config in configs {
        router.register(create(config)?);
    }
    info!("已載入外掛: {:?}", router.plugin_names());
    Ok(router)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_plugins_in_order() {
        let router = build_router(&default_plugins(), "MainWindow").unwrap();
        assert_eq!(
            router.plugin_names(),
            vec!["chat_router", "minimap_router", "aardwolf_stats"]
        );
    }

    #[test]
    fn test_unknown_plugin_is_fatal() {
        let err = create(&PluginConfig::new("speedwalk")).err().unwrap();
        assert!(matches!(err, PluginConfigError::UnknownKind(kind) if kind == "speedwalk"));
    }

    #[test]
    fn test_plugin_list_from_json() {
        let json = r#"[
            {"plugin": "chat_router", "config": {"pane": "Chat"}},
            {"plugin": "aardwolf_stats"}
        ]"#;
        let configs: Vec<PluginConfig> = serde_json::from_str(json).unwrap();
        let mut router = build_router(&configs, "MainWindow").unwrap();
        let dispatch = router.dispatch("{say}hello");
        assert_eq!(
            dispatch.effects.mutations,
            vec![crate::bridge::PaneMutation::append("Chat", "hello")]
        );
    }

    #[test]
    fn test_invalid_config_is_reported() {
        let config = PluginConfig {
            plugin: "chat_router".into(),
            config: serde_json::json!({"pane": 42}),
        };
        assert!(matches!(
            create(&config).err().unwrap(),
            PluginConfigError::Invalid { .. }
        ));
    }
}
