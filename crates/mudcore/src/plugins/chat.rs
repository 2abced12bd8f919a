//! 聊天頻道路由

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::router::{Plugin, PluginContext, PluginError};

lazy_static! {
    static ref CHAT_RX: Regex =
        Regex::new(r"^(\{chan ch=(?P<chan>.*?)\}|\{say\}|\{tell\})(?P<text>.*)$").unwrap();
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    /// 目標窗格
    pub pane: String,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            pane: "ChatWindow".to_string(),
        }
    }
}

/// 把帶頻道標記的行去掉標記後送到聊天窗格
pub struct ChatRouter {
    config: ChatConfig,
}

impl ChatRouter {
    pub fn new(config: ChatConfig) -> Self {
        Self { config }
    }
}

impl Plugin for ChatRouter {
    fn name(&self) -> &str {
        "chat_router"
    }

    fn handle(&mut self, line: &str, ctx: &mut PluginContext) -> Result<bool, PluginError> {
        let Some(caps) = CHAT_RX.captures(line) else {
            return Ok(false);
        };
        let text = caps.name("text").map(|m| m.as_str()).unwrap_or_default();
        ctx.append(&self.config.pane, text);
        Ok(true)
    }
}
