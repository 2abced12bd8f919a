//! 小地圖區塊收集

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::router::{Plugin, PluginContext, PluginError};

lazy_static! {
    static ref MAP_START: Regex = Regex::new(r"^<MAPSTART>$").unwrap();
    static ref MAP_END: Regex = Regex::new(r"^(\x1b\[0;37m)?<MAPEND>$").unwrap();
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MinimapConfig {
    pub pane: String,
}

impl Default for MinimapConfig {
    fn default() -> Self {
        Self {
            pane: "MinimapWindow".to_string(),
        }
    }
}

/// 收集 `<MAPSTART>` 到 `<MAPEND>` 之間的行，結束時整批送到小地圖窗格
///
/// 區塊內（含起訖標記）的每一行都會被認領。
pub struct MinimapRouter {
    config: MinimapConfig,
    buffer: Vec<String>,
    collecting: bool,
}

impl MinimapRouter {
    pub fn new(config: MinimapConfig) -> Self {
        Self {
            config,
            buffer: Vec::new(),
            collecting: false,
        }
    }
}

impl Plugin for MinimapRouter {
    fn name(&self) -> &str {
        "minimap_router"
    }

    fn handle(&mut self, line: &str, ctx: &mut PluginContext) -> Result<bool, PluginError> {
        if MAP_START.is_match(line) {
            self.buffer.clear();
            self.collecting = true;
        } else if MAP_END.is_match(line) {
            self.collecting = false;
            ctx.set_text(&self.config.pane, std::mem::take(&mut self.buffer));
        } else if self.collecting {
            self.buffer.push(line.to_string());
        } else {
            return Ok(false);
        }
        Ok(true)
    }
}
