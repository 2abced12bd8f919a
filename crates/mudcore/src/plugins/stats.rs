//! Aardwolf `{stats}` 狀態列解析

use lazy_static::lazy_static;
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};

use crate::router::{Plugin, PluginContext, PluginError};

lazy_static! {
    static ref STATS_RX: Regex = Regex::new(
        r"(?x)
        ^\{stats\}
        (?P<curr_str>\d+)/(?P<base_str>\d+),
        (?P<curr_int>\d+)/(?P<base_int>\d+),
        (?P<curr_wis>\d+)/(?P<base_wis>\d+),
        (?P<curr_dex>\d+)/(?P<base_dex>\d+),
        (?P<curr_con>\d+)/(?P<base_con>\d+),
        (?P<curr_luck>\d+)/(?P<base_luck>\d+),
        (?P<hp_pct>\d+),(?P<mp_pct>\d+),(?P<mv_pct>\d+),
        (?P<hit_roll>\d+),(?P<dam_roll>\d+),
        (?P<position>[^,]*),
        (?P<enemy_pct>\d+),
        (?P<curr_hp>\d+)/(?P<max_hp>\d+),
        (?P<curr_mp>\d+)/(?P<max_mp>\d+),
        (?P<curr_mv>\d+)/(?P<max_mv>\d+),
        (?P<gold>\d+),
        (?P<qp>\d+),(?P<tp>\d+),
        (?P<align>-?\d+),
        (?P<tnl>\d+),
        (?P<level>\d+),
        (?P<position_num>\d+)
        $"
    )
    .unwrap();
}

/// 沒有戰鬥對象時 enemy_pct 的值
pub const NO_ENEMY: u32 = 9999;

/// 一筆狀態列
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stats {
    pub curr_str: u32,
    pub base_str: u32,
    pub curr_int: u32,
    pub base_int: u32,
    pub curr_wis: u32,
    pub base_wis: u32,
    pub curr_dex: u32,
    pub base_dex: u32,
    pub curr_con: u32,
    pub base_con: u32,
    pub curr_luck: u32,
    pub base_luck: u32,
    pub hp_pct: u32,
    pub mp_pct: u32,
    pub mv_pct: u32,
    pub hit_roll: u32,
    pub dam_roll: u32,
    pub position: String,
    pub enemy_pct: u32,
    pub curr_hp: u32,
    pub max_hp: u32,
    pub curr_mp: u32,
    pub max_mp: u32,
    pub curr_mv: u32,
    pub max_mv: u32,
    pub gold: u64,
    pub qp: u32,
    pub tp: u32,
    pub align: i32,
    pub tnl: u32,
    pub level: u32,
    pub position_num: u32,
}

fn field<T: std::str::FromStr>(caps: &Captures, name: &str) -> Result<T, PluginError> {
    let text = caps.name(name).map(|m| m.as_str()).unwrap_or_default();
    text.parse()
        .map_err(|_| PluginError::Other(format!("狀態列欄位 {} 超出範圍: {}", name, text)))
}

impl Stats {
    /// 解析狀態列；不符合格式時回傳 `Ok(None)`
    ///
    /// # Example
    /// ```
    /// use mudcore::plugins::Stats;
    ///
    /// let line = "{stats}10/10,10/10,10/10,10/10,10/10,10/10,100,100,100,0,0,standing,\
    ///             9999,50/50,20/20,30/30,0,0,0,0,0,1,1";
    /// let stats = Stats::parse(line).unwrap().unwrap();
    /// assert_eq!(stats.curr_hp, 50);
    /// ```
    pub fn parse(line: &str) -> Result<Option<Stats>, PluginError> {
        let Some(caps) = STATS_RX.captures(line) else {
            return Ok(None);
        };
        Ok(Some(Stats {
            curr_str: field(&caps, "curr_str")?,
            base_str: field(&caps, "base_str")?,
            curr_int: field(&caps, "curr_int")?,
            base_int: field(&caps, "base_int")?,
            curr_wis: field(&caps, "curr_wis")?,
            base_wis: field(&caps, "base_wis")?,
            curr_dex: field(&caps, "curr_dex")?,
            base_dex: field(&caps, "base_dex")?,
            curr_con: field(&caps, "curr_con")?,
            base_con: field(&caps, "base_con")?,
            curr_luck: field(&caps, "curr_luck")?,
            base_luck: field(&caps, "base_luck")?,
            hp_pct: field(&caps, "hp_pct")?,
            mp_pct: field(&caps, "mp_pct")?,
            mv_pct: field(&caps, "mv_pct")?,
            hit_roll: field(&caps, "hit_roll")?,
            dam_roll: field(&caps, "dam_roll")?,
            position: field(&caps, "position")?,
            enemy_pct: field(&caps, "enemy_pct")?,
            curr_hp: field(&caps, "curr_hp")?,
            max_hp: field(&caps, "max_hp")?,
            curr_mp: field(&caps, "curr_mp")?,
            max_mp: field(&caps, "max_mp")?,
            curr_mv: field(&caps, "curr_mv")?,
            max_mv: field(&caps, "max_mv")?,
            gold: field(&caps, "gold")?,
            qp: field(&caps, "qp")?,
            tp: field(&caps, "tp")?,
            align: field(&caps, "align")?,
            tnl: field(&caps, "tnl")?,
            level: field(&caps, "level")?,
            position_num: field(&caps, "position_num")?,
        }))
    }

    /// 狀態窗格顯示的摘要
    pub fn summary(&self) -> Vec<String> {
        let mut lines = vec![
            format!("H: {}/{}", self.curr_hp, self.max_hp),
            format!("M: {}/{}", self.curr_mp, self.max_mp),
            format!("V: {}/{}", self.curr_mv, self.max_mv),
            String::new(),
        ];
        if self.enemy_pct < NO_ENEMY {
            lines.push(format!("E: {}", self.enemy_pct));
            lines.push(String::new());
        }
        lines.push(self.position.clone());
        lines
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StatsConfig {
    pub pane: String,
}

impl Default for StatsConfig {
    fn default() -> Self {
        Self {
            pane: "StatsWindow".to_string(),
        }
    }
}

/// 解析狀態列並把摘要寫到狀態窗格
pub struct AardwolfStats {
    config: StatsConfig,
}

impl AardwolfStats {
    pub fn new(config: StatsConfig) -> Self {
        Self { config }
    }
}

impl Plugin for AardwolfStats {
    fn name(&self) -> &str {
        "aardwolf_stats"
    }

    fn handle(&mut self, line: &str, ctx: &mut PluginContext) -> Result<bool, PluginError> {
        match Stats::parse(line)? {
            Some(stats) => {
                ctx.set_text(&self.config.pane, stats.summary());
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::{PaneMutation, PaneOp};

    const IDLE: &str = "{stats}10/10,10/10,10/10,10/10,10/10,10/10,100,100,100,0,0,standing,\
                        9999,50/50,20/20,30/30,0,0,0,0,0,1,1";

    #[test]
    fn test_parse_idle_line() {
        let stats = Stats::parse(IDLE).unwrap().unwrap();
        assert_eq!((stats.curr_hp, stats.max_hp), (50, 50));
        assert_eq!((stats.curr_mp, stats.max_mp), (20, 20));
        assert_eq!((stats.curr_mv, stats.max_mv), (30, 30));
        assert_eq!(stats.position, "standing");
        assert_eq!(stats.enemy_pct, NO_ENEMY);
        assert_eq!(stats.level, 1);
    }

    #[test]
    fn test_summary_without_enemy() {
        let stats = Stats::parse(IDLE).unwrap().unwrap();
        assert_eq!(
            stats.summary(),
            vec!["H: 50/50", "M: 20/20", "V: 30/30", "", "standing"]
        );
    }

    #[test]
    fn test_summary_with_enemy() {
        let line = "{stats}10/10,10/10,10/10,10/10,10/10,10/10,80,100,100,3,4,fighting,\
                    42,40/50,20/20,30/30,100,2,3,-500,1200,12,8";
        let stats = Stats::parse(line).unwrap().unwrap();
        assert_eq!(stats.align, -500);
        assert_eq!(
            stats.summary(),
            vec!["H: 40/50", "M: 20/20", "V: 30/30", "", "E: 42", "", "fighting"]
        );
    }

    #[test]
    fn test_plugin_sets_stats_pane() {
        let mut plugin = AardwolfStats::new(StatsConfig::default());
        let mut ctx = PluginContext::new();
        assert!(plugin.handle(IDLE, &mut ctx).unwrap());
        assert_eq!(ctx.mutations.len(), 1);
        let PaneMutation { pane, op } = &ctx.mutations[0];
        assert_eq!(pane, "StatsWindow");
        assert!(matches!(op, PaneOp::SetText(lines) if lines.len() == 5));
    }

    #[test]
    fn test_other_lines_not_claimed() {
        let mut plugin = AardwolfStats::new(StatsConfig::default());
        let mut ctx = PluginContext::new();
        assert!(!plugin.handle("{stats}garbage", &mut ctx).unwrap());
        assert!(!plugin.handle(&format!("x{}", IDLE), &mut ctx).unwrap());
    }

    #[test]
    fn test_overflowing_field_is_an_error() {
        let line = IDLE.replace("50/50", "99999999999/50");
        assert!(Stats::parse(&line).is_err());
    }
}
