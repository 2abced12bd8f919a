//! 自動登入
//!
//! 依設定的步驟清單在 expect 與 send 之間交替：
//! 目前步驟是 expect 且符合時前進，經過的 send 步驟立即送出，
//! 停在下一個 expect 步驟；走到結尾會繞回開頭，重新連線時可以再跑一次。

use std::fs;
use std::path::{Path, PathBuf};

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::PluginConfigError;
use crate::router::{Plugin, PluginContext, PluginError};

/// 設定檔中的一個步驟
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LoginStep {
    /// 整行完全相同
    Expect { text: String },
    /// 正規表示式
    ExpectRx { pattern: String },
    /// 送出；`$NAME` 與 `$PASSWORD` 取自帳號檔
    Send { data: String },
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AutoLoginConfig {
    pub sequence: Vec<LoginStep>,
    /// JSON 帳號檔，可用 `~` 開頭
    pub credentials_file: Option<String>,
}

/// 帳號檔內容
#[derive(Debug, Clone, Deserialize)]
pub struct Credentials {
    pub name: String,
    pub password: String,
}

enum Step {
    Expect(String),
    ExpectRx(Regex),
    Send(String),
}

impl Step {
    fn matches(&self, line: &str) -> bool {
        match self {
            Step::Expect(text) => line == text,
            Step::ExpectRx(rx) => rx.is_match(line),
            Step::Send(_) => false,
        }
    }
}

pub struct AutoLogin {
    steps: Vec<Step>,
    credentials_file: Option<PathBuf>,
    position: usize,
}

impl AutoLogin {
    pub fn new(config: AutoLoginConfig) -> Result<Self, PluginConfigError> {
        if config.sequence.is_empty() {
            return Err(PluginConfigError::EmptySequence);
        }
        let steps = config
            .sequence
            .into_iter()
            .map(|step| match step {
                LoginStep::Expect { text } => Ok(Step::Expect(text)),
                LoginStep::ExpectRx { pattern } => Regex::new(&pattern)
                    .map(Step::ExpectRx)
                    .map_err(|source| PluginConfigError::BadPattern { pattern, source }),
                LoginStep::Send { data } => Ok(Step::Send(data)),
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            steps,
            credentials_file: config.credentials_file.as_deref().map(expand_home),
            position: 0,
        })
    }

    /// 目前停在第幾個步驟
    pub fn position(&self) -> usize {
        self.position
    }

    /// 前進到下一個 expect 步驟，途中送出所有 send 步驟
    ///
    /// 最多走一圈，沒有 expect 步驟的清單不會無限循環。
    /// 某個 send 失敗時仍會走到下一個 expect，回傳第一個錯誤。
    fn advance(&mut self, ctx: &mut PluginContext) -> Result<(), PluginError> {
        let mut first_error = None;
        for _ in 0..self.steps.len() {
            self.position = (self.position + 1) % self.steps.len();
            let Step::Send(data) = &self.steps[self.position] else {
                break;
            };
            match self.resolve(data) {
                Ok(payload) => {
                    debug!("自動登入送出第 {} 步", self.position);
                    ctx.send(payload);
                }
                Err(err) => {
                    first_error.get_or_insert(err);
                }
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    fn resolve(&self, data: &str) -> Result<String, PluginError> {
        match data {
            "$NAME" => Ok(self.credentials()?.name),
            "$PASSWORD" => Ok(self.credentials()?.password),
            other => Ok(other.to_string()),
        }
    }

    /// 每次使用時才讀取帳號檔
    fn credentials(&self) -> Result<Credentials, PluginError> {
        let path = self
            .credentials_file
            .as_ref()
            .ok_or_else(|| PluginError::Other("自動登入未設定 credentials_file".to_string()))?;
        let text = fs::read_to_string(path).map_err(|source| PluginError::CredentialsIo {
            path: path.clone(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|source| PluginError::CredentialsFormat {
            path: path.clone(),
            source,
        })
    }
}

fn expand_home(path: &str) -> PathBuf {
    match (path.strip_prefix('~'), dirs::home_dir()) {
        (Some(rest), Some(home)) => home.join(rest.trim_start_matches(['/', '\\'])),
        _ => Path::new(path).to_path_buf(),
    }
}

impl Plugin for AutoLogin {
    fn name(&self) -> &str {
        "auto_login"
    }

    /// 不認領任何行，只在符合時送出命令
    fn handle(&mut self, line: &str, ctx: &mut PluginContext) -> Result<bool, PluginError> {
        if self.steps[self.position].matches(line) {
            info!("自動登入符合第 {} 步", self.position);
            self.advance(ctx)?;
        }
        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::{PaneMutation, PaneOp};
    use crate::router::LineRouter;

    fn login(sequence: Vec<LoginStep>, credentials_file: Option<String>) -> AutoLogin {
        AutoLogin::new(AutoLoginConfig {
            sequence,
            credentials_file,
        })
        .unwrap()
    }

    fn expect(text: &str) -> LoginStep {
        LoginStep::Expect { text: text.into() }
    }

    fn send(data: &str) -> LoginStep {
        LoginStep::Send { data: data.into() }
    }

    fn credentials_file(name: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!(
            "mudcore-auto-login-{}-{}.json",
            name,
            std::process::id()
        ));
        fs::write(&path, r#"{"name": "hero", "password": "sekrit"}"#).unwrap();
        path
    }

    #[test]
    fn test_config_from_json() {
        let json = r#"{
            "sequence": [
                {"type": "expect_rx", "pattern": "^What be thy name"},
                {"type": "send", "data": "$NAME"}
            ],
            "credentials_file": "~/.mud/creds.json"
        }"#;
        let config: AutoLoginConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.sequence.len(), 2);
        assert_eq!(
            config.sequence[1],
            LoginStep::Send {
                data: "$NAME".into()
            }
        );
    }

    #[test]
    fn test_empty_sequence_rejected() {
        let err = AutoLogin::new(AutoLoginConfig::default()).err().unwrap();
        assert!(matches!(err, PluginConfigError::EmptySequence));
    }

    #[test]
    fn test_bad_pattern_rejected() {
        let err = AutoLogin::new(AutoLoginConfig {
            sequence: vec![LoginStep::ExpectRx {
                pattern: "(".into(),
            }],
            credentials_file: None,
        })
        .err()
        .unwrap();
        assert!(matches!(err, PluginConfigError::BadPattern { .. }));
    }

    #[test]
    fn test_login_sequence_with_credentials() {
        let path = credentials_file("sequence");
        let mut plugin = login(
            vec![
                LoginStep::ExpectRx {
                    pattern: "name".into(),
                },
                send("$NAME"),
                expect("Password:"),
                send("$PASSWORD"),
                send("look"),
            ],
            Some(path.to_string_lossy().into_owned()),
        );

        let mut ctx = PluginContext::new();
        assert!(!plugin.handle("Welcome!", &mut ctx).unwrap());
        assert!(!plugin.handle("What be thy name?", &mut ctx).unwrap());
        assert_eq!(ctx.commands, vec!["hero"]);
        assert_eq!(plugin.position(), 2);

        let mut ctx = PluginContext::new();
        plugin.handle("Password:", &mut ctx).unwrap();
        assert_eq!(ctx.commands, vec!["sekrit", "look"]);
        // 繞回開頭，等待下一次連線
        assert_eq!(plugin.position(), 0);

        let mut ctx = PluginContext::new();
        plugin.handle("What is your name", &mut ctx).unwrap();
        assert_eq!(ctx.commands, vec!["hero"]);
        fs::remove_file(path).ok();
    }

    #[test]
    fn test_missing_credentials_is_an_error_but_advances() {
        let mut plugin = login(
            vec![expect("login"), send("$NAME"), expect("next")],
            Some("/nonexistent/creds.json".into()),
        );
        let mut ctx = PluginContext::new();
        let err = plugin.handle("login", &mut ctx).unwrap_err();
        assert!(matches!(err, PluginError::CredentialsIo { .. }));
        assert_eq!(plugin.position(), 2);
    }

    #[test]
    fn test_sends_before_credential_error_reach_server() {
        let mut router = LineRouter::new("main");
        router.register(Box::new(login(
            vec![expect("login"), send("hello"), send("$PASSWORD"), expect("next")],
            Some("/nonexistent/creds.json".into()),
        )));

        let dispatch = router.dispatch("login");
        assert_eq!(dispatch.effects.commands, vec!["hello"]);
        let diagnostics: Vec<&PaneMutation> = dispatch
            .effects
            .mutations
            .iter()
            .filter(|m| matches!(&m.op, PaneOp::AppendText(text) if text.starts_with("\x1b[31m")))
            .collect();
        assert!(!diagnostics.is_empty());
        assert!(diagnostics.iter().all(|m| m.pane == "main"));
    }

    #[test]
    fn test_single_expect_wraps_to_itself() {
        let mut plugin = login(vec![expect("ping"), send("pong")], None);
        let mut ctx = PluginContext::new();
        plugin.handle("ping", &mut ctx).unwrap();
        plugin.handle("ping", &mut ctx).unwrap();
        assert_eq!(ctx.commands, vec!["pong", "pong"]);
    }

    #[test]
    fn test_only_expect_steps_do_not_loop() {
        let mut plugin = login(vec![expect("a")], None);
        let mut ctx = PluginContext::new();
        plugin.handle("a", &mut ctx).unwrap();
        assert_eq!(plugin.position(), 0);
        assert!(ctx.commands.is_empty());
    }

    #[test]
    fn test_expand_home() {
        if let Some(home) = dirs::home_dir() {
            assert_eq!(expand_home("~/creds.json"), home.join("creds.json"));
        }
        assert_eq!(expand_home("/etc/creds.json"), PathBuf::from("/etc/creds.json"));
    }
}
