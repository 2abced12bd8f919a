//! Telnet 客戶端
//!
//! 非同步 Telnet 連線管理，以及在網路執行環境中執行的命令迴圈

use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, error, info, trace, warn};

use super::session::{ProtocolError, ProtocolSession, Received};
use crate::bridge::{BridgeError, BridgeEvent, Command, NetworkSide};
use crate::encoding::Charset;

/// Telnet 客戶端錯誤
#[derive(Debug, Error)]
pub enum TelnetError {
    #[error("連線失敗: {0}")]
    ConnectionFailed(#[from] io::Error),

    #[error("連線逾時")]
    Timeout,

    #[error("未連線")]
    NotConnected,

    #[error("DNS 解析失敗: {0}")]
    DnsResolutionFailed(String),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

/// Telnet 客戶端配置
#[derive(Debug, Clone)]
pub struct TelnetConfig {
    /// 連線逾時
    pub connect_timeout: Duration,
    /// 讀取緩衝區大小
    pub read_buffer_size: usize,
    /// 伺服器字元集
    pub charset: Charset,
}

impl Default for TelnetConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(30),
            read_buffer_size: 8192,
            charset: Charset::default(),
        }
    }
}

/// 連線結束的原因
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// 連線關閉（對方斷線、錯誤或使用者斷線），可再次連線
    Closed,
    /// 收到結束命令或繪製端已關閉，網路迴圈應停止
    Shutdown,
}

/// 單一連線的 Telnet 客戶端
///
/// 對串流型別泛型化，正式執行時是 `TcpStream`，測試時可換成記憶體串流。
pub struct TelnetClient<S> {
    stream: S,
    session: ProtocolSession,
    read_buffer_size: usize,
    /// 與前一批行一起發生、尚未回報的協定錯誤
    deferred: Option<ProtocolError>,
}

impl TelnetClient<TcpStream> {
    /// 連線到 MUD 伺服器
    ///
    /// # Arguments
    /// * `host` - 主機名稱或 IP
    /// * `port` - 連接埠
    pub async fn connect(host: &str, port: u16, config: &TelnetConfig) -> Result<Self, TelnetError> {
        info!("正在連線到 {}:{}", host, port);

        // 解析主機名稱
        let addr = format!("{}:{}", host, port);
        let socket_addrs: Vec<SocketAddr> = tokio::net::lookup_host(&addr)
            .await
            .map_err(|e| TelnetError::DnsResolutionFailed(e.to_string()))?
            .collect();

        let first = socket_addrs.first().ok_or_else(|| {
            TelnetError::DnsResolutionFailed(format!("無法解析主機: {}", host))
        })?;
        debug!("已解析到位址: {:?}", socket_addrs);

        let stream = timeout(config.connect_timeout, TcpStream::connect(first))
            .await
            .map_err(|_| TelnetError::Timeout)??;
        stream.set_nodelay(true)?;

        info!("已連線到 {}:{}", host, port);
        Ok(Self::with_stream(stream, config))
    }
}

impl<S> TelnetClient<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// 以既有的串流建立客戶端
    pub fn with_stream(stream: S, config: &TelnetConfig) -> Self {
        Self {
            stream,
            session: ProtocolSession::new(config.charset),
            read_buffer_size: config.read_buffer_size,
            deferred: None,
        }
    }

    /// 發送一行文字到伺服器（依字元集編碼並加上換行）
    pub async fn send(&mut self, text: &str) -> Result<(), TelnetError> {
        if self.session.is_closed() {
            return Err(TelnetError::NotConnected);
        }
        let data = self.session.encode_line(text);
        self.send_raw(&data).await?;
        debug!("已發送: {}", text);
        Ok(())
    }

    /// 發送原始位元組到伺服器
    async fn send_raw(&mut self, data: &[u8]) -> Result<(), TelnetError> {
        self.stream.write_all(data).await?;
        self.stream.flush().await?;
        Ok(())
    }

    /// 讀取一批資料並處理 Telnet 協定，回傳完整的行
    ///
    /// 對方關閉連線時回傳 `NotConnected`。協定錯誤之前已完整的行會先回傳，
    /// 錯誤在下一次呼叫時回報。
    pub async fn read_lines(&mut self) -> Result<Vec<String>, TelnetError> {
        if let Some(e) = self.deferred.take() {
            return Err(e.into());
        }
        let mut buffer = vec![0u8; self.read_buffer_size];
        let n = self.stream.read(&mut buffer).await?;
        if n == 0 {
            return Err(TelnetError::NotConnected);
        }
        let received = self.handle_chunk(&buffer[..n]).await?;
        match received.error {
            Some(e) if received.lines.is_empty() => Err(e.into()),
            error => {
                self.deferred = error;
                Ok(received.lines)
            }
        }
    }

    /// 處理一批原始位元組並回覆協商
    async fn handle_chunk(&mut self, chunk: &[u8]) -> Result<Received, TelnetError> {
        trace!(bytes = %hex(chunk), "READ_RAW");
        let received = self.session.receive(chunk);
        if !received.replies.is_empty() {
            self.send_raw(&received.replies).await?;
        }
        Ok(received)
    }

    /// 持續讀取直到連線結束，期間處理繪製端送來的命令
    ///
    /// 結束時發布恰好一條原因說明行與 `ConnectionClosed`。
    pub async fn run(mut self, bridge: &mut NetworkSide) -> SessionEnd {
        let mut buffer = vec![0u8; self.read_buffer_size];
        let (reason, end) = loop {
            // 只有 read 本身放在 select 內，它可以安全地被取消
            tokio::select! {
                read = self.stream.read(&mut buffer) => {
                    let n = match read {
                        Ok(0) => break ("伺服器關閉了連線".to_string(), SessionEnd::Closed),
                        Ok(n) => n,
                        Err(e) => {
                            error!("讀取錯誤: {}", e);
                            break (e.to_string(), SessionEnd::Closed);
                        }
                    };
                    let Received { lines, error: failure, .. } =
                        match self.handle_chunk(&buffer[..n]).await {
                            Ok(received) => received,
                            Err(e) => {
                                error!("寫回協商失敗: {}", e);
                                break (e.to_string(), SessionEnd::Closed);
                            }
                        };
                    // 錯誤之前已完整的行先送出，再結束連線
                    if !lines.is_empty()
                        && bridge.publish(BridgeEvent::LinesReceived(lines)).await.is_err()
                    {
                        warn!("繪製端已關閉");
                        break ("繪製端已關閉".to_string(), SessionEnd::Shutdown);
                    }
                    if let Some(e) = failure {
                        error!("協定錯誤: {}", e);
                        break (e.to_string(), SessionEnd::Closed);
                    }
                }
                command = bridge.next_command() => match command {
                    Some(Command::Send(text)) => {
                        if let Err(e) = self.send(&text).await {
                            error!("發送失敗: {}", e);
                            break (format!("發送失敗: {}", e), SessionEnd::Closed);
                        }
                    }
                    Some(Command::Connect { host, port }) => {
                        let notice = format!(">>> 已連線中，忽略連線到 {}:{} 的要求", host, port);
                        if bridge.publish(BridgeEvent::LinesReceived(vec![notice])).await.is_err() {
                            break ("繪製端已關閉".to_string(), SessionEnd::Shutdown);
                        }
                    }
                    Some(Command::Disconnect) => {
                        break ("使用者中斷連線".to_string(), SessionEnd::Closed);
                    }
                    Some(Command::Shutdown) | None => {
                        info!("收到關閉信號");
                        break ("程式結束".to_string(), SessionEnd::Shutdown);
                    }
                },
            }
        };

        self.disconnect().await;
        if let Some(line) = self.session.close(&reason) {
            if publish_closed(bridge, line).await.is_err() {
                return SessionEnd::Shutdown;
            }
        }
        end
    }

    /// 關閉串流
    async fn disconnect(&mut self) {
        if let Err(e) = self.stream.shutdown().await {
            debug!("關閉串流時發生錯誤: {}", e);
        }
        info!("已斷開連線");
    }
}

async fn publish_closed(bridge: &NetworkSide, line: String) -> Result<(), BridgeError> {
    bridge.publish(BridgeEvent::LinesReceived(vec![line])).await?;
    bridge.publish(BridgeEvent::ConnectionClosed).await
}

fn hex(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<_>>()
        .join(" ")
}

/// 網路執行環境的主迴圈
///
/// 等待 `Connect` 命令建立連線，連線結束後回到等待狀態；
/// 收到 `Shutdown` 或繪製端關閉時結束。不會自動重連。
pub async fn run_network(config: TelnetConfig, mut bridge: NetworkSide) {
    while let Some(command) = bridge.next_command().await {
        let result = match command {
            Command::Connect { host, port } => {
                match TelnetClient::connect(&host, port, &config).await {
                    Ok(client) => {
                        let connected = BridgeEvent::Connected {
                            host: host.clone(),
                            port,
                        };
                        if bridge.publish(connected).await.is_err() {
                            break;
                        }
                        if client.run(&mut bridge).await == SessionEnd::Shutdown {
                            break;
                        }
                        Ok(())
                    }
                    Err(e) => {
                        warn!("連線到 {}:{} 失敗: {}", host, port, e);
                        publish_closed(&bridge, format!(">>> 連線失敗: {}", e)).await
                    }
                }
            }
            Command::Send(text) => {
                debug!("未連線，丟棄: {}", text);
                bridge
                    .publish(BridgeEvent::LinesReceived(vec![
                        ">>> 未連線，無法發送".to_string()
                    ]))
                    .await
            }
            Command::Disconnect => Ok(()),
            Command::Shutdown => break,
        };
        if result.is_err() {
            break;
        }
    }
    info!("網路迴圈結束");
}
