//! 協定會話
//!
//! 不含 I/O 的連線狀態機：輸入任意切割的原始位元組，輸出完整的文字行、
//! 需要回傳給伺服器的協商封包，以及 GMCP 內容。
//! MCCP2 壓縮在伺服器送出 `IAC SB COMPRESS2 IAC SE` 之後立即生效，
//! 之後的位元組先解壓縮再進行 Telnet 解析。

use std::collections::HashSet;

use flate2::{Decompress, FlushDecompress, Status};
use thiserror::Error;
use tracing::{debug, info, trace, warn};

use super::protocol::{
    escape_iac, negotiation_reply, TelnetCommand, TelnetEvent, TelnetOption, TelnetParser,
};
use crate::buffer::LineBuffer;
use crate::encoding::{Charset, DecodeError};

/// 解壓縮輸出區塊大小
const INFLATE_CHUNK: usize = 16 * 1024;

/// 協定層錯誤，對連線而言皆為致命錯誤
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("解壓縮失敗: {0}")]
    Decompress(#[from] flate2::DecompressError),

    #[error("文字解碼失敗: {0}")]
    Decode(#[from] DecodeError),
}

/// 一批資料處理後的結果
///
/// 發生致命錯誤時，錯誤位置之前已完整的行仍在 `lines` 中，錯誤放在 `error`。
#[derive(Debug, Default)]
pub struct Received {
    /// 完整的文字行（不含換行）
    pub lines: Vec<String>,
    /// 需要寫回伺服器的協商回應
    pub replies: Vec<u8>,
    /// GMCP sub-negotiation 內容
    pub gmcp: Vec<String>,
    /// 致命錯誤；之後這個連線不再產生任何資料
    pub error: Option<ProtocolError>,
}

impl Received {
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
            && self.replies.is_empty()
            && self.gmcp.is_empty()
            && self.error.is_none()
    }
}

/// 單一連線的協定狀態
pub struct ProtocolSession {
    parser: TelnetParser,
    inflater: Option<Decompress>,
    lines: LineBuffer,
    charset: Charset,
    /// 已回應 DO 的選項
    accepted: HashSet<TelnetOption>,
    /// 發生過致命錯誤
    failed: bool,
    closed: bool,
}

impl ProtocolSession {
    pub fn new(charset: Charset) -> Self {
        Self {
            parser: TelnetParser::new(),
            inflater: None,
            lines: LineBuffer::new(),
            charset,
            accepted: HashSet::new(),
            failed: false,
            closed: false,
        }
    }

    /// 壓縮是否生效中
    pub fn compression_active(&self) -> bool {
        self.inflater.is_some()
    }

    /// 選項是否已協商成功
    pub fn is_accepted(&self, option: TelnetOption) -> bool {
        self.accepted.contains(&option)
    }

    /// 是否已進入關閉狀態
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// 處理一批收到的原始位元組
    ///
    /// 關閉或發生致命錯誤後再呼叫只會回傳空結果。
    pub fn receive(&mut self, chunk: &[u8]) -> Received {
        let mut received = Received::default();
        if self.closed || self.failed {
            return received;
        }

        let mut input = chunk;
        let mut failure = None;
        while !input.is_empty() {
            if let Some(inflater) = self.inflater.as_mut() {
                let mut plain = Vec::new();
                let outcome = inflate(inflater, input, &mut plain);
                self.process_plain(&plain, &mut received);
                match outcome {
                    Ok((consumed, ended)) => {
                        input = &input[consumed..];
                        if ended {
                            debug!("壓縮串流結束，恢復未壓縮模式");
                            self.inflater = None;
                        } else if consumed == 0 {
                            break;
                        }
                    }
                    Err(e) => {
                        failure = Some(ProtocolError::from(e));
                        break;
                    }
                }
            } else {
                let consumed = self.process_plain(input, &mut received);
                input = &input[consumed..];
            }
        }

        for line in self.lines.take_lines() {
            match self.charset.decode(&line) {
                Ok(text) => received.lines.push(text),
                Err(e) => {
                    // 這一行在解壓縮失敗點之前，錯誤以它為準
                    failure = Some(ProtocolError::from(e));
                    break;
                }
            }
        }

        if let Some(e) = failure {
            warn!("協定錯誤: {}", e);
            self.failed = true;
            self.inflater = None;
            self.lines.clear();
            received.error = Some(e);
        }
        received
    }

    /// 進入關閉狀態，回傳唯一一條說明原因的訊息行
    ///
    /// 第二次呼叫回傳 `None`。
    pub fn close(&mut self, reason: &str) -> Option<String> {
        if self.closed {
            return None;
        }
        self.closed = true;
        if self.lines.pending_len() > 0 {
            debug!("丟棄未完成的行 ({} 位元組)", self.lines.pending_len());
            self.lines.clear();
        }
        self.inflater = None;
        Some(format!(">>> 連線中斷: {}", reason))
    }

    /// 將一行文字編碼為送出的位元組（含換行）
    pub fn encode_line(&self, line: &str) -> Vec<u8> {
        let mut data = escape_iac(&self.charset.encode(line));
        data.push(b'\n');
        data
    }

    /// 解析未壓縮的位元組，回傳消耗的長度
    ///
    /// 遇到壓縮起點時立即停止，剩下的位元組屬於壓縮串流。
    fn process_plain(&mut self, input: &[u8], received: &mut Received) -> usize {
        let mut data = Vec::with_capacity(input.len());
        for (i, &byte) in input.iter().enumerate() {
            let Some(event) = self.parser.feed(byte) else {
                continue;
            };
            match event {
                TelnetEvent::Data(b) => data.push(b),
                TelnetEvent::Negotiation(cmd, option) => {
                    self.negotiate(cmd, option, received);
                }
                TelnetEvent::Subnegotiation(option, payload) => {
                    if self.subnegotiation(option, payload, received) {
                        self.lines.extend(&data);
                        return i + 1;
                    }
                }
                TelnetEvent::Command(cmd) => trace!("忽略 Telnet 命令 {:?}", cmd),
            }
        }
        self.lines.extend(&data);
        input.len()
    }

    fn negotiate(&mut self, cmd: TelnetCommand, option: TelnetOption, received: &mut Received) {
        match cmd {
            TelnetCommand::Will if option.is_supported() => {
                if self.accepted.insert(option) {
                    info!("接受選項 {:?}", option);
                    received
                        .replies
                        .extend_from_slice(&negotiation_reply(TelnetCommand::Do, option));
                }
            }
            TelnetCommand::Wont => {
                if self.accepted.remove(&option) {
                    info!("伺服器停用選項 {:?}", option);
                }
            }
            _ => debug!("不回應協商 {:?} {:?}", cmd, option),
        }
    }

    /// 處理 sub-negotiation，回傳是否開始壓縮
    fn subnegotiation(
        &mut self,
        option: TelnetOption,
        payload: Vec<u8>,
        received: &mut Received,
    ) -> bool {
        match option {
            // 壓縮中再次收到起點時忽略，不會巢狀壓縮
            TelnetOption::Compress2 if self.is_accepted(option) && self.inflater.is_none() => {
                info!("MCCP2 壓縮開始");
                self.inflater = Some(Decompress::new(true));
                true
            }
            TelnetOption::Gmcp if self.is_accepted(option) => {
                let text = String::from_utf8_lossy(&payload).into_owned();
                debug!(target: "gmcp", "{}", text);
                received.gmcp.push(text);
                false
            }
            _ => {
                warn!("忽略未協商的 sub-negotiation {:?}", option);
                false
            }
        }
    }
}

/// 解壓縮輸入並附加到 `output`，回傳 (消耗的輸入長度, 串流是否結束)
///
/// 失敗時 `output` 保留失敗前已解出的資料。
fn inflate(
    inflater: &mut Decompress,
    input: &[u8],
    output: &mut Vec<u8>,
) -> Result<(usize, bool), flate2::DecompressError> {
    let mut chunk = vec![0u8; INFLATE_CHUNK];
    let mut pos = 0;

    loop {
        let before_in = inflater.total_in();
        let before_out = inflater.total_out();
        let result = inflater.decompress(&input[pos..], &mut chunk, FlushDecompress::None);
        let consumed = (inflater.total_in() - before_in) as usize;
        let produced = (inflater.total_out() - before_out) as usize;
        pos += consumed;
        output.extend_from_slice(&chunk[..produced]);
        let status = result?;

        match status {
            Status::StreamEnd => return Ok((pos, true)),
            Status::BufError => break,
            Status::Ok => {
                // 輸出區塊填滿代表可能還有待取出的資料
                if produced < chunk.len() && pos >= input.len() {
                    break;
                }
                if consumed == 0 && produced == 0 {
                    break;
                }
            }
        }
    }

    Ok((pos, false))
}
