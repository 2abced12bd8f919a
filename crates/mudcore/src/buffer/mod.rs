//! 行組裝緩衝區模組
//!
//! 收集已去除 Telnet 命令的位元組，只在遇到換行時才切出完整的一行；
//! 尾端不完整的部分保留到下一批資料。

use bytes::{Bytes, BytesMut};

/// 行組裝緩衝區
#[derive(Debug, Default)]
pub struct LineBuffer {
    pending: BytesMut,
}

impl LineBuffer {
    /// 創建新的行緩衝區
    ///
    /// # Example
    /// ```
    /// use mudcore::buffer::LineBuffer;
    ///
    /// let mut buffer = LineBuffer::new();
    /// buffer.extend(b"hello\r\nwor");
    /// assert_eq!(buffer.take_lines(), vec![&b"hello"[..]]);
    /// assert_eq!(buffer.pending_len(), 3);
    /// ```
    pub fn new() -> Self {
        Self::default()
    }

    /// 添加資料
    pub fn extend(&mut self, data: &[u8]) {
        self.pending.extend_from_slice(data);
    }

    /// 切出所有完整的行，並去除前後的 `\r`
    pub fn take_lines(&mut self) -> Vec<Bytes> {
        let mut lines = Vec::new();
        while let Some(pos) = self.pending.iter().position(|&b| b == b'\n') {
            let mut line = self.pending.split_to(pos + 1);
            line.truncate(pos);
            lines.push(trim_carriage_returns(line.freeze()));
        }
        lines
    }

    /// 尚未組成完整一行的位元組數
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// 清空緩衝區
    pub fn clear(&mut self) {
        self.pending.clear();
    }
}

fn trim_carriage_returns(line: Bytes) -> Bytes {
    let start = line.iter().position(|&b| b != b'\r').unwrap_or(line.len());
    let end = line
        .iter()
        .rposition(|&b| b != b'\r')
        .map_or(start, |p| p + 1);
    line.slice(start..end)
}
