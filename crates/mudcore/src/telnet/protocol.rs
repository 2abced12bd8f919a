//! Telnet 協定常數和解析
//!
//! 實作 RFC 854 Telnet 協定的基本命令，以逐位元組狀態機解析，
//! 因此 IAC 序列被拆在兩次讀取之間也能正確處理。

/// Telnet IAC (Interpret As Command) - 0xFF
pub const IAC: u8 = 255;

/// Sub-negotiation 內容上限，超過視為格式錯誤並丟棄
const MAX_SUBNEGOTIATION_LEN: usize = 64 * 1024;

/// Telnet 命令
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum TelnetCommand {
    /// Sub-negotiation End
    Se = 240,
    /// No Operation
    Nop = 241,
    /// Data Mark
    DataMark = 242,
    /// Break
    Break = 243,
    /// Interrupt Process
    InterruptProcess = 244,
    /// Abort Output
    AbortOutput = 245,
    /// Are You There
    AreYouThere = 246,
    /// Erase Character
    EraseCharacter = 247,
    /// Erase Line
    EraseLine = 248,
    /// Go Ahead
    GoAhead = 249,
    /// Sub-negotiation Begin
    Sb = 250,
    /// Will
    Will = 251,
    /// Won't
    Wont = 252,
    /// Do
    Do = 253,
    /// Don't
    Dont = 254,
}

impl TelnetCommand {
    /// 從位元組解析 Telnet 命令
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            240 => Some(Self::Se),
            241 => Some(Self::Nop),
            242 => Some(Self::DataMark),
            243 => Some(Self::Break),
            244 => Some(Self::InterruptProcess),
            245 => Some(Self::AbortOutput),
            246 => Some(Self::AreYouThere),
            247 => Some(Self::EraseCharacter),
            248 => Some(Self::EraseLine),
            249 => Some(Self::GoAhead),
            250 => Some(Self::Sb),
            251 => Some(Self::Will),
            252 => Some(Self::Wont),
            253 => Some(Self::Do),
            254 => Some(Self::Dont),
            _ => None,
        }
    }

    /// 是否為選項協商命令（WILL/WONT/DO/DONT）
    fn is_negotiation(self) -> bool {
        matches!(self, Self::Will | Self::Wont | Self::Do | Self::Dont)
    }
}

/// Telnet 選項
///
/// 只有 `Compress2` 與 `Gmcp` 會被接受，其餘選項一律不回應。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TelnetOption {
    /// Echo
    Echo,
    /// Suppress Go Ahead
    SuppressGoAhead,
    /// Terminal Type
    TerminalType,
    /// Window Size (NAWS)
    Naws,
    /// Charset
    Charset,
    /// MCCP2 (MUD Client Compression Protocol v2)
    Compress2,
    /// GMCP (Generic MUD Communication Protocol)
    Gmcp,
    /// Unknown option
    Unknown(u8),
}

impl TelnetOption {
    /// 從位元組解析 Telnet 選項
    pub fn from_byte(byte: u8) -> Self {
        match byte {
            1 => Self::Echo,
            3 => Self::SuppressGoAhead,
            24 => Self::TerminalType,
            31 => Self::Naws,
            42 => Self::Charset,
            86 => Self::Compress2,
            201 => Self::Gmcp,
            other => Self::Unknown(other),
        }
    }

    /// 獲取選項的位元組值
    pub fn as_byte(&self) -> u8 {
        match self {
            Self::Echo => 1,
            Self::SuppressGoAhead => 3,
            Self::TerminalType => 24,
            Self::Naws => 31,
            Self::Charset => 42,
            Self::Compress2 => 86,
            Self::Gmcp => 201,
            Self::Unknown(b) => *b,
        }
    }

    /// 對方 WILL 時是否回應 DO
    pub fn is_supported(&self) -> bool {
        matches!(self, Self::Compress2 | Self::Gmcp)
    }
}

/// Telnet 資料解析結果
#[derive(Debug, Clone, PartialEq)]
pub enum TelnetEvent {
    /// 一個應用層資料位元組（已還原 IAC IAC）
    Data(u8),
    /// 選項協商（WILL, WONT, DO, DONT）
    Negotiation(TelnetCommand, TelnetOption),
    /// Sub-negotiation 資料
    Subnegotiation(TelnetOption, Vec<u8>),
    /// 其他單獨命令（NOP, GA ...）
    Command(TelnetCommand),
}

/// 解析器狀態
#[derive(Debug, Clone, Default)]
enum ParserState {
    #[default]
    Data,
    Iac,
    Negotiation(TelnetCommand),
    SubOption,
    Sub(TelnetOption),
    SubIac(TelnetOption),
}

/// 可續傳的 Telnet 解析器
///
/// 每次 [`feed`](TelnetParser::feed) 一個位元組，狀態跨呼叫保留。
#[derive(Debug, Default)]
pub struct TelnetParser {
    state: ParserState,
    sub_data: Vec<u8>,
    sub_overflow: bool,
}

impl TelnetParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// 是否停在資料狀態（沒有進行中的命令序列）
    pub fn is_idle(&self) -> bool {
        matches!(self.state, ParserState::Data)
    }

    /// 餵入一個位元組，若完成一個事件則回傳
    pub fn feed(&mut self, byte: u8) -> Option<TelnetEvent> {
        match std::mem::take(&mut self.state) {
            ParserState::Data => {
                if byte == IAC {
                    self.state = ParserState::Iac;
                    None
                } else {
                    Some(TelnetEvent::Data(byte))
                }
            }
            ParserState::Iac => match TelnetCommand::from_byte(byte) {
                None if byte == IAC => Some(TelnetEvent::Data(IAC)),
                // IAC 後接非命令位元組：格式錯誤，忽略
                None => None,
                Some(TelnetCommand::Sb) => {
                    self.state = ParserState::SubOption;
                    None
                }
                Some(cmd) if cmd.is_negotiation() => {
                    self.state = ParserState::Negotiation(cmd);
                    None
                }
                // 沒有 SB 的 SE 也一併忽略
                Some(TelnetCommand::Se) => None,
                Some(cmd) => Some(TelnetEvent::Command(cmd)),
            },
            ParserState::Negotiation(cmd) => {
                Some(TelnetEvent::Negotiation(cmd, TelnetOption::from_byte(byte)))
            }
            ParserState::SubOption => {
                self.sub_data.clear();
                self.sub_overflow = false;
                self.state = ParserState::Sub(TelnetOption::from_byte(byte));
                None
            }
            ParserState::Sub(option) => {
                if byte == IAC {
                    self.state = ParserState::SubIac(option);
                } else {
                    self.push_sub(byte);
                    self.state = ParserState::Sub(option);
                }
                None
            }
            ParserState::SubIac(option) => {
                if byte == TelnetCommand::Se as u8 {
                    let data = std::mem::take(&mut self.sub_data);
                    if self.sub_overflow {
                        return None;
                    }
                    return Some(TelnetEvent::Subnegotiation(option, data));
                }
                if byte == IAC {
                    self.push_sub(IAC);
                }
                // 其他 IAC x 在 sub-negotiation 內沒有意義，略過
                self.state = ParserState::Sub(option);
                None
            }
        }
    }

    fn push_sub(&mut self, byte: u8) {
        if self.sub_data.len() >= MAX_SUBNEGOTIATION_LEN {
            self.sub_overflow = true;
        } else {
            self.sub_data.push(byte);
        }
    }
}

/// 生成協商回應封包
pub fn negotiation_reply(cmd: TelnetCommand, option: TelnetOption) -> [u8; 3] {
    [IAC, cmd as u8, option.as_byte()]
}

/// 將送出的文字中的 0xFF 跳脫為 IAC IAC
pub fn escape_iac(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len());
    for &b in data {
        out.push(b);
        if b == IAC {
            out.push(IAC);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_all(parser: &mut TelnetParser, input: &[u8]) -> (Vec<u8>, Vec<TelnetEvent>) {
        let mut data = Vec::new();
        let mut events = Vec::new();
        for &b in input {
            match parser.feed(b) {
                Some(TelnetEvent::Data(d)) => data.push(d),
                Some(other) => events.push(other),
                None => {}
            }
        }
        (data, events)
    }

    #[test]
    fn test_parse_plain_text() {
        let (data, events) = parse_all(&mut TelnetParser::new(), b"Hello World");
        assert_eq!(data, b"Hello World");
        assert!(events.is_empty());
    }

    #[test]
    fn test_parse_escaped_iac() {
        let (data, events) = parse_all(&mut TelnetParser::new(), &[b'A', IAC, IAC, b'B']);
        assert_eq!(data, vec![b'A', IAC, b'B']);
        assert!(events.is_empty());
    }

    #[test]
    fn test_parse_will_command() {
        let input = [IAC, TelnetCommand::Will as u8, 86];
        let (data, events) = parse_all(&mut TelnetParser::new(), &input);
        assert!(data.is_empty());
        assert_eq!(
            events,
            vec![TelnetEvent::Negotiation(TelnetCommand::Will, TelnetOption::Compress2)]
        );
    }

    #[test]
    fn test_negotiation_split_across_feeds() {
        let mut parser = TelnetParser::new();
        let (_, first) = parse_all(&mut parser, &[b'x', IAC]);
        assert!(first.is_empty());
        assert!(!parser.is_idle());

        let (data, second) = parse_all(&mut parser, &[TelnetCommand::Will as u8, 201, b'y']);
        assert_eq!(data, b"y");
        assert_eq!(
            second,
            vec![TelnetEvent::Negotiation(TelnetCommand::Will, TelnetOption::Gmcp)]
        );
    }

    #[test]
    fn test_parse_subnegotiation_with_escaped_iac() {
        let mut input = vec![IAC, TelnetCommand::Sb as u8, 201];
        input.extend_from_slice(b"Char.Vitals ");
        input.extend_from_slice(&[IAC, IAC]);
        input.extend_from_slice(&[IAC, TelnetCommand::Se as u8]);
        input.extend_from_slice(b"after");

        let (data, events) = parse_all(&mut TelnetParser::new(), &input);
        assert_eq!(data, b"after");
        let mut payload = b"Char.Vitals ".to_vec();
        payload.push(IAC);
        assert_eq!(events, vec![TelnetEvent::Subnegotiation(TelnetOption::Gmcp, payload)]);
    }

    #[test]
    fn test_subnegotiation_is_never_data() {
        let mut input = vec![IAC, TelnetCommand::Sb as u8, 99];
        input.extend_from_slice(b"hidden\n");
        input.extend_from_slice(&[IAC, TelnetCommand::Se as u8]);
        let (data, _) = parse_all(&mut TelnetParser::new(), &input);
        assert!(data.is_empty());
    }

    #[test]
    fn test_malformed_iac_is_ignored() {
        let (data, events) = parse_all(&mut TelnetParser::new(), &[b'a', IAC, 17, b'b']);
        assert_eq!(data, b"ab");
        assert!(events.is_empty());
    }

    #[test]
    fn test_go_ahead_is_a_command() {
        let (_, events) = parse_all(&mut TelnetParser::new(), &[IAC, TelnetCommand::GoAhead as u8]);
        assert_eq!(events, vec![TelnetEvent::Command(TelnetCommand::GoAhead)]);
    }

    #[test]
    fn test_telnet_option_roundtrip() {
        for byte in 0..=255u8 {
            let option = TelnetOption::from_byte(byte);
            assert_eq!(option.as_byte(), byte);
        }
    }

    #[test]
    fn test_only_compression_and_gmcp_supported() {
        assert!(TelnetOption::Compress2.is_supported());
        assert!(TelnetOption::Gmcp.is_supported());
        assert!(!TelnetOption::Echo.is_supported());
        assert!(!TelnetOption::Unknown(200).is_supported());
    }

    #[test]
    fn test_escape_iac() {
        assert_eq!(escape_iac(&[b'a', IAC, b'b']), vec![b'a', IAC, IAC, b'b']);
    }
}
