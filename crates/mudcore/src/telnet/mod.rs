//! Telnet 協定模組
//!
//! 實作 Telnet 連線管理、選項協商與 MCCP2 壓縮

mod client;
mod protocol;
mod session;

pub use client::{run_network, SessionEnd, TelnetClient, TelnetConfig, TelnetError};
pub use protocol::{TelnetCommand, TelnetEvent, TelnetOption, TelnetParser, IAC};
pub use session::{ProtocolError, ProtocolSession, Received};
