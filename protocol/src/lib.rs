//! 国际象棋联机共享协议库
//!
//! 包含:
//! - 阵营、棋子、格子、走法等核心数据结构
//! - 规则引擎抽象 (RulesEngine) 及基于 `chess` crate 的实现
//! - 消息类型定义 (ServerMessage, ServerUpdate, ClientMessage)
//! - 传输层抽象 (Connector, Connection, Listener traits)
//! - 帧编解码 (FrameReader, FrameWriter, WireFormat)

mod constants;
mod error;
mod message;
mod moves;
mod piece;
mod rules;
mod transport;

pub use constants::*;
pub use error::{ChessError, ProtocolError, Result};
pub use message::{BoardStatus, ClientMessage, PositionUpdate, ServerMessage, ServerUpdate};
pub use moves::Move;
pub use piece::{Color, Piece, PieceKind, Square};
pub use rules::{ChessRules, RulesEngine};
pub use transport::{
    Connection, Connector, Listener,
    TcpConnection, TcpConnector, TcpListener,
    NetworkConfig, WireFormat,
    FrameReader, FrameWriter,
};
