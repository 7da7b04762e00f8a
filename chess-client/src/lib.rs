//! 国际象棋联机客户端
//!
//! 连接权威服务端，显示服务端下发的局面，本地校验走法后将走棋意图发回服务端。

pub mod board;
pub mod client;
pub mod error;
pub mod game;
pub mod network;
pub mod settings;
pub mod view;

pub use client::{ChessClient, ClientConfig};
pub use error::ClientError;
pub use game::{GameSession, SessionEnd, SessionEvent};
pub use settings::ClientSettings;
