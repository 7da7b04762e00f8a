//! 错误类型定义

use thiserror::Error;

/// 象棋规则错误
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ChessError {
    /// 无效的格子名称
    #[error("Invalid square name: {name:?}")]
    InvalidSquareName { name: String },

    /// 无效的走法字符串
    #[error("Invalid move notation: {notation:?}")]
    InvalidMoveNotation { notation: String },

    /// 无效的 FEN 字符串
    #[error("Invalid FEN string: {reason}")]
    InvalidFen { reason: String },
}

/// 协议错误类型
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// IO 错误
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// 序列化错误（bincode）
    #[error("Bincode serialization error: {0}")]
    Bincode(#[from] bincode::Error),

    /// JSON 序列化错误
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// 协议版本不匹配
    #[error("Protocol version mismatch: expected {expected}, got {actual}")]
    VersionMismatch { expected: u8, actual: u8 },

    /// 帧大小超限
    #[error("Frame too large: {size} bytes (max: {max})")]
    FrameTooLarge { size: usize, max: usize },

    /// 连接超时
    #[error("Connection timeout")]
    ConnectionTimeout,

    /// 连接已关闭
    #[error("Connection closed")]
    ConnectionClosed,

    /// 消息字段不合法（能解码但语义错误）
    #[error("Malformed message: {reason}")]
    Malformed { reason: String },
}

impl ProtocolError {
    /// 构造消息格式错误
    pub fn malformed(reason: impl Into<String>) -> Self {
        ProtocolError::Malformed {
            reason: reason.into(),
        }
    }
}

/// 协议操作结果类型
pub type Result<T> = std::result::Result<T, ProtocolError>;
