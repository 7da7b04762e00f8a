//! 客户端错误类型

use protocol::ProtocolError;
use thiserror::Error;

/// 客户端错误
#[derive(Error, Debug)]
pub enum ClientError {
    /// 无法建立连接（启动失败）
    #[error("Failed to connect to {address}: {source}")]
    Connect {
        address: String,
        #[source]
        source: ProtocolError,
    },

    /// 写端已关闭
    #[error("Send failed: connection closed")]
    Send,

    /// 设置文件读写失败
    #[error("Settings error: {0}")]
    Settings(String),
}

pub type Result<T> = std::result::Result<T, ClientError>;
