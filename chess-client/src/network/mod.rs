//! 网络通信模块
//!
//! 使用 protocol 库的传输层，收到的帧校验后以 [`SessionEvent`](crate::game::SessionEvent) 送入会话。

mod connection;

pub use connection::*;
