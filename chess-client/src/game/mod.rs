//! 游戏逻辑模块
//!
//! [`GameSession`] 是客户端的回合/选子状态机。网络消息、鼠标点击与自动取消选择的计时器
//! 都以 [`SessionEvent`] 的形式进入状态机，每次状态转换产出一个 [`Outbox`]，
//! 由调用方在转换结束后执行（发送走法、渲染、提示、关闭连接）。

mod input;
mod state;

pub use state::*;

use std::time::Duration;

use protocol::{ClientMessage, Color, Piece, ServerUpdate, Square};

use crate::board::Orientation;

/// 进入状态机的事件
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// 服务端更新（已通过校验）
    Server(ServerUpdate),
    /// 屏幕点击（像素坐标）
    Click { x: i32, y: i32 },
    /// 自动取消选择计时器到期
    DeselectTimeout { generation: u64 },
    /// 连接断开（流错误、帧不合法或发送失败）
    Disconnected { reason: String },
}

/// 面向玩家的提示
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    GameStart,
    InvalidMove,
    Check,
    Checkmate,
    Stalemate,
    Disconnected { reason: String },
}

impl Notification {
    /// 提示标题
    pub fn title(&self) -> &'static str {
        match self {
            Notification::GameStart => "Game Start",
            Notification::InvalidMove => "Invalid Move",
            Notification::Check => "Check",
            Notification::Checkmate => "Checkmate",
            Notification::Stalemate => "Stalemate",
            Notification::Disconnected { .. } => "Disconnected",
        }
    }

    /// 提示正文
    pub fn message(&self) -> String {
        match self {
            Notification::GameStart => "White will move first.".to_string(),
            Notification::InvalidMove => "Invalid Move!".to_string(),
            Notification::Check => "Check!".to_string(),
            Notification::Checkmate => "Checkmate!!".to_string(),
            Notification::Stalemate => "Stalemate! The game is a draw.".to_string(),
            Notification::Disconnected { reason } => format!("Lost connection to server: {}", reason),
        }
    }
}

/// 一次渲染所需的全部信息
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderFrame {
    pub fen: String,
    /// 有棋子的格子
    pub pieces: Vec<(Square, Piece)>,
    /// 当前选中的格子
    pub highlighted: Option<Square>,
    pub orientation: Orientation,
    /// 本地玩家阵营（未分配时为 None）
    pub player: Option<Color>,
    pub turn: Color,
    pub status: GameStatus,
}

impl RenderFrame {
    /// 查询格子上的棋子
    pub fn piece_at(&self, square: Square) -> Option<Piece> {
        self.pieces
            .iter()
            .find(|(sq, _)| *sq == square)
            .map(|(_, piece)| *piece)
    }
}

/// 会话结束原因
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEnd {
    /// 将死或逼和
    GameOver(GameStatus),
    /// 连接断开
    Disconnected(String),
}

/// 自动取消选择计时器
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeselectTimer {
    /// 仅当选择仍是这一代时才生效
    pub generation: u64,
    pub after: Duration,
}

/// 一次状态转换产生的副作用
#[derive(Debug, Default)]
pub struct Outbox {
    /// 待发送给服务端的消息
    pub sends: Vec<ClientMessage>,
    /// 转换结束后的画面（同一次转换只渲染一次）
    pub render: Option<RenderFrame>,
    pub notifications: Vec<Notification>,
    pub deselect: Option<DeselectTimer>,
    /// 会话结束，调用方应关闭连接
    pub end: Option<SessionEnd>,
}

impl Outbox {
    pub fn is_empty(&self) -> bool {
        self.sends.is_empty()
            && self.render.is_none()
            && self.notifications.is_empty()
            && self.deselect.is_none()
            && self.end.is_none()
    }
}
