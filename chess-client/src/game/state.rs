//! 客户端游戏状态
//!
//! 状态元组 (身份, 走子方, 选择, 棋局状态) 以及服务端消息驱动的状态转换。

use std::time::Duration;

use protocol::{BoardStatus, Color, PositionUpdate, RulesEngine, ServerUpdate, Square, INITIAL_FEN};
use tracing::{debug, info, warn};

use super::{Notification, Outbox, RenderFrame, SessionEnd, SessionEvent};
use crate::board::{BoardLayout, Orientation};

/// 玩家身份（每条连接只分配一次）
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PlayerIdentity {
    #[default]
    Unassigned,
    White,
    Black,
}

impl PlayerIdentity {
    pub fn color(&self) -> Option<Color> {
        match self {
            PlayerIdentity::Unassigned => None,
            PlayerIdentity::White => Some(Color::White),
            PlayerIdentity::Black => Some(Color::Black),
        }
    }
}

impl From<Color> for PlayerIdentity {
    fn from(color: Color) -> Self {
        match color {
            Color::White => PlayerIdentity::White,
            Color::Black => PlayerIdentity::Black,
        }
    }
}

/// 棋局状态
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum GameStatus {
    #[default]
    InProgress,
    Check,
    Checkmate,
    Stalemate,
}

impl GameStatus {
    /// 将死与逼和为终局
    pub fn is_terminal(&self) -> bool {
        matches!(self, GameStatus::Checkmate | GameStatus::Stalemate)
    }
}

impl From<BoardStatus> for GameStatus {
    fn from(status: BoardStatus) -> Self {
        match status {
            BoardStatus::Check => GameStatus::Check,
            BoardStatus::Checkmate => GameStatus::Checkmate,
            BoardStatus::Stalemate => GameStatus::Stalemate,
        }
    }
}

/// 由状态元组推导出的阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    /// 尚未分配身份
    AwaitingIdentity,
    /// 对方回合，或己方走法已发出等待服务端确认
    AwaitingTurn,
    /// 己方回合，未选子
    AwaitingSelection,
    /// 己方回合，已选子，等待落点
    PendingMoveConfirmation,
    /// 将死或逼和
    GameOver,
}

/// 选中的格子
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Selection {
    pub square: Square,
    /// 选择代数，用于识别过期的取消选择计时器
    pub generation: u64,
}

/// 权威局面：服务端下发的 FEN 及引擎解析后的棋盘
#[derive(Debug, Clone)]
pub struct BoardState<B> {
    pub fen: String,
    pub board: B,
}

/// 客户端会话状态机
pub struct GameSession<R: RulesEngine> {
    pub(super) rules: R,
    pub(super) layout: BoardLayout,
    pub(super) deselect_after: Duration,
    identity: PlayerIdentity,
    pub(super) orientation: Orientation,
    pub(super) board: BoardState<R::Board>,
    turn: Color,
    pub(super) selection: Option<Selection>,
    pub(super) generation: u64,
    status: GameStatus,
    /// 走法已发出、尚未收到新局面
    pub(super) move_in_flight: bool,
    /// 重置后等待服务端下发 board/turn
    awaiting_position: bool,
    pub(super) ended: bool,
}

impl<R: RulesEngine> GameSession<R> {
    /// 创建会话（连接建立时）
    pub fn new(rules: R, layout: BoardLayout, deselect_after: Duration) -> Self {
        let board = BoardState {
            fen: INITIAL_FEN.to_string(),
            board: rules.start_position(),
        };
        Self {
            rules,
            layout,
            deselect_after,
            identity: PlayerIdentity::Unassigned,
            orientation: Orientation::default(),
            board,
            turn: Color::White,
            selection: None,
            generation: 0,
            status: GameStatus::InProgress,
            move_in_flight: false,
            awaiting_position: false,
            ended: false,
        }
    }

    /// 会话开始：提示并渲染初始局面
    pub fn start(&self) -> Outbox {
        Outbox {
            render: Some(self.render_frame()),
            notifications: vec![Notification::GameStart],
            ..Outbox::default()
        }
    }

    /// 处理一个事件
    pub fn handle(&mut self, event: SessionEvent) -> Outbox {
        match event {
            SessionEvent::Server(update) => self.handle_server(update),
            SessionEvent::Click { x, y } => self.handle_click(x, y),
            SessionEvent::DeselectTimeout { generation } => self.handle_deselect_timeout(generation),
            SessionEvent::Disconnected { reason } => self.handle_disconnect(reason),
        }
    }

    /// 应用服务端更新
    ///
    /// 帧内字段按 player_id、board+turn、board_status、reset_board 顺序应用，
    /// 终局状态之后的字段不再处理。FEN 无法解析时不修改任何状态，会话按断线处理。
    pub fn handle_server(&mut self, update: ServerUpdate) -> Outbox {
        let mut out = Outbox::default();
        if self.ended {
            debug!("Session ended, dropping server update: {:?}", update);
            return out;
        }
        if update.is_empty() {
            debug!("Empty server update");
            return out;
        }

        let position = match update.position {
            Some(PositionUpdate { fen, turn }) => match self.rules.load_position(&fen) {
                Ok(board) => Some((BoardState { fen, board }, turn)),
                Err(e) => {
                    warn!("Rejecting server board {:?}: {}", fen, e);
                    return self.handle_disconnect(format!("malformed board: {}", e));
                }
            },
            None => None,
        };

        let mut dirty = false;

        if let Some(color) = update.player {
            dirty |= self.assign_identity(color);
        }

        if let Some((state, turn)) = position {
            debug!("Board replaced, {} to move", turn);
            self.board = state;
            self.turn = turn;
            self.move_in_flight = false;
            self.awaiting_position = false;
            self.clear_selection();
            if self.status == GameStatus::Check {
                self.status = GameStatus::InProgress;
            }
            dirty = true;
        }

        if let Some(status) = update.board_status {
            let status = GameStatus::from(status);
            match status {
                GameStatus::Check => {
                    self.status = GameStatus::Check;
                    out.notifications.push(Notification::Check);
                    dirty = true;
                }
                GameStatus::Checkmate | GameStatus::Stalemate => {
                    info!("Game over: {:?}", status);
                    self.status = status;
                    self.clear_selection();
                    self.ended = true;
                    out.render = Some(self.render_frame());
                    out.notifications.push(if status == GameStatus::Checkmate {
                        Notification::Checkmate
                    } else {
                        Notification::Stalemate
                    });
                    out.end = Some(SessionEnd::GameOver(status));
                    return out;
                }
                GameStatus::InProgress => {}
            }
        }

        if update.reset_board {
            info!("Board reset by server");
            self.reset();
            dirty = true;
        }

        if dirty {
            out.render = Some(self.render_frame());
        }
        out
    }

    /// 连接断开，未终局时结束会话
    pub fn handle_disconnect(&mut self, reason: String) -> Outbox {
        let mut out = Outbox::default();
        if self.ended {
            debug!("Session already ended, ignoring disconnect: {}", reason);
            return out;
        }
        warn!("Disconnected: {}", reason);
        self.ended = true;
        self.clear_selection();
        out.notifications.push(Notification::Disconnected {
            reason: reason.clone(),
        });
        out.end = Some(SessionEnd::Disconnected(reason));
        out
    }

    /// 分配身份并固定视角，重复分配被忽略
    fn assign_identity(&mut self, color: Color) -> bool {
        if let Some(current) = self.identity.color() {
            warn!(
                "Ignoring duplicate player_id ({}), already playing {}",
                color, current
            );
            return false;
        }
        info!("Assigned identity: {}", color);
        self.identity = PlayerIdentity::from(color);
        self.orientation = Orientation::for_player(color);
        true
    }

    /// 恢复初始局面，在收到新的 board/turn 之前不接受走子
    fn reset(&mut self) {
        self.board = BoardState {
            fen: INITIAL_FEN.to_string(),
            board: self.rules.start_position(),
        };
        self.clear_selection();
        self.status = GameStatus::InProgress;
        self.move_in_flight = false;
        self.awaiting_position = true;
    }

    pub(super) fn clear_selection(&mut self) {
        self.selection = None;
    }

    /// 当前画面
    pub fn render_frame(&self) -> RenderFrame {
        let pieces = Square::all()
            .filter_map(|sq| self.rules.piece_at(&self.board.board, sq).map(|p| (sq, p)))
            .collect();
        RenderFrame {
            fen: self.board.fen.clone(),
            pieces,
            highlighted: self.selection.map(|s| s.square),
            orientation: self.orientation,
            player: self.identity.color(),
            turn: self.turn,
            status: self.status,
        }
    }

    pub fn phase(&self) -> SessionPhase {
        if self.status.is_terminal() {
            return SessionPhase::GameOver;
        }
        let Some(color) = self.identity.color() else {
            return SessionPhase::AwaitingIdentity;
        };
        if self.turn != color || self.move_in_flight || self.awaiting_position {
            SessionPhase::AwaitingTurn
        } else if self.selection.is_some() {
            SessionPhase::PendingMoveConfirmation
        } else {
            SessionPhase::AwaitingSelection
        }
    }

    pub fn identity(&self) -> PlayerIdentity {
        self.identity
    }

    pub fn orientation(&self) -> Orientation {
        self.orientation
    }

    pub fn turn(&self) -> Color {
        self.turn
    }

    pub fn selection(&self) -> Option<Selection> {
        self.selection
    }

    pub fn status(&self) -> GameStatus {
        self.status
    }

    pub fn fen(&self) -> &str {
        &self.board.fen
    }

    pub fn layout(&self) -> BoardLayout {
        self.layout
    }

    /// 会话是否已结束（终局或断线）
    pub fn is_ended(&self) -> bool {
        self.ended
    }

    /// 是否轮到本地玩家
    pub fn is_my_turn(&self) -> bool {
        self.identity.color() == Some(self.turn)
    }
}
