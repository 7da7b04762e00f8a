//! 消息类型定义
//!
//! 服务端每一帧是一组可同时出现的可选字段；客户端只发送走法。
//! 字段名与线上格式一致：`player_id`、`board`、`turn`、`board_status`、`reset_board`、`move`。

use serde::{Deserialize, Serialize};

use crate::error::{ProtocolError, Result};
use crate::moves::Move;
use crate::piece::Color;

/// 服务端判定的棋局状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BoardStatus {
    /// 将军（仅提示）
    Check,
    /// 将死（终局）
    Checkmate,
    /// 逼和（终局）
    Stalemate,
}

impl BoardStatus {
    /// 是否为终局状态
    pub fn is_terminal(&self) -> bool {
        matches!(self, BoardStatus::Checkmate | BoardStatus::Stalemate)
    }
}

/// 服务端发送给客户端的原始帧
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServerMessage {
    /// 玩家编号：0 = 白方，1 = 黑方
    #[serde(default)]
    pub player_id: Option<u8>,
    /// 新局面 FEN，必须与 `turn` 同时出现
    #[serde(default)]
    pub board: Option<String>,
    /// 当前走子方
    #[serde(default)]
    pub turn: Option<Color>,
    #[serde(default)]
    pub board_status: Option<BoardStatus>,
    #[serde(default)]
    pub reset_board: Option<bool>,
}

impl ServerMessage {
    /// 分配玩家身份
    pub fn player(color: Color) -> Self {
        Self {
            player_id: Some(color.player_index()),
            ..Self::default()
        }
    }

    /// 整体替换局面
    pub fn position(fen: impl Into<String>, turn: Color) -> Self {
        Self {
            board: Some(fen.into()),
            turn: Some(turn),
            ..Self::default()
        }
    }

    /// 棋局状态通知
    pub fn status(status: BoardStatus) -> Self {
        Self {
            board_status: Some(status),
            ..Self::default()
        }
    }

    /// 重置棋局
    pub fn reset() -> Self {
        Self {
            reset_board: Some(true),
            ..Self::default()
        }
    }
}

/// 局面更新（`board` + `turn`，必须原子应用）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PositionUpdate {
    pub fen: String,
    pub turn: Color,
}

/// 校验后的服务端更新
///
/// 由 [`ServerMessage`] 转换而来，转换失败说明帧语义不合法，
/// 接收方不应应用其中任何字段。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServerUpdate {
    pub player: Option<Color>,
    pub position: Option<PositionUpdate>,
    pub board_status: Option<BoardStatus>,
    pub reset_board: bool,
}

impl ServerUpdate {
    /// 帧中是否没有任何有效字段
    pub fn is_empty(&self) -> bool {
        self.player.is_none()
            && self.position.is_none()
            && self.board_status.is_none()
            && !self.reset_board
    }
}

impl TryFrom<ServerMessage> for ServerUpdate {
    type Error = ProtocolError;

    fn try_from(msg: ServerMessage) -> Result<Self> {
        let player = match msg.player_id {
            Some(index) => Some(Color::from_player_index(index).ok_or_else(|| {
                ProtocolError::malformed(format!("player_id out of range: {}", index))
            })?),
            None => None,
        };

        let position = match (msg.board, msg.turn) {
            (Some(fen), Some(turn)) => Some(PositionUpdate { fen, turn }),
            (None, None) => None,
            (Some(_), None) => return Err(ProtocolError::malformed("board without turn")),
            (None, Some(_)) => return Err(ProtocolError::malformed("turn without board")),
        };

        Ok(Self {
            player,
            position,
            board_status: msg.board_status,
            reset_board: msg.reset_board.unwrap_or(false),
        })
    }
}

/// 客户端发送给服务端的消息
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientMessage {
    /// 坐标记法走法，如 `e2e4`、`e7e8q`
    #[serde(rename = "move")]
    pub uci: String,
}

impl ClientMessage {
    /// 走棋意图
    pub fn make_move(mv: &Move) -> Self {
        Self { uci: mv.to_uci() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_player_frame() {
        let msg: ServerMessage = serde_json::from_str(r#"{"player_id": 1}"#).unwrap();
        let update = ServerUpdate::try_from(msg).unwrap();
        assert_eq!(update.player, Some(Color::Black));
        assert!(update.position.is_none());
        assert!(!update.reset_board);
    }

    #[test]
    fn test_decode_combined_frame() {
        let json = r#"{
            "board": "rnbqkbnr/pppppppp/8/8/4P3/8/PPPP1PPP/RNBQKBNR b KQkq e3 0 1",
            "turn": "black",
            "board_status": "check"
        }"#;
        let msg: ServerMessage = serde_json::from_str(json).unwrap();
        let update = ServerUpdate::try_from(msg).unwrap();

        let position = update.position.unwrap();
        assert_eq!(position.turn, Color::Black);
        assert!(position.fen.starts_with("rnbqkbnr/pppppppp/8/8/4P3"));
        assert_eq!(update.board_status, Some(BoardStatus::Check));
    }

    #[test]
    fn test_board_without_turn_is_malformed() {
        let msg: ServerMessage = serde_json::from_str(r#"{"board": "8/8/8/8/8/8/8/8 w - - 0 1"}"#).unwrap();
        let err = ServerUpdate::try_from(msg).unwrap_err();
        assert!(matches!(err, ProtocolError::Malformed { .. }));

        let msg: ServerMessage = serde_json::from_str(r#"{"turn": "white"}"#).unwrap();
        assert!(ServerUpdate::try_from(msg).is_err());
    }

    #[test]
    fn test_player_id_out_of_range() {
        let msg: ServerMessage = serde_json::from_str(r#"{"player_id": 2}"#).unwrap();
        assert!(ServerUpdate::try_from(msg).is_err());
    }

    #[test]
    fn test_unknown_status_fails_decode() {
        let result = serde_json::from_str::<ServerMessage>(r#"{"board_status": "resigned"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_reset_false_is_ignored() {
        let msg: ServerMessage = serde_json::from_str(r#"{"reset_board": false}"#).unwrap();
        let update = ServerUpdate::try_from(msg).unwrap();
        assert!(update.is_empty());
    }

    #[test]
    fn test_client_message_field_name() {
        let mv: Move = "e7e8q".parse().unwrap();
        let json = serde_json::to_string(&ClientMessage::make_move(&mv)).unwrap();
        assert_eq!(json, r#"{"move":"e7e8q"}"#);
    }

    #[test]
    fn test_server_message_bincode() {
        let msg = ServerMessage::position("8/8/8/8/8/8/8/8 w - - 0 1", Color::White);
        let bytes = bincode::serialize(&msg).unwrap();
        let decoded: ServerMessage = bincode::deserialize(&bytes).unwrap();
        assert_eq!(decoded, msg);
    }
}
