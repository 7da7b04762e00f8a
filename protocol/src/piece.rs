//! 棋子定义

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::constants::BOARD_SIZE;
use crate::error::ChessError;

/// 棋子类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PieceKind {
    King,
    Queen,
    Rook,
    Bishop,
    Knight,
    Pawn,
}

impl PieceKind {
    /// 获取 FEN 字符（白方大写，黑方小写）
    pub fn to_fen_char(&self, color: Color) -> char {
        let c = match self {
            PieceKind::King => 'k',
            PieceKind::Queen => 'q',
            PieceKind::Rook => 'r',
            PieceKind::Bishop => 'b',
            PieceKind::Knight => 'n',
            PieceKind::Pawn => 'p',
        };
        match color {
            Color::White => c.to_ascii_uppercase(),
            Color::Black => c,
        }
    }

    /// 从 FEN 字符解析
    pub fn from_fen_char(c: char) -> Option<(PieceKind, Color)> {
        let color = if c.is_ascii_uppercase() {
            Color::White
        } else {
            Color::Black
        };
        let kind = match c.to_ascii_lowercase() {
            'k' => PieceKind::King,
            'q' => PieceKind::Queen,
            'r' => PieceKind::Rook,
            'b' => PieceKind::Bishop,
            'n' => PieceKind::Knight,
            'p' => PieceKind::Pawn,
            _ => return None,
        };
        Some((kind, color))
    }
}

/// 阵营
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Color {
    /// 白方（先手）
    White,
    /// 黑方（后手）
    Black,
}

impl Color {
    /// 获取对方阵营
    pub fn opponent(&self) -> Color {
        match self {
            Color::White => Color::Black,
            Color::Black => Color::White,
        }
    }

    /// 服务端分配的玩家编号（0 = 白方，1 = 黑方）
    pub fn from_player_index(index: u8) -> Option<Color> {
        match index {
            0 => Some(Color::White),
            1 => Some(Color::Black),
            _ => None,
        }
    }

    /// 转换为服务端玩家编号
    pub fn player_index(&self) -> u8 {
        match self {
            Color::White => 0,
            Color::Black => 1,
        }
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Color::White => f.write_str("White"),
            Color::Black => f.write_str("Black"),
        }
    }
}

/// 棋子
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Piece {
    pub kind: PieceKind,
    pub color: Color,
}

impl Piece {
    /// 创建新棋子
    pub fn new(kind: PieceKind, color: Color) -> Self {
        Self { kind, color }
    }

    /// 获取棋子的 Unicode 符号
    pub fn symbol(&self) -> char {
        match (self.kind, self.color) {
            (PieceKind::King, Color::White) => '♔',
            (PieceKind::Queen, Color::White) => '♕',
            (PieceKind::Rook, Color::White) => '♖',
            (PieceKind::Bishop, Color::White) => '♗',
            (PieceKind::Knight, Color::White) => '♘',
            (PieceKind::Pawn, Color::White) => '♙',
            (PieceKind::King, Color::Black) => '♚',
            (PieceKind::Queen, Color::Black) => '♛',
            (PieceKind::Rook, Color::Black) => '♜',
            (PieceKind::Bishop, Color::Black) => '♝',
            (PieceKind::Knight, Color::Black) => '♞',
            (PieceKind::Pawn, Color::Black) => '♟',
        }
    }
}

/// 棋盘格子
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Square {
    /// 列 (0-7, a-h)
    file: u8,
    /// 行 (0-7, 1-8)
    rank: u8,
}

impl Square {
    /// 创建格子，越界时返回 None
    pub fn new(file: u8, rank: u8) -> Option<Self> {
        if file < BOARD_SIZE && rank < BOARD_SIZE {
            Some(Self { file, rank })
        } else {
            None
        }
    }

    pub fn file(&self) -> u8 {
        self.file
    }

    pub fn rank(&self) -> u8 {
        self.rank
    }

    /// 是否位于底线（第 1 或第 8 行）
    pub fn is_back_rank(&self) -> bool {
        self.rank == 0 || self.rank == BOARD_SIZE - 1
    }

    /// 转换为数组索引（a1 = 0, h8 = 63）
    pub fn to_index(&self) -> usize {
        self.rank as usize * BOARD_SIZE as usize + self.file as usize
    }

    /// 按 a1, b1, ..., h8 顺序遍历全部 64 格
    pub fn all() -> impl Iterator<Item = Square> {
        (0..BOARD_SIZE).flat_map(|rank| (0..BOARD_SIZE).map(move |file| Square { file, rank }))
    }
}

impl fmt::Display for Square {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{}",
            (b'a' + self.file) as char,
            (b'1' + self.rank) as char
        )
    }
}

impl FromStr for Square {
    type Err = ChessError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ChessError::InvalidSquareName {
            name: s.to_string(),
        };
        let bytes = s.as_bytes();
        if bytes.len() != 2 {
            return Err(invalid());
        }
        let file = bytes[0].to_ascii_lowercase().wrapping_sub(b'a');
        let rank = bytes[1].wrapping_sub(b'1');
        Square::new(file, rank).ok_or_else(invalid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_piece_symbol() {
        assert_eq!(Piece::new(PieceKind::King, Color::White).symbol(), '♔');
        assert_eq!(Piece::new(PieceKind::Pawn, Color::Black).symbol(), '♟');
    }

    #[test]
    fn test_piece_kind_fen_char() {
        assert_eq!(PieceKind::Queen.to_fen_char(Color::White), 'Q');
        assert_eq!(PieceKind::from_fen_char('n'), Some((PieceKind::Knight, Color::Black)));
        assert_eq!(PieceKind::from_fen_char('x'), None);
    }

    #[test]
    fn test_square_name() {
        let e2 = Square::new(4, 1).unwrap();
        assert_eq!(e2.to_string(), "e2");
        assert_eq!("e2".parse::<Square>().unwrap(), e2);
        assert_eq!("H8".parse::<Square>().unwrap(), Square::new(7, 7).unwrap());

        assert!("i1".parse::<Square>().is_err());
        assert!("a9".parse::<Square>().is_err());
        assert!("e".parse::<Square>().is_err());
        assert!("e10".parse::<Square>().is_err());
    }

    #[test]
    fn test_square_bounds() {
        assert!(Square::new(0, 0).is_some());
        assert!(Square::new(7, 7).is_some());
        assert!(Square::new(8, 0).is_none());
        assert!(Square::new(0, 8).is_none());
        assert_eq!(Square::all().count(), 64);
        assert_eq!(Square::new(7, 7).unwrap().to_index(), 63);
    }

    #[test]
    fn test_color_opponent() {
        assert_eq!(Color::White.opponent(), Color::Black);
        assert_eq!(Color::Black.opponent(), Color::White);
    }

    #[test]
    fn test_player_index() {
        assert_eq!(Color::from_player_index(0), Some(Color::White));
        assert_eq!(Color::from_player_index(1), Some(Color::Black));
        assert_eq!(Color::from_player_index(2), None);
        assert_eq!(Color::Black.player_index(), 1);
    }
}
