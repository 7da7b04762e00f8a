//! 走法表示（坐标记法，如 `e2e4`、`e7e8q`）

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ChessError;
use crate::piece::{Color, PieceKind, Square};

/// 走法
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Move {
    pub from: Square,
    pub to: Square,
    /// 升变目标（仅兵到达底线时）
    pub promotion: Option<PieceKind>,
}

impl Move {
    /// 创建普通走法
    pub fn new(from: Square, to: Square) -> Self {
        Self {
            from,
            to,
            promotion: None,
        }
    }

    /// 创建升变走法
    pub fn with_promotion(from: Square, to: Square, promotion: PieceKind) -> Self {
        Self {
            from,
            to,
            promotion: Some(promotion),
        }
    }

    /// 转换为坐标记法
    pub fn to_uci(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Move {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.from, self.to)?;
        if let Some(kind) = self.promotion {
            write!(f, "{}", kind.to_fen_char(Color::Black))?;
        }
        Ok(())
    }
}

impl FromStr for Move {
    type Err = ChessError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ChessError::InvalidMoveNotation {
            notation: s.to_string(),
        };
        if !s.is_ascii() || !(4..=5).contains(&s.len()) {
            return Err(invalid());
        }
        let from: Square = s[0..2].parse().map_err(|_| invalid())?;
        let to: Square = s[2..4].parse().map_err(|_| invalid())?;
        let promotion = match s[4..].chars().next() {
            None => None,
            Some(c) => match PieceKind::from_fen_char(c.to_ascii_lowercase()) {
                Some((kind, _)) if !matches!(kind, PieceKind::King | PieceKind::Pawn) => Some(kind),
                _ => return Err(invalid()),
            },
        };
        Ok(Self {
            from,
            to,
            promotion,
        })
    }
}
