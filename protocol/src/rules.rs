//! 规则引擎抽象
//!
//! 客户端只需要四种能力：加载局面、查询格子上的棋子、判断走法合法性、导出 FEN。
//! 具体规则由 [`ChessRules`] 委托给 `chess` crate 实现。

use std::str::FromStr;

use crate::error::ChessError;
use crate::moves::Move;
use crate::piece::{Color, Piece, PieceKind, Square};

/// 规则引擎能力
pub trait RulesEngine: Send + 'static {
    /// 引擎内部的棋盘表示
    type Board: Clone + Send;

    /// 标准开局局面
    fn start_position(&self) -> Self::Board;

    /// 从 FEN 加载局面
    fn load_position(&self, fen: &str) -> Result<Self::Board, ChessError>;

    /// 查询格子上的棋子
    fn piece_at(&self, board: &Self::Board, square: Square) -> Option<Piece>;

    /// 走法在当前局面下是否合法（含不可送将）
    fn is_legal(&self, board: &Self::Board, mv: &Move) -> bool;

    /// 导出 FEN
    fn to_fen(&self, board: &Self::Board) -> String;
}

/// 基于 `chess` crate 的规则引擎
#[derive(Debug, Clone, Copy, Default)]
pub struct ChessRules;

impl ChessRules {
    fn to_engine_square(square: Square) -> chess::Square {
        chess::Square::make_square(
            chess::Rank::from_index(square.rank() as usize),
            chess::File::from_index(square.file() as usize),
        )
    }

    fn to_engine_piece(kind: PieceKind) -> chess::Piece {
        match kind {
            PieceKind::King => chess::Piece::King,
            PieceKind::Queen => chess::Piece::Queen,
            PieceKind::Rook => chess::Piece::Rook,
            PieceKind::Bishop => chess::Piece::Bishop,
            PieceKind::Knight => chess::Piece::Knight,
            PieceKind::Pawn => chess::Piece::Pawn,
        }
    }

    fn from_engine_piece(piece: chess::Piece) -> PieceKind {
        match piece {
            chess::Piece::King => PieceKind::King,
            chess::Piece::Queen => PieceKind::Queen,
            chess::Piece::Rook => PieceKind::Rook,
            chess::Piece::Bishop => PieceKind::Bishop,
            chess::Piece::Knight => PieceKind::Knight,
            chess::Piece::Pawn => PieceKind::Pawn,
        }
    }
}

impl RulesEngine for ChessRules {
    type Board = chess::Board;

    fn start_position(&self) -> chess::Board {
        chess::Board::default()
    }

    fn load_position(&self, fen: &str) -> Result<chess::Board, ChessError> {
        let invalid = |reason: String| ChessError::InvalidFen { reason };
        let builder = chess::BoardBuilder::from_str(fen).map_err(|e| invalid(e.to_string()))?;

        // chess::Board 在缺少王的局面上计算将军时会越界，必须先行拒绝
        for color in [chess::Color::White, chess::Color::Black] {
            let kings = chess::ALL_SQUARES
                .iter()
                .filter(|&&sq| builder[sq] == Some((chess::Piece::King, color)))
                .count();
            if kings != 1 {
                return Err(invalid(format!("{:?} has {} kings", color, kings)));
            }
        }

        chess::Board::try_from(builder).map_err(|e| invalid(e.to_string()))
    }

    fn piece_at(&self, board: &chess::Board, square: Square) -> Option<Piece> {
        let sq = Self::to_engine_square(square);
        let kind = Self::from_engine_piece(board.piece_on(sq)?);
        let color = match board.color_on(sq)? {
            chess::Color::White => Color::White,
            chess::Color::Black => Color::Black,
        };
        Some(Piece::new(kind, color))
    }

    fn is_legal(&self, board: &chess::Board, mv: &Move) -> bool {
        let candidate = chess::ChessMove::new(
            Self::to_engine_square(mv.from),
            Self::to_engine_square(mv.to),
            mv.promotion.map(Self::to_engine_piece),
        );
        board.legal(candidate)
    }

    fn to_fen(&self, board: &chess::Board) -> String {
        board.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::INITIAL_FEN;

    fn sq(name: &str) -> Square {
        name.parse().unwrap()
    }

    #[test]
    fn test_start_position_pieces() {
        let rules = ChessRules;
        let board = rules.start_position();

        assert_eq!(
            rules.piece_at(&board, sq("e1")),
            Some(Piece::new(PieceKind::King, Color::White))
        );
        assert_eq!(
            rules.piece_at(&board, sq("d8")),
            Some(Piece::new(PieceKind::Queen, Color::Black))
        );
        assert_eq!(rules.piece_at(&board, sq("e4")), None);
    }

    #[test]
    fn test_load_position_matches_start() {
        let rules = ChessRules;
        let loaded = rules.load_position(INITIAL_FEN).unwrap();
        assert!(loaded == rules.start_position());
    }

    #[test]
    fn test_rejects_missing_or_extra_kings() {
        let rules = ChessRules;
        for fen in [
            "8/8/8/8/8/8/8/8 w - - 0 1",
            "4k3/8/8/8/8/8/8/8 w - - 0 1",
            "8/8/8/8/8/8/8/4K3 b - - 0 1",
            "k6k/8/8/8/8/8/8/4K3 w - - 0 1",
        ] {
            let err = rules.load_position(fen).err().unwrap();
            assert!(matches!(err, ChessError::InvalidFen { .. }), "{}", fen);
        }
    }

    #[test]
    fn test_invalid_fen() {
        let rules = ChessRules;
        let err = rules.load_position("not a fen").err().unwrap();
        assert!(matches!(err, ChessError::InvalidFen { .. }));
    }

    #[test]
    fn test_legal_moves() {
        let rules = ChessRules;
        let board = rules.start_position();

        assert!(rules.is_legal(&board, &Move::new(sq("e2"), sq("e4"))));
        assert!(rules.is_legal(&board, &Move::new(sq("g1"), sq("f3"))));
        assert!(!rules.is_legal(&board, &Move::new(sq("e2"), sq("e5"))));
        // 黑方不能在白方回合走棋
        assert!(!rules.is_legal(&board, &Move::new(sq("e7"), sq("e5"))));
    }

    #[test]
    fn test_promotion_requires_piece() {
        let rules = ChessRules;
        let board = rules.load_position("k7/4P3/8/8/8/8/8/4K3 w - - 0 1").unwrap();

        assert!(!rules.is_legal(&board, &Move::new(sq("e7"), sq("e8"))));
        assert!(rules.is_legal(
            &board,
            &Move::with_promotion(sq("e7"), sq("e8"), PieceKind::Queen)
        ));
    }

    #[test]
    fn test_fen_roundtrip() {
        let rules = ChessRules;
        let fen = "k7/4P3/8/8/8/8/8/4K3 w - - 0 1";
        let board = rules.load_position(fen).unwrap();
        let dumped = rules.to_fen(&board);
        assert!(rules.load_position(&dumped).unwrap() == board);
    }
}
