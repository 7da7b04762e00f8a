//! 输入处理
//!
//! 点击驱动的状态转换：选子、落子、自动取消选择。

use protocol::{ClientMessage, Move, PieceKind, RulesEngine, Square};
use tracing::{debug, info};

use super::{DeselectTimer, GameSession, Notification, Outbox, Selection, SessionPhase};

impl<R: RulesEngine> GameSession<R> {
    /// 处理屏幕点击
    pub fn handle_click(&mut self, x: i32, y: i32) -> Outbox {
        let mut out = Outbox::default();
        if self.ended {
            return out;
        }

        let phase = self.phase();
        if !matches!(
            phase,
            SessionPhase::AwaitingSelection | SessionPhase::PendingMoveConfirmation
        ) {
            debug!("Click ({}, {}) ignored in {:?}", x, y, phase);
            return out;
        }

        // 棋盘外的点击不改变任何状态
        let Some(square) = self.layout.pixel_to_square(x, y, self.orientation) else {
            debug!("Click ({}, {}) outside board", x, y);
            return out;
        };

        match self.selection {
            None => self.select(square, &mut out),
            Some(selection) => self.attempt_move(selection.square, square, &mut out),
        }
        out
    }

    /// 计时器到期，仅当选择仍是同一代时取消
    pub fn handle_deselect_timeout(&mut self, generation: u64) -> Outbox {
        let mut out = Outbox::default();
        match self.selection {
            Some(selection) if !self.ended && selection.generation == generation => {
                debug!("Selection {} timed out", selection.square);
                self.clear_selection();
                out.render = Some(self.render_frame());
            }
            _ => debug!("Stale deselect timer (generation {})", generation),
        }
        out
    }

    /// 选择己方棋子
    fn select(&mut self, square: Square, out: &mut Outbox) {
        let Some(own) = self.identity().color() else {
            return;
        };
        match self.rules.piece_at(&self.board.board, square) {
            Some(piece) if piece.color == own => {
                self.generation += 1;
                self.selection = Some(Selection {
                    square,
                    generation: self.generation,
                });
                debug!("Selected {} ({:?})", square, piece.kind);
                out.deselect = Some(DeselectTimer {
                    generation: self.generation,
                    after: self.deselect_after,
                });
                out.render = Some(self.render_frame());
            }
            Some(piece) if piece.color == own.opponent() => {
                debug!("{} holds an opponent {:?}", square, piece.kind)
            }
            _ => debug!("Nothing selectable on {}", square),
        }
    }

    /// 第二次点击：构造候选走法并校验
    fn attempt_move(&mut self, from: Square, to: Square, out: &mut Outbox) {
        let candidate = self.candidate_move(from, to);
        self.clear_selection();

        if self.rules.is_legal(&self.board.board, &candidate) {
            info!("Sending move {}", candidate);
            out.sends.push(ClientMessage::make_move(&candidate));
            // 不在本地切换走子方，等待服务端下发新局面
            self.move_in_flight = true;
        } else {
            debug!("Illegal move {}", candidate);
            out.notifications.push(Notification::InvalidMove);
        }
        out.render = Some(self.render_frame());
    }

    /// 兵到达底线时自动升变为后
    fn candidate_move(&self, from: Square, to: Square) -> Move {
        let is_pawn = self
            .rules
            .piece_at(&self.board.board, from)
            .is_some_and(|piece| piece.kind == PieceKind::Pawn);
        if is_pawn && to.is_back_rank() {
            Move::with_promotion(from, to, PieceKind::Queen)
        } else {
            Move::new(from, to)
        }
    }
}
