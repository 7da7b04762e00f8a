//! 棋盘坐标映射
//!
//! 屏幕像素与棋盘格子之间的相互转换。像素原点在棋盘左上角，
//! 白方视角下 a8 在左上、h1 在右下；黑方视角整体旋转 180°。

use protocol::{Color, Square, BOARD_SIZE};

/// 默认格子边长（像素）
pub const DEFAULT_CELL_SIZE: u32 = 75;

/// 棋盘视角
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Orientation {
    /// 白方在下
    #[default]
    WhiteBottom,
    /// 黑方在下（棋盘翻转）
    BlackBottom,
}

impl Orientation {
    /// 执棋方看到的视角
    pub fn for_player(color: Color) -> Self {
        match color {
            Color::White => Orientation::WhiteBottom,
            Color::Black => Orientation::BlackBottom,
        }
    }
}

/// 棋盘布局配置
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoardLayout {
    /// 格子边长
    cell_size: i32,
}

impl Default for BoardLayout {
    fn default() -> Self {
        Self::new(DEFAULT_CELL_SIZE)
    }
}

impl BoardLayout {
    pub fn new(cell_size: u32) -> Self {
        Self {
            cell_size: cell_size.clamp(1, i32::MAX as u32 / BOARD_SIZE as u32) as i32,
        }
    }

    pub fn cell_size(&self) -> i32 {
        self.cell_size
    }

    /// 棋盘边长（像素）
    pub fn board_size(&self) -> i32 {
        self.cell_size * BOARD_SIZE as i32
    }

    /// 格子在屏幕上的行列（row 0 为顶部）
    fn cell_of(square: Square, orientation: Orientation) -> (i32, i32) {
        let last = BOARD_SIZE as i32 - 1;
        let (file, rank) = (square.file() as i32, square.rank() as i32);
        match orientation {
            Orientation::WhiteBottom => (file, last - rank),
            Orientation::BlackBottom => (last - file, rank),
        }
    }

    /// 将格子转换为其中心点的屏幕坐标
    pub fn square_to_pixel(&self, square: Square, orientation: Orientation) -> (i32, i32) {
        let (col, row) = Self::cell_of(square, orientation);
        let half = self.cell_size / 2;
        (col * self.cell_size + half, row * self.cell_size + half)
    }

    /// 将屏幕坐标转换为格子，棋盘外返回 None
    pub fn pixel_to_square(&self, x: i32, y: i32, orientation: Orientation) -> Option<Square> {
        if x < 0 || y < 0 || x >= self.board_size() || y >= self.board_size() {
            return None;
        }
        let last = BOARD_SIZE as i32 - 1;
        let (col, row) = (x / self.cell_size, y / self.cell_size);
        let (file, rank) = match orientation {
            Orientation::WhiteBottom => (col, last - row),
            Orientation::BlackBottom => (last - col, row),
        };
        Square::new(file as u8, rank as u8)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sq(name: &str) -> Square {
        name.parse().unwrap()
    }

    #[test]
    fn test_roundtrip_all_squares() {
        for cell_size in [1, 2, 75, 100] {
            let layout = BoardLayout::new(cell_size);
            for orientation in [Orientation::WhiteBottom, Orientation::BlackBottom] {
                for square in Square::all() {
                    let (x, y) = layout.square_to_pixel(square, orientation);
                    assert_eq!(
                        layout.pixel_to_square(x, y, orientation),
                        Some(square),
                        "cell_size={} orientation={:?} square={}",
                        cell_size,
                        orientation,
                        square
                    );
                }
            }
        }
    }

    #[test]
    fn test_white_bottom_corners() {
        let layout = BoardLayout::default();
        assert_eq!(layout.pixel_to_square(0, 0, Orientation::WhiteBottom), Some(sq("a8")));
        assert_eq!(layout.pixel_to_square(599, 599, Orientation::WhiteBottom), Some(sq("h1")));
        assert_eq!(layout.pixel_to_square(74, 74, Orientation::WhiteBottom), Some(sq("a8")));
        assert_eq!(layout.pixel_to_square(75, 74, Orientation::WhiteBottom), Some(sq("b8")));
        assert_eq!(layout.square_to_pixel(sq("e2"), Orientation::WhiteBottom), (337, 487));
    }

    #[test]
    fn test_black_bottom_is_rotated() {
        let layout = BoardLayout::default();
        assert_eq!(layout.pixel_to_square(0, 0, Orientation::BlackBottom), Some(sq("h1")));
        assert_eq!(layout.pixel_to_square(599, 599, Orientation::BlackBottom), Some(sq("a8")));
        assert_eq!(layout.square_to_pixel(sq("e7"), Orientation::BlackBottom), (262, 487));
    }

    #[test]
    fn test_outside_board() {
        let layout = BoardLayout::default();
        assert_eq!(layout.pixel_to_square(-1, 10, Orientation::WhiteBottom), None);
        assert_eq!(layout.pixel_to_square(10, -1, Orientation::BlackBottom), None);
        assert_eq!(layout.pixel_to_square(600, 10, Orientation::WhiteBottom), None);
        assert_eq!(layout.pixel_to_square(10, 600, Orientation::BlackBottom), None);
    }

    #[test]
    fn test_orientation_for_player() {
        assert_eq!(Orientation::for_player(Color::White), Orientation::WhiteBottom);
        assert_eq!(Orientation::for_player(Color::Black), Orientation::BlackBottom);
    }
}
