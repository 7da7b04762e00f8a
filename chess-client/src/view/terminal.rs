//! 终端显示与输入
//!
//! 以 Unicode 字符绘制棋盘。输入每行一个格子名（如 `e2`）或像素坐标（如 `337 487`），
//! 格子名按当前视角换算成该格中心的像素坐标，与鼠标点击走同一条路径。

use std::fmt::Write as _;
use std::io::{BufRead, Write};

use protocol::BOARD_SIZE;
use tokio::sync::{mpsc, watch};
use tracing::{debug, warn};

use super::View;
use crate::board::{BoardLayout, Orientation};
use crate::game::{GameStatus, Notification, RenderFrame, SessionEvent};

/// 将画面绘制为文本
pub fn draw_board(frame: &RenderFrame, layout: &BoardLayout) -> String {
    let size = BOARD_SIZE as i32;
    let cell = layout.cell_size();
    let centre = |index: i32| index * cell + cell / 2;

    let mut text = String::new();
    let player = frame.player.map_or("-".to_string(), |c| c.to_string());
    let _ = write!(text, "You: {}  Turn: {}", player, frame.turn);
    match frame.status {
        GameStatus::InProgress => {}
        status => {
            let _ = write!(text, "  [{:?}]", status);
        }
    }
    text.push('\n');

    for row in 0..size {
        for col in 0..size {
            let Some(square) = layout.pixel_to_square(centre(col), centre(row), frame.orientation)
            else {
                continue;
            };
            if col == 0 {
                let _ = write!(text, "{} ", square.rank() + 1);
            }
            let symbol = frame.piece_at(square).map_or('·', |p| p.symbol());
            if frame.highlighted == Some(square) {
                let _ = write!(text, "[{}]", symbol);
            } else {
                let _ = write!(text, " {} ", symbol);
            }
        }
        text.push('\n');
    }

    text.push_str("  ");
    for col in 0..size {
        if let Some(square) = layout.pixel_to_square(centre(col), centre(size - 1), frame.orientation)
        {
            let _ = write!(text, " {} ", (b'a' + square.file()) as char);
        }
    }
    text.push('\n');
    text
}

/// 终端视图
pub struct TerminalView<W: Write + Send> {
    out: W,
    layout: BoardLayout,
    /// 最近一次绘制的视角，供输入线程换算格子名
    orientation: watch::Sender<Orientation>,
}

impl<W: Write + Send> TerminalView<W> {
    pub fn new(out: W, layout: BoardLayout) -> (Self, watch::Receiver<Orientation>) {
        let (orientation, rx) = watch::channel(Orientation::default());
        (
            Self {
                out,
                layout,
                orientation,
            },
            rx,
        )
    }

    fn write(&mut self, text: &str) {
        if let Err(e) = self.out.write_all(text.as_bytes()).and_then(|_| self.out.flush()) {
            warn!("Terminal write failed: {}", e);
        }
    }
}

impl TerminalView<std::io::Stdout> {
    pub fn stdout(layout: BoardLayout) -> (Self, watch::Receiver<Orientation>) {
        Self::new(std::io::stdout(), layout)
    }
}

impl<W: Write + Send> View for TerminalView<W> {
    fn render(&mut self, frame: &RenderFrame) {
        self.orientation.send_replace(frame.orientation);
        let text = draw_board(frame, &self.layout);
        self.write(&text);
    }

    fn notify(&mut self, notification: &Notification) {
        let text = format!("== {} == {}\n", notification.title(), notification.message());
        self.write(&text);
    }
}

/// 解析一行输入为点击坐标
pub fn parse_click(line: &str, layout: &BoardLayout, orientation: Orientation) -> Option<(i32, i32)> {
    let line = line.trim();
    if let Ok(square) = line.parse() {
        return Some(layout.square_to_pixel(square, orientation));
    }
    let mut parts = line.split_whitespace();
    let x = parts.next()?.parse().ok()?;
    let y = parts.next()?.parse().ok()?;
    if parts.next().is_some() {
        return None;
    }
    Some((x, y))
}

/// 逐行读取输入并转换为点击事件，输入结束或会话关闭时返回
pub fn read_input<B: BufRead>(
    input: B,
    layout: BoardLayout,
    orientation: &watch::Receiver<Orientation>,
    events: &mpsc::UnboundedSender<SessionEvent>,
) {
    for line in input.lines() {
        let Ok(line) = line else {
            break;
        };
        if line.trim().is_empty() {
            continue;
        }
        let current = *orientation.borrow();
        match parse_click(&line, &layout, current) {
            Some((x, y)) => {
                if events.send(SessionEvent::Click { x, y }).is_err() {
                    break;
                }
            }
            None => debug!("Unrecognised input: {:?}", line),
        }
    }
}

/// 在独立线程中读取标准输入
pub fn spawn_stdin_input(
    layout: BoardLayout,
    orientation: watch::Receiver<Orientation>,
    events: mpsc::UnboundedSender<SessionEvent>,
) -> std::thread::JoinHandle<()> {
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        read_input(stdin.lock(), layout, &orientation, &events);
        debug!("Terminal input closed");
    })
}
