//! 显示层
//!
//! 会话只通过 [`View`] 下达渲染与提示命令；点击以 `SessionEvent::Click` 的形式回到会话。

mod terminal;

pub use terminal::*;

pub use crate::game::{Notification, RenderFrame};

/// 显示接口
pub trait View: Send {
    /// 绘制棋盘（含选中高亮）
    fn render(&mut self, frame: &RenderFrame);

    /// 弹出提示
    fn notify(&mut self, notification: &Notification);
}
