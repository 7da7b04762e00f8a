//! 客户端主循环
//!
//! [`ChessClient`] 是会话状态的唯一持有者：接收循环、写任务、终端输入与取消选择计时器
//! 都只向同一个事件通道投递 [`SessionEvent`]，主循环逐个应用事件，
//! 并在状态转换返回后执行 [`Outbox`] 中的副作用。

use std::time::Duration;

use protocol::{NetworkConfig, RulesEngine};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::board::BoardLayout;
use crate::error::Result;
use crate::game::{DeselectTimer, GameSession, Outbox, SessionEnd, SessionEvent};
use crate::network::{ConnectionHandle, NetworkConnection};
use crate::settings::ClientSettings;
use crate::view::View;

/// 运行参数
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub network: NetworkConfig,
    pub layout: BoardLayout,
    pub deselect_after: Duration,
    pub reconnect_attempts: u32,
    pub reconnect_delay: Duration,
}

impl ClientConfig {
    pub fn from_settings(settings: &ClientSettings) -> Result<Self> {
        Ok(Self {
            network: settings.network()?,
            layout: BoardLayout::new(settings.cell_size),
            deselect_after: settings.deselect_timeout(),
            reconnect_attempts: settings.reconnect_attempts,
            reconnect_delay: settings.reconnect_delay(),
        })
    }
}

/// 国际象棋客户端
pub struct ChessClient<R: RulesEngine + Clone, V: View> {
    config: ClientConfig,
    rules: R,
    view: V,
    events_tx: mpsc::UnboundedSender<SessionEvent>,
    events_rx: mpsc::UnboundedReceiver<SessionEvent>,
    /// 当前的取消选择计时器
    deselect_timer: Option<JoinHandle<()>>,
}

impl<R: RulesEngine + Clone, V: View> ChessClient<R, V> {
    pub fn new(config: ClientConfig, rules: R, view: V) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            config,
            rules,
            view,
            events_tx,
            events_rx,
            deselect_timer: None,
        }
    }

    /// 事件入口（用于投递点击）
    pub fn event_sender(&self) -> mpsc::UnboundedSender<SessionEvent> {
        self.events_tx.clone()
    }

    pub fn view(&self) -> &V {
        &self.view
    }

    /// 连接服务器并运行直到会话结束
    ///
    /// 首次连接失败返回错误；断线后按配置重连，每次重连使用全新的会话。终局不会重连。
    pub async fn run(&mut self) -> Result<SessionEnd> {
        let address = self.config.network.address();
        let format = self.config.network.wire_format;
        let mut attempts_left = self.config.reconnect_attempts;

        let mut connection = NetworkConnection::connect(&address, format, self.events_tx.clone()).await?;
        loop {
            let end = self.run_session(&connection.handle()).await;
            connection.close();

            let reason = match end {
                SessionEnd::Disconnected(reason) if attempts_left > 0 => reason,
                end => {
                    info!("Session ended: {:?}", end);
                    return Ok(end);
                }
            };

            connection = loop {
                attempts_left -= 1;
                info!(
                    "Reconnecting in {:?} ({} attempts left): {}",
                    self.config.reconnect_delay, attempts_left, reason
                );
                tokio::time::sleep(self.config.reconnect_delay).await;
                self.discard_pending_events();

                match NetworkConnection::connect(&address, format, self.events_tx.clone()).await {
                    Ok(connection) => break connection,
                    Err(e) if attempts_left > 0 => warn!("Reconnect failed: {}", e),
                    Err(e) => {
                        warn!("Reconnect failed: {}", e);
                        return Ok(SessionEnd::Disconnected(e.to_string()));
                    }
                }
            };
        }
    }

    /// 在一条连接上运行一个会话
    async fn run_session(&mut self, connection: &ConnectionHandle) -> SessionEnd {
        let mut session = GameSession::new(
            self.rules.clone(),
            self.config.layout,
            self.config.deselect_after,
        );

        let out = session.start();
        if let Some(end) = self.execute(out, connection) {
            return end;
        }

        while let Some(event) = self.events_rx.recv().await {
            debug!("Event: {:?}", event);
            let out = session.handle(event);
            if let Some(end) = self.execute(out, connection) {
                return end;
            }
        }
        // 本结构持有发送端，通道不会在此之前关闭
        SessionEnd::Disconnected("event channel closed".to_string())
    }

    /// 执行一次状态转换的副作用
    fn execute(&mut self, out: Outbox, connection: &ConnectionHandle) -> Option<SessionEnd> {
        for msg in out.sends {
            if let Err(e) = connection.send(msg) {
                warn!("{}", e);
                let _ = self.events_tx.send(SessionEvent::Disconnected {
                    reason: e.to_string(),
                });
            }
        }

        if let Some(frame) = &out.render {
            self.view.render(frame);
        }
        for notification in &out.notifications {
            self.view.notify(notification);
        }

        if let Some(timer) = out.deselect {
            self.schedule_deselect(timer);
        }

        if out.end.is_some() {
            self.cancel_deselect();
        }
        out.end
    }

    fn schedule_deselect(&mut self, timer: DeselectTimer) {
        self.cancel_deselect();
        let events = self.events_tx.clone();
        self.deselect_timer = Some(tokio::spawn(async move {
            tokio::time::sleep(timer.after).await;
            let _ = events.send(SessionEvent::DeselectTimeout {
                generation: timer.generation,
            });
        }));
    }

    fn cancel_deselect(&mut self) {
        if let Some(handle) = self.deselect_timer.take() {
            handle.abort();
        }
    }

    /// 丢弃上一条连接遗留的事件
    fn discard_pending_events(&mut self) {
        let mut dropped = 0;
        while self.events_rx.try_recv().is_ok() {
            dropped += 1;
        }
        if dropped > 0 {
            debug!("Discarded {} stale events", dropped);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use protocol::{
        BoardStatus, ChessRules, ClientMessage, Color, Connection, Listener, ServerMessage,
        TcpListener, WireFormat, INITIAL_FEN,
    };

    use crate::game::{GameStatus, Notification, RenderFrame};

    /// 将渲染与提示转发给测试
    struct RecordingView {
        frames: mpsc::UnboundedSender<RenderFrame>,
        notifications: Vec<Notification>,
    }

    impl View for RecordingView {
        fn render(&mut self, frame: &RenderFrame) {
            let _ = self.frames.send(frame.clone());
        }

        fn notify(&mut self, notification: &Notification) {
            self.notifications.push(notification.clone());
        }
    }

    async fn fake_server() -> (TcpListener, ClientConfig) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();
        let mut settings = ClientSettings::default();
        settings.apply_server_override(&address).unwrap();
        let config = ClientConfig::from_settings(&settings).unwrap();
        (listener, config)
    }

    fn client(config: ClientConfig) -> (ChessClient<ChessRules, RecordingView>, mpsc::UnboundedReceiver<RenderFrame>) {
        let (frames, rx) = mpsc::unbounded_channel();
        let view = RecordingView {
            frames,
            notifications: Vec::new(),
        };
        (ChessClient::new(config, ChessRules, view), rx)
    }

    fn click(layout: &BoardLayout, frame: &RenderFrame, name: &str) -> SessionEvent {
        let (x, y) = layout.square_to_pixel(name.parse().unwrap(), frame.orientation);
        SessionEvent::Click { x, y }
    }

    #[tokio::test]
    async fn test_plays_move_until_checkmate() {
        let (mut listener, config) = fake_server().await;
        let layout = config.layout;
        let (mut client, mut frames) = client(config);
        let clicks = client.event_sender();

        let server = tokio::spawn(async move {
            let mut conn = listener.accept().await.unwrap();
            let opening = ServerMessage {
                player_id: Some(0),
                ..ServerMessage::position(INITIAL_FEN, Color::White)
            };
            conn.send(&opening).await.unwrap();

            let mv: ClientMessage = conn.recv().await.unwrap();
            conn.send(&ServerMessage::status(BoardStatus::Checkmate)).await.unwrap();
            mv
        });

        let driver = tokio::spawn(async move {
            while let Some(frame) = frames.recv().await {
                if frame.player == Some(Color::White) {
                    clicks.send(click(&layout, &frame, "e2")).unwrap();
                    clicks.send(click(&layout, &frame, "e4")).unwrap();
                    break;
                }
            }
        });

        let end = client.run().await.unwrap();
        assert_eq!(end, SessionEnd::GameOver(GameStatus::Checkmate));
        assert_eq!(server.await.unwrap().uci, "e2e4");
        driver.await.unwrap();

        let notifications = &client.view().notifications;
        assert_eq!(notifications.first(), Some(&Notification::GameStart));
        assert_eq!(notifications.last(), Some(&Notification::Checkmate));
    }

    #[tokio::test]
    async fn test_disconnect_ends_session() {
        let (mut listener, config) = fake_server().await;
        let (mut client, _frames) = client(config);

        tokio::spawn(async move {
            let mut conn = listener.accept().await.unwrap();
            conn.send(&ServerMessage::player(Color::Black)).await.unwrap();
            conn.close().await.unwrap();
        });

        let end = client.run().await.unwrap();
        assert!(matches!(end, SessionEnd::Disconnected(_)));
        assert!(matches!(
            client.view().notifications.last(),
            Some(Notification::Disconnected { .. })
        ));
    }

    #[tokio::test]
    async fn test_reconnects_with_fresh_session() {
        let (mut listener, mut config) = fake_server().await;
        config.reconnect_attempts = 1;
        config.reconnect_delay = Duration::from_millis(10);
        let (mut client, _frames) = client(config);

        tokio::spawn(async move {
            let mut first = listener.accept().await.unwrap();
            first.send(&ServerMessage::player(Color::White)).await.unwrap();
            first.close().await.unwrap();

            let mut second = listener.accept().await.unwrap();
            second.send(&ServerMessage::player(Color::Black)).await.unwrap();
            second.send(&ServerMessage::status(BoardStatus::Stalemate)).await.unwrap();
            // 保持连接直到客户端关闭
            let _ = second.recv::<ClientMessage>().await;
        });

        let end = client.run().await.unwrap();
        assert_eq!(end, SessionEnd::GameOver(GameStatus::Stalemate));

        let starts = client
            .view()
            .notifications
            .iter()
            .filter(|n| **n == Notification::GameStart)
            .count();
        assert_eq!(starts, 2);
    }

    #[tokio::test]
    async fn test_connect_failure_is_error() {
        let (listener, config) = fake_server().await;
        drop(listener);
        let (mut client, _frames) = client(config);
        assert!(client.run().await.is_err());
    }

    #[test]
    fn test_config_from_settings() {
        let settings = ClientSettings {
            wire_format: WireFormat::Bincode,
            cell_size: 50,
            ..ClientSettings::default()
        };
        let config = ClientConfig::from_settings(&settings).unwrap();
        assert_eq!(config.network.address(), "127.0.0.1:5555");
        assert_eq!(config.network.wire_format, WireFormat::Bincode);
        assert_eq!(config.layout.board_size(), 400);
        assert_eq!(config.deselect_after, Duration::from_secs(3));
    }
}
