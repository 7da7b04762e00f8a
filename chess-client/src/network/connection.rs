//! 网络连接管理
//!
//! 连接建立后拆分为读写两端：读端在独立任务中循环接收服务端帧，
//! 写端任务从无界队列中取出待发送的消息。两个任务都只通过事件通道与会话交互。

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use protocol::{
    ClientMessage, Connector, FrameReader, FrameWriter, ProtocolError, ServerMessage,
    ServerUpdate, TcpConnector, WireFormat,
};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::error::{ClientError, Result};
use crate::game::SessionEvent;

/// 断线通知，每条连接最多上报一次
#[derive(Clone)]
struct DisconnectNotifier {
    events: mpsc::UnboundedSender<SessionEvent>,
    reported: Arc<AtomicBool>,
}

impl DisconnectNotifier {
    fn report(&self, reason: String) {
        if self.reported.swap(true, Ordering::SeqCst) {
            return;
        }
        let _ = self.events.send(SessionEvent::Disconnected { reason });
    }
}

fn disconnect_reason(e: &ProtocolError) -> String {
    match e {
        ProtocolError::ConnectionClosed => "server closed the connection".to_string(),
        other => other.to_string(),
    }
}

/// 发送句柄，可在任务间克隆
#[derive(Clone, Debug)]
pub struct ConnectionHandle {
    outgoing: mpsc::UnboundedSender<ClientMessage>,
}

impl ConnectionHandle {
    /// 放入写队列，写端已关闭时返回 [`ClientError::Send`]
    pub fn send(&self, msg: ClientMessage) -> Result<()> {
        self.outgoing.send(msg).map_err(|_| ClientError::Send)
    }}

/// 与服务端的一条连接
pub struct NetworkConnection {
    handle: ConnectionHandle,
    reader_task: JoinHandle<()>,
    writer_task: JoinHandle<()>,
}

impl NetworkConnection {
    /// 连接服务器并启动读写任务
    pub async fn connect(
        address: &str,
        format: WireFormat,
        events: mpsc::UnboundedSender<SessionEvent>,
    ) -> Result<Self> {
        let conn = TcpConnector::new(format)
            .connect(address)
            .await
            .map_err(|source| ClientError::Connect {
                address: address.to_string(),
                source,
            })?;
        info!("Connected to server: {}", address);

        let (reader, writer) = conn.split();
        Ok(Self::spawn(reader, writer, events))
    }

    /// 在已拆分的读写端上启动任务
    pub fn spawn<R, W>(
        reader: FrameReader<R>,
        writer: FrameWriter<W>,
        events: mpsc::UnboundedSender<SessionEvent>,
    ) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let notifier = DisconnectNotifier {
            events,
            reported: Arc::new(AtomicBool::new(false)),
        };
        let (outgoing, queue) = mpsc::unbounded_channel();

        let reader_task = tokio::spawn(receive_loop(reader, notifier.clone()));
        let writer_task = tokio::spawn(write_loop(writer, queue, notifier));

        Self {
            handle: ConnectionHandle { outgoing },
            reader_task,
            writer_task,
        }
    }

    /// 写队列句柄，发送不等待写入完成
    pub fn handle(&self) -> ConnectionHandle {
        self.handle.clone()
    }

    /// 关闭连接，丢弃两端
    pub fn close(&self) {
        debug!("Closing connection");
        self.reader_task.abort();
        self.writer_task.abort();
    }
}

impl Drop for NetworkConnection {
    fn drop(&mut self) {
        self.close();
    }
}

/// 接收循环：解码、校验、转发，出错时上报断线并退出
async fn receive_loop<R>(mut reader: FrameReader<R>, notifier: DisconnectNotifier)
where
    R: AsyncRead + Unpin + Send,
{
    loop {
        let update = reader
            .read_frame::<ServerMessage>()
            .await
            .and_then(ServerUpdate::try_from);

        match update {
            Ok(update) => {
                debug!("Received: {:?}", update);
                if notifier.events.send(SessionEvent::Server(update)).is_err() {
                    debug!("Session gone, stopping receive loop");
                    return;
                }
            }
            Err(e) => {
                match &e {
                    ProtocolError::ConnectionClosed => info!("Server closed the connection"),
                    ProtocolError::Malformed { .. } | ProtocolError::Json(_) | ProtocolError::Bincode(_) => {
                        warn!("Malformed server message: {}", e)
                    }
                    _ => error!("Receive error: {}", e),
                }
                notifier.report(disconnect_reason(&e));
                return;
            }
        }
    }
}

/// 写循环：队列关闭时正常结束，写失败时上报断线
async fn write_loop<W>(
    mut writer: FrameWriter<W>,
    mut queue: mpsc::UnboundedReceiver<ClientMessage>,
    notifier: DisconnectNotifier,
) where
    W: AsyncWrite + Unpin + Send,
{
    while let Some(msg) = queue.recv().await {
        debug!("Sending: {:?}", msg);
        if let Err(e) = writer.write_frame(&msg).await {
            error!("Failed to send message: {}", e);
            notifier.report(format!("send failed: {}", e));
            return;
        }
    }
    let _ = writer.shutdown().await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use protocol::{Color, Listener, Connection, TcpListener, INITIAL_FEN};
    use tokio::io::{duplex, split, DuplexStream, ReadHalf, WriteHalf};

    type Server = (FrameReader<ReadHalf<DuplexStream>>, FrameWriter<WriteHalf<DuplexStream>>);

    fn pair() -> (NetworkConnection, Server, mpsc::UnboundedReceiver<SessionEvent>) {
        let (client, server) = duplex(4096);
        let (cr, cw) = split(client);
        let (sr, sw) = split(server);
        let (tx, rx) = mpsc::unbounded_channel();
        let conn = NetworkConnection::spawn(
            FrameReader::new(cr, WireFormat::Json),
            FrameWriter::new(cw, WireFormat::Json),
            tx,
        );
        let server = (
            FrameReader::new(sr, WireFormat::Json),
            FrameWriter::new(sw, WireFormat::Json),
        );
        (conn, server, rx)
    }

    #[tokio::test]
    async fn test_forwards_validated_updates() {
        let (_conn, (_sr, mut sw), mut events) = pair();

        let frame = ServerMessage {
            player_id: Some(1),
            ..ServerMessage::position(INITIAL_FEN, Color::White)
        };
        sw.write_frame(&frame).await.unwrap();

        match events.recv().await.unwrap() {
            SessionEvent::Server(update) => {
                assert_eq!(update.player, Some(Color::Black));
                assert_eq!(update.position.unwrap().turn, Color::White);
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_malformed_frame_disconnects_once() {
        let (conn, (_sr, mut sw), mut events) = pair();

        let frame = ServerMessage {
            board: Some(INITIAL_FEN.to_string()),
            ..ServerMessage::default()
        };
        sw.write_frame(&frame).await.unwrap();
        sw.write_frame(&ServerMessage::reset()).await.unwrap();

        match events.recv().await.unwrap() {
            SessionEvent::Disconnected { reason } => assert!(reason.contains("board without turn")),
            other => panic!("unexpected event: {:?}", other),
        }
        // 接收循环已退出，后续的 reset 帧不会被转发
        drop(conn);
        assert!(events.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_eof_reports_disconnect() {
        let (_conn, server, mut events) = pair();
        drop(server);

        match events.recv().await.unwrap() {
            SessionEvent::Disconnected { reason } => {
                assert_eq!(reason, "server closed the connection")
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_send_move() {
        let (conn, (mut sr, _sw), _events) = pair();

        conn.handle().send(ClientMessage { uci: "e2e4".to_string() }).unwrap();
        let received: serde_json::Value = sr.read_frame().await.unwrap();
        assert_eq!(received, serde_json::json!({ "move": "e2e4" }));
    }

    #[tokio::test]
    async fn test_close_drops_socket() {
        let (conn, (mut sr, _sw), _events) = pair();
        conn.close();

        let result = sr.read_frame::<ClientMessage>().await;
        assert!(matches!(result, Err(ProtocolError::ConnectionClosed)));
    }

    #[tokio::test]
    async fn test_connect_over_tcp() {
        let mut listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();

        let (tx, _rx) = mpsc::unbounded_channel();
        let conn = NetworkConnection::connect(&address, WireFormat::Json, tx)
            .await
            .unwrap();
        let mut server_side = listener.accept().await.unwrap();

        conn.handle().send(ClientMessage { uci: "g1f3".to_string() }).unwrap();
        let msg: ClientMessage = server_side.recv().await.unwrap();
        assert_eq!(msg.uci, "g1f3");
    }

    #[tokio::test]
    async fn test_connect_refused() {
        let address = {
            let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap().to_string()
        };

        let (tx, _rx) = mpsc::unbounded_channel();
        let result = NetworkConnection::connect(&address, WireFormat::Json, tx).await;
        assert!(matches!(result, Err(ClientError::Connect { .. })));
    }
}
