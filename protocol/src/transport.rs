//! 传输层
//!
//! Connector/Connection/Listener traits 将会话逻辑与具体传输解耦，客户端使用 TCP 实现。
//!
//! 帧格式：
//!
//! ```text
//! +---------+----------------+-----------------+
//! | version | length (u32 BE) | payload         |
//! | 1 byte  | 4 bytes        | length bytes    |
//! +---------+----------------+-----------------+
//! ```
//!
//! 消息体编码由 [`WireFormat`] 决定，收发双方必须一致。

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::trace;

use crate::error::{ProtocolError, Result};
use crate::{CONNECT_TIMEOUT, DEFAULT_PORT, MAX_FRAME_SIZE, PROTOCOL_VERSION};

/// 消息体编码
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WireFormat {
    /// JSON，字段名原样出现在线上
    #[default]
    Json,
    /// bincode，紧凑但双方必须使用相同的结构定义
    Bincode,
}

impl WireFormat {
    fn encode<M: Serialize>(&self, msg: &M) -> Result<Vec<u8>> {
        match self {
            WireFormat::Json => Ok(serde_json::to_vec(msg)?),
            WireFormat::Bincode => Ok(bincode::serialize(msg)?),
        }
    }

    fn decode<M: DeserializeOwned>(&self, payload: &[u8]) -> Result<M> {
        match self {
            WireFormat::Json => Ok(serde_json::from_slice(payload)?),
            WireFormat::Bincode => Ok(bincode::deserialize(payload)?),
        }
    }
}

/// 服务器地址与编码
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NetworkConfig {
    pub host: String,
    pub port: u16,
    pub wire_format: WireFormat,
}

impl NetworkConfig {
    /// 连接地址 `host:port`
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: DEFAULT_PORT,
            wire_format: WireFormat::default(),
        }
    }
}

/// 双向消息连接
#[async_trait]
pub trait Connection: Send + Sync {
    async fn send<M: Serialize + Send + Sync>(&mut self, msg: &M) -> Result<()>;

    async fn recv<M: DeserializeOwned>(&mut self) -> Result<M>;

    /// 关闭写端，对方读到 EOF
    async fn close(&mut self) -> Result<()>;
}

/// 主动建立连接（客户端）
#[async_trait]
pub trait Connector: Send + Sync {
    type Conn: Connection;

    async fn connect(&self, addr: &str) -> Result<Self::Conn>;
}

/// 被动接受连接（服务端与测试）
#[async_trait]
pub trait Listener: Send + Sync + Sized {
    type Conn: Connection;

    async fn bind(addr: &str) -> Result<Self>;

    async fn accept(&mut self) -> Result<Self::Conn>;

    /// 实际绑定的地址（绑定端口 0 时用于获取端口）
    fn local_addr(&self) -> Option<String>;
}

// ============================================================================
// TCP 实现
// ============================================================================

/// TCP 连接器
#[derive(Clone, Copy, Debug, Default)]
pub struct TcpConnector {
    pub format: WireFormat,
}

impl TcpConnector {
    pub fn new(format: WireFormat) -> Self {
        Self { format }
    }
}

#[async_trait]
impl Connector for TcpConnector {
    type Conn = TcpConnection;

    async fn connect(&self, addr: &str) -> Result<TcpConnection> {
        let stream = match timeout(CONNECT_TIMEOUT, TcpStream::connect(addr)).await {
            Ok(stream) => stream?,
            Err(_) => return Err(ProtocolError::ConnectionTimeout),
        };
        TcpConnection::from_stream(stream, self.format)
    }
}

/// TCP 连接（已拆分为读写两端）
pub struct TcpConnection {
    reader: FrameReader<OwnedReadHalf>,
    writer: FrameWriter<OwnedWriteHalf>,
}

impl TcpConnection {
    pub fn from_stream(stream: TcpStream, format: WireFormat) -> Result<Self> {
        // 走法消息很小，关闭 Nagle 以免延迟
        stream.set_nodelay(true)?;
        let (read_half, write_half) = stream.into_split();
        Ok(Self {
            reader: FrameReader::new(read_half, format),
            writer: FrameWriter::new(write_half, format),
        })
    }

    /// 拆分为读端与写端，分别交给不同的任务
    pub fn split(self) -> (FrameReader<OwnedReadHalf>, FrameWriter<OwnedWriteHalf>) {
        (self.reader, self.writer)
    }
}

#[async_trait]
impl Connection for TcpConnection {
    async fn send<M: Serialize + Send + Sync>(&mut self, msg: &M) -> Result<()> {
        self.writer.write_frame(msg).await
    }

    async fn recv<M: DeserializeOwned>(&mut self) -> Result<M> {
        self.reader.read_frame().await
    }

    async fn close(&mut self) -> Result<()> {
        self.writer.shutdown().await
    }
}

/// TCP 监听器
pub struct TcpListener {
    inner: tokio::net::TcpListener,
    format: WireFormat,
}

impl TcpListener {
    /// 指定接受的连接使用的消息体编码
    pub fn with_format(self, format: WireFormat) -> Self {
        Self { format, ..self }
    }
}

#[async_trait]
impl Listener for TcpListener {
    type Conn = TcpConnection;

    async fn bind(addr: &str) -> Result<Self> {
        Ok(Self {
            inner: tokio::net::TcpListener::bind(addr).await?,
            format: WireFormat::default(),
        })
    }

    async fn accept(&mut self) -> Result<TcpConnection> {
        let (stream, _) = self.inner.accept().await?;
        TcpConnection::from_stream(stream, self.format)
    }

    fn local_addr(&self) -> Option<String> {
        self.inner.local_addr().ok().map(|a| a.to_string())
    }
}

// ============================================================================
// 帧编解码
// ============================================================================

/// 帧头
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct FrameHeader {
    length: usize,
}

impl FrameHeader {
    const SIZE: usize = 5;

    fn new(length: usize) -> Result<Self> {
        if length > MAX_FRAME_SIZE {
            return Err(ProtocolError::FrameTooLarge {
                size: length,
                max: MAX_FRAME_SIZE,
            });
        }
        Ok(Self { length })
    }

    fn parse(bytes: [u8; Self::SIZE]) -> Result<Self> {
        let [version, length @ ..] = bytes;
        if version != PROTOCOL_VERSION {
            return Err(ProtocolError::VersionMismatch {
                expected: PROTOCOL_VERSION,
                actual: version,
            });
        }
        Self::new(u32::from_be_bytes(length) as usize)
    }

    fn to_bytes(self) -> [u8; Self::SIZE] {
        let [a, b, c, d] = (self.length as u32).to_be_bytes();
        [PROTOCOL_VERSION, a, b, c, d]
    }
}

/// 帧读取器
pub struct FrameReader<R> {
    reader: R,
    format: WireFormat,
    buffer: Vec<u8>,
}

impl<R: AsyncRead + Unpin + Send> FrameReader<R> {
    pub fn new(reader: R, format: WireFormat) -> Self {
        Self {
            reader,
            format,
            buffer: Vec::new(),
        }
    }

    /// 读取并解码一帧，阻塞直到整帧到达；对端关闭时返回 `ConnectionClosed`
    pub async fn read_frame<M: DeserializeOwned>(&mut self) -> Result<M> {
        let mut bytes = [0u8; FrameHeader::SIZE];
        self.read_exact(&mut bytes).await?;
        let header = FrameHeader::parse(bytes)?;

        self.buffer.resize(header.length, 0);
        let mut payload = std::mem::take(&mut self.buffer);
        let read = self.read_exact(&mut payload).await;
        self.buffer = payload;
        read?;

        trace!("Read frame: {} bytes", header.length);
        self.format.decode(&self.buffer)
    }

    async fn read_exact(&mut self, buf: &mut [u8]) -> Result<()> {
        match self.reader.read_exact(buf).await {
            Ok(_) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                Err(ProtocolError::ConnectionClosed)
            }
            Err(e) => Err(ProtocolError::Io(e)),
        }
    }
}

/// 帧写入器
pub struct FrameWriter<W> {
    writer: W,
    format: WireFormat,
}

impl<W: AsyncWrite + Unpin + Send> FrameWriter<W> {
    pub fn new(writer: W, format: WireFormat) -> Self {
        Self { writer, format }
    }

    /// 编码并写入一帧
    pub async fn write_frame<M: Serialize>(&mut self, msg: &M) -> Result<()> {
        let payload = self.format.encode(msg)?;
        let header = FrameHeader::new(payload.len())?;

        let mut frame = Vec::with_capacity(FrameHeader::SIZE + payload.len());
        frame.extend_from_slice(&header.to_bytes());
        frame.extend_from_slice(&payload);
        self.writer.write_all(&frame).await?;
        self.writer.flush().await?;

        trace!("Wrote frame: {} bytes", header.length);
        Ok(())
    }

    /// 关闭写端
    pub async fn shutdown(&mut self) -> Result<()> {
        Ok(self.writer.shutdown().await?)
    }
}
