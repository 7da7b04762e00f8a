//! 客户端设置模块
//!
//! 提供设置数据结构与持久化（用户配置目录下的 JSON 文件）

use std::path::{Path, PathBuf};
use std::time::Duration;

use protocol::{NetworkConfig, WireFormat, DEFAULT_PORT};
use serde::{Deserialize, Serialize};

use crate::board::DEFAULT_CELL_SIZE;
use crate::error::{ClientError, Result};

/// 日志级别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    /// EnvFilter 指令中使用的级别名
    pub fn as_directive(&self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

/// 客户端设置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientSettings {
    // === 网络设置 ===
    /// 服务器地址 `host:port`
    pub server_address: String,
    /// 消息体编码，需与服务端一致
    pub wire_format: WireFormat,
    /// 断线后重连次数（0 表示断线即退出）
    pub reconnect_attempts: u32,
    /// 重连间隔（毫秒）
    pub reconnect_delay_ms: u64,

    // === 棋盘设置 ===
    /// 格子边长（像素）
    pub cell_size: u32,
    /// 选子后自动取消的时间（毫秒）
    pub deselect_timeout_ms: u64,

    // === 高级设置 ===
    pub log_level: LogLevel,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            server_address: format!("127.0.0.1:{}", DEFAULT_PORT),
            wire_format: WireFormat::default(),
            reconnect_attempts: 0,
            reconnect_delay_ms: 1000,

            cell_size: DEFAULT_CELL_SIZE,
            deselect_timeout_ms: 3000,

            log_level: LogLevel::default(),
        }
    }
}

/// 解析 `host` 或 `host:port`，缺省端口为 [`DEFAULT_PORT`]
pub fn parse_server_address(address: &str) -> Result<(String, u16)> {
    let address = address.trim();
    let (host, port) = match address.rsplit_once(':') {
        Some((host, port)) => {
            let port = port
                .parse::<u16>()
                .map_err(|_| ClientError::Settings(format!("invalid port in {:?}", address)))?;
            (host, port)
        }
        None => (address, DEFAULT_PORT),
    };
    if host.is_empty() {
        return Err(ClientError::Settings(format!("missing host in {:?}", address)));
    }
    Ok((host.to_string(), port))
}

impl ClientSettings {
    /// 获取设置文件路径
    pub fn settings_path() -> Option<PathBuf> {
        dirs::config_dir().map(|mut path| {
            path.push("chess-client");
            path.push("settings.json");
            path
        })
    }

    /// 从默认位置加载设置，失败时使用默认值
    pub fn load() -> Self {
        let Some(path) = Self::settings_path() else {
            tracing::warn!("Config directory unavailable, using default settings");
            return Self::default();
        };
        Self::load_from(&path)
    }

    /// 从指定文件加载设置，文件不存在或格式无效时使用默认值
    pub fn load_from(path: &Path) -> Self {
        if !path.exists() {
            tracing::info!("Settings file not found, using defaults");
            return Self::default();
        }

        match std::fs::read_to_string(path) {
            Ok(content) => match serde_json::from_str(&content) {
                Ok(settings) => {
                    tracing::info!("Loaded settings: {:?}", path);
                    settings
                }
                Err(e) => {
                    tracing::warn!("Invalid settings file: {}, using defaults", e);
                    Self::default()
                }
            },
            Err(e) => {
                tracing::warn!("Cannot read settings file: {}, using defaults", e);
                Self::default()
            }
        }
    }

    /// 保存设置到默认位置
    pub fn save(&self) -> Result<()> {
        let path = Self::settings_path()
            .ok_or_else(|| ClientError::Settings("config directory unavailable".to_string()))?;
        self.save_to(&path)
    }

    /// 保存设置到指定文件
    pub fn save_to(&self, path: &Path) -> Result<()> {
        // 确保目录存在
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                ClientError::Settings(format!("cannot create config directory: {}", e))
            })?;
        }

        let content = serde_json::to_string_pretty(self)
            .map_err(|e| ClientError::Settings(format!("serialize failed: {}", e)))?;

        std::fs::write(path, content)
            .map_err(|e| ClientError::Settings(format!("write failed: {}", e)))?;

        tracing::info!("Settings saved: {:?}", path);
        Ok(())
    }

    /// 命令行参数覆盖服务器地址
    pub fn apply_server_override(&mut self, arg: &str) -> Result<()> {
        let (host, port) = parse_server_address(arg)?;
        self.server_address = format!("{}:{}", host, port);
        Ok(())
    }

    /// 连接配置
    pub fn network(&self) -> Result<NetworkConfig> {
        let (host, port) = parse_server_address(&self.server_address)?;
        Ok(NetworkConfig {
            host,
            port,
            wire_format: self.wire_format,
        })
    }

    pub fn deselect_timeout(&self) -> Duration {
        Duration::from_millis(self.deselect_timeout_ms)
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }
}
