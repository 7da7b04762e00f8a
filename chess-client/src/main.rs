use std::process::ExitCode;

use anyhow::Result;
use chess_client::view::{spawn_stdin_input, TerminalView};
use chess_client::{ChessClient, ClientConfig, ClientSettings, SessionEnd};
use protocol::ChessRules;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let mut settings = ClientSettings::load();

    // 初始化日志
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(tracing_subscriber::EnvFilter::from_default_env()
            .add_directive(format!("chess_client={}", settings.log_level.as_directive()).parse()?))
        .init();

    // 首次运行写出默认设置，命令行覆盖不落盘
    if ClientSettings::settings_path().is_some_and(|path| !path.exists()) {
        if let Err(e) = settings.save() {
            warn!("Failed to write default settings: {}", e);
        }
    }

    if let Some(address) = std::env::args().nth(1) {
        settings.apply_server_override(&address)?;
    }
    let config = ClientConfig::from_settings(&settings)?;
    info!("Connecting to {}", config.network.address());

    let layout = config.layout;
    let (view, orientation) = TerminalView::stdout(layout);
    let mut client = ChessClient::new(config, ChessRules, view);
    spawn_stdin_input(layout, orientation, client.event_sender());

    let end = match client.run().await {
        Ok(end) => end,
        Err(e) => {
            error!("{}", e);
            return Ok(ExitCode::FAILURE);
        }
    };

    match end {
        SessionEnd::GameOver(status) => {
            info!("Game over: {:?}", status);
            Ok(ExitCode::SUCCESS)
        }
        SessionEnd::Disconnected(reason) => {
            error!("Disconnected: {}", reason);
            Ok(ExitCode::FAILURE)
        }
    }
}
