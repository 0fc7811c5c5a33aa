use medchat::{api, app::ChatApp, config, logging};
use std::net::Ipv4Addr;
use std::ops::RangeInclusive;
use std::sync::Arc;
use tokio::net::TcpListener;

/// Ports tried in order when `SERVER_PORT` is unset.
const FALLBACK_PORTS: RangeInclusive<u16> = 7860..=7899;

#[tokio::main]
async fn main() {
    config::init_config();
    logging::init_tracing(false);
    let app = api::create_router(Arc::new(ChatApp::new().await));

    let (listener, port) = bind_listener().await.expect("Failed to bind listener");
    tracing::info!(port, "medchat listening on http://0.0.0.0:{port}");
    axum::serve(listener, app).await.expect("HTTP server failed");
}

async fn bind_listener() -> std::io::Result<(TcpListener, u16)> {
    if let Some(port) = config::get_config().server_port {
        let listener = TcpListener::bind((Ipv4Addr::UNSPECIFIED, port)).await?;
        return Ok((listener, port));
    }

    for port in FALLBACK_PORTS {
        match TcpListener::bind((Ipv4Addr::UNSPECIFIED, port)).await {
            Ok(listener) => return Ok((listener, port)),
            Err(err) if err.kind() == std::io::ErrorKind::AddrInUse => {
                tracing::debug!(port, "Port busy; trying next");
            }
            Err(err) => return Err(err),
        }
    }

    Err(std::io::Error::new(
        std::io::ErrorKind::AddrNotAvailable,
        format!(
            "no free port in {}-{}",
            FALLBACK_PORTS.start(),
            FALLBACK_PORTS.end()
        ),
    ))
}
