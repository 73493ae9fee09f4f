//! The TCP listener: accepts connections and runs each one on its own task
//! through handshake and session.  No connection failure ever stops the
//! accept loop.

use crate::config::RtmpConfig;
use crate::connection::{BufDuplex, Conn};
use crate::handshake;
use crate::router::StreamRouter;
use crate::session::ServerSession;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream};
use tracing::{info, warn};

/// Binds the configured address and serves RTMP forever
pub async fn listen(config: RtmpConfig) -> io::Result<()> {
    let listener = TcpListener::bind(&config.bind_address).await?;
    let router = Arc::new(StreamRouter::new(Duration::from_secs(
        config.publisher_grace_secs,
    )));

    serve(listener, config, router).await
}

/// Accept loop over an already bound listener
pub async fn serve(
    listener: TcpListener,
    config: RtmpConfig,
    router: Arc<StreamRouter>,
) -> io::Result<()> {
    info!(
        event = "rtmp listen",
        addr = %listener.local_addr()?,
    );

    loop {
        let (stream, peer_addr) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(error) => {
                warn!(event = "accept", %error);
                continue;
            }
        };

        let config = config.clone();
        let router = router.clone();
        tokio::spawn(async move {
            handle_connection(stream, peer_addr, config, router).await;
        });
    }
}

async fn handle_connection(
    stream: TcpStream,
    peer_addr: SocketAddr,
    config: RtmpConfig,
    router: Arc<StreamRouter>,
) {
    if let Err(error) = stream.set_nodelay(true) {
        warn!(event = "set nodelay", addr = %peer_addr, %error);
    }

    info!(event = "connection accepted", addr = %peer_addr);
    serve_connection(stream, peer_addr.to_string(), config, router).await;
}

/// Drives one connection to completion; generic so tests can run it over an
/// in-memory duplex
pub(crate) async fn serve_connection<S>(
    stream: S,
    peer_addr: String,
    config: RtmpConfig,
    router: Arc<StreamRouter>,
) where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut io = BufDuplex::new(stream);

    let handshake_timeout = Duration::from_millis(config.handshake_timeout_ms);
    match tokio::time::timeout(handshake_timeout, handshake::serve(&mut io, 0)).await {
        Ok(Ok(())) => {}
        Ok(Err(error)) => {
            warn!(event = "handshake", addr = %peer_addr, %error);
            return;
        }
        Err(_) => {
            warn!(event = "handshake", addr = %peer_addr, "timed out");
            return;
        }
    }

    let conn = Conn::new(io, peer_addr.clone(), &config);
    let session = ServerSession::new(conn, router, &config);

    match session.run().await {
        Ok(()) => info!(event = "connection closed", addr = %peer_addr),
        Err(error) => warn!(event = "connection closed", addr = %peer_addr, %error),
    }
}
