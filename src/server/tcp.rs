//! M3DA TCP listener.
//!
//! One tokio task per device connection. Each task owns a [`Connection`] and
//! only moves bytes: reads are fed to [`Connection::on_bytes`] and every
//! reaction is written back before the next read.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use super::connection::Connection;
use super::state::AppState;
use crate::error::{M3daError, Result};

const READ_BUFFER: usize = 8 * 1024;

/// TCP server for device connections
pub struct M3daTcpServer {
    app: Arc<AppState>,
    listener: TcpListener,
}

impl M3daTcpServer {
    /// Bind the configured TCP address
    pub async fn bind(app: Arc<AppState>) -> Result<Self> {
        let addr = app.config.tcp_addr;
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| M3daError::Server(format!("Failed to bind TCP to {}: {}", addr, e)))?;
        Ok(Self { app, listener })
    }

    /// Bound address, useful when port 0 was requested
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept connections until the listener fails
    pub async fn serve(self) -> Result<()> {
        tracing::info!("M3DA server listening on {}", self.local_addr()?);
        loop {
            let (stream, peer) = self
                .listener
                .accept()
                .await
                .map_err(|e| M3daError::Server(format!("TCP accept error: {}", e)))?;
            let app = Arc::clone(&self.app);
            tokio::spawn(async move {
                let _guard = app.track_connection();
                if let Err(e) = handle_stream(app.clone(), stream, peer).await {
                    tracing::debug!(%peer, error = %e, "connection ended with error");
                }
            });
        }
    }
}

async fn handle_stream(app: Arc<AppState>, mut stream: TcpStream, peer: SocketAddr) -> Result<()> {
    tracing::debug!(%peer, "device connected");
    let idle_timeout = app.config.idle_timeout;
    let mut connection = Connection::new(app);
    let mut buf = vec![0u8; READ_BUFFER];

    loop {
        let read = match tokio::time::timeout(idle_timeout, stream.read(&mut buf)).await {
            Ok(read) => read?,
            Err(_) => {
                tracing::info!(%peer, "closing idle connection");
                break;
            }
        };
        if read == 0 {
            if let Err(e) = connection.on_eof() {
                tracing::warn!(%peer, error = %e, "connection closed mid-envelope");
            }
            break;
        }

        let reaction = connection.on_bytes(&buf[..read]);
        for bytes in &reaction.writes {
            stream.write_all(bytes).await?;
        }
        if reaction.close {
            break;
        }
    }

    stream.shutdown().await.ok();
    tracing::debug!(%peer, "device disconnected");
    Ok(())
}
