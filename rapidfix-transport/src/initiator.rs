/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! Connecting side: resolve, iterate candidates, bind.

use crate::connection::{apply_socket_options, SocketOptions};
use rapidfix_core::error::SessionError;
use std::time::Duration;
use tokio::net::{lookup_host, TcpStream};

/// Parameters for one outbound connection attempt.
#[derive(Debug, Clone)]
pub struct ConnectSettings {
    /// Remote host name or address.
    pub host: String,
    /// Remote port.
    pub port: u16,
    /// Per-address connect timeout.
    pub timeout: Duration,
    /// Socket options to apply on success.
    pub options: SocketOptions,
}

/// Resolves the host and attempts each candidate address in turn, bounded
/// by the configured timeout. The first successful socket is returned with
/// options applied; callers hand it to [`crate::connection::bind_stream`].
///
/// # Errors
/// [`SessionError::Connect`] when resolution fails or every candidate
/// refuses or times out. The session retries on its reconnect interval.
pub async fn connect(settings: &ConnectSettings) -> Result<TcpStream, SessionError> {
    let addrs = lookup_host((settings.host.as_str(), settings.port))
        .await
        .map_err(|e| SessionError::Connect(format!("resolving {}: {e}", settings.host)))?;

    let mut last_error = None;
    for addr in addrs {
        match tokio::time::timeout(settings.timeout, TcpStream::connect(addr)).await {
            Ok(Ok(stream)) => {
                tracing::info!(%addr, "connected");
                apply_socket_options(&stream, settings.options);
                return Ok(stream);
            }
            Ok(Err(e)) => {
                tracing::debug!(%addr, error = %e, "connect attempt failed");
                last_error = Some(e.to_string());
            }
            Err(_) => {
                tracing::debug!(%addr, "connect attempt timed out");
                last_error = Some("timed out".to_string());
            }
        }
    }

    Err(SessionError::Connect(format!(
        "{}:{}: {}",
        settings.host,
        settings.port,
        last_error.unwrap_or_else(|| "no addresses resolved".to_string())
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    fn settings(host: &str, port: u16) -> ConnectSettings {
        ConnectSettings {
            host: host.to_string(),
            port,
            timeout: Duration::from_millis(500),
            options: SocketOptions::default(),
        }
    }

    #[tokio::test]
    async fn test_connect_success() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let stream = connect(&settings("127.0.0.1", addr.port())).await.unwrap();
        assert_eq!(stream.peer_addr().unwrap(), addr);
    }

    #[tokio::test]
    async fn test_connect_refused() {
        // Bind then drop to get a port with nothing listening.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        assert!(matches!(
            connect(&settings("127.0.0.1", port)).await,
            Err(SessionError::Connect(_))
        ));
    }

    #[tokio::test]
    async fn test_connect_bad_host() {
        assert!(matches!(
            connect(&settings("host.invalid.rapidfix.test", 1)).await,
            Err(SessionError::Connect(_))
        ));
    }
}
