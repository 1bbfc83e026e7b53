//! # callcast web console
//!
//! A small HTTP surface over a running [`CallManager`]:
//!
//! | Route | Response |
//! |---|---|
//! | `GET /`, `GET /health` | plain-text liveness |
//! | `GET /status` | [`ManagerStatus`](callcast_session_core::ManagerStatus) as JSON |
//! | `GET /sessions/:chat_id` | one session summary, `404` when not in a call |
//!
//! Hosting platforms that probe a port for liveness only need `/health`.

mod error;
mod routes;

use std::net::SocketAddr;

use callcast_session_core::CallManager;
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;

pub use error::{ApiError, ConsoleError};
pub use routes::router;

/// Where the console listens
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsoleConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
        }
    }
}

impl ConsoleConfig {
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn addr(&self) -> Result<SocketAddr, ConsoleError> {
        let raw = format!("{}:{}", self.host, self.port);
        raw.parse().map_err(|_| ConsoleError::InvalidAddress(raw))
    }
}

/// Bind and serve until `shutdown` resolves
pub async fn serve<F>(config: &ConsoleConfig, manager: CallManager, shutdown: F) -> Result<(), ConsoleError>
where
    F: std::future::Future<Output = ()> + Send + 'static,
{
    let addr = config.addr()?;
    let listener = TcpListener::bind(addr).await.map_err(|e| ConsoleError::Bind {
        addr: addr.to_string(),
        reason: e.to_string(),
    })?;
    serve_on(listener, manager, shutdown).await
}

/// Serve on an already bound listener
pub async fn serve_on<F>(listener: TcpListener, manager: CallManager, shutdown: F) -> Result<(), ConsoleError>
where
    F: std::future::Future<Output = ()> + Send + 'static,
{
    let local = listener.local_addr().map_err(|e| ConsoleError::Io(e.to_string()))?;
    tracing::info!(addr = %local, "web console listening");
    axum::serve(listener, router(manager))
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| ConsoleError::Io(e.to_string()))?;
    tracing::info!("web console stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_addr() {
        let config = ConsoleConfig::default();
        assert_eq!(config.addr().unwrap(), "0.0.0.0:8000".parse().unwrap());
        assert_eq!(config.with_port(9001).addr().unwrap().port(), 9001);
    }

    #[test]
    fn test_bad_host() {
        let config = ConsoleConfig {
            host: "not a host".into(),
            port: 80,
        };
        assert!(matches!(config.addr(), Err(ConsoleError::InvalidAddress(_))));
    }
}
