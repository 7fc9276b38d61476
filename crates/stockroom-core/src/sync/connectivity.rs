//! Reachability checks consulted before each scheduled cycle.

use std::time::Duration;

use tokio::net::TcpStream;
use url::Url;

use crate::http::TransportError;

#[allow(async_fn_in_trait)]
pub trait ConnectivityCheck {
    async fn is_online(&self) -> bool;
}

/// Always reports online; the cycle itself surfaces network failures.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysOnline;

impl ConnectivityCheck for AlwaysOnline {
    async fn is_online(&self) -> bool {
        true
    }
}

/// Online when a TCP connection to the API host succeeds within `timeout`.
#[derive(Debug, Clone)]
pub struct TcpProbe {
    address: String,
    timeout: Duration,
}

impl TcpProbe {
    pub fn new(address: impl Into<String>, timeout: Duration) -> Self {
        Self {
            address: address.into(),
            timeout,
        }
    }

    pub fn from_base_url(base_url: &str, timeout: Duration) -> Result<Self, TransportError> {
        let url = Url::parse(base_url.trim())
            .map_err(|e| TransportError::InvalidConfiguration(e.to_string()))?;
        let host = url.host_str().ok_or_else(|| {
            TransportError::InvalidConfiguration(format!("{base_url} has no host"))
        })?;
        let port = url.port_or_known_default().ok_or_else(|| {
            TransportError::InvalidConfiguration(format!("{base_url} has no port"))
        })?;

        let address = if host.contains(':') && !host.starts_with('[') {
            format!("[{host}]:{port}")
        } else {
            format!("{host}:{port}")
        };
        Ok(Self::new(address, timeout))
    }

    pub fn address(&self) -> &str {
        &self.address
    }
}

impl ConnectivityCheck for TcpProbe {
    async fn is_online(&self) -> bool {
        match tokio::time::timeout(self.timeout, TcpStream::connect(&self.address)).await {
            Ok(Ok(_)) => true,
            Ok(Err(error)) => {
                tracing::debug!("{} unreachable: {}", self.address, error);
                false
            }
            Err(_) => {
                tracing::debug!("{} probe timed out", self.address);
                false
            }
        }
    }
}
