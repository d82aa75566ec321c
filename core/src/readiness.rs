//! TCP connect probing used while the helper initializes

use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::debug;

/// Probe that succeeds once something accepts connections on `host:port`
///
/// # Example
///
/// ```rust,no_run
/// use ctx7_core::readiness::TcpProbe;
/// use std::time::Duration;
///
/// # async fn example() {
/// let probe = TcpProbe::new("127.0.0.1", 8809, Duration::from_millis(100));
/// if probe.accepts().await {
///     println!("helper is listening");
/// }
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct TcpProbe {
    host: String,
    port: u16,
    timeout: Duration,
}

impl TcpProbe {
    /// Create a new TCP probe
    pub fn new(host: impl Into<String>, port: u16, timeout: Duration) -> Self {
        Self {
            host: host.into(),
            port,
            timeout,
        }
    }

    /// Get the target address as a string
    #[must_use]
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Attempt one connection; the stream is dropped immediately
    pub async fn accepts(&self) -> bool {
        let address = self.address();
        match timeout(self.timeout, TcpStream::connect(&address)).await {
            Ok(Ok(_stream)) => {
                debug!("TCP probe to {} succeeded", address);
                true
            }
            Ok(Err(e)) => {
                debug!("TCP probe to {} failed: {}", address, e);
                false
            }
            Err(_) => {
                debug!("TCP probe to {} timed out after {:?}", address, self.timeout);
                false
            }
        }
    }
}
