//! Engine endpoint addresses.

use std::fmt;
#[cfg(unix)]
use std::path::PathBuf;
use std::str::FromStr;

use crate::error::ClientError;

/// Port the engine listens on by default.
pub const DEFAULT_PORT: u16 = 6142;

/// Where the engine is reachable.
///
/// Accepted forms:
/// - `6142`: TCP on localhost
/// - `host:port` or `tcp://host:port`
/// - `unix:/path/to.sock` or `unix:///path/to.sock` (unix only)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    /// TCP `host:port`.
    Tcp(String),
    /// Unix domain socket path.
    #[cfg(unix)]
    Unix(PathBuf),
}

impl Default for Endpoint {
    fn default() -> Self {
        Self::Tcp(format!("127.0.0.1:{DEFAULT_PORT}"))
    }
}

impl FromStr for Endpoint {
    type Err = ClientError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(ClientError::InvalidEndpoint("empty endpoint".into()));
        }

        if let Some(path) = s.strip_prefix("unix://").or_else(|| s.strip_prefix("unix:")) {
            return unix_endpoint(path);
        }

        let addr = s.strip_prefix("tcp://").unwrap_or(s);
        if let Ok(port) = addr.parse::<u16>() {
            return Ok(Self::Tcp(format!("127.0.0.1:{port}")));
        }

        match addr.rsplit_once(':') {
            Some((host, port)) if !host.is_empty() && port.parse::<u16>().is_ok() => {
                Ok(Self::Tcp(addr.to_string()))
            }
            _ => Err(ClientError::InvalidEndpoint(format!(
                "expected PORT, HOST:PORT or unix:PATH, got {s:?}"
            ))),
        }
    }
}

#[cfg(unix)]
fn unix_endpoint(path: &str) -> Result<Endpoint, ClientError> {
    if path.is_empty() {
        return Err(ClientError::InvalidEndpoint("empty socket path".into()));
    }
    Ok(Endpoint::Unix(PathBuf::from(path)))
}

#[cfg(not(unix))]
fn unix_endpoint(_path: &str) -> Result<Endpoint, ClientError> {
    Err(ClientError::InvalidEndpoint(
        "unix sockets are not supported on this platform".into(),
    ))
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tcp(addr) => write!(f, "{addr}"),
            #[cfg(unix)]
            Self::Unix(path) => write!(f, "unix:{}", path.display()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_port_is_localhost() {
        let endpoint: Endpoint = "6142".parse().unwrap();
        assert_eq!(endpoint, Endpoint::Tcp("127.0.0.1:6142".into()));
        assert_eq!(endpoint, Endpoint::default());
    }

    #[test]
    fn host_and_port() {
        let endpoint: Endpoint = "engine.local:7000".parse().unwrap();
        assert_eq!(endpoint, Endpoint::Tcp("engine.local:7000".into()));

        let endpoint: Endpoint = "tcp://[::1]:7000".parse().unwrap();
        assert_eq!(endpoint, Endpoint::Tcp("[::1]:7000".into()));
    }

    #[cfg(unix)]
    #[test]
    fn unix_socket_forms() {
        let short: Endpoint = "unix:/run/engine.sock".parse().unwrap();
        let long: Endpoint = "unix:///run/engine.sock".parse().unwrap();
        assert_eq!(short, Endpoint::Unix(PathBuf::from("/run/engine.sock")));
        assert_eq!(short, long);
        assert_eq!(short.to_string(), "unix:/run/engine.sock");
    }

    #[test]
    fn rejects_garbage() {
        for input in ["", "   ", "engine", "engine:", ":6142", "host:99999", "unix:"] {
            let result = input.parse::<Endpoint>();
            assert!(
                matches!(result, Err(ClientError::InvalidEndpoint(_))),
                "{input:?} should be rejected"
            );
        }
    }

    #[test]
    fn display_parses_back() {
        let endpoint: Endpoint = "10.0.0.2:6142".parse().unwrap();
        let again: Endpoint = endpoint.to_string().parse().unwrap();
        assert_eq!(endpoint, again);
    }
}
