use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;
use tracing::debug;

/// Answers whether outbound network access is usable right now.
pub trait Connectivity: Send + Sync {
    fn is_reachable(&self) -> bool;
}

/// Reports reachability by opening a TCP connection to the catalog host.
#[derive(Debug, Clone)]
pub struct TcpProbe {
    host: String,
    port: u16,
    timeout: Duration,
}

impl TcpProbe {
    pub fn new(host: impl Into<String>, port: u16, timeout: Duration) -> Self {
        Self {
            host: host.into(),
            port,
            timeout,
        }
    }

    /// Probes the host of an `http(s)://host[:port]/...` base URL.
    pub fn for_base_url(base_url: &str, timeout: Duration) -> Self {
        let (scheme, rest) = base_url.split_once("://").unwrap_or(("https", base_url));
        let authority = rest.split('/').next().unwrap_or(rest);
        let default_port = if scheme.eq_ignore_ascii_case("http") { 80 } else { 443 };
        let (host, port) = match authority.rsplit_once(':') {
            Some((h, p)) => (h, p.parse().unwrap_or(default_port)),
            None => (authority, default_port),
        };
        Self::new(host, port, timeout)
    }
}

impl Connectivity for TcpProbe {
    fn is_reachable(&self) -> bool {
        let addrs = match (self.host.as_str(), self.port).to_socket_addrs() {
            Ok(addrs) => addrs,
            Err(e) => {
                debug!("Could not resolve {}: {}", self.host, e);
                return false;
            }
        };
        for addr in addrs {
            if TcpStream::connect_timeout(&addr, self.timeout).is_ok() {
                return true;
            }
        }
        debug!("No route to {}:{}", self.host, self.port);
        false
    }
}

/// Fixed answer, for running against the cache only.
#[derive(Debug, Clone, Copy)]
pub struct StaticConnectivity(pub bool);

impl Connectivity for StaticConnectivity {
    fn is_reachable(&self) -> bool {
        self.0
    }
}
